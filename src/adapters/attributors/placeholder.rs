use serde_json::Value;

use crate::{
    application::ProjectAttributor,
    domain::{ProjectContribution, UNKNOWN_PROJECT},
};

/// Attributes every transaction to one fixed project with a fixed amount.
/// Used when no real extraction rule is configured.
pub struct PlaceholderAttributor {
    project_id: String,
    amount: f64,
}

impl PlaceholderAttributor {
    pub fn new(project_id: impl Into<String>, amount: f64) -> Self {
        Self {
            project_id: project_id.into(),
            amount,
        }
    }
}

impl Default for PlaceholderAttributor {
    fn default() -> Self {
        Self::new(UNKNOWN_PROJECT, 1.0)
    }
}

impl ProjectAttributor for PlaceholderAttributor {
    fn name(&self) -> &str {
        "PlaceholderAttributor"
    }

    fn attribute(&self, _transaction: &Value) -> Option<ProjectContribution> {
        Some(ProjectContribution::new(self.project_id.clone(), self.amount))
    }
}
