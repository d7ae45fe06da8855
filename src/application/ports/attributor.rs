use serde_json::Value;

use crate::domain::ProjectContribution;

/// Maps one `jsonParsed` transaction to the project it concerns.
///
/// Implementations get the transaction exactly as returned by the endpoint
/// (the `result` of a get-transaction call) and return `None` when the
/// transaction carries no event they recognise.
pub trait ProjectAttributor: Send + Sync {
    fn attribute(&self, transaction: &Value) -> Option<ProjectContribution>;
    fn name(&self) -> &str;
}
