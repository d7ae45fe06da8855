use serde_json::{json, Value};

use crate::{
    application::ReportEmitter,
    domain::{AggregateEntry, RunReport},
};

/// Machine-readable report: `{"top": [...], "summary": {...}}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReport;

impl JsonReport {
    pub fn new() -> Self {
        Self
    }

    fn top(entries: &[AggregateEntry]) -> Value {
        Value::Array(
            entries
                .iter()
                .map(|entry| json!({"projectId": entry.project_id, "amount": entry.total_amount}))
                .collect(),
        )
    }
}

impl ReportEmitter for JsonReport {
    fn render_entries(&self, entries: &[AggregateEntry]) -> String {
        format!("{:#}", json!({ "top": Self::top(entries) }))
    }

    fn render(&self, report: &RunReport) -> String {
        let document = json!({
            "top": Self::top(&report.top()),
            "summary": {
                "signatures": report.signatures_fetched,
                "resolved": report.resolved,
                "unattributed": report.unattributed,
                "projects": report.aggregate.len(),
                "skipped": report.skipped,
                "failed": report.failed,
                "cancelled": report.cancelled,
            },
        });
        format!("{document:#}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemFailure, ProjectAggregate, ProjectContribution};

    #[test]
    fn empty_input_has_an_empty_top_list() {
        let rendered: Value = serde_json::from_str(&JsonReport.render_entries(&[])).unwrap();
        assert_eq!(rendered, json!({"top": []}));
    }

    #[test]
    fn renders_ranking_and_summary() {
        let mut aggregate = ProjectAggregate::new();
        for (project, amount) in [("P1", 1.0), ("P1", 1.0), ("P2", 3.0)] {
            aggregate.accumulate(&ProjectContribution::new(project, amount));
        }
        let report = RunReport {
            aggregate,
            top_n: 10,
            signatures_fetched: 4,
            resolved: 3,
            skipped: vec![ItemFailure {
                signature: "sigC".into(),
                reason: "transaction not found: sigC".into(),
            }],
            ..RunReport::default()
        };

        let rendered: Value = serde_json::from_str(&JsonReport.render(&report)).unwrap();
        assert_eq!(
            rendered["top"],
            json!([{"projectId": "P2", "amount": 3.0}, {"projectId": "P1", "amount": 2.0}])
        );
        assert_eq!(rendered["summary"]["signatures"], 4);
        assert_eq!(rendered["summary"]["projects"], 2);
        assert_eq!(rendered["summary"]["skipped"][0]["signature"], "sigC");
        assert_eq!(rendered["summary"]["failed"], json!([]));
        assert_eq!(rendered["summary"]["cancelled"], false);
    }
}
