use crate::domain::{AggregateEntry, RunReport};

pub trait ReportEmitter: Send + Sync {
    /// Renders ranked entries. An empty slice renders an empty table.
    fn render_entries(&self, entries: &[AggregateEntry]) -> String;
    /// Renders the ranking together with the run summary.
    fn render(&self, report: &RunReport) -> String;
}
