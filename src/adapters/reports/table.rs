use std::fmt::Write;

use crate::{
    application::ReportEmitter,
    domain::{AggregateEntry, ItemFailure, RunReport},
};

const HEADERS: [&str; 3] = ["(index)", "projectId", "amount"];

/// Console-style table: `(index) | projectId | amount`, one row per project.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableReport;

impl TableReport {
    pub fn new() -> Self {
        Self
    }
}

/// Whole amounts print without a fractional part, like `1` rather than `1.0`.
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount.abs() < 1e15 {
        format!("{amount:.0}")
    } else {
        amount.to_string()
    }
}

fn write_row(out: &mut String, cells: &[String; 3], widths: &[usize; 3]) {
    let _ = writeln!(
        out,
        "| {:<w0$} | {:<w1$} | {:>w2$} |",
        cells[0],
        cells[1],
        cells[2],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
    );
}

fn write_failures(out: &mut String, label: &str, items: &[ItemFailure]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{label}:");
    for item in items {
        let _ = writeln!(out, "  {}  {}", item.signature, item.reason);
    }
}

impl ReportEmitter for TableReport {
    fn render_entries(&self, entries: &[AggregateEntry]) -> String {
        let rows: Vec<[String; 3]> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                [
                    index.to_string(),
                    entry.project_id.clone(),
                    format_amount(entry.total_amount),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        write_row(&mut out, &HEADERS.map(String::from), &widths);
        let separator: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        let _ = writeln!(out, "|{}|", separator.join("|"));
        for row in &rows {
            write_row(&mut out, row, &widths);
        }
        out
    }

    fn render(&self, report: &RunReport) -> String {
        let mut out = self.render_entries(&report.top());

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "signatures: {}  resolved: {}  unattributed: {}  skipped: {}  failed: {}",
            report.signatures_fetched,
            report.resolved,
            report.unattributed,
            report.skipped.len(),
            report.failed.len()
        );
        write_failures(&mut out, "skipped", &report.skipped);
        write_failures(&mut out, "failed", &report.failed);
        if report.cancelled {
            let _ = writeln!(out, "run cancelled before all transactions were resolved");
        }
        out
    }
}
