//! Per-project accumulation.
//!
//! Entries keep the order in which each project was first seen. Ranking sorts
//! by total descending with a stable sort, so equal totals stay in
//! first-insertion order and the ranking is a deterministic total order.

use std::collections::HashMap;

use super::{AggregateEntry, ProjectContribution};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectAggregate {
    entries: Vec<AggregateEntry>,
    index: HashMap<String, usize>,
}

impl ProjectAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the contribution to its project, creating the entry on first sighting.
    /// Returns `false` (and leaves the aggregate untouched) for negative or
    /// non-finite amounts.
    pub fn accumulate(&mut self, contribution: &ProjectContribution) -> bool {
        if !contribution.is_valid() {
            tracing::warn!(
                project_id = %contribution.project_id,
                amount = contribution.amount,
                "Rejected contribution with invalid amount"
            );
            return false;
        }

        match self.index.get(&contribution.project_id) {
            Some(&position) => self.entries[position].total_amount += contribution.amount,
            None => {
                self.index
                    .insert(contribution.project_id.clone(), self.entries.len());
                self.entries.push(AggregateEntry {
                    project_id: contribution.project_id.clone(),
                    total_amount: contribution.amount,
                });
            }
        }
        true
    }

    pub fn total(&self, project_id: &str) -> Option<f64> {
        self.index
            .get(project_id)
            .map(|&position| self.entries[position].total_amount)
    }

    /// Entries in first-insertion order.
    pub fn entries(&self) -> &[AggregateEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top_n(&self, n: usize) -> Vec<AggregateEntry> {
        top_n(&self.entries, n)
    }
}

/// The `n` entries with the largest totals, descending. Ties keep their input order.
pub fn top_n(entries: &[AggregateEntry], n: usize) -> Vec<AggregateEntry> {
    let mut ranked = entries.to_vec();
    ranked.sort_by(|a, b| b.total_amount.total_cmp(&a.total_amount));
    ranked.truncate(n);
    ranked
}
