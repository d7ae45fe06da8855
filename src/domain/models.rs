use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ProjectAggregate;

/// One element of a signatures-for-address result, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    /// Non-null when the transaction failed on chain.
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

impl SignatureInfo {
    pub fn is_failed(&self) -> bool {
        self.err.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContribution {
    pub project_id: String,
    pub amount: f64,
}

impl ProjectContribution {
    pub fn new(project_id: impl Into<String>, amount: f64) -> Self {
        Self {
            project_id: project_id.into(),
            amount,
        }
    }

    /// Amounts must be finite and non-negative to be aggregated.
    pub fn is_valid(&self) -> bool {
        self.amount.is_finite() && self.amount >= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateEntry {
    pub project_id: String,
    pub total_amount: f64,
}

/// A signature that could not be turned into a contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub signature: String,
    pub reason: String,
}

/// Outcome of a single pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub aggregate: ProjectAggregate,
    pub top_n: usize,
    pub signatures_fetched: usize,
    pub resolved: usize,
    pub unattributed: usize,
    /// Transactions that no longer resolve (pruned or not finalized).
    pub skipped: Vec<ItemFailure>,
    pub failed: Vec<ItemFailure>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn top(&self) -> Vec<AggregateEntry> {
        self.aggregate.top_n(self.top_n)
    }
}

pub const UNKNOWN_PROJECT: &str = "UNKNOWN";

pub const MAGIC_EDEN_V2_PROGRAM_ID: &str = "M2mx93ekt1fmXSVkTrUL9xVFHkmME8HTUi5Cyc5aF7K";
pub const DEFAULT_RPC_ENDPOINT: &str = "https://api.mainnet-beta.solana.com";
