//! Signature fetching with explicit pagination.
//!
//! Pages are requested newest first. After a full page the next request uses
//! `before` = the last (oldest) signature of that page while `until` stays
//! fixed. Fetching stops at the first page shorter than `limit`, at the first
//! entry past the cutoff, or after `max_pages` pages.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::{
    application::{AppError, AppResult, RpcClient},
    domain::SignatureInfo,
};

pub const MAX_PAGE_LIMIT: usize = 1000;
pub const DEFAULT_PAGE_LIMIT: usize = MAX_PAGE_LIMIT;
pub const DEFAULT_MAX_PAGES: usize = 10;
pub const DEFAULT_SIGNATURES_METHOD: &str = "getConfirmedSignaturesForAddress2";

/// Lower bound of the fetch window.
#[derive(Debug, Clone, PartialEq)]
pub enum Cutoff {
    /// Sent to the endpoint as `until`; the endpoint stops before this signature.
    Signature(String),
    /// Entries with a `blockTime` older than this are dropped. Entries without a
    /// `blockTime` are kept.
    Timestamp(DateTime<Utc>),
    /// Entries from an older slot are dropped.
    Slot(u64),
}

impl Cutoff {
    fn excludes(&self, info: &SignatureInfo) -> bool {
        match self {
            Cutoff::Signature(_) => false,
            Cutoff::Timestamp(at) => info
                .block_time
                .map_or(false, |block_time| block_time < at.timestamp()),
            Cutoff::Slot(slot) => info.slot < *slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub limit: usize,
    pub until: Option<Cutoff>,
    pub max_pages: usize,
    pub include_failed: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            until: None,
            max_pages: DEFAULT_MAX_PAGES,
            include_failed: false,
        }
    }
}

impl FetchOptions {
    pub fn validate(&self) -> AppResult<()> {
        if self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(AppError::Config(format!(
                "page limit must be between 1 and {MAX_PAGE_LIMIT}, got {}",
                self.limit
            )));
        }
        if self.max_pages == 0 {
            return Err(AppError::Config("max pages must be at least 1".to_string()));
        }
        Ok(())
    }
}

pub struct SignatureFetcher {
    client: RpcClient,
    method: String,
}

impl SignatureFetcher {
    pub fn new(client: RpcClient) -> Self {
        Self {
            client,
            method: DEFAULT_SIGNATURES_METHOD.to_string(),
        }
    }

    /// Switches to another signatures-for-address method, e.g. `getSignaturesForAddress`.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// One page, exactly as the endpoint returned it.
    pub async fn fetch_page(
        &self,
        program_id: &str,
        limit: usize,
        before: Option<&str>,
        until: Option<&str>,
    ) -> AppResult<Vec<SignatureInfo>> {
        let mut config = Map::new();
        config.insert("limit".to_string(), json!(limit));
        if let Some(before) = before {
            config.insert("before".to_string(), json!(before));
        }
        if let Some(until) = until {
            config.insert("until".to_string(), json!(until));
        }

        let result = self
            .client
            .call(&self.method, vec![json!(program_id), Value::Object(config)])
            .await?;

        parse_signature_page(result)
    }

    /// Every signature in the window, newest first.
    pub async fn fetch_signatures(
        &self,
        program_id: &str,
        options: &FetchOptions,
    ) -> AppResult<Vec<SignatureInfo>> {
        options.validate()?;

        let until = match &options.until {
            Some(Cutoff::Signature(signature)) => Some(signature.as_str()),
            _ => None,
        };

        let mut collected = Vec::new();
        let mut before: Option<String> = None;
        let mut failed_dropped = 0usize;

        for page_number in 1..=options.max_pages {
            let page = self
                .fetch_page(program_id, options.limit, before.as_deref(), until)
                .await?;
            let page_len = page.len();
            let oldest = page.last().map(|info| info.signature.clone());

            let mut crossed_cutoff = false;
            for info in page {
                if options.until.as_ref().map_or(false, |c| c.excludes(&info)) {
                    crossed_cutoff = true;
                    break;
                }
                if info.is_failed() && !options.include_failed {
                    failed_dropped += 1;
                    continue;
                }
                collected.push(info);
            }

            tracing::debug!(
                page = page_number,
                page_len,
                collected = collected.len(),
                "Fetched signature page"
            );

            if crossed_cutoff || page_len < options.limit {
                break;
            }

            if page_number == options.max_pages {
                tracing::warn!(
                    max_pages = options.max_pages,
                    "Stopped paginating at the page bound; older signatures in the window were not fetched"
                );
                break;
            }
            before = oldest;
        }

        if failed_dropped > 0 {
            tracing::debug!(failed_dropped, "Dropped failed transactions");
        }
        Ok(collected)
    }
}

fn parse_signature_page(result: Value) -> AppResult<Vec<SignatureInfo>> {
    if !result.is_array() {
        return Err(AppError::Protocol(format!(
            "expected an array of signatures, got {}",
            json_kind(&result)
        )));
    }
    serde_json::from_value(result)
        .map_err(|e| AppError::Protocol(format!("malformed signature entry: {e}")))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
