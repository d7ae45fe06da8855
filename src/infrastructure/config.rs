use std::{path::PathBuf, str::FromStr, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Url;
use solana_sdk::pubkey::Pubkey;

use crate::{
    adapters::attributors::AmountMode,
    application::{
        AppError, AppResult, Cutoff, FetchOptions, RetryPolicy, DEFAULT_CONCURRENCY, DEFAULT_MAX_PAGES,
        DEFAULT_PAGE_LIMIT, DEFAULT_SIGNATURES_METHOD, DEFAULT_TOP_N, DEFAULT_TRANSACTION_METHOD,
    },
    domain::{DEFAULT_RPC_ENDPOINT, MAGIC_EDEN_V2_PROGRAM_ID},
};

pub const MAX_CONCURRENCY: usize = 256;
pub const DEFAULT_LOOKBACK_MINUTES: i64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportKind {
    Http,
    Fixture,
}

impl FromStr for TransportKind {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "fixture" => Ok(TransportKind::Fixture),
            _ => Err(AppError::Config(format!("Invalid TRANSPORT: {raw}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributionKind {
    Placeholder,
    Marketplace,
}

impl FromStr for AttributionKind {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_lowercase().as_str() {
            "placeholder" => Ok(AttributionKind::Placeholder),
            "marketplace" => Ok(AttributionKind::Marketplace),
            _ => Err(AppError::Config(format!("Invalid ATTRIBUTION: {raw}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportFormat {
    Table,
    Json,
}

impl FromStr for ReportFormat {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_lowercase().as_str() {
            "table" => Ok(ReportFormat::Table),
            "json" => Ok(ReportFormat::Json),
            _ => Err(AppError::Config(format!("Invalid REPORT_FORMAT: {raw}"))),
        }
    }
}

/// Everything a run needs, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub rpc_url: String,
    pub program_id: String,
    pub page_limit: usize,
    /// Zero disables the time cutoff.
    pub lookback_minutes: i64,
    pub top_n: usize,
    pub max_pages: usize,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub run_timeout: Option<Duration>,
    pub include_failed: bool,
    pub attribution: AttributionKind,
    pub amount_mode: AmountMode,
    pub report_format: ReportFormat,
    pub transport: TransportKind,
    pub fixture_path: Option<PathBuf>,
    pub signatures_method: String,
    pub transaction_method: String,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset and blank values take defaults.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let config = Self {
            rpc_url: get("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_ENDPOINT.to_string()),
            program_id: get("PROGRAM_ID").unwrap_or_else(|| MAGIC_EDEN_V2_PROGRAM_ID.to_string()),
            page_limit: parse(&get, "PAGE_LIMIT", DEFAULT_PAGE_LIMIT)?,
            lookback_minutes: parse(&get, "LOOKBACK_MINUTES", DEFAULT_LOOKBACK_MINUTES)?,
            top_n: parse(&get, "TOP_N", DEFAULT_TOP_N)?,
            max_pages: parse(&get, "MAX_PAGES", DEFAULT_MAX_PAGES)?,
            concurrency: parse(&get, "RESOLVE_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            request_timeout: Duration::from_secs(parse(
                &get,
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            max_retries: parse(&get, "MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_base_delay: Duration::from_millis(parse(
                &get,
                "RETRY_BASE_DELAY_MS",
                DEFAULT_RETRY_BASE_DELAY_MS,
            )?),
            run_timeout: get("RUN_TIMEOUT_SECS")
                .map(|raw| parse_value::<u64>("RUN_TIMEOUT_SECS", &raw))
                .transpose()?
                .map(Duration::from_secs),
            include_failed: parse_bool(&get, "INCLUDE_FAILED")?,
            attribution: parse(&get, "ATTRIBUTION", AttributionKind::Placeholder)?,
            amount_mode: parse(&get, "AMOUNT_MODE", AmountMode::Count)?,
            report_format: parse(&get, "REPORT_FORMAT", ReportFormat::Table)?,
            transport: parse(&get, "TRANSPORT", TransportKind::Http)?,
            fixture_path: get("FIXTURE_PATH").map(PathBuf::from),
            signatures_method: get("SIGNATURES_METHOD")
                .unwrap_or_else(|| DEFAULT_SIGNATURES_METHOD.to_string()),
            transaction_method: get("TRANSACTION_METHOD")
                .unwrap_or_else(|| DEFAULT_TRANSACTION_METHOD.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        Pubkey::from_str(&self.program_id).map_err(|e| {
            AppError::Config(format!("PROGRAM_ID {} is not a valid address: {e}", self.program_id))
        })?;

        if self.transport == TransportKind::Http {
            Url::parse(&self.rpc_url)
                .map_err(|e| AppError::Config(format!("RPC_URL {} is invalid: {e}", self.rpc_url)))?;
        }
        if self.transport == TransportKind::Fixture && self.fixture_path.is_none() {
            return Err(AppError::Config(
                "FIXTURE_PATH is required when TRANSPORT=fixture".to_string(),
            ));
        }
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(AppError::Config(format!(
                "RESOLVE_CONCURRENCY must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if self.lookback_minutes < 0 {
            return Err(AppError::Config("LOOKBACK_MINUTES must not be negative".to_string()));
        }
        self.lookback_since(Utc::now())?;
        if self.request_timeout.is_zero() {
            return Err(AppError::Config("REQUEST_TIMEOUT_SECS must be at least 1".to_string()));
        }

        self.fetch_options().validate()
    }

    /// Start of the lookback window ending at `now`, or `None` when disabled.
    pub fn lookback_since(&self, now: DateTime<Utc>) -> AppResult<Option<DateTime<Utc>>> {
        if self.lookback_minutes == 0 {
            return Ok(None);
        }
        TimeDelta::try_minutes(self.lookback_minutes)
            .and_then(|window| now.checked_sub_signed(window))
            .map(Some)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "LOOKBACK_MINUTES={} is out of range",
                    self.lookback_minutes
                ))
            })
    }

    /// Fetch options for a run starting at `now`, with the lookback cutoff applied.
    pub fn fetch_options_at(&self, now: DateTime<Utc>) -> AppResult<FetchOptions> {
        let mut fetch = self.fetch_options();
        fetch.until = self.lookback_since(now)?.map(Cutoff::Timestamp);
        Ok(fetch)
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            limit: self.page_limit,
            until: None,
            max_pages: self.max_pages,
            include_failed: self.include_failed,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
            ..RetryPolicy::default()
        }
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| AppError::Config(format!("{key}={raw}: {e}")))
}

fn parse_bool<G>(get: &G, key: &str) -> AppResult<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|raw| raw.to_lowercase()).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(AppError::Config(format!("{key}={other}: expected a boolean"))),
    }
}
