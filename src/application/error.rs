use thiserror::Error;

/// RPC error codes worth retrying: rate limiting, node behind, block not yet available.
const TRANSIENT_RPC_CODES: [i64; 3] = [429, -32005, -32004];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transaction not found: {0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("http error (status {status:?}): {message}")]
    Http { status: Option<u16>, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AppError {
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Rpc { code, .. } => TRANSIENT_RPC_CODES.contains(code),
            AppError::Http { status, .. } => match status {
                // connection-level failure
                None => true,
                Some(status) => *status == 429 || (500..600).contains(status),
            },
            AppError::Timeout => true,
            _ => false,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
