use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{RpcRequest, RpcResponse};
use crate::application::{AppError, AppResult, RpcTransport, TransportResponse};

/// Longest slice of a non-JSON error body kept in an error message.
const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Exponential delay before retry number `attempt + 1`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// JSON-RPC client over an [`RpcTransport`].
///
/// Cloning is cheap and clones share the request-id counter and the
/// cancellation token, so one client can serve many concurrent callers.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    next_id: Arc<AtomicU64>,
    retry: RetryPolicy,
    request_timeout: Duration,
    cancel: CancellationToken,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            next_id: Arc::new(AtomicU64::new(1)),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// Calls `method` and returns its `result` verbatim.
    ///
    /// Transient failures are retried with exponential backoff; everything else
    /// is returned on first occurrence.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> AppResult<Value> {
        let mut attempt = 0;
        loop {
            match self.call_once(method, &params).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient RPC failure, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn call_once(&self, method: &str, params: &[Value]) -> AppResult<Value> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let request = RpcRequest::new(
            self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params.to_vec(),
        );
        let body = request.to_bytes()?;
        tracing::debug!(id = request.id, method, "Sending RPC request");

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
            sent = tokio::time::timeout(self.request_timeout, self.transport.post(body)) => {
                match sent {
                    Ok(response) => response?,
                    Err(_) => return Err(AppError::Timeout),
                }
            }
        };

        decode(response)
    }
}

fn decode(response: TransportResponse) -> AppResult<Value> {
    if !response.is_success() {
        // Some providers report rate limiting as a JSON-RPC error on a 429.
        if let Ok(RpcResponse::Failure(error)) = RpcResponse::from_slice(&response.body) {
            return Err(error.into());
        }
        return Err(AppError::Http {
            status: Some(response.status),
            message: String::from_utf8_lossy(&response.body)
                .chars()
                .take(ERROR_BODY_PREVIEW)
                .collect(),
        });
    }

    RpcResponse::from_slice(&response.body)?.into_result()
}
