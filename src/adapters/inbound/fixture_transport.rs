//! Offline transport serving canned JSON-RPC replies.
//!
//! Replies are keyed by method and the first positional param (the address
//! or signature). Several replies under one key are served in order and the
//! last one repeats. Requests without a reply get `"result": null`.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::application::{AppError, AppResult, RpcErrorObject, RpcTransport, TransportResponse};

#[derive(Debug, Clone, PartialEq)]
pub enum FixtureReply {
    Result(Value),
    Error { code: i64, message: String },
    /// Raw HTTP status and body, bypassing the JSON-RPC envelope.
    Status { status: u16, body: String },
    /// A 200 with a body that is not JSON.
    Raw(String),
    /// Never answers.
    Hang,
}

#[derive(Deserialize)]
struct FixtureFile {
    responses: Vec<FixtureEntry>,
}

#[derive(Deserialize)]
struct FixtureEntry {
    method: String,
    subject: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

type FixtureKey = (String, String);

#[derive(Default)]
pub struct FixtureTransportAdaptor {
    replies: Mutex<HashMap<FixtureKey, VecDeque<FixtureReply>>>,
    requests: Mutex<Vec<Value>>,
}

impl FixtureTransportAdaptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `{"responses": [{"method", "subject", "result" | "error"}]}`.
    pub async fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path).await.map_err(|e| {
            AppError::Config(format!("cannot read fixture {}: {e}", path.display()))
        })?;
        let file: FixtureFile = serde_json::from_slice(&raw).map_err(|e| {
            AppError::Config(format!("invalid fixture {}: {e}", path.display()))
        })?;

        let mut transport = Self::new();
        for entry in file.responses {
            let reply = match entry.error {
                Some(error) => FixtureReply::Error {
                    code: error.code,
                    message: error.message,
                },
                None => FixtureReply::Result(entry.result.unwrap_or(Value::Null)),
            };
            transport = transport.with_reply(&entry.method, &entry.subject, reply);
        }
        tracing::info!(path = %path.display(), "Loaded RPC fixture");
        Ok(transport)
    }

    pub fn with_reply(mut self, method: &str, subject: &str, reply: FixtureReply) -> Self {
        self.replies
            .get_mut()
            .entry((method.to_string(), subject.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn with_result(self, method: &str, subject: &str, result: Value) -> Self {
        self.with_reply(method, subject, FixtureReply::Result(result))
    }

    pub fn with_error(self, method: &str, subject: &str, code: i64, message: &str) -> Self {
        self.with_reply(
            method,
            subject,
            FixtureReply::Error {
                code,
                message: message.to_string(),
            },
        )
    }

    /// Every decoded request received so far, in arrival order.
    pub async fn requests(&self) -> Vec<Value> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self, method: &str) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|request| request["method"] == method)
            .count()
    }

    async fn next_reply(&self, key: &FixtureKey) -> FixtureReply {
        let mut replies = self.replies.lock().await;
        match replies.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
        .unwrap_or(FixtureReply::Result(Value::Null))
    }
}

#[async_trait]
impl RpcTransport for FixtureTransportAdaptor {
    async fn post(&self, body: Bytes) -> AppResult<TransportResponse> {
        let request: Value = serde_json::from_slice(&body)
            .map_err(|e| AppError::Protocol(format!("fixture received an invalid request: {e}")))?;

        let key = (
            request["method"].as_str().unwrap_or_default().to_string(),
            request["params"][0].as_str().unwrap_or_default().to_string(),
        );
        let id = request["id"].clone();
        self.requests.lock().await.push(request);

        let envelope = match self.next_reply(&key).await {
            FixtureReply::Result(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            FixtureReply::Error { code, message } => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": code, "message": message},
            }),
            FixtureReply::Status { status, body } => {
                return Ok(TransportResponse {
                    status,
                    body: Bytes::from(body),
                })
            }
            FixtureReply::Raw(body) => return Ok(TransportResponse::ok(body)),
            FixtureReply::Hang => return std::future::pending().await,
        };

        Ok(TransportResponse::ok(envelope.to_string()))
    }

    fn endpoint(&self) -> &str {
        "fixture://"
    }
}
