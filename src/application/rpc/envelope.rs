//! JSON-RPC 2.0 request and response envelopes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }

    pub fn to_bytes(&self) -> AppResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| AppError::Protocol(format!("failed to encode request: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RpcErrorObject> for AppError {
    fn from(error: RpcErrorObject) -> Self {
        AppError::Rpc {
            code: error.code,
            message: error.message,
        }
    }
}

/// A decoded response: exactly one of result or error.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    Success(Value),
    Failure(RpcErrorObject),
}

impl RpcResponse {
    pub fn from_slice(body: &[u8]) -> AppResult<Self> {
        let decoded: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::Protocol(format!("response body is not valid JSON: {e}")))?;

        let Value::Object(mut fields) = decoded else {
            return Err(AppError::Protocol(
                "response body is not a JSON object".to_string(),
            ));
        };

        // An error wins over any result that came along with it.
        match fields.remove("error") {
            None | Some(Value::Null) => {}
            Some(error) => {
                let error = serde_json::from_value(error)
                    .map_err(|e| AppError::Protocol(format!("malformed error object: {e}")))?;
                return Ok(RpcResponse::Failure(error));
            }
        }

        match fields.remove("result") {
            Some(result) => Ok(RpcResponse::Success(result)),
            None => Err(AppError::Protocol(
                "response carries neither result nor error".to_string(),
            )),
        }
    }

    pub fn into_result(self) -> AppResult<Value> {
        match self {
            RpcResponse::Success(result) => Ok(result),
            RpcResponse::Failure(error) => Err(error.into()),
        }
    }
}
