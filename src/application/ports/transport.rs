use async_trait::async_trait;
use bytes::Bytes;

use crate::application::AppResult;

/// Raw HTTP-level reply; envelope decoding is left to the RPC client.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// POSTs a JSON body to the endpoint and returns whatever came back.
    async fn post(&self, body: Bytes) -> AppResult<TransportResponse>;
    fn endpoint(&self) -> &str;
}
