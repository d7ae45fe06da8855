use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, Url};

use crate::application::{AppError, AppResult, RpcTransport, TransportResponse};

pub struct HttpTransportAdaptor {
    client: Client,
    endpoint: Url,
}

impl HttpTransportAdaptor {
    pub fn new(endpoint: &str) -> AppResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AppError::Config(format!("invalid RPC endpoint {endpoint}: {e}")))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        tracing::info!("Using RPC endpoint: {}", endpoint.host_str().unwrap_or("unknown"));
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl RpcTransport for HttpTransportAdaptor {
    async fn post(&self, body: Bytes) -> AppResult<TransportResponse> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;
        Ok(TransportResponse { status, body })
    }

    fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

fn transport_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        return AppError::Timeout;
    }
    AppError::Http {
        status: err.status().map(|status| status.as_u16()),
        message: err.to_string(),
    }
}
