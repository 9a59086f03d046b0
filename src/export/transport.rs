//! Delivery of encoded payloads to the collector.

use super::EncodedPayload;
use crate::core::config::normalize_url;
use crate::core::sign::SIGNATURE_HEADER;
use crate::core::{MetricsError, Result};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use std::time::Duration;

/// Sends one payload. Implementations report non-success answers as errors.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &EncodedPayload) -> Result<()>;
}

/// POSTs payloads to `{server_url}/update/`.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetricsError::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/update/", normalize_url(server_url)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &EncodedPayload) -> Result<()> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip");

        if let Some(signature) = &payload.signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request
            .body(payload.body.clone())
            .send()
            .await
            .map_err(|e| MetricsError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetricsError::network(format!(
                "collector answered {status}: {}",
                body.trim()
            )));
        }

        Ok(())
    }
}
