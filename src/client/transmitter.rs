//! Single-attempt blob transmitter.
//!
//! A transmitter performs exactly one network attempt per call and reports
//! the outcome. Retry policy belongs to the delivery coordinator, which
//! decides whether a failed blob is buffered or dropped.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::{DEVICE_ID_HEADER, TELEMETRY_PATH};
use crate::error::TransmitError;

/// Sends one encrypted blob to the remote store.
///
/// Implementations must be thread-safe (`Send + Sync`) and must not retry
/// internally.
#[async_trait]
pub trait Transmitter: Send + Sync {
    /// Attempt delivery once.
    ///
    /// `Ok(())` means the server confirmed durable storage (`201 Created`).
    async fn send(&self, blob: &[u8]) -> Result<(), TransmitError>;
}

/// HTTP transmitter that POSTs blobs to the ingestion endpoint.
#[derive(Clone)]
pub struct HttpTransmitter {
    client: reqwest::Client,
    url: String,
    device_id: String,
    api_token: String,
}

impl HttpTransmitter {
    /// Create a transmitter for `endpoint` (scheme + host, no path).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        device_id: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            url: format!("{}{TELEMETRY_PATH}", endpoint.trim_end_matches('/')),
            device_id: device_id.into(),
            api_token: api_token.into(),
        })
    }

    /// Full ingestion URL this transmitter posts to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transmitter for HttpTransmitter {
    async fn send(&self, blob: &[u8]) -> Result<(), TransmitError> {
        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_token))
            .header(DEVICE_ID_HEADER, &self.device_id)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(blob.to_vec())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Telemetry send failed");
                return Err(TransmitError::Network(e.to_string()));
            },
        };

        let status = response.status();
        if status == StatusCode::CREATED {
            debug!(bytes = blob.len(), "Telemetry blob delivered");
            return Ok(());
        }

        let err = match status {
            StatusCode::UNAUTHORIZED => TransmitError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => TransmitError::RateLimited,
            other => TransmitError::Rejected {
                status: other.as_u16(),
            },
        };
        warn!(url = %self.url, status = status.as_u16(), error = %err, "Telemetry send rejected");
        Err(err)
    }
}
