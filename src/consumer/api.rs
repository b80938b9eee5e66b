//! HTTP client for the retrieval and purge endpoints.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::constants::TELEMETRY_PATH;
use crate::reliability::{RetryConfig, retry_async};
use crate::server::types::PurgeResponse;

/// One entry as returned by `GET /api/telemetry`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawEntry {
    /// Server arrival time.
    pub timestamp: String,
    /// Base64 sealed blob.
    pub data: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl ApiError {
    /// Transport failures and 5xx are worth another attempt.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(e) => !e.is_decode() && !e.is_builder(),
            Self::Status { status, .. } => *status >= 500,
        }
    }
}

/// Authenticated client for one device's telemetry.
#[derive(Clone)]
pub struct TelemetryApi {
    client: reqwest::Client,
    url: Url,
    device_id: String,
    api_token: String,
    retry: RetryConfig,
}

impl TelemetryApi {
    /// # Errors
    ///
    /// Returns an error if `endpoint` is not a valid base URL or the HTTP
    /// client cannot be built.
    pub fn new(
        endpoint: &str,
        device_id: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let base = Url::parse(endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid endpoint '{endpoint}': {e}"))?;
        let url = base
            .join(TELEMETRY_PATH)
            .map_err(|e| anyhow::anyhow!("Invalid endpoint '{endpoint}': {e}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            url,
            device_id: device_id.into(),
            api_token: api_token.into(),
            retry: RetryConfig::network(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Newest-first entries that arrived at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns the last [`ApiError`] once retries are exhausted, or the first
    /// non-retriable one.
    pub async fn fetch(
        &self,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<RawEntry>, ApiError> {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("device_id", &self.device_id);
            if let Some(since) = since {
                query.append_pair(
                    "since",
                    &since.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                );
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }

        let entries = retry_async(
            self.retry.clone(),
            || self.fetch_once(url.clone()),
            ApiError::is_retriable,
        )
        .await?;
        debug!(count = entries.len(), "Fetched telemetry");
        Ok(entries)
    }

    async fn fetch_once(&self, url: Url) -> Result<Vec<RawEntry>, ApiError> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_token))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Delete entries that arrived before `before`, or all of them.
    ///
    /// Never retried.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure or a non-2xx status.
    pub async fn purge(&self, before: Option<DateTime<Utc>>) -> Result<u64, ApiError> {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("device_id", &self.device_id);
            if let Some(before) = before {
                query.append_pair(
                    "before",
                    &before.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                );
            }
        }

        let response = self
            .client
            .delete(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_token))
            .send()
            .await?;
        let body: PurgeResponse = check_status(response).await?.json().await?;
        Ok(body.deleted)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body: if status == StatusCode::UNAUTHORIZED {
            "check the API token".to_string()
        } else {
            body
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_join() {
        let api = TelemetryApi::new("http://127.0.0.1:8787/", "d", "t", Duration::from_secs(1))
            .unwrap();
        assert_eq!(api.url.as_str(), "http://127.0.0.1:8787/api/telemetry");
        assert!(TelemetryApi::new("not a url", "d", "t", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_status_retriability() {
        let server_error = ApiError::Status {
            status: 503,
            body: String::new(),
        };
        let unauthorized = ApiError::Status {
            status: 401,
            body: String::new(),
        };
        assert!(server_error.is_retriable());
        assert!(!unauthorized.is_retriable());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let api = TelemetryApi::new("http://127.0.0.1:9", "d", "t", Duration::from_secs(2))
            .unwrap()
            .with_retry(RetryConfig::none());
        let err = api.fetch(None, Some(1)).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert!(err.is_retriable());
    }
}
