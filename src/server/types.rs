//! Request and response types for the telemetry API.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::constants::{DEFAULT_RETRIEVE_LIMIT, MAX_RETRIEVE_LIMIT, STORAGE_METADATA_FILE};
use crate::error::{Error, Result};
use crate::utils::{millis_to_rfc3339, now_millis};

/// Query for `GET /api/telemetry`.
///
/// `limit` stays a string so a non-numeric value falls back to the default
/// instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
pub struct RetrieveQuery {
    pub device_id: Option<String>,
    pub since: Option<String>,
    pub limit: Option<String>,
}

/// Query for `DELETE /api/telemetry`.
#[derive(Debug, Default, Deserialize)]
pub struct PurgeQuery {
    pub device_id: Option<String>,
    pub before: Option<String>,
}

/// One stored blob in a retrieval response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    /// Arrival time, RFC 3339 with millisecond precision.
    pub timestamp: String,
    /// Standard base64 of the sealed blob.
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// Check that a device id is usable as a single storage key segment.
///
/// # Errors
///
/// Returns [`Error::InvalidRequest`] for an empty id, an id containing `/`
/// or `\`, the relative components `.` and `..`, or the name of the
/// storage metadata file.
pub fn validate_device_id(device_id: &str) -> Result<&str> {
    if device_id.is_empty() {
        return Err(Error::invalid_request("device id must not be empty"));
    }
    if device_id.contains(['/', '\\']) || device_id == "." || device_id == ".." {
        return Err(Error::invalid_request(format!(
            "device id '{device_id}' is not a valid key segment"
        )));
    }
    if device_id == STORAGE_METADATA_FILE {
        return Err(Error::invalid_request(format!(
            "device id '{device_id}' is reserved"
        )));
    }
    Ok(device_id)
}

/// Resolve the `limit` query value: absent, non-numeric or non-positive
/// gives the default; anything above the cap is clamped.
pub fn effective_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map_or(DEFAULT_RETRIEVE_LIMIT, |n| {
            usize::try_from(n).map_or(MAX_RETRIEVE_LIMIT, |n| n.min(MAX_RETRIEVE_LIMIT))
        })
}

/// Storage key for a blob.
pub fn object_key(device_id: &str, arrival_ms: i64) -> String {
    format!("{device_id}/{arrival_ms}")
}

/// Arrival time encoded in a key, if its last segment is an integer.
pub fn arrival_ms(key: &str) -> Option<i64> {
    key.rsplit('/').next()?.parse().ok()
}

/// Render an arrival time for the API.
pub fn arrival_timestamp(ms: i64) -> String {
    millis_to_rfc3339(ms).unwrap_or_else(|| ms.to_string())
}

/// Strictly increasing millisecond clock.
///
/// Two requests in the same millisecond get consecutive values, so their
/// keys never collide. Under a burst the clock may run slightly ahead of
/// wall time.
#[derive(Debug, Default)]
pub struct ArrivalClock {
    last: AtomicI64,
}

impl ArrivalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = now_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}
