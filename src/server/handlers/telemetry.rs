//! Telemetry ingest, retrieval and purge handlers.
//!
//! All three run behind the bearer token middleware. Parameter validation
//! and rate limiting happen here, in that order.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info};

use super::super::audit::{AuditEvent, log_audit_event};
use super::super::types::{
    CreatedResponse, PurgeQuery, PurgeResponse, RetrieveQuery, TelemetryEntry, arrival_ms,
    arrival_timestamp, effective_limit, object_key, validate_device_id,
};
use super::super::{AppError, AppState, metrics};
use crate::constants::DEVICE_ID_HEADER;
use crate::error::Error;
use crate::utils::parse_timestamp_millis;

/// POST /api/telemetry - Store one sealed blob for the calling device.
pub(crate) async fn ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let device_id = headers
        .get(DEVICE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            metrics::record_ingest("invalid");
            AppError::BadRequest("Missing X-Device-ID header".to_string())
        })?;
    let device_id = require_device(Some(device_id)).inspect_err(|_| {
        metrics::record_ingest("invalid");
    })?;

    admit(&state, device_id, "ingest")?;

    if body.is_empty() {
        metrics::record_ingest("invalid");
        return Err(AppError::BadRequest("Request body is empty".to_string()));
    }

    let arrival = state.clock.next();
    let key = object_key(device_id, arrival);
    state.storage.put(&key, &body).await.inspect_err(|_| {
        metrics::record_ingest("error");
    })?;

    metrics::record_ingest("created");
    debug!(%key, bytes = body.len(), "Stored telemetry blob");
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse { status: "created" }),
    ))
}

/// GET /api/telemetry - Newest-first blobs at or after `since`.
pub(crate) async fn retrieve(
    State(state): State<AppState>,
    Query(query): Query<RetrieveQuery>,
) -> Result<Json<Vec<TelemetryEntry>>, AppError> {
    let device_id = require_device(query.device_id.as_deref())?;
    admit(&state, device_id, "retrieve")?;

    let since = parse_bound(query.since.as_deref(), "since")?.unwrap_or(0);
    let limit = effective_limit(query.limit.as_deref());

    let mut selected: Vec<(i64, String)> = state
        .storage
        .list_all(&format!("{device_id}/"))
        .await?
        .into_iter()
        .filter_map(|meta| arrival_ms(&meta.path).map(|ms| (ms, meta.path)))
        .filter(|(ms, _)| *ms >= since)
        .collect();

    // Numeric order: "10" sorts after "9" here, unlike the key listing.
    selected.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    selected.truncate(limit);

    let storage = state.storage.clone();
    let fetched: Vec<Option<TelemetryEntry>> = stream::iter(selected)
        .map(|(ms, key)| {
            let storage = storage.clone();
            async move {
                let blob = storage.get(&key).await?;
                Ok::<_, anyhow::Error>(blob.map(|data| TelemetryEntry {
                    timestamp: arrival_timestamp(ms),
                    data: STANDARD.encode(data),
                }))
            }
        })
        .buffered(state.fetch_concurrency.max(1))
        .try_collect()
        .await?;

    // Objects purged between listing and fetch are simply absent.
    let entries: Vec<TelemetryEntry> = fetched.into_iter().flatten().collect();

    metrics::record_retrieve();
    debug!(device_id, returned = entries.len(), limit, "Served telemetry");
    Ok(Json(entries))
}

/// DELETE /api/telemetry - Remove blobs that arrived before `before`.
pub(crate) async fn purge(
    State(state): State<AppState>,
    Query(query): Query<PurgeQuery>,
) -> Result<Json<PurgeResponse>, AppError> {
    let device_id = require_device(query.device_id.as_deref())?;
    admit(&state, device_id, "purge")?;

    let before = parse_bound(query.before.as_deref(), "before")?.unwrap_or(i64::MAX);

    let doomed: Vec<String> = state
        .storage
        .list_all(&format!("{device_id}/"))
        .await?
        .into_iter()
        .filter(|meta| arrival_ms(&meta.path).is_some_and(|ms| ms < before))
        .map(|meta| meta.path)
        .collect();

    let deleted = state.storage.delete_many(&doomed).await?;

    metrics::record_purge(deleted);
    info!(device_id, deleted, "Purged telemetry");
    Ok(Json(PurgeResponse {
        deleted: deleted as u64,
    }))
}

/// Any other method on /api/telemetry.
pub(crate) async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

fn require_device(device_id: Option<&str>) -> Result<&str, AppError> {
    let device_id = device_id
        .ok_or_else(|| AppError::BadRequest("Missing device_id".to_string()))?;
    validate_device_id(device_id).map_err(|e| {
        log_audit_event(AuditEvent::InvalidDeviceId {
            device_id: device_id.to_string(),
        });
        AppError::from(e)
    })
}

fn admit(state: &AppState, device_id: &str, operation: &'static str) -> Result<(), AppError> {
    if state.rate_limiter.check(device_id) {
        return Ok(());
    }
    log_audit_event(AuditEvent::RateLimited {
        device_id: device_id.to_string(),
        operation,
    });
    metrics::record_rate_limited(operation);
    Err(Error::rate_limited(device_id).into())
}

/// Parse an optional timestamp bound; an empty value counts as absent.
fn parse_bound(raw: Option<&str>, name: &str) -> Result<Option<i64>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => parse_timestamp_millis(value).map(Some).ok_or_else(|| {
            Error::invalid_request(format!("'{name}' is not an RFC 3339 timestamp: {value}"))
                .into()
        }),
    }
}
