//! HTTP API handlers.

pub mod telemetry;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::types::HealthResponse;
use super::{AppError, AppState};
use crate::utils::{millis_to_rfc3339, now_millis};

pub(crate) use telemetry::{ingest, method_not_allowed, purge, retrieve};

/// GET /health - Liveness probe, no authentication.
pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: millis_to_rfc3339(now_millis()).unwrap_or_default(),
    })
}

/// GET /metrics - Prometheus text exposition.
pub(crate) async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => AppError::NotFound.into_response(),
    }
}

/// Fallback for unknown paths.
pub(crate) async fn not_found() -> AppError {
    AppError::NotFound
}
