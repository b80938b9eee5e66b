//! Bearer token authentication.
//!
//! Applied to `/api/telemetry` ahead of every other check, so an
//! unauthenticated request never learns whether its parameters were valid.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use subtle::ConstantTimeEq;

use super::AppState;
use super::audit::{AuditEvent, log_audit_event};
use super::error::AppError;
use super::metrics;

/// Constant-time comparison of a presented token against the expected one.
pub fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Middleware rejecting requests without `Authorization: Bearer <token>`.
pub async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let failure = match presented {
        None => Some("missing bearer token"),
        Some(token) if token_matches(token, &state.api_token) => None,
        Some(_) => Some("invalid bearer token"),
    };
    let Some(reason) = failure else {
        return next.run(request).await;
    };

    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    log_audit_event(AuditEvent::AuthFailure {
        remote_addr,
        reason,
    });
    metrics::record_auth_failure();

    AppError::Unauthorized.into_response()
}
