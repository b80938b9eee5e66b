//! HTTP error responses.
//!
//! Every error leaves the server as `{"error": "<message>"}` with the
//! matching status code.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Handler error mapped to a status code and JSON body.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    RateLimited,
    NotFound,
    MethodNotAllowed,
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::BadRequest(msg) => msg,
            Self::Unauthorized => "Unauthorized",
            Self::RateLimited => "Rate limit exceeded",
            Self::NotFound => "Not found",
            Self::MethodNotAllowed => "Method not allowed",
            // Details stay in the server log.
            Self::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(error = %detail, "Request failed");
        }
        let body = Json(ErrorBody {
            error: self.message(),
        });
        (self.status(), body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<crate::error::Error> for AppError {
    fn from(err: crate::error::Error) -> Self {
        match err.status_code() {
            400 => Self::BadRequest(err.to_string()),
            401 => Self::Unauthorized,
            429 => Self::RateLimited,
            _ => Self::Internal(err.to_string()),
        }
    }
}
