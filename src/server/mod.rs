//! Telemetry ingestion and retrieval server.
//!
//! Routes:
//!
//! | Method | Path             | Auth   | Purpose                      |
//! |--------|------------------|--------|------------------------------|
//! | POST   | `/api/telemetry` | bearer | store one sealed blob        |
//! | GET    | `/api/telemetry` | bearer | newest-first retrieval       |
//! | DELETE | `/api/telemetry` | bearer | purge blobs before a cutoff  |
//! | GET    | `/health`        | none   | liveness                     |
//! | GET    | `/metrics`       | none   | Prometheus exposition        |
//!
//! Blobs are opaque to the server; it never holds the encryption key.

pub mod audit;
pub mod auth;
pub mod error;
mod handlers;
pub mod metrics;
pub mod rate_limit;
pub mod storage;
pub mod types;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::AppError;
pub use rate_limit::RateLimiter;
pub use storage::StorageService;
pub use types::ArrivalClock;

use crate::config::ServerConfig;
use crate::constants::{HEALTH_PATH, METRICS_PATH, TELEMETRY_PATH};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub rate_limiter: Arc<RateLimiter>,
    pub clock: Arc<ArrivalClock>,
    pub api_token: Arc<str>,
    pub fetch_concurrency: usize,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Build state from the `[server]` config section.
    pub fn new(storage: StorageService, config: &ServerConfig) -> Self {
        Self {
            storage,
            rate_limiter: Arc::new(RateLimiter::new(
                config.rate_limit,
                Duration::from_secs(config.rate_window_secs),
            )),
            clock: Arc::new(ArrivalClock::new()),
            api_token: Arc::from(config.api_token.as_str()),
            fetch_concurrency: config.fetch_concurrency,
            max_body_bytes: config.max_body_bytes,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            prometheus: None,
        }
    }

    #[must_use]
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Assemble the HTTP router.
pub fn router(state: AppState) -> Router {
    let telemetry = Router::new()
        .route(
            TELEMETRY_PATH,
            post(handlers::ingest)
                .get(handlers::retrieve)
                .delete(handlers::purge)
                .fallback(handlers::method_not_allowed),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .merge(telemetry)
        .route(HEALTH_PATH, get(handlers::health))
        .route(METRICS_PATH, get(handlers::metrics_endpoint))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(state.request_timeout))
                .layer(DefaultBodyLimit::max(state.max_body_bytes)),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves.
///
/// Also runs a background task that prunes expired rate limit windows.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("Failed to read listener address")?;
    let limiter = state.rate_limiter.clone();
    let prune_every = Duration::from_secs(60);
    let pruner = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(prune_every);
        loop {
            ticker.tick().await;
            let pruned = limiter.prune();
            if pruned > 0 {
                tracing::debug!(pruned, "Pruned expired rate limit windows");
            }
        }
    });

    info!(%addr, "Telemetry server listening");
    let result = axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("Server error");

    pruner.abort();
    info!("Telemetry server stopped");
    result
}
