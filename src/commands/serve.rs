//! Run the telemetry server.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::log_warnings;
use crate::config::{ServerConfig, StorageLocation};
use crate::server::{self, AppState, StorageService};

/// Serve until Ctrl+C.
pub async fn execute(config: ServerConfig) -> Result<()> {
    log_warnings(&config.validate()?);

    let storage = match config.storage_location()? {
        StorageLocation::Memory => {
            info!("Using in-memory storage");
            StorageService::memory()
        },
        StorageLocation::Directory(dir) => {
            info!(dir = %dir.display(), "Using filesystem storage");
            StorageService::file(&dir)?
        },
    };

    let mut state = AppState::new(storage, &config);
    match server::metrics::install_recorder() {
        Ok(handle) => state = state.with_prometheus(handle),
        Err(e) => warn!(error = %e, "Metrics disabled"),
    }

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    server::serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
