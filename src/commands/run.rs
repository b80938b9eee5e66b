//! Periodic delivery in the foreground.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::{build_coordinator, print_ok};
use crate::client::{DeliveryScheduler, JsonFileSource};
use crate::config::ClientConfig;

/// Deliver the reading in `reading_file` every `interval_secs` until Ctrl+C.
///
/// The file is re-read on every tick, so another process can keep it
/// current.
pub async fn execute(client: &ClientConfig, reading_file: PathBuf) -> Result<()> {
    let coordinator = Arc::new(build_coordinator(client)?);
    let source = Arc::new(JsonFileSource::new(&reading_file));

    info!(
        file = %reading_file.display(),
        interval_secs = client.interval_secs,
        cycle_budget_secs = client.cycle_budget_secs,
        "Starting delivery scheduler"
    );
    let handle = DeliveryScheduler::spawn(
        coordinator.clone(),
        source,
        client.interval(),
        client.cycle_budget(),
    );

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;

    print_ok(&coordinator.status())
}
