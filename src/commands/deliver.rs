//! Deliver a single reading.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use super::{build_coordinator, print_ok};
use crate::client::JsonFileSource;
use crate::config::ClientConfig;

/// Run one collect-and-deliver cycle for the reading in `path` (`-` for
/// stdin), then print the report and pipeline status.
pub async fn execute(client: &ClientConfig, path: &Path) -> Result<()> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read reading from stdin")?;
        text
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reading file: {}", path.display()))?
    };
    let reading = JsonFileSource::parse(&text).context("Failed to parse reading JSON")?;

    let coordinator = build_coordinator(client)?;
    let report = coordinator.collect_and_deliver(reading).await;

    print_ok(&serde_json::json!({
        "report": report,
        "status": coordinator.status(),
    }))
}
