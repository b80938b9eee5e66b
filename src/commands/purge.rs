//! Delete stored blobs for the configured device.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::{build_api, print_ok};
use crate::config::ClientConfig;
use crate::utils::parse_timestamp_millis;

/// Purge blobs that arrived before `before`, or all of them with `all`.
pub async fn execute(client: &ClientConfig, before: Option<&str>, all: bool) -> Result<()> {
    let cutoff = match (before, all) {
        (Some(raw), false) => Some(parse_cutoff(raw)?),
        (None, true) => None,
        (Some(_), true) => anyhow::bail!("--before and --all are mutually exclusive"),
        (None, false) => anyhow::bail!("Refusing to purge everything without --all"),
    };

    let api = build_api(client)?;
    let deleted = api.purge(cutoff).await.context("Failed to purge telemetry")?;
    tracing::info!(deleted, "Purged telemetry");
    print_ok(&serde_json::json!({ "deleted": deleted }))
}

fn parse_cutoff(raw: &str) -> Result<DateTime<Utc>> {
    parse_timestamp_millis(raw)
        .and_then(DateTime::from_timestamp_millis)
        .with_context(|| format!("Invalid timestamp '{raw}', expected RFC 3339 or YYYY-MM-DD"))
}
