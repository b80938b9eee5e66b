//! CLI command implementations for sensorlink.
//!
//! - [`serve`] - Telemetry server
//! - [`deliver`] - One collect-and-deliver cycle for a reading
//! - [`run`] - Periodic delivery from a reading file
//! - [`outbox`] - Inspect or drain the device outbox
//! - [`fetch`] - Retrieve and decrypt readings (consumer)
//! - [`purge`] - Delete stored blobs (consumer)
//!
//! Device and consumer commands print one JSON object on stdout:
//! `{"ok": true, "data": ...}` or `{"ok": false, "error": "..."}`.

pub mod deliver;
pub mod fetch;
pub mod outbox;
pub mod purge;
pub mod run;
pub mod serve;

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use crate::client::{DeliveryCoordinator, HttpTransmitter, Outbox};
use crate::config::{ClientConfig, ValidationResult};
use crate::consumer::TelemetryApi;

/// Print a success envelope.
///
/// # Errors
///
/// Returns an error if `data` cannot be serialized.
pub fn print_ok<T: Serialize>(data: &T) -> Result<()> {
    let line = serde_json::to_string(&serde_json::json!({ "ok": true, "data": data }))
        .context("Failed to serialize command output")?;
    println!("{line}");
    Ok(())
}

/// Print a failure envelope.
pub fn print_failure(error: &anyhow::Error) {
    println!(
        "{}",
        serde_json::json!({ "ok": false, "error": format!("{error:#}") })
    );
}

pub(crate) fn log_warnings(result: &ValidationResult) {
    for warning in &result.warnings {
        tracing::warn!("{warning}");
    }
}

/// Coordinator wired to the configured outbox and endpoint.
pub(crate) fn build_coordinator(client: &ClientConfig) -> Result<DeliveryCoordinator> {
    log_warnings(&client.validate()?);

    let key = client.key()?;
    let outbox = Outbox::open(client.outbox_path()?)?;
    let transmitter = HttpTransmitter::new(
        &client.endpoint,
        client.device_id.clone(),
        client.api_token.clone(),
        client.send_timeout(),
    )?;

    Ok(
        DeliveryCoordinator::new(key.as_bytes(), outbox, Arc::new(transmitter))
            .with_reject_policy(client.reject_policy)
            .with_enabled_sensors(client.enabled_sensors.clone()),
    )
}

pub(crate) fn build_api(client: &ClientConfig) -> Result<TelemetryApi> {
    log_warnings(&client.validate()?);
    TelemetryApi::new(
        &client.endpoint,
        client.device_id.clone(),
        client.api_token.clone(),
        client.send_timeout(),
    )
}
