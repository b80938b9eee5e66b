//! Prometheus counters for the telemetry server.
//!
//! Counters are recorded through the `metrics` facade. Without an installed
//! recorder they are no-ops, which is the case in router tests.

use anyhow::Result;
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const INGEST_TOTAL: &str = "sensorlink_ingest_total";
pub const RETRIEVE_TOTAL: &str = "sensorlink_retrieve_total";
pub const PURGE_DELETED_TOTAL: &str = "sensorlink_purge_deleted_total";
pub const RATE_LIMITED_TOTAL: &str = "sensorlink_rate_limited_total";
pub const AUTH_FAILURES_TOTAL: &str = "sensorlink_auth_failures_total";

/// Install the global Prometheus recorder and return its render handle.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {e}"))
}

/// One ingest attempt that reached validation, labelled by outcome
/// (`created`, `invalid`, `error`).
pub fn record_ingest(outcome: &'static str) {
    counter!(INGEST_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_retrieve() {
    counter!(RETRIEVE_TOTAL).increment(1);
}

pub fn record_purge(deleted: usize) {
    counter!(PURGE_DELETED_TOTAL).increment(deleted as u64);
}

pub fn record_rate_limited(operation: &'static str) {
    counter!(RATE_LIMITED_TOTAL, "operation" => operation).increment(1);
}

pub fn record_auth_failure() {
    counter!(AUTH_FAILURES_TOTAL).increment(1);
}
