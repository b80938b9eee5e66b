//! Collect-and-deliver cycle.
//!
//! Each cycle seals one reading, tries to send it, and on success drains the
//! outbox oldest-first. On failure the fresh blob joins the outbox so it is
//! retried, in order, on the next successful cycle.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::outbox::{EntryId, Outbox};
use super::transmitter::Transmitter;
use crate::codec;
use crate::error::{Error, TransmitError};
use crate::reading::{Reading, SensorKind};

/// What to do with a blob the server refused for a non-transient reason
/// (bad token, 4xx other than 429).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectPolicy {
    /// Keep the blob in the outbox like any other failure.
    #[default]
    Buffer,
    /// Discard the blob and record a configuration error.
    Drop,
}

/// Observable state of the delivery pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStatus {
    /// Whether a scheduler is currently driving cycles.
    pub running: bool,
    /// Time of the last confirmed delivery.
    pub last_success: Option<DateTime<Utc>>,
    /// Most recent failure, cleared by the next confirmed delivery.
    pub last_error: Option<String>,
    /// Outbox size as of the end of the last cycle.
    pub buffered: u64,
}

/// Result of one [`DeliveryCoordinator::collect_and_deliver`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum DeliveryReport {
    /// The reading carried no sensor sections; nothing was sent.
    Skipped,
    /// The fresh blob was delivered, then `flushed` buffered blobs followed.
    Delivered { flushed: usize, remaining: u64 },
    /// Delivery failed and the blob was persisted for a later cycle.
    Buffered { id: EntryId },
    /// The reading was discarded (encryption failure, reject policy, or the
    /// outbox itself failed).
    Dropped,
}

/// Drives the encrypt, send, buffer and flush sequence.
pub struct DeliveryCoordinator {
    key: Vec<u8>,
    outbox: Outbox,
    transmitter: Arc<dyn Transmitter>,
    reject_policy: RejectPolicy,
    enabled_sensors: Vec<SensorKind>,
    status: RwLock<DeliveryStatus>,
    cycle: tokio::sync::Mutex<()>,
}

impl DeliveryCoordinator {
    /// Create a coordinator.
    ///
    /// The key is not validated here; a wrong-length key surfaces as a
    /// dropped reading on the first cycle.
    pub fn new(key: &[u8], outbox: Outbox, transmitter: Arc<dyn Transmitter>) -> Self {
        Self {
            key: key.to_vec(),
            outbox,
            transmitter,
            reject_policy: RejectPolicy::default(),
            enabled_sensors: Vec::new(),
            status: RwLock::new(DeliveryStatus::default()),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_reject_policy(mut self, policy: RejectPolicy) -> Self {
        self.reject_policy = policy;
        self
    }

    /// Restrict readings to these sections. Empty means all.
    #[must_use]
    pub fn with_enabled_sensors(mut self, sensors: Vec<SensorKind>) -> Self {
        self.enabled_sensors = sensors;
        self
    }

    /// Snapshot of the pipeline state.
    pub fn status(&self) -> DeliveryStatus {
        self.status.read().clone()
    }

    pub fn set_running(&self, running: bool) {
        self.status.write().running = running;
    }

    /// Run one cycle for `reading`.
    ///
    /// Never fails: every error is recorded in [`status`](Self::status) and
    /// reflected in the returned report. Overlapping calls are serialized.
    pub async fn collect_and_deliver(&self, mut reading: Reading) -> DeliveryReport {
        let _cycle = self.cycle.lock().await;

        reading.sensors.retain(&self.enabled_sensors);
        if reading.is_empty() {
            debug!("Reading has no enabled sensor sections, skipping");
            return DeliveryReport::Skipped;
        }

        let blob = match codec::encrypt(&reading, &self.key) {
            Ok(blob) => blob,
            Err(e) => {
                self.record_error(Error::from(e));
                return DeliveryReport::Dropped;
            },
        };

        match self.transmitter.send(&blob).await {
            Ok(()) => {
                {
                    let mut status = self.status.write();
                    status.last_success = Some(Utc::now());
                    status.last_error = None;
                }
                let flushed = self.flush().await;
                let remaining = self.refresh_buffered().await;
                info!(flushed, remaining, "Reading delivered");
                DeliveryReport::Delivered { flushed, remaining }
            },
            Err(e) => self.handle_send_failure(blob, e).await,
        }
    }

    /// Drain the outbox without a fresh reading.
    ///
    /// Returns how many blobs were delivered and how many remain.
    pub async fn flush_outbox(&self) -> (usize, u64) {
        let _cycle = self.cycle.lock().await;
        let flushed = self.flush().await;
        let remaining = self.refresh_buffered().await;
        if flushed > 0 {
            self.status.write().last_success = Some(Utc::now());
        }
        (flushed, remaining)
    }

    async fn handle_send_failure(&self, blob: Vec<u8>, err: TransmitError) -> DeliveryReport {
        if !err.is_retriable() && self.reject_policy == RejectPolicy::Drop {
            self.record_error(Error::config(format!("reading refused by server: {err}")));
            return DeliveryReport::Dropped;
        }

        self.record_error(Error::from(err));
        match self.outbox.append_async(blob).await {
            Ok(id) => {
                self.refresh_buffered().await;
                DeliveryReport::Buffered { id }
            },
            Err(e) => {
                self.record_error(Error::Storage(format!("{e:#}")));
                DeliveryReport::Dropped
            },
        }
    }

    /// Send buffered blobs oldest-first, stopping at the first failure.
    async fn flush(&self) -> usize {
        let entries = match self.outbox.list_ordered_async().await {
            Ok(entries) => entries,
            Err(e) => {
                self.record_error(Error::Storage(format!("{e:#}")));
                return 0;
            },
        };

        let mut flushed = 0;
        for entry in entries {
            if let Err(e) = self.transmitter.send(&entry.blob).await {
                debug!(id = %entry.id, "Flush halted");
                self.record_error(Error::from(e));
                break;
            }
            if let Err(e) = self.outbox.remove_async(entry.id).await {
                // Delivered but still on disk; it will be sent again.
                self.record_error(Error::Storage(format!("{e:#}")));
                break;
            }
            flushed += 1;
        }
        flushed
    }

    async fn refresh_buffered(&self) -> u64 {
        match self.outbox.count_async().await {
            Ok(count) => {
                self.status.write().buffered = count;
                count
            },
            Err(e) => {
                self.record_error(Error::Storage(format!("{e:#}")));
                self.status.read().buffered
            },
        }
    }

    fn record_error(&self, err: Error) {
        warn!(error = %err, "Delivery cycle error");
        self.status.write().last_error = Some(err.to_string());
    }
}
