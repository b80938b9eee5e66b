//! Decrypting fetched entries and interpreting the readings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::api::RawEntry;
use crate::codec;
use crate::reading::Reading;

/// A reading recovered from the server, with its arrival time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedReading {
    pub received_at: String,
    #[serde(flatten)]
    pub reading: Reading,
}

/// Change of motion state between two adjacent readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// Timestamp of the reading that shows the new state.
    pub at: DateTime<Utc>,
    pub from: String,
    pub to: String,
}

/// Decode and decrypt every entry, dropping the ones that fail.
///
/// Order is preserved.
pub fn decode_entries(entries: &[RawEntry], key: &[u8]) -> Vec<DecodedReading> {
    entries
        .iter()
        .filter_map(|entry| match decode_entry(entry, key) {
            Ok(reading) => Some(DecodedReading {
                received_at: entry.timestamp.clone(),
                reading,
            }),
            Err(reason) => {
                debug!(received_at = %entry.timestamp, %reason, "Dropping undecodable entry");
                None
            },
        })
        .collect()
}

fn decode_entry(entry: &RawEntry, key: &[u8]) -> Result<Reading, String> {
    let blob = STANDARD.decode(&entry.data).map_err(|e| format!("base64: {e}"))?;
    codec::decrypt(&blob, key).map_err(|e| e.to_string())
}

/// Oldest first, by the device-side reading timestamp.
pub fn sort_chronologically(readings: &mut [DecodedReading]) {
    readings.sort_by_key(|r| r.reading.timestamp);
}

/// Motion state changes across chronologically sorted readings.
///
/// Only adjacent pairs where both readings carry a motion section are
/// compared; a reading without one neither starts nor ends a transition.
pub fn detect_transitions(readings: &[DecodedReading]) -> Vec<Transition> {
    readings
        .windows(2)
        .filter_map(|pair| {
            let from = pair[0].reading.motion_state()?;
            let to = pair[1].reading.motion_state()?;
            (from != to).then(|| Transition {
                at: pair[1].reading.timestamp,
                from: from.to_string(),
                to: to.to_string(),
            })
        })
        .collect()
}
