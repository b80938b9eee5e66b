//! Reading sources.
//!
//! Sensor acquisition happens outside this crate. A [`ReadingSource`] is the
//! seam where the platform hands the scheduler its latest snapshot.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

use crate::reading::{Reading, SensorReadings};

/// Supplies the reading for the next delivery cycle.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Current snapshot, or `None` when nothing is available this tick.
    async fn current_reading(&self) -> Option<Reading>;
}

/// Reads a JSON reading from a file on every tick.
///
/// The file may omit `timestamp`, in which case the reading is stamped with
/// the time it was read. A missing or malformed file yields `None`.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

/// File form of a reading with an optional timestamp.
#[derive(Deserialize)]
struct ReadingFile {
    timestamp: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    sensors: SensorReadings,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse a reading from JSON text, stamping it now if undated.
    pub fn parse(text: &str) -> serde_json::Result<Reading> {
        let file: ReadingFile = serde_json::from_str(text)?;
        Ok(Reading {
            timestamp: file.timestamp.unwrap_or_else(Utc::now),
            sensors: file.sensors,
        })
    }
}

#[async_trait]
impl ReadingSource for JsonFileSource {
    async fn current_reading(&self) -> Option<Reading> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read reading file");
                return None;
            },
        };

        match Self::parse(&text) {
            Ok(reading) => Some(reading),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to parse reading file");
                None
            },
        }
    }
}
