//! Telemetry reading model.
//!
//! A [`Reading`] is a point-in-time snapshot of whichever sensors are
//! enabled on the device. Every section is optional; absent sections are
//! omitted from the serialized form entirely rather than written as `null`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A timestamped set of sensor sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Time the reading was taken (UTC).
    pub timestamp: DateTime<Utc>,
    /// Sensor sections present in this reading.
    #[serde(default)]
    pub sensors: SensorReadings,
}

impl Reading {
    /// Create a reading with no sections at the given time.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            sensors: SensorReadings::default(),
        }
    }

    /// Create an empty reading stamped with the current time.
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// True when no sensor section is present.
    pub fn is_empty(&self) -> bool {
        self.sensors.section_count() == 0
    }

    /// Motion state, if the motion section is present.
    pub fn motion_state(&self) -> Option<&str> {
        self.sensors.motion.as_ref().map(|m| m.state.as_str())
    }

    /// Builder-style setter for the motion section.
    #[must_use]
    pub fn with_motion(mut self, state: impl Into<String>, confidence: impl Into<String>) -> Self {
        self.sensors.motion = Some(MotionData {
            state: state.into(),
            confidence: confidence.into(),
        });
        self
    }

    /// Builder-style setter for the location section.
    #[must_use]
    pub fn with_location(mut self, location: LocationData) -> Self {
        self.sensors.location = Some(location);
        self
    }
}

/// Sparse set of sensor sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<VelocityData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<StepsData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion: Option<MotionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bluetooth: Option<BluetoothData>,
}

impl SensorReadings {
    /// Number of sections present.
    pub fn section_count(&self) -> usize {
        SensorKind::ALL.iter().filter(|k| self.has(**k)).count()
    }

    /// Whether the given section is present.
    pub fn has(&self, kind: SensorKind) -> bool {
        match kind {
            SensorKind::Location => self.location.is_some(),
            SensorKind::Velocity => self.velocity.is_some(),
            SensorKind::Steps => self.steps.is_some(),
            SensorKind::Motion => self.motion.is_some(),
            SensorKind::Bluetooth => self.bluetooth.is_some(),
        }
    }

    /// Drop every section whose kind is not in `enabled`.
    ///
    /// An empty `enabled` list keeps everything.
    pub fn retain(&mut self, enabled: &[SensorKind]) {
        if enabled.is_empty() {
            return;
        }
        for kind in SensorKind::ALL {
            if enabled.contains(&kind) {
                continue;
            }
            match kind {
                SensorKind::Location => self.location = None,
                SensorKind::Velocity => self.velocity = None,
                SensorKind::Steps => self.steps = None,
                SensorKind::Motion => self.motion = None,
                SensorKind::Bluetooth => self.bluetooth = None,
            }
        }
    }
}

/// Sensor section identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Location,
    Velocity,
    Steps,
    Motion,
    Bluetooth,
}

impl SensorKind {
    /// All section kinds in serialization order.
    pub const ALL: [SensorKind; 5] = [
        Self::Location,
        Self::Velocity,
        Self::Steps,
        Self::Motion,
        Self::Bluetooth,
    ];

    /// Field name used in the serialized reading.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Velocity => "velocity",
            Self::Steps => "steps",
            Self::Motion => "motion",
            Self::Bluetooth => "bluetooth",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown sensor '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityData {
    /// Meters per second.
    pub speed: f64,
    /// Degrees clockwise from true north.
    pub course: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepsData {
    pub count: i64,
    /// Meters.
    pub distance: f64,
    pub floors_up: i64,
    pub floors_down: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionData {
    /// Activity label such as `walking`, `running` or `stationary`.
    pub state: String,
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothData {
    pub devices: Vec<BluetoothDevice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothDevice {
    pub name: String,
    pub rssi: i32,
    pub uuid: String,
}
