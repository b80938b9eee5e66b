//! Consumer side: fetch blobs, decrypt them, and interpret the readings.

pub mod api;
pub mod decode;

pub use api::{ApiError, RawEntry, TelemetryApi};
pub use decode::{
    DecodedReading, Transition, decode_entries, detect_transitions, sort_chronologically,
};
