//! Store-and-forward delivery of encrypted multi-sensor telemetry.
//!
//! - [`client`] seals readings with [`codec`], sends them, and buffers
//!   failures in a durable outbox that is flushed in order.
//! - [`server`] stores opaque blobs per device behind a bearer token with
//!   per-device rate limiting and newest-first retrieval.
//! - [`consumer`] fetches blobs back, decrypts what it can, and interprets
//!   motion transitions.

pub mod client;
pub mod codec;
pub mod commands;
pub mod config;
pub mod constants;
pub mod consumer;
pub mod error;
pub mod logging;
pub mod paths;
pub mod reading;
pub mod reliability;
pub mod server;
pub mod utils;

pub use error::{Error, Result};
pub use reading::{Reading, SensorKind};
