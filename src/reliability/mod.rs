//! Reliability helpers for outbound calls.

pub mod retry;

pub use retry::{RetryConfig, retry_async};
