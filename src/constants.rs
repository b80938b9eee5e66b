//! Shared constants for the sensorlink server, device client and consumer.
//!
//! Defaults here are the values used when a config file omits a field.

// =============================================================================
// HTTP surface
// =============================================================================

/// Telemetry endpoint (POST ingest, GET retrieve, DELETE purge).
pub const TELEMETRY_PATH: &str = "/api/telemetry";

/// Built-in health check endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Built-in metrics endpoint (Prometheus format).
pub const METRICS_PATH: &str = "/metrics";

/// Header carrying the device identifier on ingest.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Default server bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Maximum accepted ingest body size.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Default per-request timeout on the server.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Rate limiting
// =============================================================================

/// Requests admitted per device per window.
pub const DEFAULT_RATE_LIMIT: u32 = 60;

/// Length of a rate limit window.
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;

// =============================================================================
// Retrieval
// =============================================================================

/// Entries returned when `limit` is absent or unusable.
pub const DEFAULT_RETRIEVE_LIMIT: usize = 100;

/// Hard cap on `limit`.
pub const MAX_RETRIEVE_LIMIT: usize = 1000;

/// Simultaneous blob reads while assembling a retrieval response.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 50;

/// Page size used when draining a storage listing.
pub const LIST_PAGE_SIZE: usize = 1000;

/// Metadata database file at the root of a storage directory. Device
/// directories share that root, so no device may take this name.
pub const STORAGE_METADATA_FILE: &str = "metadata.redb";

// =============================================================================
// Device client
// =============================================================================

/// Seconds between collect-and-deliver cycles.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Time budget for a single cycle (send + flush).
pub const DEFAULT_CYCLE_BUDGET_SECS: u64 = 25;

/// Timeout for one transmit attempt.
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;

/// Default remote endpoint for device and consumer.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8787";
