//! Security audit logging for the telemetry server.
//!
//! Events go to the `audit` tracing target so they can be filtered or routed
//! separately, e.g. `RUST_LOG=audit=info`.

use std::net::SocketAddr;
use tracing::warn;

/// Security-relevant request outcomes.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// Missing or wrong bearer token.
    AuthFailure {
        remote_addr: Option<SocketAddr>,
        reason: &'static str,
    },
    /// Device exceeded its request window.
    RateLimited {
        device_id: String,
        operation: &'static str,
    },
    /// Device id that would not form a safe storage key.
    InvalidDeviceId { device_id: String },
}

/// Log a security audit event with structured fields.
pub fn log_audit_event(event: AuditEvent) {
    match event {
        AuditEvent::AuthFailure {
            remote_addr,
            reason,
        } => {
            warn!(
                target: "audit",
                event_type = "auth_failure",
                remote_addr = ?remote_addr,
                reason,
                "Authentication failed"
            );
        },
        AuditEvent::RateLimited {
            device_id,
            operation,
        } => {
            warn!(
                target: "audit",
                event_type = "rate_limited",
                %device_id,
                operation,
                "Rate limit exceeded"
            );
        },
        AuditEvent::InvalidDeviceId { device_id } => {
            warn!(
                target: "audit",
                event_type = "invalid_device_id",
                %device_id,
                "Rejected unsafe device id"
            );
        },
    }
}
