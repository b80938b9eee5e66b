//! Outbox inspection and manual flush.

use anyhow::Result;

use super::{build_coordinator, print_ok};
use crate::client::Outbox;
use crate::config::ClientConfig;

/// Print the number of buffered blobs.
pub fn count(client: &ClientConfig) -> Result<()> {
    let outbox = Outbox::open(client.outbox_path()?)?;
    print_ok(&serde_json::json!({ "pending": outbox.count()? }))
}

/// Send buffered blobs oldest-first, stopping at the first failure.
pub async fn flush(client: &ClientConfig) -> Result<()> {
    let coordinator = build_coordinator(client)?;
    let (flushed, remaining) = coordinator.flush_outbox().await;
    print_ok(&serde_json::json!({
        "flushed": flushed,
        "remaining": remaining,
        "last_error": coordinator.status().last_error,
    }))
}
