//! Types and constants for blob storage.

use chrono::{DateTime, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};

/// Metadata table for the filesystem backend, keyed by object path.
pub(crate) const OBJECTS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("objects");

/// Metadata for a stored blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object key, e.g. `device-1/1712345678901`
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// When the backend accepted the write
    pub stored_at: DateTime<Utc>,
}

impl ObjectMeta {
    pub(crate) fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            stored_at: Utc::now(),
        }
    }
}

/// One page of a prefix listing, in ascending key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    /// Pass back to fetch the next page; `None` when the listing is complete.
    pub cursor: Option<String>,
}
