//! Durable outbox for blobs awaiting delivery.
//!
//! Entries live in a single redb table keyed by a `u64` creation id. redb
//! iterates keys in order, so enumeration order is the creation order and
//! survives restarts without depending on filesystem listing order.
//!
//! Ids are allocated inside the write transaction as
//! `max(now_millis * 1000, last_id + 1)`: millisecond-ordered across
//! restarts, with room for 1000 appends per millisecond before the counter
//! runs ahead of the wall clock. A backwards clock step never produces a
//! smaller id.

use anyhow::{Context, Result};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::utils::now_millis;

/// Table definition for outbox entries.
const OUTBOX_TABLE: TableDefinition<'static, u64, &'static [u8]> = TableDefinition::new("outbox");

/// Creation-ordered identifier of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A buffered blob with its creation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub id: EntryId,
    pub blob: Vec<u8>,
}

/// Append-only local store of encrypted blobs.
///
/// `Outbox` is `Clone` and can be shared across threads; redb serializes
/// writers internally.
#[derive(Clone)]
pub struct Outbox {
    db: Arc<Database>,
}

impl Outbox {
    /// Open or create the outbox database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or the database cannot be
    /// created, or the table cannot be initialized.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create outbox directory: {}", parent.display())
            })?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open outbox database: {}", path.display()))?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            let _table = write_txn
                .open_table(OUTBOX_TABLE)
                .context("Failed to initialize outbox table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        let outbox = Self { db: Arc::new(db) };
        tracing::debug!(path = %path.display(), pending = outbox.count()?, "Outbox opened");
        Ok(outbox)
    }

    /// Persist a blob as a new entry.
    ///
    /// The entry is visible to [`list_ordered`](Self::list_ordered) only once
    /// the transaction commits; a failed append leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn append(&self, blob: &[u8]) -> Result<EntryId> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;

        let id = {
            let mut table = write_txn
                .open_table(OUTBOX_TABLE)
                .context("Failed to open outbox table")?;

            let last = table
                .last()
                .context("Failed to read last outbox entry")?
                .map(|(key, _)| key.value());

            let stamp = u64::try_from(now_millis()).unwrap_or(0).saturating_mul(1000);
            let id = match last {
                Some(last) => stamp.max(last.saturating_add(1)),
                None => stamp,
            };

            table
                .insert(id, blob)
                .with_context(|| format!("Failed to insert outbox entry {id}"))?;
            id
        };

        write_txn
            .commit()
            .context("Failed to commit outbox append")?;

        tracing::debug!(id, bytes = blob.len(), "Buffered blob in outbox");
        Ok(EntryId(id))
    }

    /// All entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction or iteration fails.
    pub fn list_ordered(&self) -> Result<Vec<OutboxEntry>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;

        let table = read_txn
            .open_table(OUTBOX_TABLE)
            .context("Failed to open outbox table")?;

        let mut entries = Vec::new();
        for item in table.iter().context("Failed to iterate outbox table")? {
            let (key, value) = item.context("Failed to read outbox entry")?;
            entries.push(OutboxEntry {
                id: EntryId(key.value()),
                blob: value.value().to_vec(),
            });
        }

        Ok(entries)
    }

    /// Delete one entry. Removing a missing id is not an error.
    ///
    /// Returns `true` if the entry existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write transaction fails.
    pub fn remove(&self, id: EntryId) -> Result<bool> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;

        let existed = {
            let mut table = write_txn
                .open_table(OUTBOX_TABLE)
                .context("Failed to open outbox table")?;
            let removed = table
                .remove(id.0)
                .with_context(|| format!("Failed to remove outbox entry {id}"))?;
            removed.is_some()
        };

        write_txn
            .commit()
            .context("Failed to commit outbox removal")?;

        Ok(existed)
    }

    /// Number of persisted entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn count(&self) -> Result<u64> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(OUTBOX_TABLE)
            .context("Failed to open outbox table")?;
        table.len().context("Failed to count outbox entries")
    }

    // -------------------------------------------------------------------------
    // Async wrappers
    //
    // redb calls block; these move them onto the blocking pool. Once spawned,
    // the transaction runs to completion even if the awaiting future is
    // dropped, so cancelling a delivery cycle never tears a write.
    // -------------------------------------------------------------------------

    /// Async version of [`append`](Self::append).
    pub async fn append_async(&self, blob: Vec<u8>) -> Result<EntryId> {
        let outbox = self.clone();
        tokio::task::spawn_blocking(move || outbox.append(&blob))
            .await
            .context("Task join error")?
    }

    /// Async version of [`list_ordered`](Self::list_ordered).
    pub async fn list_ordered_async(&self) -> Result<Vec<OutboxEntry>> {
        let outbox = self.clone();
        tokio::task::spawn_blocking(move || outbox.list_ordered())
            .await
            .context("Task join error")?
    }

    /// Async version of [`remove`](Self::remove).
    pub async fn remove_async(&self, id: EntryId) -> Result<bool> {
        let outbox = self.clone();
        tokio::task::spawn_blocking(move || outbox.remove(id))
            .await
            .context("Task join error")?
    }

    /// Async version of [`count`](Self::count).
    pub async fn count_async(&self) -> Result<u64> {
        let outbox = self.clone();
        tokio::task::spawn_blocking(move || outbox.count())
            .await
            .context("Task join error")?
    }
}
