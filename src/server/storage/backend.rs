//! Backend trait for blob storage.

use super::types::{ListPage, ObjectMeta};
use anyhow::Result;
use async_trait::async_trait;

/// Keyed blob store.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// A write is durable once `put` returns `Ok`.
///
/// # Example
///
/// ```ignore
/// use sensorlink::server::storage::{MemoryStorageBackend, StorageBackend};
///
/// let backend = MemoryStorageBackend::new();
/// backend.put("device-1/1712345678901", &blob).await?;
/// let page = backend.list_page("device-1/", None, 1000).await?;
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Store a blob, replacing any previous value at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the write fails.
    async fn put(&self, path: &str, data: &[u8]) -> Result<ObjectMeta>;

    /// Fetch a blob and its metadata. `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the read fails.
    async fn get(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>>;

    /// Metadata only. `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or metadata cannot be read.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;

    /// List up to `page_size` objects whose key starts with `prefix`, in
    /// ascending key order, starting strictly after `cursor`.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    async fn list_page(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage>;

    /// Delete every listed key. Missing keys are skipped.
    ///
    /// Returns the number of objects actually removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is invalid or deletion fails.
    async fn delete_many(&self, paths: &[String]) -> Result<usize>;
}
