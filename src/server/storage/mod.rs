//! Blob storage for ingested telemetry.
//!
//! Objects are opaque byte blobs keyed `{device_id}/{arrival_ms}`. Two
//! backends implement [`StorageBackend`]:
//!
//! - [`MemoryStorageBackend`]: `DashMap`, lost on exit
//! - [`FilesystemBackend`]: one file per blob plus a redb key index, with
//!   path traversal protection and startup reconciliation
//!
//! Listing is paginated at the backend; [`StorageService::list_all`] drains
//! every page for a prefix.

mod backend;
mod filesystem;
mod memory;
mod metadata;
mod types;
mod validation;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

pub use backend::StorageBackend;
pub use filesystem::FilesystemBackend;
pub use memory::MemoryStorageBackend;
pub use types::{ListPage, ObjectMeta};

use crate::constants::LIST_PAGE_SIZE;

/// Cloneable handle over any [`StorageBackend`].
#[derive(Clone)]
pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
}

impl StorageService {
    /// Storage rooted at a filesystem directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created or opened.
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::custom(FilesystemBackend::open(path)?))
    }

    /// Non-persistent in-memory storage.
    pub fn memory() -> Self {
        Self::custom(MemoryStorageBackend::new())
    }

    pub fn custom<B: StorageBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Store a blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the write fails.
    pub async fn put(&self, path: &str, data: &[u8]) -> Result<ObjectMeta> {
        self.backend.put(path, data).await
    }

    /// Fetch a blob's bytes. `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the read fails.
    pub async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.backend.get(path).await?.map(|(data, _)| data))
    }

    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    pub async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        self.backend.head(path).await
    }

    /// # Errors
    ///
    /// Returns an error if listing fails.
    pub async fn list_page(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage> {
        self.backend.list_page(prefix, cursor, page_size).await
    }

    /// Every object under `prefix`, following cursors until exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails to load.
    pub async fn list_all(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut objects = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .backend
                .list_page(prefix, cursor.as_deref(), LIST_PAGE_SIZE)
                .await?;
            objects.extend(page.objects);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(objects)
    }

    /// Delete a batch of keys; returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    pub async fn delete_many(&self, paths: &[String]) -> Result<usize> {
        if paths.is_empty() {
            return Ok(0);
        }
        self.backend.delete_many(paths).await
    }
}
