//! In-memory storage backend.
//!
//! Non-persistent store on a `DashMap`. Used for tests and for servers run
//! with `storage = "memory"`.

use super::backend::StorageBackend;
use super::types::{ListPage, ObjectMeta};
use super::validation::normalize_key;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Clone)]
struct MemoryObject {
    data: Vec<u8>,
    meta: ObjectMeta,
}

/// In-memory blob backend.
///
/// All data is lost when the process exits.
#[derive(Clone, Default)]
pub struct MemoryStorageBackend {
    data: DashMap<String, MemoryObject>,
}

impl MemoryStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn put(&self, path: &str, data: &[u8]) -> Result<ObjectMeta> {
        let key = normalize_key(path)?;
        let meta = ObjectMeta::new(key.clone(), data.len() as u64);
        self.data.insert(
            key,
            MemoryObject {
                data: data.to_vec(),
                meta: meta.clone(),
            },
        );
        Ok(meta)
    }

    async fn get(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>> {
        let key = normalize_key(path)?;
        Ok(self.data.get(&key).map(|entry| {
            let obj = entry.value();
            (obj.data.clone(), obj.meta.clone())
        }))
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let key = normalize_key(path)?;
        Ok(self.data.get(&key).map(|entry| entry.value().meta.clone()))
    }

    async fn list_page(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage> {
        let mut objects: Vec<ObjectMeta> = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .filter(|entry| cursor.is_none_or(|c| entry.key().as_str() > c))
            .map(|entry| entry.value().meta.clone())
            .collect();

        objects.sort_by(|a, b| a.path.cmp(&b.path));

        let cursor = if objects.len() > page_size {
            objects.truncate(page_size);
            objects.last().map(|m| m.path.clone())
        } else {
            None
        };

        Ok(ListPage { objects, cursor })
    }

    async fn delete_many(&self, paths: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for path in paths {
            let key = normalize_key(path)?;
            if self.data.remove(&key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let backend = MemoryStorageBackend::new();

        let meta = backend.put("dev/1", b"blob").await.unwrap();
        assert_eq!(meta.path, "dev/1");
        assert_eq!(meta.size, 4);

        let (data, meta) = backend.get("dev/1").await.unwrap().unwrap();
        assert_eq!(data, b"blob");
        assert_eq!(meta.path, "dev/1");
        assert!(backend.get("dev/2").await.unwrap().is_none());
        assert_eq!(backend.head("dev/1").await.unwrap().unwrap().size, 4);
    }

    #[tokio::test]
    async fn test_list_page_walks_prefix_in_order() {
        let backend = MemoryStorageBackend::new();
        for i in 0..5 {
            backend.put(&format!("dev/{i}"), b"x").await.unwrap();
        }
        backend.put("devx/0", b"x").await.unwrap();
        backend.put("other/0", b"x").await.unwrap();

        let first = backend.list_page("dev/", None, 2).await.unwrap();
        let paths: Vec<_> = first.objects.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, ["dev/0", "dev/1"]);
        assert_eq!(first.cursor.as_deref(), Some("dev/1"));

        let second = backend
            .list_page("dev/", first.cursor.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(second.objects[0].path, "dev/2");

        let last = backend.list_page("dev/", Some("dev/3"), 2).await.unwrap();
        assert_eq!(last.objects.len(), 1);
        assert!(last.cursor.is_none());
    }

    #[tokio::test]
    async fn test_delete_many_counts_existing() {
        let backend = MemoryStorageBackend::new();
        backend.put("dev/1", b"a").await.unwrap();
        backend.put("dev/2", b"b").await.unwrap();

        let deleted = backend
            .delete_many(&["dev/1".into(), "dev/2".into(), "dev/3".into()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(backend.data.is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_prevention() {
        let backend = MemoryStorageBackend::new();
        for path in ["../etc/passwd", "/etc/passwd", ""] {
            assert!(backend.put(path, b"x").await.is_err(), "accepted {path:?}");
        }
    }
}
