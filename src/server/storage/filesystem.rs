//! Filesystem-backed storage backend.
//!
//! Each blob is a file at `<base_dir>/<key>`; a redb table in the same
//! directory indexes keys for ordered prefix listing.

use super::backend::StorageBackend;
use super::metadata::{
    METADATA_FILE, PARTIAL_SUFFIX, list_page, load_metadata, reconcile, remove_metadata,
    save_metadata,
};
use super::types::{ListPage, OBJECTS_TABLE, ObjectMeta};
use super::validation::{normalize_key, object_path};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redb::Database;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Persistent blob backend.
///
/// `FilesystemBackend` is `Clone`; clones share the metadata database.
#[derive(Clone)]
pub struct FilesystemBackend {
    base_dir: PathBuf,
    db: Arc<Database>,
}

impl FilesystemBackend {
    /// Create or open storage rooted at `base_dir`, then reconcile.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Storage directory cannot be created
    /// - Metadata database cannot be opened or initialized
    /// - Metadata reconciliation fails
    pub fn open<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();

        fs::create_dir_all(&base_dir).with_context(|| {
            format!("Failed to create storage directory: {}", base_dir.display())
        })?;

        let db_path = base_dir.join(METADATA_FILE);
        let db = Database::create(&db_path).with_context(|| {
            format!(
                "Failed to open storage metadata database: {}",
                db_path.display()
            )
        })?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            let _table = write_txn
                .open_table(OBJECTS_TABLE)
                .context("Failed to initialize objects table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        reconcile(&db, &base_dir)?;

        Ok(Self {
            base_dir,
            db: Arc::new(db),
        })
    }

    fn put_sync(&self, path: &str, data: &[u8]) -> Result<ObjectMeta> {
        let key = normalize_key(path)?;
        let file_path = object_path(&self.base_dir, &key)?;

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directories for: {key}"))?;
        }

        // Write aside and rename so readers never see a truncated blob.
        let mut partial = file_path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        {
            let mut file = File::create(&partial)
                .with_context(|| format!("Failed to create object: {key}"))?;
            file.write_all(data)
                .with_context(|| format!("Failed to write object: {key}"))?;
            file.sync_all()
                .with_context(|| format!("Failed to sync object: {key}"))?;
        }
        fs::rename(&partial, &file_path)
            .with_context(|| format!("Failed to commit object: {key}"))?;
        if let Some(parent) = file_path.parent() {
            sync_dir(parent).with_context(|| format!("Failed to sync directory for: {key}"))?;
        }

        let meta = ObjectMeta::new(key, data.len() as u64);
        save_metadata(&self.db, &meta)?;
        Ok(meta)
    }

    fn get_sync(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>> {
        let key = normalize_key(path)?;
        let file_path = object_path(&self.base_dir, &key)?;

        let data = match fs::read(&file_path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read object: {key}")),
        };

        let meta = match load_metadata(&self.db, &key)? {
            Some(meta) => meta,
            None => ObjectMeta::new(key, data.len() as u64),
        };
        Ok(Some((data, meta)))
    }

    fn head_sync(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let key = normalize_key(path)?;
        let file_path = object_path(&self.base_dir, &key)?;

        if !file_path.exists() {
            return Ok(None);
        }
        if let Some(meta) = load_metadata(&self.db, &key)? {
            return Ok(Some(meta));
        }

        let metadata = fs::metadata(&file_path)
            .with_context(|| format!("Failed to get file metadata: {key}"))?;
        Ok(Some(ObjectMeta::new(key, metadata.len())))
    }

    fn delete_many_sync(&self, paths: &[String]) -> Result<usize> {
        let mut keys = Vec::with_capacity(paths.len());
        let mut deleted = 0;

        for path in paths {
            let key = normalize_key(path)?;
            let file_path = object_path(&self.base_dir, &key)?;
            match fs::remove_file(&file_path) {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to delete object: {key}"));
                },
            }
            keys.push(key);
        }

        // Rows for already-missing files are dropped too.
        remove_metadata(&self.db, &keys)?;
        Ok(deleted)
    }
}

/// Persist a rename inside `dir`.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

/// No directory fsync off Unix.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn put(&self, path: &str, data: &[u8]) -> Result<ObjectMeta> {
        let backend = self.clone();
        let path = path.to_string();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || backend.put_sync(&path, &data))
            .await
            .context("Task join error")?
    }

    async fn get(&self, path: &str) -> Result<Option<(Vec<u8>, ObjectMeta)>> {
        let backend = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || backend.get_sync(&path))
            .await
            .context("Task join error")?
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let backend = self.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || backend.head_sync(&path))
            .await
            .context("Task join error")?
    }

    async fn list_page(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage> {
        let db = self.db.clone();
        let prefix = prefix.to_string();
        let cursor = cursor.map(str::to_string);
        tokio::task::spawn_blocking(move || list_page(&db, &prefix, cursor.as_deref(), page_size))
            .await
            .context("Task join error")?
    }

    async fn delete_many(&self, paths: &[String]) -> Result<usize> {
        let backend = self.clone();
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || backend.delete_many_sync(&paths))
            .await
            .context("Task join error")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (FilesystemBackend, TempDir) {
        let tmp = TempDir::new().unwrap();
        let backend = FilesystemBackend::open(tmp.path()).unwrap();
        (backend, tmp)
    }

    #[tokio::test]
    async fn test_put_get_head() {
        let (backend, tmp) = open();

        backend.put("dev/100", b"sealed").await.unwrap();
        assert!(tmp.path().join("dev").join("100").is_file());

        let (data, meta) = backend.get("dev/100").await.unwrap().unwrap();
        assert_eq!(data, b"sealed");
        assert_eq!(meta.size, 6);
        assert_eq!(backend.head("dev/100").await.unwrap().unwrap().path, "dev/100");
        assert!(backend.get("dev/101").await.unwrap().is_none());
        assert!(backend.head("dev/101").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_page_is_prefix_scoped() {
        let (backend, _tmp) = open();
        for i in 0..5 {
            backend.put(&format!("dev/{i}"), b"x").await.unwrap();
        }
        backend.put("dev2/0", b"x").await.unwrap();

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = backend.list_page("dev/", cursor.as_deref(), 2).await.unwrap();
            seen.extend(page.objects.into_iter().map(|m| m.path));
            cursor = page.cursor;
            if cursor.is_none() {
                break;
            }
        }
        assert_eq!(seen, ["dev/0", "dev/1", "dev/2", "dev/3", "dev/4"]);
    }

    #[tokio::test]
    async fn test_delete_many() {
        let (backend, tmp) = open();
        backend.put("dev/1", b"a").await.unwrap();
        backend.put("dev/2", b"b").await.unwrap();

        let deleted = backend
            .delete_many(&["dev/1".into(), "dev/9".into()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(!tmp.path().join("dev").join("1").exists());

        let page = backend.list_page("dev/", None, 10).await.unwrap();
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].path, "dev/2");
    }

    #[tokio::test]
    async fn test_reconcile_on_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let backend = FilesystemBackend::open(tmp.path()).unwrap();
            backend.put("dev/1", b"a").await.unwrap();
            backend.put("dev/2", b"b").await.unwrap();
        }

        // Out-of-band changes: one file removed, one added, one half-written.
        fs::remove_file(tmp.path().join("dev/1")).unwrap();
        fs::write(tmp.path().join("dev/3"), b"ccc").unwrap();
        fs::write(tmp.path().join("dev/4.partial"), b"torn").unwrap();

        let backend = FilesystemBackend::open(tmp.path()).unwrap();
        let page = backend.list_page("dev/", None, 10).await.unwrap();
        let paths: Vec<_> = page.objects.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, ["dev/2", "dev/3"]);
        assert_eq!(page.objects[1].size, 3);
        assert!(!tmp.path().join("dev/4.partial").exists());
    }

    #[tokio::test]
    async fn test_device_dirs_with_reserved_suffixes_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let backend = FilesystemBackend::open(tmp.path()).unwrap();
            backend.put("phone.lock/1700000000000", b"a").await.unwrap();
            backend.put("phone.partial/1700000000001", b"bb").await.unwrap();
        }
        fs::write(tmp.path().join("stray.lock"), b"").unwrap();

        let backend = FilesystemBackend::open(tmp.path()).unwrap();
        let locked = backend.list_page("phone.lock/", None, 10).await.unwrap();
        assert_eq!(locked.objects.len(), 1);
        assert_eq!(locked.objects[0].path, "phone.lock/1700000000000");

        let partial = backend.list_page("phone.partial/", None, 10).await.unwrap();
        assert_eq!(partial.objects.len(), 1);
        assert_eq!(partial.objects[0].size, 2);
        assert!(tmp.path().join("phone.partial").is_dir());

        let (data, _) = backend.get("phone.lock/1700000000000").await.unwrap().unwrap();
        assert_eq!(data, b"a");
        assert!(backend.list_page("stray.lock", None, 10).await.unwrap().objects.is_empty());
    }

    #[tokio::test]
    async fn test_put_leaves_no_partial_file() {
        let (backend, tmp) = open();
        backend.put("dev/1700000000000", b"sealed").await.unwrap();

        let names: Vec<_> = fs::read_dir(tmp.path().join("dev"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["1700000000000"]);
        assert_eq!(fs::read(tmp.path().join("dev/1700000000000")).unwrap(), b"sealed");
    }

    #[tokio::test]
    async fn test_path_traversal_prevention() {
        let (backend, _tmp) = open();
        for path in ["../etc/passwd", "../../etc/passwd", "/etc/passwd"] {
            assert!(backend.put(path, b"x").await.is_err(), "accepted {path:?}");
        }
    }
}
