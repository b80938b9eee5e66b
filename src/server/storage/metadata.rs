//! Metadata table operations for the filesystem backend.
//!
//! The redb table is the listing index; blob bytes live in plain files.
//! [`reconcile`] repairs drift between the two after a crash or manual
//! edits to the storage directory.

use anyhow::{Context, Result};
use redb::{Database, ReadableDatabase, ReadableTable};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::types::{ListPage, OBJECTS_TABLE, ObjectMeta};

pub(crate) use crate::constants::STORAGE_METADATA_FILE as METADATA_FILE;

/// Suffix of in-flight writes, renamed into place on completion.
pub(crate) const PARTIAL_SUFFIX: &str = ".partial";

pub(crate) fn save_metadata(db: &Database, meta: &ObjectMeta) -> Result<()> {
    let write_txn = db
        .begin_write()
        .context("Failed to begin write transaction")?;
    {
        let mut table = write_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?;
        let json = serde_json::to_vec(meta).context("Failed to serialize object metadata")?;
        table
            .insert(meta.path.as_str(), json.as_slice())
            .with_context(|| format!("Failed to insert object metadata: {}", meta.path))?;
    }
    write_txn
        .commit()
        .context("Failed to commit metadata save transaction")?;
    Ok(())
}

pub(crate) fn load_metadata(db: &Database, path: &str) -> Result<Option<ObjectMeta>> {
    let read_txn = db
        .begin_read()
        .context("Failed to begin read transaction")?;
    let table = read_txn
        .open_table(OBJECTS_TABLE)
        .context("Failed to open objects table")?;

    let Some(guard) = table
        .get(path)
        .with_context(|| format!("Failed to read object metadata: {path}"))?
    else {
        return Ok(None);
    };
    let meta = serde_json::from_slice(guard.value())
        .with_context(|| format!("Failed to deserialize object metadata: {path}"))?;
    Ok(Some(meta))
}

/// Remove metadata rows in one transaction. Returns how many existed.
pub(crate) fn remove_metadata(db: &Database, paths: &[String]) -> Result<usize> {
    let write_txn = db
        .begin_write()
        .context("Failed to begin write transaction")?;
    let mut removed = 0;
    {
        let mut table = write_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table")?;
        for path in paths {
            let existed = table
                .remove(path.as_str())
                .with_context(|| format!("Failed to remove object metadata: {path}"))?;
            if existed.is_some() {
                removed += 1;
            }
        }
    }
    write_txn
        .commit()
        .context("Failed to commit metadata removal transaction")?;
    Ok(removed)
}

/// Ascending range scan over keys starting with `prefix`, strictly after
/// `cursor`.
pub(crate) fn list_page(
    db: &Database,
    prefix: &str,
    cursor: Option<&str>,
    page_size: usize,
) -> Result<ListPage> {
    let read_txn = db
        .begin_read()
        .context("Failed to begin read transaction")?;
    let table = read_txn
        .open_table(OBJECTS_TABLE)
        .context("Failed to open objects table")?;

    let start = cursor.unwrap_or(prefix);
    let range = table
        .range::<&str>(start..)
        .context("Failed to scan objects table")?;

    let mut objects = Vec::new();
    let mut more = false;
    for item in range {
        let (key, value) = item.context("Failed to read object entry")?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        if cursor == Some(key) {
            continue;
        }
        if objects.len() == page_size {
            more = true;
            break;
        }
        match serde_json::from_slice::<ObjectMeta>(value.value()) {
            Ok(meta) => objects.push(meta),
            Err(e) => tracing::warn!(path = key, error = %e, "Skipping unreadable object metadata"),
        }
    }

    let cursor = if more {
        objects.last().map(|m| m.path.clone())
    } else {
        None
    };
    Ok(ListPage { objects, cursor })
}

/// Bring the metadata table in line with the files on disk.
///
/// Removes rows whose file is gone, indexes files that have no row and
/// corrects sizes that no longer match. Leftover partial writes are deleted.
///
/// # Errors
///
/// Returns an error if directory scanning fails or database operations fail.
pub(crate) fn reconcile(db: &Database, base_dir: &Path) -> Result<()> {
    tracing::debug!(base_dir = %base_dir.display(), "Reconciling storage metadata");

    let mut fs_files: HashSet<String> = HashSet::new();
    scan_directory(base_dir, base_dir, &mut fs_files)?;

    let mut orphaned: Vec<String> = Vec::new();
    let mut stale: Vec<ObjectMeta> = Vec::new();
    {
        let read_txn = db
            .begin_read()
            .context("Failed to begin read transaction for reconciliation")?;
        let table = read_txn
            .open_table(OBJECTS_TABLE)
            .context("Failed to open objects table for reconciliation")?;

        for item in table.iter().context("Failed to iterate objects table")? {
            let (key, value) = item.context("Failed to read object entry")?;
            let path = key.value().to_string();

            if !fs_files.remove(&path) {
                orphaned.push(path);
                continue;
            }
            if let Ok(mut meta) = serde_json::from_slice::<ObjectMeta>(value.value())
                && let Ok(file_meta) = fs::metadata(base_dir.join(&path))
                && file_meta.len() != meta.size
            {
                meta.size = file_meta.len();
                stale.push(meta);
            }
        }
    }

    if !orphaned.is_empty() {
        remove_metadata(db, &orphaned)?;
    }
    for path in &fs_files {
        if let Ok(file_meta) = fs::metadata(base_dir.join(path)) {
            save_metadata(db, &ObjectMeta::new(path.clone(), file_meta.len()))?;
        }
    }
    for meta in &stale {
        save_metadata(db, meta)?;
    }

    if orphaned.len() + fs_files.len() + stale.len() > 0 {
        tracing::info!(
            orphaned = orphaned.len(),
            untracked = fs_files.len(),
            stale = stale.len(),
            "Storage reconciliation complete"
        );
    } else {
        tracing::debug!("Storage metadata is consistent with filesystem");
    }

    Ok(())
}

/// Collect relative paths of every blob file under `dir`.
fn scan_directory(base_dir: &Path, dir: &Path, files: &mut HashSet<String>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat: {}", path.display()))?;

        // Device directories may carry any name; only files are filtered.
        if file_type.is_dir() {
            scan_directory(base_dir, &path, files)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if dir == base_dir && (name == METADATA_FILE || name.ends_with(".lock")) {
            continue;
        }
        if name.ends_with(PARTIAL_SUFFIX) {
            tracing::debug!(path = %path.display(), "Removing interrupted write");
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove interrupted write"
                );
            }
            continue;
        }

        if let Ok(relative) = path.strip_prefix(base_dir) {
            files.insert(relative.to_string_lossy().replace('\\', "/"));
        }
    }

    Ok(())
}
