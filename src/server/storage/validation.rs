//! Object key validation.
//!
//! Keys are relative, slash-separated paths. Anything that could escape the
//! storage root is rejected before it reaches a backend.

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

/// Validate an object key and return its normalized relative path.
///
/// Rejects empty keys, absolute paths, `..` components and root or prefix
/// components. `.` components are dropped.
pub(crate) fn validate_path(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        bail!("Object path cannot be empty");
    }

    let path = Path::new(path);
    if path.is_absolute() {
        bail!("Object path cannot be absolute: {}", path.display());
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => normalized.push(name),
            Component::CurDir => {},
            Component::ParentDir => {
                bail!("Object path cannot contain '..': {}", path.display())
            },
            Component::RootDir | Component::Prefix(_) => {
                bail!(
                    "Object path cannot contain root or prefix: {}",
                    path.display()
                )
            },
        }
    }

    if normalized.as_os_str().is_empty() {
        bail!("Object path normalized to empty path");
    }

    Ok(normalized)
}

/// Validate a key and return it as a forward-slash string.
pub(crate) fn normalize_key(path: &str) -> Result<String> {
    Ok(validate_path(path)?.to_string_lossy().replace('\\', "/"))
}

/// Filesystem location for an object under `base_dir`.
pub(crate) fn object_path(base_dir: &Path, path: &str) -> Result<PathBuf> {
    Ok(base_dir.join(validate_path(path)?))
}
