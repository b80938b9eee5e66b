//! Path utilities for sensorlink data.
//!
//! # Files
//! - [`get_config_path`] - `~/.sensorlink/sensorlink.toml`
//! - [`get_outbox_path`] - `~/.sensorlink/outbox.redb` (device outbox)
//! - [`get_storage_dir`] - `~/.sensorlink/storage/` (server blob store)

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable overriding the base directory.
pub const HOME_ENV: &str = "SENSORLINK_HOME";

/// Get the sensorlink base directory.
///
/// Resolution order:
/// 1. `SENSORLINK_HOME` environment variable (if set)
/// 2. `~/.sensorlink/` (default)
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV)
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().context("Failed to get home directory")?;
    Ok(home.join(".sensorlink"))
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("sensorlink.toml"))
}

pub fn get_outbox_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("outbox.redb"))
}

pub fn get_storage_dir() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("storage"))
}
