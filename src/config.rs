//! Configuration for the sensorlink server, device client and consumer.
//!
//! One TOML file (`sensorlink.toml`) carries two sections:
//!
//! - [`ServerConfig`] (`[server]`) - bind address, token, storage, limits
//! - [`ClientConfig`] (`[client]`) - endpoint, credentials, outbox, cadence
//!
//! Every field has a default, so a missing file or section is valid until
//! [`ServerConfig::validate`] or [`ClientConfig::validate`] is asked about a
//! role that needs credentials. Secrets can be supplied through environment
//! variables instead of the file (see [`Config::apply_env_overrides`]).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::RejectPolicy;
use crate::codec::EncryptionKey;
use crate::constants;
use crate::error::Error;
use crate::paths;
use crate::reading::SensorKind;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root of `sensorlink.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub api_token: String,
    /// `"memory"`, a directory path, or unset for `~/.sensorlink/storage`.
    pub storage: Option<String>,
    pub rate_limit: u32,
    pub rate_window_secs: u64,
    pub fetch_concurrency: usize,
    pub max_body_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: constants::DEFAULT_BIND.to_string(),
            api_token: String::new(),
            storage: None,
            rate_limit: constants::DEFAULT_RATE_LIMIT,
            rate_window_secs: constants::DEFAULT_RATE_WINDOW_SECS,
            fetch_concurrency: constants::DEFAULT_FETCH_CONCURRENCY,
            max_body_bytes: constants::DEFAULT_MAX_BODY_BYTES,
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Where the server keeps blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    Memory,
    Directory(PathBuf),
}

/// `[client]` section, shared by the device pipeline and the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint: String,
    pub device_id: String,
    pub api_token: String,
    /// Standard base64 of a 32-byte key.
    pub encryption_key: String,
    pub outbox_path: Option<PathBuf>,
    pub interval_secs: u64,
    pub cycle_budget_secs: u64,
    pub send_timeout_secs: u64,
    /// Sections to keep; empty keeps all.
    pub enabled_sensors: Vec<SensorKind>,
    pub reject_policy: RejectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: constants::DEFAULT_ENDPOINT.to_string(),
            device_id: String::new(),
            api_token: String::new(),
            encryption_key: String::new(),
            outbox_path: None,
            interval_secs: constants::DEFAULT_INTERVAL_SECS,
            cycle_budget_secs: constants::DEFAULT_CYCLE_BUDGET_SECS,
            send_timeout_secs: constants::DEFAULT_SEND_TIMEOUT_SECS,
            enabled_sensors: Vec::new(),
            reject_policy: RejectPolicy::default(),
        }
    }
}

impl Config {
    /// Load `path` if given, else `~/.sensorlink/sensorlink.toml` if it
    /// exists, else defaults. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path cannot be read, or any file
    /// found contains invalid TOML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let default_path = paths::get_config_path()?;
                if default_path.exists() {
                    Self::load_from(&default_path)?
                } else {
                    tracing::debug!(path = %default_path.display(), "No config file, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse a config file without applying environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - A field has the wrong type
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Overlay secrets and identity from the environment.
    ///
    /// `SENSORLINK_API_TOKEN` sets both the server and client token.
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(token) = get("SENSORLINK_API_TOKEN") {
            self.server.api_token.clone_from(&token);
            self.client.api_token = token;
        }
        if let Some(device_id) = get("SENSORLINK_DEVICE_ID") {
            self.client.device_id = device_id;
        }
        if let Some(key) = get("SENSORLINK_ENCRYPTION_KEY") {
            self.client.encryption_key = key;
        }
        if let Some(endpoint) = get("SENSORLINK_ENDPOINT") {
            self.client.endpoint = endpoint;
        }
    }
}

impl ServerConfig {
    /// Resolve the `storage` setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the default location needs a home directory and
    /// none can be determined.
    pub fn storage_location(&self) -> Result<StorageLocation> {
        match self.storage.as_deref().map(str::trim) {
            Some("memory") => Ok(StorageLocation::Memory),
            Some(dir) if !dir.is_empty() => Ok(StorageLocation::Directory(PathBuf::from(dir))),
            _ => Ok(StorageLocation::Directory(paths::get_storage_dir()?)),
        }
    }

    /// Check the server section before binding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] listing every problem found.
    pub fn validate(&self) -> crate::error::Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.api_token.is_empty() {
            errors.push("server.api_token is required (or set SENSORLINK_API_TOKEN)".to_string());
        } else if self.api_token.len() < 16 {
            warnings.push("server.api_token is shorter than 16 characters".to_string());
        }
        if self.bind.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("server.bind '{}' is not a socket address", self.bind));
        }
        for (name, value) in [
            ("server.rate_limit", u64::from(self.rate_limit)),
            ("server.rate_window_secs", self.rate_window_secs),
            ("server.fetch_concurrency", self.fetch_concurrency as u64),
            ("server.max_body_bytes", self.max_body_bytes as u64),
            ("server.request_timeout_secs", self.request_timeout_secs),
        ] {
            if value == 0 {
                errors.push(format!("{name} cannot be 0"));
            }
        }
        if self.storage.as_deref() == Some("memory") {
            warnings.push("server.storage is 'memory'; blobs are lost on restart".to_string());
        }

        finish(errors, warnings)
    }
}

impl ClientConfig {
    /// Check the client section before any network attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] listing every problem found.
    pub fn validate(&self) -> crate::error::Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        match url::Url::parse(&self.endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                if url.scheme() == "http" && url.host_str().is_some_and(|h| !is_loopback(h)) {
                    warnings.push(format!(
                        "client.endpoint '{}' is not HTTPS; the bearer token travels in clear",
                        self.endpoint
                    ));
                }
            },
            Ok(url) => errors.push(format!(
                "client.endpoint scheme '{}' is not http or https",
                url.scheme()
            )),
            Err(e) => errors.push(format!("client.endpoint '{}' is invalid: {e}", self.endpoint)),
        }

        if self.device_id.is_empty() {
            errors.push("client.device_id is required (or set SENSORLINK_DEVICE_ID)".to_string());
        } else if crate::server::types::validate_device_id(&self.device_id).is_err() {
            errors.push(format!(
                "client.device_id '{}' must not contain '/' or be '.' or '..'",
                self.device_id
            ));
        }
        if self.api_token.is_empty() {
            errors.push("client.api_token is required (or set SENSORLINK_API_TOKEN)".to_string());
        }
        if self.encryption_key.is_empty() {
            errors.push(
                "client.encryption_key is required (or set SENSORLINK_ENCRYPTION_KEY)".to_string(),
            );
        } else if let Err(e) = EncryptionKey::from_base64(&self.encryption_key) {
            errors.push(format!("client.encryption_key: {e}"));
        }
        for (name, value) in [
            ("client.interval_secs", self.interval_secs),
            ("client.cycle_budget_secs", self.cycle_budget_secs),
            ("client.send_timeout_secs", self.send_timeout_secs),
        ] {
            if value == 0 {
                errors.push(format!("{name} cannot be 0"));
            }
        }
        if self.cycle_budget_secs > self.interval_secs {
            warnings.push(format!(
                "client.cycle_budget_secs ({}) exceeds interval_secs ({}); ticks will be skipped",
                self.cycle_budget_secs, self.interval_secs
            ));
        }

        finish(errors, warnings)
    }

    /// Decoded encryption key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the key is missing or malformed.
    pub fn key(&self) -> crate::error::Result<EncryptionKey> {
        EncryptionKey::from_base64(&self.encryption_key)
            .map_err(|e| Error::config(format!("client.encryption_key: {e}")))
    }

    /// Outbox location, defaulting under the sensorlink home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn outbox_path(&self) -> Result<PathBuf> {
        match &self.outbox_path {
            Some(path) => Ok(path.clone()),
            None => paths::get_outbox_path(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cycle_budget(&self) -> Duration {
        Duration::from_secs(self.cycle_budget_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

fn is_loopback(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host == "[::1]" || host == "::1"
}

fn finish(errors: Vec<String>, warnings: Vec<String>) -> crate::error::Result<ValidationResult> {
    if !errors.is_empty() {
        return Err(Error::config(format!(
            "validation failed:\n  - {}",
            errors.join("\n  - ")
        )));
    }
    Ok(ValidationResult { warnings })
}
