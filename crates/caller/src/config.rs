//! Client configuration via `dataservices.toml`
//!
//! Everything a client needs besides the endpoint declarations: where the
//! server is, how long one call may take, and how bulk callers size their
//! queue and name their worker threads.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use dataservices_core::{Error, Result};

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "dataservices.toml";

/// Bulk caller settings, under `[bulk]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkConfig {
    /// Maximum number of accepted inputs waiting for a worker (default: 1000)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Worker threads are named `{thread_name_prefix}-{n}`
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_thread_name_prefix() -> String {
    "dataservices-bulk".to_string()
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

/// Client configuration loaded from `dataservices.toml`.
///
/// # Example
///
/// ```toml
/// base_url = "http://localhost:8012"
/// timeout_ms = 30000
///
/// [bulk]
/// queue_capacity = 1000
/// thread_name_prefix = "dataservices-bulk"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-call timeout in milliseconds (default: 30000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Bulk caller settings
    #[serde(default)]
    pub bulk: BulkConfig,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            bulk: BulkConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check values that would otherwise fail later, on first use.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::configuration("base_url must not be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(Error::configuration("timeout_ms must be positive"));
        }
        if self.bulk.queue_capacity == 0 {
            return Err(Error::configuration("bulk.queue_capacity must be positive"));
        }
        if self.bulk.thread_name_prefix.is_empty() {
            return Err(Error::configuration(
                "bulk.thread_name_prefix must not be empty",
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Data services client configuration
#
# Server base URL; endpoint paths are appended to it.
base_url = "http://localhost:8000"

# Per-call timeout in milliseconds (default: 30000)
timeout_ms = 30000

[bulk]
# Accepted inputs waiting for a worker before accept() blocks (default: 1000)
queue_capacity = 1000

# Worker threads are named "<prefix>-<n>"
thread_name_prefix = "dataservices-bulk"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read, parsed or
    /// validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: ClientConfig = toml::from_str(&content).map_err(|e| {
            Error::configuration(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::configuration(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::configuration(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::configuration(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
