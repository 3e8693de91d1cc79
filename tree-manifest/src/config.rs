//! Configuration for manifest runs.
//!
//! Loads configuration from a TOML file; command-line flags are applied on
//! top by the binary.

use crate::utils::errors::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Directory the manifest artifacts are written to
    #[serde(default = "default_manifest_dir")]
    pub dir: PathBuf,

    /// Output filename; artifacts are named after it
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Number of resource builder workers (0 = logical CPU count)
    #[serde(default)]
    pub workers: usize,

    /// Capacity of the aggregation channel (0 = logical CPU count)
    #[serde(default)]
    pub channel_capacity: usize,

    /// Extra path substrings to skip during the walk
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from("./manifests")
}

fn default_prefix() -> String {
    "manifest.txt".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Logical CPU count, falling back to 1 when it cannot be determined.
pub fn logical_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            dir: default_manifest_dir(),
            prefix: default_prefix(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ScanConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            logical_cpus()
        } else {
            self.workers
        }
    }

    pub fn effective_channel_capacity(&self) -> usize {
        if self.channel_capacity == 0 {
            logical_cpus()
        } else {
            self.channel_capacity
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::io(path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ManifestError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Reject settings a run cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.manifest.dir.as_os_str().is_empty() {
            return Err(ManifestError::Config("manifest dir must not be empty".into()));
        }
        if self.manifest.prefix.is_empty() {
            return Err(ManifestError::Config("output prefix must not be empty".into()));
        }
        if self.manifest.prefix.contains(std::path::is_separator) {
            return Err(ManifestError::Config(format!(
                "output prefix must be a file name, got {:?}",
                self.manifest.prefix
            )));
        }
        Ok(())
    }
}
