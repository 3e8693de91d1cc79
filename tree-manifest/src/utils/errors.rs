//! Custom error types for manifest generation.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checksum mismatch for {artifact}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        artifact: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Run interrupted")]
    Interrupted,

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ManifestError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ManifestError>;
