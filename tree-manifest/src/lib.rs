//! tree-manifest library
//!
//! Scans a directory tree into a sorted, checksummed, gzip-archived manifest.

pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{ManifestExecutor, ManifestJob, ScanReport};
pub use utils::errors::ManifestError;
pub type Result<T> = std::result::Result<T, ManifestError>;
