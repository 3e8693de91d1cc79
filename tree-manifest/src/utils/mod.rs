//! Utility modules for manifest generation.

pub mod checksum;
pub mod errors;
pub mod logger;

pub use errors::{ManifestError, Result};
