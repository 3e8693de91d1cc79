//! Resource records: one scanned filesystem entry and its metadata.
//!
//! A resource is built from a single `symlink_metadata` call plus, for
//! regular files, one full read of the content. Symlinks are never followed,
//! so a link to a directory is reported as a symlink and not a directory.

use crate::utils::checksum::sha256_hex;
use crate::utils::errors::{ManifestError, Result};
use std::fmt;
use std::fs::Metadata;
use std::path::Path;

/// One filesystem entry observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Path as walked (absolute when the scan root is canonical)
    pub path: String,

    /// Byte length; 0 for directories
    pub size: u64,

    /// Is this a directory?
    pub is_dir: bool,

    /// Is this a symlink?
    pub is_symlink: bool,

    /// Permission bits as unpadded octal, e.g. `644`
    pub permissions: String,

    /// Lowercase hex SHA-256 of the content (empty input for non-regular entries)
    pub checksum: String,
}

impl Resource {
    /// Stat `path` and build its record.
    ///
    /// Regular files are read fully into memory before hashing, so peak
    /// memory grows with the largest files being built concurrently.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| ManifestError::io(path, e))?;

        let file_type = metadata.file_type();
        let content = if file_type.is_file() {
            tokio::fs::read(path)
                .await
                .map_err(|e| ManifestError::io(path, e))?
        } else {
            Vec::new()
        };

        Ok(Self::from_parts(path, &metadata, &content))
    }

    fn from_parts(path: &Path, metadata: &Metadata, content: &[u8]) -> Self {
        let file_type = metadata.file_type();
        let is_dir = file_type.is_dir();

        Self {
            path: path.to_string_lossy().into_owned(),
            size: if is_dir { 0 } else { metadata.len() },
            is_dir,
            is_symlink: file_type.is_symlink(),
            permissions: permission_bits(metadata),
            checksum: sha256_hex(content),
        }
    }
}

/// Renders as one manifest line (without the trailing newline):
/// `checksum|permissions|size|is_dir|is_symlink|path`
impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}",
            self.checksum, self.permissions, self.size, self.is_dir, self.is_symlink, self.path
        )
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:o}", metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> String {
    if metadata.permissions().readonly() {
        "444".to_string()
    } else {
        "666".to_string()
    }
}
