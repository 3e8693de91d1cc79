//! SHA-256 helpers shared by resource building and manifest finalization.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

use super::errors::{ManifestError, Result};

/// Read buffer size for hashing artifacts from disk (64KB)
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Lowercase hex SHA-256 of an in-memory buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of a file, streamed from disk.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ManifestError::io(path, e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await.map_err(|e| ManifestError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
