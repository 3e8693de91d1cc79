//! Integrity verification of finalized manifest artifacts.
//!
//! Checks both stages: the gzip artifact against `<prefix>.gz.checksum`, then
//! the decompressed plaintext against `<prefix>.checksum`.

use super::manifest::ManifestArtifacts;
use crate::utils::checksum::{sha256_file, sha256_hex};
use crate::utils::errors::{ManifestError, Result};
use async_compression::tokio::bufread::GzipDecoder;
use std::path::Path;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::info;

/// Result of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// Number of manifest lines
    pub lines: usize,
    /// Hex SHA-256 of the decompressed manifest
    pub checksum: String,
    /// Hex SHA-256 of the gzip artifact
    pub compressed_checksum: String,
}

pub async fn verify_artifacts(artifacts: &ManifestArtifacts) -> Result<VerifyReport> {
    let expected_gz = read_checksum(&artifacts.compressed_checksum).await?;
    let compressed_checksum = sha256_file(&artifacts.compressed).await?;
    ensure_match(&artifacts.compressed, expected_gz, &compressed_checksum)?;

    let file = tokio::fs::File::open(&artifacts.compressed)
        .await
        .map_err(|e| ManifestError::io(&artifacts.compressed, e))?;
    let mut decoder = GzipDecoder::new(BufReader::new(file));
    let mut plaintext = Vec::new();
    decoder
        .read_to_end(&mut plaintext)
        .await
        .map_err(|e| ManifestError::io(&artifacts.compressed, e))?;

    let expected = read_checksum(&artifacts.checksum).await?;
    let checksum = sha256_hex(&plaintext);
    ensure_match(&artifacts.plaintext, expected, &checksum)?;

    let lines = plaintext.iter().filter(|&&b| b == b'\n').count();
    info!(
        "Verified {} ({} lines)",
        artifacts.compressed.display(),
        lines
    );

    Ok(VerifyReport {
        lines,
        checksum,
        compressed_checksum,
    })
}

async fn read_checksum(path: &Path) -> Result<String> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ManifestError::io(path, e))?;
    Ok(content.trim().to_string())
}

fn ensure_match(artifact: &Path, expected: String, actual: &str) -> Result<()> {
    if expected.eq_ignore_ascii_case(actual) {
        Ok(())
    } else {
        Err(ManifestError::ChecksumMismatch {
            artifact: artifact.to_path_buf(),
            expected,
            actual: actual.to_string(),
        })
    }
}
