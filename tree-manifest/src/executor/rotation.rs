//! Rotation of a previous run's manifest out of the output path.
//!
//! Backups are named `NNN.<prefix>` where `NNN` is one more than the highest
//! numeric prefix already present in the manifest directory. Sequence
//! numbers are rediscovered from filenames on every run, nothing is stored.

use crate::utils::errors::{ManifestError, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Numeric prefix of `file_name` if it names a backup of `prefix`.
///
/// Accepted shapes are `<digits>[-tag].<prefix>` and
/// `<digits>[-tag].<prefix>.<suffix>`. The prefix is compared literally.
pub fn backup_index(file_name: &str, prefix: &str) -> Option<u64> {
    let (head, rest) = file_name.split_once('.')?;
    if !(rest == prefix || rest.strip_prefix(prefix)?.starts_with('.')) {
        return None;
    }

    let digits = head.split('-').next()?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse().ok()
}

/// Name the next backup of `prefix` inside `dir`.
///
/// If `dir` cannot be listed, falls back to `prefix` itself so the run can
/// still proceed.
pub async fn next_backup_name(dir: &Path, prefix: &str) -> String {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to list {} for rotation: {}", dir.display(), e);
            return prefix.to_string();
        }
    };

    let mut max_index = 0;
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                if let Some(index) = backup_index(&entry.file_name().to_string_lossy(), prefix) {
                    max_index = max_index.max(index);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Stopped listing {} for rotation: {}", dir.display(), e);
                break;
            }
        }
    }

    format!("{:03}.{}", max_index + 1, prefix)
}

/// Move an existing manifest at `<dir>/<prefix>` out of the way.
///
/// Returns the backup path, or `None` when there was nothing to rotate.
pub async fn rotate_existing(dir: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    let current = dir.join(prefix);
    let exists = tokio::fs::try_exists(&current)
        .await
        .map_err(|e| ManifestError::io(&current, e))?;
    if !exists {
        return Ok(None);
    }

    let backup = dir.join(next_backup_name(dir, prefix).await);
    tokio::fs::rename(&current, &backup)
        .await
        .map_err(|e| ManifestError::io(&current, e))?;
    info!("Rotated previous manifest to {}", backup.display());

    Ok(Some(backup))
}
