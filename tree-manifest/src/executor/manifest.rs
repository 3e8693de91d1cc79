//! Manifest writing and finalization.
//!
//! A manifest is written as four sibling artifacts in the manifest
//! directory:
//!
//! | Artifact               | Content                                  |
//! |------------------------|------------------------------------------|
//! | `<prefix>`             | plaintext, removed once finalized        |
//! | `<prefix>.checksum`    | hex SHA-256 of the plaintext             |
//! | `<prefix>.gz`          | gzip copy of the plaintext               |
//! | `<prefix>.gz.checksum` | hex SHA-256 of `<prefix>.gz`             |
//!
//! The open plaintext file lives in a [`ManifestHandle`] shared by the
//! writer task and the interrupt path. Whoever takes the lock first decides
//! the outcome: the writer finalizes the full set, or the interrupt renames
//! the plaintext to `<prefix>.partial`. Never both.

use crate::fs::Resource;
use crate::utils::checksum::sha256_file;
use crate::utils::errors::{ManifestError, Result};
use async_compression::tokio::write::GzipEncoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Paths of every artifact a run can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestArtifacts {
    pub plaintext: PathBuf,
    pub checksum: PathBuf,
    pub compressed: PathBuf,
    pub compressed_checksum: PathBuf,
    pub partial: PathBuf,
}

impl ManifestArtifacts {
    pub fn new(dir: &Path, prefix: &str) -> Self {
        Self {
            plaintext: dir.join(prefix),
            checksum: dir.join(format!("{}.checksum", prefix)),
            compressed: dir.join(format!("{}.gz", prefix)),
            compressed_checksum: dir.join(format!("{}.gz.checksum", prefix)),
            partial: dir.join(format!("{}.partial", prefix)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Plaintext open, resources still arriving
    Collecting,
    /// Writer owns the output; interrupts wait for it
    Finalizing,
    Complete,
    Failed,
    Interrupted,
}

struct HandleState {
    file: Option<File>,
    phase: Phase,
}

/// What the interrupt path did with the in-progress manifest.
#[derive(Debug)]
pub enum InterruptOutcome {
    /// Plaintext was renamed to the `.partial` path
    PartialSaved(PathBuf),
    /// The writer had already finished (or failed); nothing left to save
    AlreadyFinished,
    /// The rename itself failed
    RenameFailed(std::io::Error),
}

/// Summary of a finalized manifest.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    /// Lines written (one per resource)
    pub resources: usize,
    /// Hex SHA-256 of the plaintext manifest
    pub checksum: String,
    /// Hex SHA-256 of the gzip artifact
    pub compressed_checksum: String,
}

/// Shared handle to the in-progress manifest.
#[derive(Clone)]
pub struct ManifestHandle {
    artifacts: Arc<ManifestArtifacts>,
    state: Arc<Mutex<HandleState>>,
}

impl ManifestHandle {
    /// Create (truncate) the plaintext manifest and wrap it in a handle.
    pub async fn create(artifacts: ManifestArtifacts) -> Result<Self> {
        let file = File::create(&artifacts.plaintext)
            .await
            .map_err(|e| ManifestError::io(&artifacts.plaintext, e))?;

        Ok(Self {
            artifacts: Arc::new(artifacts),
            state: Arc::new(Mutex::new(HandleState {
                file: Some(file),
                phase: Phase::Collecting,
            })),
        })
    }

    pub fn artifacts(&self) -> &ManifestArtifacts {
        &self.artifacts
    }

    /// Write the sorted resources and run every finalization stage.
    ///
    /// `resources` must already be sorted by path. A cancelled run is never
    /// finalized: its plaintext is kept under the `.partial` name instead.
    pub async fn finish(
        &self,
        resources: &[Resource],
        cancel: &CancellationToken,
    ) -> Result<WriteSummary> {
        let mut state = self.state.lock().await;
        if state.phase != Phase::Collecting {
            return Err(ManifestError::Interrupted);
        }
        if cancel.is_cancelled() {
            if let InterruptOutcome::RenameFailed(e) = self.save_partial(&mut state).await {
                warn!("Failed to rename cancelled manifest: {}", e);
            }
            return Err(ManifestError::Interrupted);
        }
        state.phase = Phase::Finalizing;

        let file = state.file.take();
        let result = match file {
            Some(file) => self.write_and_finalize(file, resources).await,
            None => Err(ManifestError::Interrupted),
        };

        state.phase = if result.is_ok() {
            Phase::Complete
        } else {
            Phase::Failed
        };
        result
    }

    /// Abandon the run, keeping what was written under the `.partial` name.
    pub async fn interrupt(&self) -> InterruptOutcome {
        let mut state = self.state.lock().await;
        match state.phase {
            Phase::Collecting => self.save_partial(&mut state).await,
            Phase::Interrupted => {
                InterruptOutcome::PartialSaved(self.artifacts.partial.clone())
            }
            Phase::Finalizing | Phase::Complete | Phase::Failed => {
                InterruptOutcome::AlreadyFinished
            }
        }
    }

    async fn save_partial(&self, state: &mut HandleState) -> InterruptOutcome {
        state.phase = Phase::Interrupted;

        if let Some(mut file) = state.file.take() {
            if let Err(e) = file.flush().await {
                warn!("Failed to flush partial manifest: {}", e);
            }
        }

        match tokio::fs::rename(&self.artifacts.plaintext, &self.artifacts.partial).await {
            Ok(()) => InterruptOutcome::PartialSaved(self.artifacts.partial.clone()),
            Err(e) => InterruptOutcome::RenameFailed(e),
        }
    }

    async fn write_and_finalize(&self, file: File, resources: &[Resource]) -> Result<WriteSummary> {
        let artifacts = &self.artifacts;

        write_lines(file, &artifacts.plaintext, resources).await?;
        info!("Wrote {} resources to {}", resources.len(), artifacts.plaintext.display());

        let checksum = sha256_file(&artifacts.plaintext).await?;
        write_checksum(&artifacts.checksum, &checksum).await?;

        compress(&artifacts.plaintext, &artifacts.compressed).await?;
        let compressed_checksum = sha256_file(&artifacts.compressed).await?;
        write_checksum(&artifacts.compressed_checksum, &compressed_checksum).await?;

        tokio::fs::remove_file(&artifacts.plaintext)
            .await
            .map_err(|e| ManifestError::io(&artifacts.plaintext, e))?;

        debug!(
            "Finalized manifest (sha256 {}, gz sha256 {})",
            checksum, compressed_checksum
        );

        Ok(WriteSummary {
            resources: resources.len(),
            checksum,
            compressed_checksum,
        })
    }
}

/// Drain the aggregation channel, sort by path and finalize the manifest.
///
/// Returns once every sender is gone; the caller closes the channel only
/// after all builders have stopped. If `cancel` has fired by then, the
/// drained set is incomplete and is kept as `.partial` rather than finalized.
pub async fn write_manifest(
    handle: ManifestHandle,
    mut rx: mpsc::Receiver<Resource>,
    cancel: CancellationToken,
) -> Result<WriteSummary> {
    let mut resources = Vec::new();
    while let Some(resource) = rx.recv().await {
        resources.push(resource);
    }

    resources.sort_unstable_by(|a, b| a.path.cmp(&b.path));

    match handle.finish(&resources, &cancel).await {
        Ok(summary) => Ok(summary),
        Err(ManifestError::Interrupted) => Err(ManifestError::Interrupted),
        Err(e) => {
            error!("Manifest finalization failed: {}", e);
            Err(e)
        }
    }
}

async fn write_lines(file: File, path: &Path, resources: &[Resource]) -> Result<()> {
    let mut writer = BufWriter::new(file);
    for resource in resources {
        let line = format!("{}\n", resource);
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ManifestError::io(path, e))?;
    }
    writer.flush().await.map_err(|e| ManifestError::io(path, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| ManifestError::io(path, e))
}

async fn write_checksum(path: &Path, checksum: &str) -> Result<()> {
    tokio::fs::write(path, checksum)
        .await
        .map_err(|e| ManifestError::io(path, e))
}

async fn compress(source: &Path, target: &Path) -> Result<()> {
    let input = File::open(source)
        .await
        .map_err(|e| ManifestError::io(source, e))?;
    let output = File::create(target)
        .await
        .map_err(|e| ManifestError::io(target, e))?;

    let mut reader = BufReader::new(input);
    let mut encoder = GzipEncoder::new(BufWriter::new(output));
    tokio::io::copy(&mut reader, &mut encoder)
        .await
        .map_err(|e| ManifestError::io(target, e))?;
    // Writes the gzip trailer and flushes the inner writer
    encoder
        .shutdown()
        .await
        .map_err(|e| ManifestError::io(target, e))?;

    Ok(())
}
