//! Manifest job executor - orchestrates one scan from walk to finalized artifacts.
//!
//! Pipeline:
//! - rotation of any previous manifest (in [`ManifestExecutor::prepare`])
//! - a writer task draining the aggregation channel
//! - a blocking walker feeding a bounded path queue
//! - a fixed pool of builder workers turning paths into resources
//!
//! Builders push onto the aggregation channel (capacity = logical CPU count
//! by default), which is the only backpressure point between the scan and
//! the writer. The executor keeps the last sender and drops it only after
//! every worker has been joined, so the channel has a single closing owner.

pub mod manifest;
pub mod rotation;
pub mod verify;

use crate::config::Config;
use crate::fs::walker::{walk_paths, WalkOptions};
use crate::fs::Resource;
use crate::utils::errors::{ManifestError, Result};
use chrono::{DateTime, Utc};
use manifest::{write_manifest, ManifestArtifacts, ManifestHandle, WriteSummary};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Paths queued per worker between the walker and the builders.
const PATH_QUEUE_PER_WORKER: usize = 4;

/// Manifest job configuration
#[derive(Debug, Clone)]
pub struct ManifestJob {
    pub root: PathBuf,
    pub manifest_dir: PathBuf,
    pub prefix: String,
    pub workers: usize,
    pub channel_capacity: usize,
    pub exclude: Vec<String>,
}

impl ManifestJob {
    pub fn from_config(root: PathBuf, config: &Config) -> Self {
        Self {
            root,
            manifest_dir: config.manifest.dir.clone(),
            prefix: config.manifest.prefix.clone(),
            workers: config.scan.effective_workers(),
            channel_capacity: config.scan.effective_channel_capacity(),
            exclude: config.scan.exclude.clone(),
        }
    }
}

/// A job whose output location is prepared and whose plaintext is open.
pub struct ManifestRun {
    job: ManifestJob,
    root: PathBuf,
    manifest_dir: PathBuf,
    handle: ManifestHandle,
}

impl ManifestRun {
    /// Handle to the in-progress manifest, for the interrupt path.
    pub fn handle(&self) -> ManifestHandle {
        self.handle.clone()
    }
}

/// Manifest execution result
#[derive(Debug)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub root: PathBuf,
    /// Paths the walker admitted
    pub admitted_entries: usize,
    /// Entries that failed to stat or read
    pub failed_entries: usize,
    /// Bytes of regular-file content hashed
    pub bytes_hashed: u64,
    /// Traversal error that cut the walk short, if any
    pub walk_error: Option<String>,
    pub manifest: WriteSummary,
    pub artifacts: ManifestArtifacts,
    pub duration: Duration,
}

#[derive(Default)]
struct BuildStats {
    built: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
}

/// Main manifest executor
pub struct ManifestExecutor {
    cancel_token: CancellationToken,
}

impl ManifestExecutor {
    /// Create a new executor (no cancellation support)
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    /// Create a new executor with cancellation support
    pub fn with_cancel(cancel_token: CancellationToken) -> Self {
        Self { cancel_token }
    }

    /// Resolve paths, rotate any previous manifest and open the new one.
    pub async fn prepare(&self, job: ManifestJob) -> Result<ManifestRun> {
        tokio::fs::create_dir_all(&job.manifest_dir)
            .await
            .map_err(|e| ManifestError::io(&job.manifest_dir, e))?;
        let manifest_dir = tokio::fs::canonicalize(&job.manifest_dir)
            .await
            .map_err(|e| ManifestError::io(&job.manifest_dir, e))?;
        let root = tokio::fs::canonicalize(&job.root)
            .await
            .map_err(|e| ManifestError::io(&job.root, e))?;

        rotation::rotate_existing(&manifest_dir, &job.prefix).await?;

        let artifacts = ManifestArtifacts::new(&manifest_dir, &job.prefix);
        let handle = ManifestHandle::create(artifacts).await?;

        Ok(ManifestRun {
            job,
            root,
            manifest_dir,
            handle,
        })
    }

    /// Execute a prepared run
    pub async fn execute(&self, run: ManifestRun) -> Result<ScanReport> {
        let started_at = Utc::now();
        let start_time = Instant::now();
        let ManifestRun {
            job,
            root,
            manifest_dir,
            handle,
            ..
        } = run;

        let workers = job.workers.max(1);
        let capacity = job.channel_capacity.max(1);

        info!(
            "Starting manifest scan of {} ({} workers, channel capacity {})",
            root.display(),
            workers,
            capacity
        );

        // Writer runs alongside the builders; the channel is bounded
        let (resource_tx, resource_rx) = mpsc::channel::<Resource>(capacity);
        let writer = tokio::spawn(write_manifest(
            handle.clone(),
            resource_rx,
            self.cancel_token.clone(),
        ));

        let (path_tx, path_rx) = mpsc::channel::<PathBuf>(workers * PATH_QUEUE_PER_WORKER);
        let path_rx = Arc::new(Mutex::new(path_rx));
        let stats = Arc::new(BuildStats::default());

        let mut builders = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            builders.push(tokio::spawn(build_worker(
                worker_id,
                Arc::clone(&path_rx),
                resource_tx.clone(),
                self.cancel_token.clone(),
                Arc::clone(&stats),
            )));
        }
        // Once the workers are gone the queue closes and the walker stops
        drop(path_rx);

        let mut options = WalkOptions::for_manifest_dir(&manifest_dir);
        options.exclude_patterns.extend(job.exclude.iter().cloned());

        let walk_root = root.clone();
        let walk_cancel = self.cancel_token.clone();
        let walk = tokio::task::spawn_blocking(move || {
            walk_paths(&walk_root, &options, |path| {
                !walk_cancel.is_cancelled() && path_tx.blocking_send(path).is_ok()
            })
        });

        let (admitted_entries, walk_error) = match walk.await? {
            Ok(count) => (count, None),
            Err(e) => {
                error!("Error walking {}: {}", root.display(), e);
                (0, Some(e.to_string()))
            }
        };

        for builder in builders {
            if let Err(e) = builder.await {
                warn!("Builder task failed: {}", e);
            }
        }
        drop(resource_tx);

        let manifest = writer.await??;

        if self.cancel_token.is_cancelled() {
            return Err(ManifestError::Interrupted);
        }

        let built = stats.built.load(Ordering::Relaxed);
        let failed_entries = stats.failed.load(Ordering::Relaxed);
        // A walk error loses the admitted count; reconstruct it from the builders
        let admitted_entries = if walk_error.is_some() {
            built + failed_entries
        } else {
            admitted_entries
        };

        Ok(ScanReport {
            started_at,
            root,
            admitted_entries,
            failed_entries,
            bytes_hashed: stats.bytes.load(Ordering::Relaxed),
            walk_error,
            manifest,
            artifacts: handle.artifacts().clone(),
            duration: start_time.elapsed(),
        })
    }
}

impl Default for ManifestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull paths off the shared queue until it closes or the run is cancelled.
async fn build_worker(
    worker_id: usize,
    paths: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    resource_tx: mpsc::Sender<Resource>,
    cancel: CancellationToken,
    stats: Arc<BuildStats>,
) {
    loop {
        let next = {
            let mut rx = paths.lock().await;
            tokio::select! {
                path = rx.recv() => path,
                _ = cancel.cancelled() => None,
            }
        };
        let Some(path) = next else { break };

        let resource = match Resource::from_path(&path).await {
            Ok(resource) => resource,
            Err(e) => {
                warn!("Skipping entry: {}", e);
                stats.failed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        let hashed = if resource.is_dir || resource.is_symlink {
            0
        } else {
            resource.size
        };

        // Check cancellation before every send
        if cancel.is_cancelled() {
            break;
        }
        let sent = tokio::select! {
            result = resource_tx.send(resource) => result.is_ok(),
            _ = cancel.cancelled() => false,
        };
        if !sent {
            break;
        }

        stats.built.fetch_add(1, Ordering::Relaxed);
        stats.bytes.fetch_add(hashed, Ordering::Relaxed);
    }

    debug!("Builder {} stopped", worker_id);
}
