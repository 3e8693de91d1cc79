//! tree-manifest - Main entry point
//!
//! Writes a sorted, checksummed and gzip-archived manifest of a directory tree.

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tree_manifest::daemon::shutdown::InterruptHandler;
use tree_manifest::executor::manifest::ManifestArtifacts;
use tree_manifest::executor::verify::verify_artifacts;
use tree_manifest::{utils, Config, ManifestError, ManifestExecutor, ManifestJob, ScanReport};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory tree to scan
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,

    /// Directory to store manifests (default: ./manifests)
    #[arg(long, value_name = "DIR")]
    manifest_dir: Option<PathBuf>,

    /// Prefix for output filenames (default: manifest.txt)
    #[arg(long, value_name = "NAME")]
    outpre: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of resource builder workers (default: logical CPU count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Verify the artifacts of the last finished run instead of scanning
    #[arg(long)]
    verify: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => match Config::from_file(config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("FATAL ERROR: {}", e);
                return Ok(ExitCode::FAILURE);
            }
        },
        None => Config::default(),
    };

    if let Some(dir) = &args.manifest_dir {
        if dir.as_os_str().is_empty() {
            return print_usage();
        }
        config.manifest.dir = dir.clone();
    }
    // An empty prefix falls back to the default name
    if let Some(prefix) = args.outpre.as_ref().filter(|p| !p.is_empty()) {
        config.manifest.prefix = prefix.clone();
    }
    if let Some(workers) = args.workers {
        config.scan.workers = workers;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    if let Err(e) = config.validate() {
        eprintln!("FATAL ERROR: {}", e);
        return Ok(ExitCode::FAILURE);
    }

    if args.verify {
        return verify(&config).await;
    }

    let root = match args.root.filter(|r| !r.as_os_str().is_empty()) {
        Some(root) => root,
        None => return print_usage(),
    };

    tracing::info!("Starting tree-manifest v{}", env!("CARGO_PKG_VERSION"));

    let cancel_token = CancellationToken::new();
    let mut interrupts = InterruptHandler::new(cancel_token.clone());
    let executor = ManifestExecutor::with_cancel(cancel_token);

    let run = match executor.prepare(ManifestJob::from_config(root, &config)).await {
        Ok(run) => run,
        Err(e) => {
            eprintln!("FATAL ERROR: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    let handle = run.handle();

    tokio::select! {
        result = executor.execute(run) => match result {
            Ok(report) => {
                log_report(&report);
                Ok(ExitCode::SUCCESS)
            }
            Err(ManifestError::Interrupted) => Ok(ExitCode::FAILURE),
            Err(e) => {
                tracing::error!("Manifest run failed: {}", e);
                Ok(ExitCode::FAILURE)
            }
        },
        _ = InterruptHandler::wait_for_signal() => {
            interrupts.terminate(&handle).await;
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_usage() -> Result<ExitCode> {
    Args::command().print_help()?;
    println!();
    Ok(ExitCode::SUCCESS)
}

async fn verify(config: &Config) -> Result<ExitCode> {
    let artifacts = ManifestArtifacts::new(&config.manifest.dir, &config.manifest.prefix);

    match verify_artifacts(&artifacts).await {
        Ok(report) => {
            println!("{}: OK ({} lines)", artifacts.compressed.display(), report.lines);
            println!("  sha256     {}", report.checksum);
            println!("  gz sha256  {}", report.compressed_checksum);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}: FAILED: {}", artifacts.compressed.display(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn log_report(report: &ScanReport) {
    if let Some(walk_error) = &report.walk_error {
        tracing::error!("Walk of {} stopped early: {}", report.root.display(), walk_error);
    }

    tracing::info!(
        "Manifest complete: {} resources ({} admitted, {} failed), {} bytes hashed, \
         started {}, took {:.2}s",
        report.manifest.resources,
        report.admitted_entries,
        report.failed_entries,
        report.bytes_hashed,
        report.started_at.to_rfc3339(),
        report.duration.as_secs_f64()
    );
    tracing::info!(
        "Artifacts: {} (sha256 {}), {}",
        report.artifacts.compressed.display(),
        report.manifest.compressed_checksum,
        report.artifacts.checksum.display()
    );
}
