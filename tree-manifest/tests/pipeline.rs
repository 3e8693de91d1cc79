//! End-to-end manifest runs against temporary trees.

use async_compression::tokio::bufread::GzipDecoder;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tree_manifest::daemon::shutdown::InterruptHandler;
use tree_manifest::executor::manifest::InterruptOutcome;
use tree_manifest::executor::verify::verify_artifacts;
use tree_manifest::{ManifestError, ManifestExecutor, ManifestJob, ScanReport};

const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn job(root: &Path, manifest_dir: &Path) -> ManifestJob {
    ManifestJob {
        root: root.to_path_buf(),
        manifest_dir: manifest_dir.to_path_buf(),
        prefix: "manifest.txt".to_string(),
        workers: 4,
        channel_capacity: 2,
        exclude: Vec::new(),
    }
}

async fn run(job: ManifestJob) -> ScanReport {
    let executor = ManifestExecutor::new();
    let prepared = executor.prepare(job).await.unwrap();
    executor.execute(prepared).await.unwrap()
}

async fn manifest_text(report: &ScanReport) -> String {
    let file = tokio::fs::File::open(&report.artifacts.compressed).await.unwrap();
    let mut decoder = GzipDecoder::new(BufReader::new(file));
    let mut text = String::new();
    decoder.read_to_string(&mut text).await.unwrap();
    text
}

fn fields(line: &str) -> Vec<&str> {
    line.splitn(6, '|').collect()
}

#[tokio::test]
#[cfg(unix)]
async fn test_file_and_empty_directory() -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let source = TempDir::new()?;
    let out = TempDir::new()?;
    let a = source.path().join("a.txt");
    fs::write(&a, b"0123456789")?;
    fs::set_permissions(&a, fs::Permissions::from_mode(0o644))?;
    fs::create_dir(source.path().join("b"))?;

    let report = run(job(source.path(), out.path())).await;
    let text = manifest_text(&report).await;
    let lines: Vec<&str> = text.lines().collect();

    // root, a.txt, b
    assert_eq!(lines.len(), 3);
    let root = fs::canonicalize(source.path())?;

    let root_line = fields(lines[0]);
    assert_eq!(root_line[5], root.to_string_lossy());
    assert_eq!(root_line[3], "true");

    let a_line = fields(lines[1]);
    assert_eq!(a_line[0], sha256_hex(b"0123456789"));
    assert_eq!(a_line[0].len(), 64);
    assert_eq!(a_line[1], "644");
    assert_eq!(a_line[2], "10");
    assert_eq!(a_line[3], "false");
    assert_eq!(a_line[4], "false");
    assert_eq!(a_line[5], root.join("a.txt").to_string_lossy());

    let b_line = fields(lines[2]);
    assert_eq!(b_line[0], EMPTY_SHA256);
    assert_eq!(b_line[2], "0");
    assert_eq!(b_line[3], "true");
    assert_eq!(b_line[5], root.join("b").to_string_lossy());
    Ok(())
}

#[tokio::test]
async fn test_lines_sorted_and_checksums_hold() -> std::io::Result<()> {
    let source = TempDir::new()?;
    let out = TempDir::new()?;
    for dir in ["zeta", "alpha", "mid/deep/er"] {
        fs::create_dir_all(source.path().join(dir))?;
    }
    for i in 0..50 {
        let dir = ["zeta", "alpha", "mid/deep/er"][i % 3];
        fs::write(
            source.path().join(dir).join(format!("{}.dat", 50 - i)),
            vec![i as u8; i * 31],
        )?;
    }

    let report = run(job(source.path(), out.path())).await;
    let text = manifest_text(&report).await;

    let paths: Vec<&str> = text.lines().map(|l| fields(l)[5]).collect();
    assert_eq!(paths.len(), report.manifest.resources);
    assert_eq!(paths.len(), report.admitted_entries - report.failed_entries);
    assert!(paths.windows(2).all(|w| w[0] <= w[1]));

    // Raw and compressed checksums
    let checksum = fs::read_to_string(&report.artifacts.checksum)?;
    assert_eq!(checksum, sha256_hex(text.as_bytes()));
    let gz = fs::read(&report.artifacts.compressed)?;
    assert_eq!(
        fs::read_to_string(&report.artifacts.compressed_checksum)?,
        sha256_hex(&gz)
    );

    assert!(!report.artifacts.plaintext.exists());
    assert_eq!(verify_artifacts(&report.artifacts).await.unwrap().lines, paths.len());
    Ok(())
}

#[tokio::test]
async fn test_manifest_dir_inside_root_is_skipped() -> std::io::Result<()> {
    let source = TempDir::new()?;
    fs::write(source.path().join("data.txt"), b"data")?;
    let manifest_dir = source.path().join("manifests");
    fs::create_dir(&manifest_dir)?;
    fs::write(manifest_dir.join("042.manifest.txt"), b"old")?;

    let report = run(job(source.path(), &manifest_dir)).await;
    let text = manifest_text(&report).await;

    let canonical_dir = fs::canonicalize(&manifest_dir)?;
    assert!(text
        .lines()
        .all(|l| !Path::new(fields(l)[5]).starts_with(&canonical_dir)));
    // root + data.txt
    assert_eq!(text.lines().count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_second_run_rotates_first() -> std::io::Result<()> {
    let source = TempDir::new()?;
    let out = TempDir::new()?;
    fs::write(source.path().join("data.txt"), b"data")?;
    // Left behind by an earlier run that was never finalized
    fs::write(out.path().join("manifest.txt"), b"stale")?;

    run(job(source.path(), out.path())).await;
    assert_eq!(fs::read(out.path().join("001.manifest.txt"))?, b"stale");

    fs::write(out.path().join("manifest.txt"), b"stale again")?;
    run(job(source.path(), out.path())).await;
    assert_eq!(fs::read(out.path().join("002.manifest.txt"))?, b"stale again");
    Ok(())
}

#[tokio::test]
async fn test_interrupted_run_leaves_only_partial() -> std::io::Result<()> {
    let source = TempDir::new()?;
    let out = TempDir::new()?;
    for i in 0..100 {
        fs::write(source.path().join(format!("{}.txt", i)), b"payload")?;
    }

    let cancel = CancellationToken::new();
    let executor = ManifestExecutor::with_cancel(cancel.clone());
    let prepared = executor.prepare(job(source.path(), out.path())).await.unwrap();
    let handle = prepared.handle();

    let mut interrupts = InterruptHandler::new(cancel);
    interrupts.terminate(&handle).await;

    let result = executor.execute(prepared).await;
    assert!(matches!(result, Err(ManifestError::Interrupted)));

    assert!(out.path().join("manifest.txt.partial").exists());
    assert!(!out.path().join("manifest.txt").exists());
    assert!(!out.path().join("manifest.txt.gz").exists());
    assert!(!out.path().join("manifest.txt.checksum").exists());
    assert!(!out.path().join("manifest.txt.gz.checksum").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_terminate_during_run_never_finalizes_partial_set() -> std::io::Result<()> {
    let source = TempDir::new()?;
    for i in 0..200 {
        fs::write(source.path().join(format!("{}.txt", i)), vec![b'x'; 4096])?;
    }

    for _ in 0..10 {
        let out = TempDir::new()?;
        let cancel = CancellationToken::new();
        let executor = ManifestExecutor::with_cancel(cancel.clone());
        let prepared = executor.prepare(job(source.path(), out.path())).await.unwrap();
        let handle = prepared.handle();

        let running = tokio::spawn(async move { executor.execute(prepared).await });
        tokio::task::yield_now().await;

        let mut interrupts = InterruptHandler::new(cancel);
        let outcome = interrupts.terminate(&handle).await;
        let result = running.await.unwrap();

        let gz = out.path().join("manifest.txt.gz");
        let partial = out.path().join("manifest.txt.partial");
        match outcome {
            Some(InterruptOutcome::PartialSaved(_)) => {
                assert!(matches!(result, Err(ManifestError::Interrupted)));
                assert!(partial.exists());
                assert!(!gz.exists());
                assert!(!out.path().join("manifest.txt.checksum").exists());
            }
            // The run won the race and its manifest is complete
            Some(InterruptOutcome::AlreadyFinished) => {
                assert!(gz.exists());
                assert!(!partial.exists());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    Ok(())
}

#[tokio::test]
#[cfg(unix)]
async fn test_unreadable_file_is_left_out() -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let source = TempDir::new()?;
    let out = TempDir::new()?;
    fs::write(source.path().join("ok.txt"), b"ok")?;
    let locked = source.path().join("locked.txt");
    fs::write(&locked, b"secret")?;
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;

    // Root can read anything; nothing to assert there
    if fs::read(&locked).is_ok() {
        return Ok(());
    }

    let report = run(job(source.path(), out.path())).await;
    let text = manifest_text(&report).await;

    assert_eq!(report.failed_entries, 1);
    assert!(!text.contains("locked.txt"));
    assert!(text.contains("ok.txt"));
    Ok(())
}
