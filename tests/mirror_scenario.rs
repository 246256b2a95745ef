use filetime::{set_file_mtime, FileTime};
use mirror_backup::mirror::{CopyStatus, MirrorConfig, MirrorEngine, RetryPolicy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn canonical_tempdir() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().canonicalize().unwrap();
    (dir, path)
}

fn engine_for(source: &Path, backup: &Path) -> MirrorEngine {
    let config = MirrorConfig::new(source, backup)
        .with_retry(RetryPolicy::new(3, Duration::from_millis(10)));
    MirrorEngine::new(Arc::new(config))
}

async fn wait_for_content(path: &Path, expected: &str) -> bool {
    for _ in 0..250 {
        if std::fs::read_to_string(path).ok().as_deref() == Some(expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_scan_then_live_update() {
    let (_src_guard, src) = canonical_tempdir();
    let (_bak_guard, backup) = canonical_tempdir();

    let source_file = src.join("a/b.txt");
    std::fs::create_dir_all(source_file.parent().unwrap()).unwrap();
    std::fs::write(&source_file, "x").unwrap();
    set_file_mtime(&source_file, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let engine = engine_for(&src, &backup);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(engine.clone().run(cancel.clone()));

    let mirrored = backup.join("a/b.txt");
    assert!(wait_for_content(&mirrored, "x").await);

    // Give the watcher time to be installed before writing
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(&source_file, "y").unwrap();
    assert!(wait_for_content(&mirrored, "y").await);

    // No further source change: the pipeline skips
    let outcome = engine.pipeline().mirror_file(&source_file).await;
    assert_eq!(outcome.status, CopyStatus::Skipped);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_write_right_after_scan_copy_is_mirrored() {
    let (_src_guard, src) = canonical_tempdir();
    let (_bak_guard, backup) = canonical_tempdir();

    let source_file = src.join("a/b.txt");
    std::fs::create_dir_all(source_file.parent().unwrap()).unwrap();
    std::fs::write(&source_file, "x").unwrap();
    set_file_mtime(&source_file, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let engine = engine_for(&src, &backup);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(engine.run(cancel.clone()));

    // The watch is in place before the scan copies anything, so no settle delay
    let mirrored = backup.join("a/b.txt");
    assert!(wait_for_content(&mirrored, "x").await);
    std::fs::write(&source_file, "y").unwrap();
    assert!(wait_for_content(&mirrored, "y").await);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_rename_keeps_old_backup() {
    let (_src_guard, src) = canonical_tempdir();
    let (_bak_guard, backup) = canonical_tempdir();

    let old = src.join("old.txt");
    std::fs::write(&old, "renamed content").unwrap();

    let engine = engine_for(&src, &backup);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(engine.run(cancel.clone()));

    assert!(wait_for_content(&backup.join("old.txt"), "renamed content").await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let new = src.join("new.txt");
    std::fs::rename(&old, &new).unwrap();

    assert!(wait_for_content(&backup.join("new.txt"), "renamed content").await);
    assert_eq!(
        std::fs::read_to_string(backup.join("old.txt")).unwrap(),
        "renamed content"
    );

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_deleted_source_leaves_backup() {
    let (_src_guard, src) = canonical_tempdir();
    let (_bak_guard, backup) = canonical_tempdir();

    let doomed = src.join("doomed.txt");
    std::fs::write(&doomed, "still here").unwrap();

    let engine = engine_for(&src, &backup);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(engine.run(cancel.clone()));

    let mirrored = backup.join("doomed.txt");
    assert!(wait_for_content(&mirrored, "still here").await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    std::fs::remove_file(&doomed).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(std::fs::read_to_string(&mirrored).unwrap(), "still here");
}

#[tokio::test]
async fn test_missing_source_aborts_startup() {
    let (_guard, root) = canonical_tempdir();
    let engine = engine_for(&root.join("absent"), &root.join("backup"));

    let err = engine.run(CancellationToken::new()).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(!root.join("backup").exists());
}
