use super::copier::RetryingCopier;
use super::decision;
use super::error::{MirrorError, MirrorResult};
use super::locks::PathLocks;
use super::paths;
use super::scanner::TreeScanner;
use super::watcher::{ChangeWatcher, WatchStreams};
use super::{ChangeEvent, ChangeKind, CopyOutcome, CopyStatus, MirrorConfig, MirrorStats, StatsSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Totals for one initial scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub files_seen: u64,
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl ScanReport {
    fn record(&mut self, outcome: &CopyOutcome) {
        self.files_seen += 1;
        match outcome.status {
            CopyStatus::Copied => self.copied += 1,
            CopyStatus::Skipped => self.skipped += 1,
            CopyStatus::Failed => self.failed += 1,
        }
    }
}

/// Resolve, decide and copy for a single source file.
///
/// Both the scan and the watcher funnel through here, so every copy into a
/// given destination holds that destination's lock from decision to rename.
#[derive(Clone)]
pub struct MirrorPipeline {
    config: Arc<MirrorConfig>,
    copier: RetryingCopier,
    locks: PathLocks,
    stats: Arc<MirrorStats>,
}

impl MirrorPipeline {
    pub fn new(config: Arc<MirrorConfig>, copier: RetryingCopier) -> Self {
        Self {
            config,
            copier,
            locks: PathLocks::new(),
            stats: Arc::new(MirrorStats::default()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn mirror_file(&self, source: &Path) -> CopyOutcome {
        let config = &self.config;
        let outcome = match paths::mirrored_path(&config.source_root, &config.backup_root, source) {
            Ok(dest) => {
                let _guard = self.locks.lock(&dest).await;
                self.decide_and_copy(source).await
            }
            Err(e) => CopyOutcome::failed(0, e),
        };

        self.stats.record(&outcome);
        match outcome.status {
            CopyStatus::Copied => {
                info!(path = %source.display(), attempts = outcome.attempts, "copy succeeded")
            }
            CopyStatus::Skipped => debug!(path = %source.display(), "backup up to date, skipped"),
            CopyStatus::Failed => error!(
                path = %source.display(),
                attempts = outcome.attempts,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "copy failed"
            ),
        }
        outcome
    }

    async fn decide_and_copy(&self, source: &Path) -> CopyOutcome {
        let config = &self.config;
        let dest = match paths::resolve(&config.source_root, &config.backup_root, source).await {
            Ok(dest) => dest,
            Err(e) => return CopyOutcome::failed(0, e),
        };

        match decision::should_copy(source, &dest).await {
            Ok(true) => self.copier.copy(source, &dest).await,
            Ok(false) => CopyOutcome::skipped(),
            Err(e @ MirrorError::StaleFile { .. }) => {
                debug!(error = %e, "file moved on, skipping");
                CopyOutcome::skipped()
            }
            Err(e) => CopyOutcome::failed(0, e),
        }
    }
}

/// Initial full mirror followed by live change propagation.
#[derive(Clone)]
pub struct MirrorEngine {
    config: Arc<MirrorConfig>,
    pipeline: MirrorPipeline,
}

impl MirrorEngine {
    pub fn new(config: Arc<MirrorConfig>) -> Self {
        let copier = RetryingCopier::new(config.retry);
        Self::with_copier(config, copier)
    }

    pub fn with_copier(config: Arc<MirrorConfig>, copier: RetryingCopier) -> Self {
        let pipeline = MirrorPipeline::new(config.clone(), copier);
        Self { config, pipeline }
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &MirrorPipeline {
        &self.pipeline
    }

    /// Validate the roots and create the backup root.
    pub async fn prepare(&self) -> MirrorResult<()> {
        let source = &self.config.source_root;
        let backup = &self.config.backup_root;

        if !source.is_dir() {
            return Err(MirrorError::SourceNotFound {
                path: source.clone(),
            });
        }
        if backup.starts_with(source) {
            return Err(MirrorError::Config(format!(
                "backup path {} must not be inside source path {}",
                backup.display(),
                source.display()
            )));
        }

        tokio::fs::create_dir_all(backup)
            .await
            .map_err(|e| MirrorError::DirectoryCreate {
                path: backup.clone(),
                source: e,
            })?;

        info!(
            source = %source.display(),
            backup = %backup.display(),
            "mirror roots ready"
        );
        Ok(())
    }

    /// Copy every file under the source root that is missing or older in the backup.
    ///
    /// Cancellation stops the walk; copies already started run to completion.
    pub async fn initial_scan(&self, cancel: CancellationToken) -> MirrorResult<ScanReport> {
        let scanner = TreeScanner::new(self.config.source_root.clone());
        // Surface a missing root before handing off to the blocking walk
        let files = scanner.scan()?;

        let (tx, mut rx) = mpsc::channel::<PathBuf>(256);
        let walker = tokio::task::spawn_blocking(move || {
            for file in files {
                if tx.blocking_send(file).is_err() {
                    break;
                }
            }
        });

        let permits = Arc::new(Semaphore::new(self.config.scan_concurrency.max(1)));
        let mut copies = JoinSet::new();

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let file = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(file) => file,
                    None => break,
                },
            };

            let pipeline = self.pipeline.clone();
            copies.spawn(async move {
                let _permit = permit;
                pipeline.mirror_file(&file).await
            });
        }

        // Unblocks the walker if we stopped early
        drop(rx);

        let mut report = ScanReport::default();
        while let Some(joined) = copies.join_next().await {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(e) => warn!(error = %e, "scan copy task did not complete"),
            }
        }
        if let Err(e) = walker.await {
            warn!(error = %e, "directory walk aborted");
        }

        Ok(report)
    }

    /// Run until `cancel` fires, then stop watching and drain in-flight copies.
    pub async fn run(self, cancel: CancellationToken) -> MirrorResult<StatsSnapshot> {
        self.prepare().await?;

        // Watch first: a file the scan copies and a writer then touches must
        // still produce an event
        let mut watcher = ChangeWatcher::new(self.config.source_root.clone());
        let WatchStreams {
            mut events,
            mut errors,
        } = watcher.start()?;

        let tracker = TaskTracker::new();
        let scan_cancel = cancel.child_token();
        let mut scan = tokio::spawn({
            let engine = self.clone();
            let scan_cancel = scan_cancel.clone();
            async move { engine.initial_scan(scan_cancel).await }
        });

        let mut scan_done = false;
        let mut fatal = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                joined = &mut scan, if !scan_done => {
                    scan_done = true;
                    if let Err(e) = self.log_scan_result(joined) {
                        fatal = Some(e);
                        break;
                    }
                }
                Some(change) = events.recv() => self.dispatch(&tracker, change),
                Some(e) = errors.recv() => {
                    warn!(error = %e, "watcher error");
                }
            }
        }

        watcher.stop();
        if !scan_done {
            scan_cancel.cancel();
            if let Err(e) = self.log_scan_result(scan.await) {
                fatal.get_or_insert(e);
            }
        }

        tracker.close();
        tracker.wait().await;

        let totals = self.pipeline.stats();
        info!(
            copied = totals.copied,
            skipped = totals.skipped,
            failed = totals.failed,
            "service stopped"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(totals),
        }
    }

    fn dispatch(&self, tracker: &TaskTracker, change: ChangeEvent) {
        match change.kind {
            ChangeKind::Renamed => info!(
                old_path = ?change.old_path,
                path = %change.path.display(),
                "rename detected"
            ),
            kind => info!(kind = ?kind, path = %change.path.display(), "change detected"),
        }

        // Renames mirror the new path only; the old backup stays where it is
        let pipeline = self.pipeline.clone();
        tracker.spawn(async move {
            pipeline.mirror_file(&change.path).await;
        });
    }

    fn log_scan_result(
        &self,
        joined: Result<MirrorResult<ScanReport>, tokio::task::JoinError>,
    ) -> MirrorResult<()> {
        match joined {
            Ok(Ok(report)) => {
                info!(
                    files = report.files_seen,
                    copied = report.copied,
                    skipped = report.skipped,
                    failed = report.failed,
                    "initial scan finished"
                );
                Ok(())
            }
            Ok(Err(e)) if e.is_fatal() => {
                error!(error = %e, "initial scan aborted");
                Err(e)
            }
            Ok(Err(e)) => {
                error!(error = %e, "initial scan failed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "initial scan task did not complete");
                Ok(())
            }
        }
    }
}
