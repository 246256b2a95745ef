pub mod copier;
pub mod decision;
pub mod engine;
pub mod error;
pub mod locks;
pub mod paths;
pub mod scanner;
pub mod watcher;

pub use copier::{FileCopier, RetryingCopier, TempRenameCopier};
pub use engine::{MirrorEngine, MirrorPipeline, ScanReport};
pub use error::{MirrorError, MirrorResult};
pub use scanner::TreeScanner;
pub use watcher::{ChangeWatcher, WatchStreams};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Immutable settings shared by every mirroring component.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub source_root: PathBuf,
    pub backup_root: PathBuf,
    pub retry: RetryPolicy,
    /// Number of initial-scan copies allowed to run at once
    pub scan_concurrency: usize,
}

impl MirrorConfig {
    pub fn new(source_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            backup_root: backup_root.into(),
            retry: RetryPolicy::default(),
            scan_concurrency: num_cpus::get() * 2,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_scan_concurrency(mut self, scan_concurrency: usize) -> Self {
        self.scan_concurrency = scan_concurrency.max(1);
        self
    }
}

/// Fixed-delay retry budget for a single file copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Renamed,
}

/// A qualifying filesystem change below the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    /// Previous location, only set for renames that reported both ends
    pub old_path: Option<PathBuf>,
}

impl ChangeEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Created,
            path: path.into(),
            old_path: None,
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Modified,
            path: path.into(),
            old_path: None,
        }
    }

    pub fn renamed(old_path: Option<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Renamed,
            path: path.into(),
            old_path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Copied,
    Skipped,
    Failed,
}

/// Result of pushing one file through the decide-then-copy pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub status: CopyStatus,
    pub attempts: u32,
    pub error: Option<String>,
}

impl CopyOutcome {
    pub fn copied(attempts: u32) -> Self {
        Self {
            status: CopyStatus::Copied,
            attempts,
            error: None,
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: CopyStatus::Skipped,
            attempts: 0,
            error: None,
        }
    }

    pub fn failed(attempts: u32, error: impl ToString) -> Self {
        Self {
            status: CopyStatus::Failed,
            attempts,
            error: Some(error.to_string()),
        }
    }

    pub fn is_copied(&self) -> bool {
        self.status == CopyStatus::Copied
    }
}

/// Running totals across every pipeline the engine has executed.
#[derive(Debug, Default)]
pub struct MirrorStats {
    copied: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl MirrorStats {
    pub fn record(&self, outcome: &CopyOutcome) {
        let counter = match outcome.status {
            CopyStatus::Copied => &self.copied,
            CopyStatus::Skipped => &self.skipped,
            CopyStatus::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            copied: self.copied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_needs_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_stats_record_by_status() {
        let stats = MirrorStats::default();
        stats.record(&CopyOutcome::copied(1));
        stats.record(&CopyOutcome::copied(2));
        stats.record(&CopyOutcome::skipped());
        stats.record(&CopyOutcome::failed(3, "disk full"));

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                copied: 2,
                skipped: 1,
                failed: 1
            }
        );
    }
}
