use super::{CopyOutcome, RetryPolicy};
use async_trait::async_trait;
use filetime::FileTime;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Whole-file copy primitive used by [`RetryingCopier`].
///
/// Implementations must replace the destination atomically: a reader sees
/// either the previous file or the complete new one.
#[async_trait]
pub trait FileCopier: Send + Sync {
    async fn copy_file(&self, source: &Path, dest: &Path) -> io::Result<()>;
}

/// Copies into a hidden sibling of the destination, stamps it with the
/// source's modification time and renames it into place.
#[derive(Debug, Default, Clone, Copy)]
pub struct TempRenameCopier;

#[async_trait]
impl FileCopier for TempRenameCopier {
    async fn copy_file(&self, source: &Path, dest: &Path) -> io::Result<()> {
        let source = source.to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || copy_then_rename(&source, &dest))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

fn copy_then_rename(source: &Path, dest: &Path) -> io::Result<()> {
    // Read before copying so a write racing the copy leaves the backup older
    let before = std::fs::metadata(source)?;
    let mtime = FileTime::from_last_modification_time(&before);
    let tmp = temp_path_for(dest);

    let result = std::fs::copy(source, &tmp)
        .and_then(|copied| ensure_unchanged(source, &before, mtime, copied))
        .and_then(|_| filetime::set_file_mtime(&tmp, mtime))
        .and_then(|_| std::fs::rename(&tmp, dest));

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// A writer touched the source mid-copy; the temporary file may be torn.
fn ensure_unchanged(
    source: &Path,
    before: &std::fs::Metadata,
    mtime: FileTime,
    copied: u64,
) -> io::Result<()> {
    let after = std::fs::metadata(source)?;
    let stable = copied == before.len()
        && after.len() == before.len()
        && FileTime::from_last_modification_time(&after) == mtime;

    if stable {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Interrupted,
            "source changed during copy",
        ))
    }
}

fn temp_path_for(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.{}.mirror-tmp", name, uuid::Uuid::new_v4().simple()))
}

/// Whether a failed copy is worth another attempt.
///
/// Missing files, permission problems and malformed paths will fail the same
/// way every time. Everything else (locks, busy files, interrupted I/O,
/// momentarily full or unavailable volumes) gets retried.
pub fn is_transient(err: &io::Error) -> bool {
    if is_bad_path(err) {
        return false;
    }

    !matches!(
        err.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::InvalidData
            | io::ErrorKind::Unsupported
    )
}

#[cfg(unix)]
fn is_bad_path(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENAMETOOLONG) | Some(libc::EISDIR) | Some(libc::ENOTDIR)
    )
}

#[cfg(not(unix))]
fn is_bad_path(_err: &io::Error) -> bool {
    false
}

/// Runs a [`FileCopier`] under a fixed-delay retry budget.
#[derive(Clone)]
pub struct RetryingCopier {
    policy: RetryPolicy,
    primitive: Arc<dyn FileCopier>,
}

impl RetryingCopier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_primitive(policy, Arc::new(TempRenameCopier))
    }

    pub fn with_primitive(policy: RetryPolicy, primitive: Arc<dyn FileCopier>) -> Self {
        Self { policy, primitive }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Copy `source` over `dest`. Never returns an error: failures end up in the outcome.
    pub async fn copy(&self, source: &Path, dest: &Path) -> CopyOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.primitive.copy_file(source, dest).await {
                Ok(()) => return CopyOutcome::copied(attempt),
                Err(e) if !is_transient(&e) => {
                    debug!(path = %source.display(), error = %e, "permanent copy error, not retrying");
                    return CopyOutcome::failed(attempt, e);
                }
                Err(e) if attempt >= max_attempts => {
                    return CopyOutcome::failed(attempt, e);
                }
                Err(e) => {
                    warn!(
                        path = %source.display(),
                        attempt,
                        max_attempts,
                        error = %e,
                        "transient copy error, retrying"
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        }
    }
}
