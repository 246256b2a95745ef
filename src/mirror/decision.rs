use super::error::{MirrorError, MirrorResult};
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;

/// Last write time of `path` in UTC.
pub async fn modified_utc(path: &Path) -> io::Result<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path).await?;
    Ok(DateTime::<Utc>::from(metadata.modified()?))
}

/// Decide whether `source` needs to be copied over `backup`.
///
/// A missing backup always needs a copy. Otherwise the copy happens only when
/// the source was written strictly after the backup, so re-evaluating an
/// unchanged pair after a successful copy keeps returning `false`.
///
/// Only a vanished source is [`MirrorError::StaleFile`]; any other metadata
/// failure on either side is [`MirrorError::Metadata`] and must be reported.
pub async fn should_copy(source: &Path, backup: &Path) -> MirrorResult<bool> {
    let source_time = modified_utc(source).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            MirrorError::StaleFile {
                path: source.to_path_buf(),
                source: e,
            }
        } else {
            MirrorError::Metadata {
                path: source.to_path_buf(),
                source: e,
            }
        }
    })?;

    match modified_utc(backup).await {
        Ok(backup_time) => Ok(source_time > backup_time),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(MirrorError::Metadata {
            path: backup.to_path_buf(),
            source: e,
        }),
    }
}
