use super::error::{MirrorError, MirrorResult};
use std::path::{Path, PathBuf};

/// Map a path below `source_root` onto the same relative location below `backup_root`.
pub fn mirrored_path(
    source_root: &Path,
    backup_root: &Path,
    source_path: &Path,
) -> MirrorResult<PathBuf> {
    let relative = source_path
        .strip_prefix(source_root)
        .map_err(|_| MirrorError::OutsideSource {
            path: source_path.to_path_buf(),
            root: source_root.to_path_buf(),
        })?;
    Ok(backup_root.join(relative))
}

/// Compute the backup path for `source_path` and make sure its parent directory exists.
pub async fn resolve(
    source_root: &Path,
    backup_root: &Path,
    source_path: &Path,
) -> MirrorResult<PathBuf> {
    let dest = mirrored_path(source_root, backup_root, source_path)?;

    if let Some(parent) = dest.parent() {
        // create_dir_all already succeeds when the directory exists
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| MirrorError::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mirrored_path_keeps_relative_layout() {
        let dest = mirrored_path(
            Path::new("/data/src"),
            Path::new("/mnt/backup"),
            Path::new("/data/src/a/b.txt"),
        )
        .unwrap();
        assert_eq!(dest, PathBuf::from("/mnt/backup/a/b.txt"));
    }

    #[test]
    fn test_mirrored_path_rejects_foreign_path() {
        let err = mirrored_path(
            Path::new("/data/src"),
            Path::new("/mnt/backup"),
            Path::new("/etc/passwd"),
        )
        .unwrap_err();
        assert!(matches!(err, MirrorError::OutsideSource { .. }));
    }

    #[tokio::test]
    async fn test_resolve_creates_parents() {
        let src = tempfile::tempdir().unwrap();
        let backup = tempfile::tempdir().unwrap();
        let file = src.path().join("deep/er/file.txt");

        let dest = resolve(src.path(), backup.path(), &file).await.unwrap();
        assert_eq!(dest, backup.path().join("deep/er/file.txt"));
        assert!(backup.path().join("deep/er").is_dir());

        // Second call with the directories already present
        let again = resolve(src.path(), backup.path(), &file).await.unwrap();
        assert_eq!(again, dest);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_reports_directory_create_error() {
        let src = tempfile::tempdir().unwrap();
        let backup = tempfile::tempdir().unwrap();
        // A regular file where a directory is needed
        std::fs::write(backup.path().join("blocked"), b"not a dir").unwrap();

        let err = resolve(src.path(), backup.path(), &src.path().join("blocked/file.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::DirectoryCreate { .. }));
    }

    proptest! {
        #[test]
        fn prop_mirrored_path_strips_only_the_root(
            segments in prop::collection::vec("[a-zA-Z0-9_]{1,8}", 1..5)
        ) {
            let source_root = Path::new("/src/root");
            let backup_root = Path::new("/backup/root");
            let relative: PathBuf = segments.iter().collect();

            let dest = mirrored_path(source_root, backup_root, &source_root.join(&relative)).unwrap();
            prop_assert_eq!(dest.strip_prefix(backup_root).unwrap(), relative.as_path());
        }
    }
}
