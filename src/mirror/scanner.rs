use super::error::{MirrorError, MirrorResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Enumerates every regular file below the source root for the initial pass.
pub struct TreeScanner {
    source_root: PathBuf,
}

impl TreeScanner {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Lazily walk the tree. Order is unspecified.
    ///
    /// Entries that cannot be read mid-walk are logged and skipped; only a
    /// missing root is an error.
    pub fn scan(&self) -> MirrorResult<impl Iterator<Item = PathBuf>> {
        if !self.source_root.is_dir() {
            return Err(MirrorError::SourceNotFound {
                path: self.source_root.clone(),
            });
        }

        info!("Scanning files in {}", self.source_root.display());

        let files = WalkDir::new(&self.source_root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_file() => Some(entry.into_path()),
                Ok(entry) => {
                    debug!("Skipping non-file entry: {}", entry.path().display());
                    None
                }
                Err(e) => {
                    warn!(
                        path = ?e.path(),
                        error = %e,
                        "skipping unreadable entry during scan"
                    );
                    None
                }
            });

        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_scan_finds_nested_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("a/b/c")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("top.txt"), "1").unwrap();
        std::fs::write(root.join("a/one.txt"), "2").unwrap();
        std::fs::write(root.join("a/b/c/deep.bin"), "3").unwrap();

        let found: BTreeSet<PathBuf> = TreeScanner::new(root).scan().unwrap().collect();
        let expected: BTreeSet<PathBuf> = ["top.txt", "a/one.txt", "a/b/c/deep.bin"]
            .iter()
            .map(|p| root.join(p))
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_scan_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(TreeScanner::new(dir.path()).scan().unwrap().count(), 0);
    }

    #[test]
    fn test_scan_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = TreeScanner::new(dir.path().join("nope"))
            .scan()
            .err()
            .unwrap();
        assert!(matches!(err, MirrorError::SourceNotFound { .. }));
        assert!(err.is_fatal());
    }
}
