use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type MirrorResult<T> = Result<T, MirrorError>;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("source directory does not exist: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("failed to create directory {}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The source disappeared between notification and check.
    #[error("file moved on before it could be inspected: {}", path.display())]
    StaleFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read metadata of {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not below source root {}", path.display(), root.display())]
    OutsideSource { path: PathBuf, root: PathBuf },

    #[error("filesystem watch failed")]
    Watch(#[from] notify::Error),

    #[error("watcher is already running")]
    AlreadyWatching,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MirrorError {
    /// Errors that must abort startup instead of being logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MirrorError::SourceNotFound { .. } | MirrorError::Config(_)
        )
    }
}
