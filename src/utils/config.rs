use crate::mirror::{MirrorConfig, MirrorError, RetryPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "mirror.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory tree to mirror
    #[serde(default, alias = "sourcePath", alias = "sourcepath")]
    pub source_path: Option<PathBuf>,

    /// Directory receiving the mirrored tree
    #[serde(default, alias = "backupPath", alias = "backuppath")]
    pub backup_path: Option<PathBuf>,

    /// Copy attempts per file before giving up
    pub max_attempts: u32,

    /// Pause between copy attempts, e.g. "500ms" or "2s"
    pub retry_delay: String,

    /// Concurrent copies during the initial scan
    pub scan_concurrency: usize,

    pub log_format: LogFormat,
}

impl Config {
    /// Load config from `.env`, the JSON config file and `MIRROR_*` environment variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from(&config_file_path())
    }

    /// Load using an explicit config file. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("max_attempts", 3_i64)?
            .set_default("retry_delay", "500ms")?
            .set_default("scan_concurrency", (num_cpus::get() * 2) as i64)?
            .set_default("log_format", "pretty")?
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("MIRROR"))
            .build()
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("invalid configuration values")
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let delay = humantime::parse_duration(&self.retry_delay)
            .with_context(|| format!("invalid retry_delay: {}", self.retry_delay))?;
        Ok(RetryPolicy::new(self.max_attempts, delay))
    }

    /// Build the immutable engine configuration; both paths are required.
    pub fn mirror_config(&self) -> Result<MirrorConfig> {
        let source = required_path(self.source_path.as_deref(), "source_path")?;
        let backup = required_path(self.backup_path.as_deref(), "backup_path")?;

        Ok(MirrorConfig::new(source, backup)
            .with_retry(self.retry_policy()?)
            .with_scan_concurrency(self.scan_concurrency))
    }
}

fn required_path(value: Option<&Path>, key: &str) -> Result<PathBuf> {
    let path = value
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| MirrorError::Config(format!("{key} is required")))?;

    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir().context("cannot resolve relative path")?;
        Ok(cwd.join(path))
    }
}

/// `MIRROR_CONFIG`, else `mirror.json` in the working directory, else the user config dir.
fn config_file_path() -> PathBuf {
    if let Ok(path) = std::env::var("MIRROR_CONFIG") {
        return PathBuf::from(path);
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|dir| dir.join("mirror-backup").join(CONFIG_FILE_NAME))
        .unwrap_or(local)
}

pub fn load_config() -> Result<Config> {
    Config::load()
}
