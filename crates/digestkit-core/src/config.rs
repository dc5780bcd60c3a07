//! Persisted settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::Result;
use crate::cache::DEFAULT_TTL;
use crate::dictionary::SyncOptions;

/// Public single-word definition API.
pub const DEFAULT_DEFINITION_API_HOST: &str = "https://api.dictionaryapi.dev/api/v2";

/// Settings that persist across runs. Every field has a default, so a
/// partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the databases and the checkpoint file. `None`
    /// means the platform data directory chosen by the host.
    pub data_dir: Option<PathBuf>,
    /// Base URL of the per-letter dictionary shards. Empty disables downloads.
    pub shard_base_url: String,
    /// Base URL of the single-word definition API.
    pub definition_api_host: String,
    /// TTL for generic cache entries written with the default.
    pub cache_ttl_days: u32,
    /// Upper bound for one shard fetch attempt.
    pub shard_timeout_secs: u64,
    /// Attempts per shard before it is skipped.
    pub shard_max_attempts: u32,
    /// Delay before the second attempt.
    pub shard_retry_backoff_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let sync = SyncOptions::default();
        Self {
            data_dir: None,
            shard_base_url: String::new(),
            definition_api_host: DEFAULT_DEFINITION_API_HOST.to_string(),
            cache_ttl_days: u32::try_from(DEFAULT_TTL.num_days()).unwrap_or(7),
            shard_timeout_secs: sync.shard_timeout.as_secs(),
            shard_max_attempts: sync.max_attempts,
            shard_retry_backoff_ms: u64::try_from(sync.retry_backoff.as_millis())
                .unwrap_or(500),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&contents)?)
    }

    /// Write settings, creating the parent directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Data file locations, using `fallback` when no data directory is set.
    #[must_use]
    pub fn paths(&self, fallback: &Path) -> DataPaths {
        DataPaths::new(self.data_dir.as_deref().unwrap_or(fallback))
    }

    /// Shard fetch budget.
    #[must_use]
    pub const fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            shard_timeout: Duration::from_secs(self.shard_timeout_secs),
            max_attempts: self.shard_max_attempts,
            retry_backoff: Duration::from_millis(self.shard_retry_backoff_ms),
        }
    }

    /// TTL for generic cache entries, saturating at the largest duration.
    #[must_use]
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_days(i64::from(self.cache_ttl_days))
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// Files kept under the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// General cache database.
    pub cache_db: PathBuf,
    /// Offline dictionary database.
    pub dictionary_db: PathBuf,
    /// Download checkpoint file.
    pub checkpoints: PathBuf,
}

impl DataPaths {
    /// Standard file names under `data_dir`.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            cache_db: data_dir.join("cache.db"),
            dictionary_db: data_dir.join("dictionary.db"),
            checkpoints: data_dir.join("checkpoints.json"),
        }
    }
}
