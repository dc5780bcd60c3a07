//! Checkpoint file storage.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::model::{CheckpointDocument, DownloadCheckpoint};
use crate::Result;
use crate::language::Language;

/// Small key-value area recording per-language download progress and the
/// set of languages currently downloading.
///
/// Every mutation is written through to disk (temp file + rename) before
/// it becomes visible; a failed write leaves the store unchanged. All
/// read-modify-write cycles hold one async lock, so downloads of different
/// languages can share the store.
#[derive(Debug)]
pub struct CheckpointStore {
    path: Option<PathBuf>,
    state: Mutex<CheckpointDocument>,
}

impl CheckpointStore {
    /// Open the checkpoint file at `path`, starting empty if it does not exist.
    ///
    /// A file that cannot be parsed is logged and treated as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let document = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(
                    "Ignoring unreadable checkpoint file {}: {}",
                    path.display(),
                    e
                );
                CheckpointDocument::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckpointDocument::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(document),
        })
    }

    /// Create a store that is never written to disk, for testing.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(CheckpointDocument::default()),
        }
    }

    /// Saved checkpoint of a language, if any.
    pub async fn get(&self, lang: Language) -> Option<DownloadCheckpoint> {
        self.state.lock().await.checkpoints.get(&lang).copied()
    }

    /// Save a language's checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn put(&self, lang: Language, checkpoint: DownloadCheckpoint) -> Result<()> {
        self.update(|document| {
            document.checkpoints.insert(lang, checkpoint);
            true
        })
        .await
    }

    /// Drop a language's checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn remove(&self, lang: Language) -> Result<()> {
        self.update(|document| document.checkpoints.remove(&lang).is_some()).await
    }

    /// Record that a language is being downloaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn mark_downloading(&self, lang: Language) -> Result<()> {
        self.update(|document| document.downloading.insert(lang)).await
    }

    /// Record that a language is no longer being downloaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn clear_downloading(&self, lang: Language) -> Result<()> {
        self.update(|document| document.downloading.remove(&lang)).await
    }

    /// Whether a language is marked as downloading.
    pub async fn is_downloading(&self, lang: Language) -> bool {
        self.state.lock().await.downloading.contains(&lang)
    }

    /// Languages marked as downloading, in declaration order.
    pub async fn downloading(&self) -> Vec<Language> {
        self.state.lock().await.downloading.iter().copied().collect()
    }

    /// Languages with a saved checkpoint or a downloading marker.
    pub async fn interrupted(&self) -> Vec<Language> {
        let state = self.state.lock().await;
        let mut langs: Vec<Language> = state
            .checkpoints
            .keys()
            .chain(state.downloading.iter())
            .copied()
            .collect();
        langs.sort_unstable();
        langs.dedup();
        langs
    }

    /// Apply `change` to a copy of the document and swap it in once it is on
    /// disk. `change` returns false when it changed nothing.
    async fn update(
        &self,
        change: impl FnOnce(&mut CheckpointDocument) -> bool + Send,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        if !change(&mut next) {
            return Ok(());
        }

        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn persist(&self, document: &CheckpointDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(document)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!("Checkpoints saved to {}", path.display());
        Ok(())
    }
}
