//! Dictionary data models.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::language::Language;

/// One word of an offline dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DictionaryEntry {
    /// Normalized headword.
    pub word: String,
    /// Part of speech.
    pub part_of_speech: String,
    /// Definition text.
    pub definition: String,
}

/// Download state stored in the dictionary `meta` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageMeta {
    /// Language the row describes.
    pub language: Language,
    /// Set only after a pass that stored at least one entry.
    pub downloaded: bool,
    /// When that pass finished.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Reported after every successfully processed shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// Language being downloaded.
    pub language: Language,
    /// Letter of the shard just processed.
    pub letter: char,
    /// Share of the 26 shards attempted so far, 0..=100.
    pub percent_complete: u8,
    /// Entries stored so far, including those of a resumed earlier pass.
    pub entries_processed: u64,
}

/// How a call to `download_language` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// All shards attempted and at least one entry stored.
    Downloaded,
    /// The language was already downloaded; nothing was fetched.
    AlreadyDownloaded,
    /// All shards attempted but nothing was stored. The checkpoint is kept.
    Failed,
    /// The language was deleted while downloading.
    Aborted,
    /// Stopped by the caller. The checkpoint is kept for a later resume.
    Interrupted,
}

/// Outcome of `download_language`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Language that was downloaded.
    pub language: Language,
    /// Final state.
    pub status: DownloadStatus,
    /// Entries stored across this and any resumed pass.
    pub entries_processed: u64,
    /// Letters skipped after their retry budget ran out.
    pub failed_letters: Vec<char>,
    /// Shards fetched by this call.
    pub fetched_shards: usize,
}

impl DownloadReport {
    pub(super) const fn new(language: Language, status: DownloadStatus) -> Self {
        Self {
            language,
            status,
            entries_processed: 0,
            failed_letters: Vec::new(),
            fetched_shards: 0,
        }
    }
}

/// Observable state of a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LanguageStatus {
    /// No usable dictionary. A failed pass also ends here.
    NotDownloaded,
    /// A download is running or can be resumed.
    Downloading {
        /// Shard the next pass starts at.
        next_shard_index: usize,
        /// Entries stored so far.
        entries_processed: u64,
        /// Whether a download is marked as running right now.
        active: bool,
    },
    /// Dictionary ready for offline lookups.
    Downloaded {
        /// When the download finished.
        completed_at: Option<DateTime<Utc>>,
    },
}

/// Per-shard fetch budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound for one fetch attempt.
    pub shard_timeout: Duration,
    /// Attempts per shard before it is skipped (at least 1).
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly after that.
    pub retry_backoff: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            shard_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}
