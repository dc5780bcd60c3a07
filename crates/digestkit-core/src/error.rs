//! Error types for the core library.

use std::path::PathBuf;

use thiserror::Error;

use crate::language::Language;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A database could not be opened (missing permissions, full disk, locked file).
    #[error("Storage unavailable at {path}: {source}")]
    StorageUnavailable {
        /// Location that failed to open.
        path: PathBuf,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An expected table is missing, or the on-disk schema is newer than this build.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// One shard of a dictionary download could not be fetched or parsed.
    #[error("Shard {letter}.json for {language} failed: {reason}")]
    ShardFetch {
        /// Language being downloaded.
        language: Language,
        /// Shard letter.
        letter: char,
        /// Failure description.
        reason: String,
    },

    /// A download of this language is already running in this process.
    #[error("Download already in progress for {0}")]
    DownloadInProgress(Language),

    /// Language code or name is not in the supported set.
    #[error("Unsupported language: {0}")]
    UnknownLanguage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote request failed.
    #[error("Remote error: {0}")]
    Remote(#[from] digestkit_remote::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
