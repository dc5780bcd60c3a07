//! # digestkit-core
//!
//! Local storage engine behind digestkit's summarization and word-lookup
//! features.
//!
//! This crate provides:
//! - **Schema management** - versioned `SQLite` databases with additive migrations
//! - **TTL cache** - memoized expensive results with pull-based expiry
//! - **Entity caches** - email summaries and word definitions, invalidated by callers
//! - **Offline dictionaries** - resumable per-language bulk download and lookup
//! - **Word lookup** - offline first, then cached, then remote definitions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod dictionary;
pub mod entity;
mod error;
pub mod language;
pub mod schema;
pub mod service;

pub use cache::{CacheEntry, CacheStore, DEFAULT_TTL};
pub use checkpoint::{CheckpointStore, DownloadCheckpoint};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DataPaths, Settings};
pub use dictionary::{
    DictionaryEntry, DictionarySyncEngine, DownloadProgress, DownloadReport, DownloadStatus,
    LanguageMeta, LanguageStatus, SHARD_COUNT, ShardSource, SyncOptions,
};
pub use digestkit_remote::ShardEntry;
pub use entity::{CachedEmailSummary, EmailSummaryStore, Metadata, WordDefinitionStore};
pub use error::{Error, Result};
pub use language::Language;
pub use schema::{Database, DatabaseKind};
pub use service::{Definition, DefinitionOrigin, DefinitionSource, WordLookup};
