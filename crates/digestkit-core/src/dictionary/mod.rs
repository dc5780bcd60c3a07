//! Offline dictionaries: resumable per-language bulk download and lookup.
//!
//! Each language is downloaded as 26 per-letter shards, fetched strictly in
//! sequence. Progress is checkpointed to the [`CheckpointStore`](crate::CheckpointStore)
//! after every shard, so an interrupted download resumes where it stopped.
//!
//! Checkpoint writes are not transactional with the data writes they follow.
//! A crash in between replays one shard on resume, which is harmless only
//! because every dictionary write is an upsert keyed by the normalized word.
//! Keep it that way.

mod engine;
mod model;
mod source;

pub use engine::{DictionarySyncEngine, SHARD_COUNT};
pub use model::{
    DictionaryEntry, DownloadProgress, DownloadReport, DownloadStatus, LanguageMeta,
    LanguageStatus, SyncOptions,
};
pub use source::ShardSource;
