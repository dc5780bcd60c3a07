//! Checkpoint data models.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Resume point of an interrupted dictionary download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadCheckpoint {
    /// First shard not yet attempted (0..=26).
    pub next_shard_index: usize,
    /// Entries stored by the shards before `next_shard_index`.
    pub entries_processed: u64,
}

/// On-disk layout of the checkpoint area.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct CheckpointDocument {
    #[serde(default)]
    pub checkpoints: BTreeMap<Language, DownloadCheckpoint>,
    #[serde(default)]
    pub downloading: BTreeSet<Language>,
}
