//! Where shards come from.

use std::future::Future;

use digestkit_remote::{ShardClient, ShardEntry};

use crate::Result;
use crate::language::Language;

/// Supplier of per-letter dictionary shards.
pub trait ShardSource: Send + Sync {
    /// Fetch every entry of one language's shard.
    fn fetch_shard(
        &self,
        language: Language,
        letter: char,
    ) -> impl Future<Output = Result<Vec<ShardEntry>>> + Send;
}

impl ShardSource for ShardClient {
    async fn fetch_shard(&self, language: Language, letter: char) -> Result<Vec<ShardEntry>> {
        Ok(Self::fetch_shard(self, language.remote_name(), letter).await?)
    }
}
