//! Word lookup: offline dictionary first, then cached and remote definitions.

use std::future::Future;
use std::sync::Arc;

use digestkit_remote::{DefinitionClient, RemoteDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use crate::dictionary::{DictionarySyncEngine, ShardSource};
use crate::entity::{WordDefinitionStore, normalize_word};
use crate::language::Language;

/// Supplier of single-word definitions when the offline dictionary misses.
pub trait DefinitionSource: Send + Sync {
    /// Look one word up.
    fn lookup(
        &self,
        lang: Language,
        word: &str,
    ) -> impl Future<Output = Result<Option<RemoteDefinition>>> + Send;
}

impl DefinitionSource for DefinitionClient {
    async fn lookup(&self, lang: Language, word: &str) -> Result<Option<RemoteDefinition>> {
        Ok(Self::lookup(self, lang.code(), word).await?)
    }
}

/// Where a definition was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionOrigin {
    /// Downloaded offline dictionary.
    Offline,
    /// Earlier remote answer kept in the word definition cache.
    Cached,
    /// Fetched just now.
    Remote,
}

/// A resolved definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    /// Normalized word.
    pub word: String,
    /// Part of speech.
    pub part_of_speech: String,
    /// Definition text.
    pub definition: String,
    /// Where it came from.
    pub origin: DefinitionOrigin,
}

/// Resolves words through the offline dictionary, the word definition cache
/// and finally a remote source. Remote answers are cached.
pub struct WordLookup<S, D> {
    dictionary: Arc<DictionarySyncEngine<S>>,
    definitions: Arc<WordDefinitionStore>,
    remote: Option<D>,
}

impl<S: ShardSource, D: DefinitionSource> WordLookup<S, D> {
    /// Create a lookup over the offline dictionary and the definition cache.
    #[must_use]
    pub const fn new(
        dictionary: Arc<DictionarySyncEngine<S>>,
        definitions: Arc<WordDefinitionStore>,
    ) -> Self {
        Self {
            dictionary,
            definitions,
            remote: None,
        }
    }

    /// Enable the remote fallback.
    #[must_use]
    pub fn with_remote(mut self, remote: D) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Resolve a word.
    ///
    /// A failing remote source is logged and reported as not found.
    ///
    /// # Errors
    ///
    /// Returns an error if a local store fails.
    pub async fn define(&self, word: &str, lang: Language) -> Result<Option<Definition>> {
        let word = normalize_word(word);
        if word.is_empty() {
            return Ok(None);
        }

        if let Some(entry) = self.dictionary.lookup(&word, lang).await? {
            return Ok(Some(Definition {
                word: entry.word,
                part_of_speech: entry.part_of_speech,
                definition: entry.definition,
                origin: DefinitionOrigin::Offline,
            }));
        }

        let key = cache_key(lang, &word);
        if let Some(mut cached) = self.definitions.get::<Definition>(&key).await? {
            cached.origin = DefinitionOrigin::Cached;
            return Ok(Some(cached));
        }

        let Some(remote) = &self.remote else {
            return Ok(None);
        };

        debug!("{:?} not available offline for {}, asking remote", word, lang);
        let found = match remote.lookup(lang, &word).await {
            Ok(Some(found)) => found,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Remote lookup of {:?} ({}) failed: {}", word, lang, e);
                return Ok(None);
            }
        };

        let definition = Definition {
            word,
            part_of_speech: found.part_of_speech,
            definition: found.definition,
            origin: DefinitionOrigin::Remote,
        };
        self.definitions.set(&key, &definition).await?;
        Ok(Some(definition))
    }
}

/// Remote answers differ per language, so the cache key carries it.
fn cache_key(lang: Language, word: &str) -> String {
    format!("{}:{word}", lang.code())
}
