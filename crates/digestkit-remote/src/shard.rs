//! Per-letter dictionary shard client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Shard names, one per letter. Every language is split into exactly these 26 documents.
pub const SHARD_LETTERS: [char; 26] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// One record of a shard document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShardEntry {
    /// Headword as published (not normalized).
    pub word: String,
    /// Part of speech.
    #[serde(default, alias = "partOfSpeech")]
    pub pos: String,
    /// Definition text.
    #[serde(default)]
    pub definition: String,
}

/// Client for the sharded dictionary endpoint.
#[derive(Debug, Clone)]
pub struct ShardClient {
    base_url: Url,
    http_client: Client,
}

impl ShardClient {
    /// Creates a client for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            http_client: crate::build_http_client(None)?,
        })
    }

    /// Applies a whole-request timeout to every shard fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be rebuilt.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http_client = crate::build_http_client(Some(timeout))?;
        Ok(self)
    }

    /// Returns the base URL shards are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the URL of one shard: `{base}/{language}/{letter}.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot carry path segments.
    pub fn shard_url(&self, language: &str, letter: char) -> Result<Url> {
        let file = format!("{letter}.json");
        crate::join_segments(&self.base_url, &[language, &file])
    }

    /// Fetches and parses one shard.
    ///
    /// # Arguments
    ///
    /// * `language` - Remote language directory name (e.g. `Spanish`)
    /// * `letter` - Shard letter, `a` through `z`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status, or a body
    /// that is not a JSON array of entries.
    pub async fn fetch_shard(&self, language: &str, letter: char) -> Result<Vec<ShardEntry>> {
        if !letter.is_ascii_lowercase() {
            return Err(Error::InvalidConfig(format!("invalid shard letter {letter:?}")));
        }

        let url = self.shard_url(language, letter)?;
        debug!("Fetching shard {}", url);

        let response = self.http_client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        let entries: Vec<ShardEntry> = serde_json::from_str(&body)?;
        debug!("Shard {} yielded {} entries", url, entries.len());
        Ok(entries)
    }
}
