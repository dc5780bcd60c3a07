//! Single-word definitions API client, used when a word is missing locally.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// The first definition the API returns for a word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDefinition {
    /// Headword as returned by the API.
    pub word: String,
    /// Part of speech of the first meaning.
    pub part_of_speech: String,
    /// First definition of that meaning.
    pub definition: String,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
    word: String,
    #[serde(default)]
    meanings: Vec<ApiMeaning>,
}

#[derive(Debug, Deserialize)]
struct ApiMeaning {
    #[serde(default, rename = "partOfSpeech")]
    part_of_speech: String,
    #[serde(default)]
    definitions: Vec<ApiDefinition>,
}

#[derive(Debug, Deserialize)]
struct ApiDefinition {
    definition: String,
}

/// Client for `GET {host}/entries/{lang}/{word}`.
#[derive(Debug, Clone)]
pub struct DefinitionClient {
    api_host: Url,
    http_client: Client,
}

impl DefinitionClient {
    /// Creates a client for the given API host.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(api_host: &str) -> Result<Self> {
        Ok(Self {
            api_host: Url::parse(api_host)?,
            http_client: crate::build_http_client(None)?,
        })
    }

    /// Looks a word up remotely.
    ///
    /// Returns `None` when the API does not know the word (HTTP 404) or
    /// returns no usable definition.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, any other non-success status,
    /// or an unexpected response shape.
    pub async fn lookup(&self, lang: &str, word: &str) -> Result<Option<RemoteDefinition>> {
        let url = crate::join_segments(&self.api_host, &["entries", lang, word])?;
        debug!("Looking up {:?} at {}", word, url);

        let response = self.http_client.get(url.clone()).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        let entries: Vec<ApiEntry> = serde_json::from_str(&body)?;
        Ok(first_definition(entries))
    }
}

fn first_definition(entries: Vec<ApiEntry>) -> Option<RemoteDefinition> {
    entries.into_iter().find_map(|entry| {
        let word = entry.word;
        entry.meanings.into_iter().find_map(|meaning| {
            let definition = meaning.definitions.into_iter().next()?.definition;
            Some(RemoteDefinition {
                word: word.clone(),
                part_of_speech: meaning.part_of_speech,
                definition,
            })
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_first_definition_skips_empty_meanings() {
        let json = r#"[{
            "word": "serendipity",
            "meanings": [
                {"partOfSpeech": "verb", "definitions": []},
                {"partOfSpeech": "noun", "definitions": [
                    {"definition": "The occurrence of events by chance in a happy way."},
                    {"definition": "Second sense."}
                ]}
            ]
        }]"#;
        let entries: Vec<ApiEntry> = serde_json::from_str(json).unwrap();
        let def = first_definition(entries).unwrap();
        assert_eq!(def.word, "serendipity");
        assert_eq!(def.part_of_speech, "noun");
        assert!(def.definition.starts_with("The occurrence"));
    }

    #[test]
    fn test_first_definition_none_when_empty() {
        let entries: Vec<ApiEntry> = serde_json::from_str(r#"[{"word":"x"}]"#).unwrap();
        assert!(first_definition(entries).is_none());
    }
}
