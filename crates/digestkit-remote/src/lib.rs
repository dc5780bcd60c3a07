//! # digestkit-remote
//!
//! HTTP clients for the two remote collaborators of the offline dictionary.
//!
//! ## Features
//!
//! - **Dictionary shards**: one JSON document per language and letter
//!   (`{base}/{Language}/{letter}.json`), fetched by [`ShardClient`]
//! - **Single-word fallback**: a definitions API (`{host}/entries/{lang}/{word}`)
//!   queried by [`DefinitionClient`] when a word is missing locally
//!
//! ## Quick Start
//!
//! ```ignore
//! use digestkit_remote::ShardClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ShardClient::new("https://dictionaries.example.com/v1")?;
//!     let entries = client.fetch_shard("Spanish", 'm').await?;
//!     println!("{} entries", entries.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod definition;
mod error;
mod shard;

pub use definition::{DefinitionClient, RemoteDefinition};
pub use error::{Error, Result};
pub use shard::{SHARD_LETTERS, ShardClient, ShardEntry};

use std::time::Duration;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("digestkit/", env!("CARGO_PKG_VERSION"));

/// Builds the shared HTTP client with an optional whole-request timeout.
fn build_http_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(Into::into)
}

/// Appends path segments to a base URL, keeping any path the base already has.
fn join_segments(base: &url::Url, segments: &[&str]) -> Result<url::Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::InvalidConfig(format!("{base} cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
