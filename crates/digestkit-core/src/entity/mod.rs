//! Keyed caches without TTL, invalidated explicitly by their callers.

mod email;
mod model;
mod word;

pub use email::EmailSummaryStore;
pub use model::{CachedEmailSummary, Metadata, normalize_word};
pub use word::WordDefinitionStore;
