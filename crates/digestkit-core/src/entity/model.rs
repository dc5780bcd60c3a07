//! Entity cache models.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::Result;

/// Free-form fields stored next to a summary (for example `emailCount`).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A cached email thread summary.
///
/// The store applies no staleness policy. Callers compare [`metadata`](Self::metadata)
/// against the live thread (typically [`email_count`](Self::email_count)) and
/// regenerate when it no longer matches.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEmailSummary {
    /// Email thread id.
    pub email_id: String,
    /// Stored summary.
    pub summary: serde_json::Value,
    /// When the summary was written.
    pub written_at: DateTime<Utc>,
    /// Metadata stored alongside the summary.
    pub metadata: Metadata,
}

impl CachedEmailSummary {
    /// Deserialize the summary into the caller's type.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored summary does not match `T`.
    pub fn summary_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.summary.clone())?)
    }

    /// Number of messages the thread had when it was summarized.
    #[must_use]
    pub fn email_count(&self) -> Option<u64> {
        self.metadata
            .get("emailCount")
            .and_then(serde_json::Value::as_u64)
    }
}

/// Canonical form of a word used as a lookup key: trimmed and lowercased.
#[must_use]
pub fn normalize_word(word: &str) -> String {
    word.trim().to_lowercase()
}
