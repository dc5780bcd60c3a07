//! Cache data models.

use chrono::{DateTime, Duration, Utc};

/// Lifetime of an entry written without an explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::days(7);

/// A stored cache row.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cache key.
    pub key: String,
    /// Serialized value.
    pub value: serde_json::Value,
    /// When the value was written.
    pub written_at: DateTime<Utc>,
    /// How long the value stays valid after `written_at`.
    pub ttl: Duration,
}

impl CacheEntry {
    /// Instant from which the entry is no longer served, or `None` if the
    /// TTL reaches past the representable range and the entry never expires.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.written_at.checked_add_signed(self.ttl)
    }

    /// Returns true if the entry is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires_at| now >= expires_at)
    }
}
