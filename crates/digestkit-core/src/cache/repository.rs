//! TTL cache storage repository.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::{debug, info};

use super::model::{CacheEntry, DEFAULT_TTL};
use crate::clock::{Clock, SystemClock};
use crate::Result;
use crate::schema::{Database, DatabaseKind};

/// Repository for the `generic_cache` table.
///
/// Writes are unconditional overwrites: concurrent writers to one key end
/// with the last write.
pub struct CacheStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl CacheStore {
    /// Create a store over an open cache database.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            clock: Arc::new(SystemClock),
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let db = Database::in_memory(DatabaseKind::Cache).await?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Replace the time source used for expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the TTL used by [`CacheStore::set_default`].
    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Store a value for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized or the database query fails.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let value = serde_json::to_string(value)?;
        let written_at = self.clock.now().timestamp_millis();

        sqlx::query(
            r"
            INSERT INTO generic_cache (key, value, written_at, ttl_ms)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                written_at = excluded.written_at,
                ttl_ms = excluded.ttl_ms
            ",
        )
        .bind(key)
        .bind(&value)
        .bind(written_at)
        .bind(ttl.num_milliseconds().max(0))
        .execute(&self.db.pool().await)
        .await?;

        Ok(())
    }

    /// Store a value for the default TTL ([`DEFAULT_TTL`] unless replaced).
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized or the database query fails.
    pub async fn set_default<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, value, self.default_ttl).await
    }

    /// Get a live value.
    ///
    /// Returns `None` if the key is absent or expired. An expired entry is
    /// deleted by the read that finds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the stored value does
    /// not deserialize into `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_entry(key).await? {
            Some(entry) => Ok(Some(serde_json::from_value(entry.value)?)),
            None => Ok(None),
        }
    }

    /// Get a live entry with its write time and TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let pool = self.db.pool().await;
        let row = sqlx::query(
            r"
            SELECT key, value, written_at, ttl_ms
            FROM generic_cache
            WHERE key = ?
            ",
        )
        .bind(key)
        .fetch_optional(&pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let entry = row_to_entry(&row)?;

        if entry.is_expired_at(self.clock.now()) {
            // Only remove the version we looked at; a concurrent set wins.
            sqlx::query(r"DELETE FROM generic_cache WHERE key = ? AND written_at = ?")
                .bind(key)
                .bind(entry.written_at.timestamp_millis())
                .execute(&pool)
                .await?;
            debug!("Cache entry {:?} expired at {:?}", key, entry.expires_at());
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Remove one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query(r"DELETE FROM generic_cache WHERE key = ?")
            .bind(key)
            .execute(&self.db.pool().await)
            .await?;

        Ok(())
    }

    /// Remove every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query(r"DELETE FROM generic_cache")
            .execute(&self.db.pool().await)
            .await?;

        Ok(())
    }

    /// Delete every expired entry, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn sweep(&self) -> Result<u64> {
        let now = self.clock.now().timestamp_millis();
        let result = sqlx::query(r"DELETE FROM generic_cache WHERE written_at + ttl_ms <= ?")
            .bind(now)
            .execute(&self.db.pool().await)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!("Swept {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Number of stored rows, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn len(&self) -> Result<u64> {
        let row = sqlx::query(r"SELECT COUNT(*) as count FROM generic_cache")
            .fetch_one(&self.db.pool().await)
            .await?;

        let count: i64 = row.get("count");
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Returns true if no rows are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<CacheEntry> {
    let value: String = row.get("value");
    let written_at: i64 = row.get("written_at");
    let ttl_ms: i64 = row.get("ttl_ms");

    Ok(CacheEntry {
        key: row.get("key"),
        value: serde_json::from_str(&value)?,
        written_at: DateTime::<Utc>::from_timestamp_millis(written_at).unwrap_or_default(),
        ttl: Duration::try_milliseconds(ttl_ms).unwrap_or(Duration::MAX),
    })
}
