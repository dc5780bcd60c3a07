//! Email summary storage repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;

use super::model::{CachedEmailSummary, Metadata};
use crate::Result;
use crate::clock::{Clock, SystemClock};
use crate::schema::{Database, DatabaseKind};

/// Repository for the `email_summaries` table.
pub struct EmailSummaryStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl EmailSummaryStore {
    /// Create a store over an open cache database.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            clock: Arc::new(SystemClock),
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

    /// Replace the time source used for `written_at`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Store (or overwrite) the summary of a thread.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database query fails.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        email_id: &str,
        summary: &T,
        metadata: &Metadata,
    ) -> Result<()> {
        let summary = serde_json::to_string(summary)?;
        let metadata = serde_json::to_string(metadata)?;

        sqlx::query(
            r"
            INSERT INTO email_summaries (email_id, summary, written_at, metadata)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(email_id) DO UPDATE SET
                summary = excluded.summary,
                written_at = excluded.written_at,
                metadata = excluded.metadata
            ",
        )
        .bind(email_id)
        .bind(&summary)
        .bind(self.clock.now().timestamp_millis())
        .bind(&metadata)
        .execute(&self.db.pool().await)
        .await?;

        Ok(())
    }

    /// Get the cached summary of a thread with its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the stored JSON is corrupt.
    pub async fn get(&self, email_id: &str) -> Result<Option<CachedEmailSummary>> {
        let row = sqlx::query(
            r"
            SELECT email_id, summary, written_at, metadata
            FROM email_summaries
            WHERE email_id = ?
            ",
        )
        .bind(email_id)
        .fetch_optional(&self.db.pool().await)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let summary: String = row.get("summary");
        let metadata: String = row.get("metadata");
        let written_at: i64 = row.get("written_at");

        Ok(Some(CachedEmailSummary {
            email_id: row.get("email_id"),
            summary: serde_json::from_str(&summary)?,
            written_at: DateTime::<Utc>::from_timestamp_millis(written_at).unwrap_or_default(),
            metadata: serde_json::from_str(&metadata)?,
        }))
    }

    /// Remove the summary of a thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, email_id: &str) -> Result<()> {
        sqlx::query(r"DELETE FROM email_summaries WHERE email_id = ?")
            .bind(email_id)
            .execute(&self.db.pool().await)
            .await?;

        Ok(())
    }

    /// Remove every summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query(r"DELETE FROM email_summaries")
            .execute(&self.db.pool().await)
            .await?;

        Ok(())
    }
}
