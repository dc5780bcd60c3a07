//! Word definition storage repository.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;

use super::model::normalize_word;
use crate::Result;
use crate::schema::{Database, DatabaseKind};

/// Repository for the `word_definitions` table. Keys are normalized words.
pub struct WordDefinitionStore {
    db: Arc<Database>,
}

impl WordDefinitionStore {
    /// Create a store over an open cache database.
    #[must_use]
    pub const fn new(db: Arc<Database>) -> Self {
        Self { db }
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

    /// Store (or overwrite) a definition.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database query fails.
    pub async fn set<T: Serialize + ?Sized>(&self, word: &str, definition: &T) -> Result<()> {
        let definition = serde_json::to_string(definition)?;

        sqlx::query(
            r"
            INSERT INTO word_definitions (word, definition)
            VALUES (?, ?)
            ON CONFLICT(word) DO UPDATE SET definition = excluded.definition
            ",
        )
        .bind(normalize_word(word))
        .bind(&definition)
        .execute(&self.db.pool().await)
        .await?;

        Ok(())
    }

    /// Get a definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the stored value does
    /// not deserialize into `T`.
    pub async fn get<T: DeserializeOwned>(&self, word: &str) -> Result<Option<T>> {
        let row = sqlx::query(r"SELECT definition FROM word_definitions WHERE word = ?")
            .bind(normalize_word(word))
            .fetch_optional(&self.db.pool().await)
            .await?;

        match row {
            Some(row) => {
                let definition: String = row.get("definition");
                Ok(Some(serde_json::from_str(&definition)?))
            }
            None => Ok(None),
        }
    }

    /// Remove a definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, word: &str) -> Result<()> {
        sqlx::query(r"DELETE FROM word_definitions WHERE word = ?")
            .bind(normalize_word(word))
            .execute(&self.db.pool().await)
            .await?;

        Ok(())
    }

    /// Remove every definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query(r"DELETE FROM word_definitions")
            .execute(&self.db.pool().await)
            .await?;

        Ok(())
    }
}
