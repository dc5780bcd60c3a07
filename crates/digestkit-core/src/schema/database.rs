//! Database handle with explicit open/close and a single recovery path.

use std::fmt;
use std::path::{Path, PathBuf};

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::migration::{CACHE_MIGRATIONS, DICTIONARY_MIGRATIONS, Migration, Table};
use crate::{Error, Result};

/// Which logical database a handle serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    /// Generic cache, email summaries and word definitions.
    Cache,
    /// Per-language dictionary tables and download metadata.
    Dictionary,
}

impl DatabaseKind {
    /// Migration history of this database.
    #[must_use]
    pub const fn migrations(self) -> &'static [Migration] {
        match self {
            Self::Cache => CACHE_MIGRATIONS,
            Self::Dictionary => DICTIONARY_MIGRATIONS,
        }
    }

    /// Schema version this build expects.
    #[must_use]
    pub fn target_version(self) -> u32 {
        self.migrations().last().map_or(0, |m| m.version)
    }

    /// Every table the current schema must contain.
    pub fn tables(self) -> impl Iterator<Item = Table> {
        self.migrations()
            .iter()
            .flat_map(|m| m.tables.iter().copied())
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("cache"),
            Self::Dictionary => f.write_str("dictionary"),
        }
    }
}

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

impl Location {
    fn display_path(&self) -> PathBuf {
        match self {
            Self::File(path) => path.clone(),
            Self::Memory => PathBuf::from(":memory:"),
        }
    }
}

/// An open, migrated database.
///
/// Constructed once and shared (usually behind an `Arc`) by the stores that
/// use it. Nothing opens a database implicitly.
#[derive(Debug)]
pub struct Database {
    kind: DatabaseKind,
    location: Location,
    pool: RwLock<SqlitePool>,
}

impl Database {
    /// Open (creating if needed) a database file and migrate it.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the file cannot be opened, and
    /// `SchemaMismatch` if the on-disk schema is newer than this build or
    /// tables are still missing after repair.
    pub async fn open(kind: DatabaseKind, path: impl AsRef<Path>) -> Result<Self> {
        let location = Location::File(path.as_ref().to_path_buf());
        let pool = connect(&location).await?;
        migrate(&pool, kind).await?;
        verify(&pool, kind).await?;

        info!("Opened {} database at {}", kind, path.as_ref().display());
        Ok(Self {
            kind,
            location,
            pool: RwLock::new(pool),
        })
    }

    /// Create an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema creation fails.
    pub async fn in_memory(kind: DatabaseKind) -> Result<Self> {
        let location = Location::Memory;
        let pool = connect(&location).await?;
        migrate(&pool, kind).await?;
        verify(&pool, kind).await?;

        Ok(Self {
            kind,
            location,
            pool: RwLock::new(pool),
        })
    }

    /// Which database this is.
    #[must_use]
    pub const fn kind(&self) -> DatabaseKind {
        self.kind
    }

    /// Current connection pool. Cheap to clone.
    pub async fn pool(&self) -> SqlitePool {
        self.pool.read().await.clone()
    }

    /// Stored schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn schema_version(&self) -> Result<u32> {
        read_version(&self.pool().await).await
    }

    /// Check whether a table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn table_exists(&self, table: Table) -> Result<bool> {
        table_exists(&self.pool().await, table).await
    }

    /// Make sure a table exists before an operation depends on it.
    ///
    /// A missing table triggers one logged [`reopen`](Self::reopen); if the
    /// table is still missing afterwards the operation fails.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if the table cannot be recreated.
    pub async fn ensure_table(&self, table: Table) -> Result<()> {
        if self.table_exists(table).await? {
            return Ok(());
        }

        warn!(
            "Table {} missing from {} database, reopening to recreate it",
            table.name(),
            self.kind
        );
        self.reopen().await?;

        if self.table_exists(table).await? {
            info!("Recovered table {}", table.name());
            Ok(())
        } else {
            Err(Error::SchemaMismatch(format!(
                "table {} is missing from the {} database",
                table.name(),
                self.kind
            )))
        }
    }

    /// Replace the connection pool and re-run table creation for every table
    /// of the current schema, regardless of the stored version.
    ///
    /// In-memory databases keep their pool (a fresh connection would be a
    /// different, empty database) and only re-run table creation.
    ///
    /// # Errors
    ///
    /// Returns an error if reconnecting or table creation fails.
    pub async fn reopen(&self) -> Result<()> {
        match &self.location {
            Location::File(path) => {
                info!("Reopening {} database at {}", self.kind, path.display());
                let fresh = connect(&self.location).await?;
                create_all(&fresh, self.kind).await?;

                let old = {
                    let mut guard = self.pool.write().await;
                    std::mem::replace(&mut *guard, fresh)
                };
                old.close().await;
            }
            Location::Memory => {
                info!("Recreating tables of in-memory {} database", self.kind);
                create_all(&self.pool().await, self.kind).await?;
            }
        }
        Ok(())
    }

    /// Close the connection pool. Further operations fail.
    pub async fn close(&self) {
        debug!("Closing {} database", self.kind);
        self.pool.read().await.close().await;
    }
}

async fn connect(location: &Location) -> Result<SqlitePool> {
    let unavailable = |source| Error::StorageUnavailable {
        path: location.display_path(),
        source,
    };

    match location {
        Location::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| unavailable(sqlx::Error::Io(e)))?;
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await
                .map_err(unavailable)
        }
        Location::Memory => SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(unavailable),
    }
}

async fn read_version(pool: &SqlitePool) -> Result<u32> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    u32::try_from(version)
        .map_err(|_| Error::SchemaMismatch(format!("invalid schema version {version}")))
}

/// Apply every migration newer than the stored version, each in its own transaction.
async fn migrate(pool: &SqlitePool, kind: DatabaseKind) -> Result<()> {
    let current = read_version(pool).await?;
    let target = kind.target_version();

    if current > target {
        return Err(Error::SchemaMismatch(format!(
            "{kind} database is at version {current}, newer than supported version {target}"
        )));
    }

    for migration in kind.migrations().iter().filter(|m| m.version > current) {
        debug!("Migrating {} database to version {}", kind, migration.version);
        let mut tx = pool.begin().await?;
        for table in migration.tables {
            for statement in table.create_statements() {
                sqlx::query(&statement).execute(&mut *tx).await?;
            }
        }
        // PRAGMA does not accept bound parameters.
        sqlx::query(&format!("PRAGMA user_version = {}", migration.version))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    if current < target {
        info!("Migrated {} database from version {} to {}", kind, current, target);
    }
    Ok(())
}

async fn create_all(pool: &SqlitePool, kind: DatabaseKind) -> Result<()> {
    for table in kind.tables() {
        for statement in table.create_statements() {
            sqlx::query(&statement).execute(pool).await?;
        }
    }
    Ok(())
}

async fn table_exists(pool: &SqlitePool, table: Table) -> Result<bool> {
    let row = sqlx::query(
        r"
        SELECT COUNT(*) as count
        FROM sqlite_master
        WHERE type = 'table' AND name = ?
        ",
    )
    .bind(table.name())
    .fetch_one(pool)
    .await?;

    let count: i64 = row.get("count");
    Ok(count > 0)
}

async fn missing_tables(pool: &SqlitePool, kind: DatabaseKind) -> Result<Vec<Table>> {
    let mut missing = Vec::new();
    for table in kind.tables() {
        if !table_exists(pool, table).await? {
            missing.push(table);
        }
    }
    Ok(missing)
}

/// Startup check. Tables missing despite an up-to-date version get one
/// explicit repair pass before the open fails.
async fn verify(pool: &SqlitePool, kind: DatabaseKind) -> Result<()> {
    let missing = missing_tables(pool, kind).await?;
    if missing.is_empty() {
        return Ok(());
    }

    warn!(
        "{} database is missing {} table(s) at its current version, repairing",
        kind,
        missing.len()
    );
    create_all(pool, kind).await?;

    let still_missing = missing_tables(pool, kind).await?;
    if still_missing.is_empty() {
        return Ok(());
    }

    let names: Vec<&str> = still_missing.iter().map(|t| t.name()).collect();
    Err(Error::SchemaMismatch(format!(
        "{kind} database is missing tables: {}",
        names.join(", ")
    )))
}

/// Whether a driver error means the queried table does not exist.
pub(crate) fn is_missing_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.message().contains("no such table"))
}
