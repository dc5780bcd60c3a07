//! Database lifecycle and additive migrations.
//!
//! Two logical databases are managed here: the general cache database
//! (generic TTL cache, email summaries, word definitions) and the dictionary
//! database (one table per [`Language`](crate::Language) plus `meta`).
//! Migrations only ever create tables; nothing is dropped by a version bump.

mod database;
mod migration;

pub use database::{Database, DatabaseKind};
pub use migration::{CACHE_MIGRATIONS, DICTIONARY_MIGRATIONS, Migration, Table};

pub(crate) use database::is_missing_table;
