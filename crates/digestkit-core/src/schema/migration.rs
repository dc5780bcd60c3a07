//! Migration tables for both databases.

use crate::language::Language;

/// A table managed by the schema layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// TTL key-value cache.
    GenericCache,
    /// Email summaries keyed by thread id.
    EmailSummaries,
    /// Cached single-word definitions.
    WordDefinitions,
    /// Per-language download state (`lang-{code}` rows).
    DictionaryMeta,
    /// Entries of one language.
    Dictionary(Language),
}

impl Table {
    /// SQL name of the table.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GenericCache => "generic_cache",
            Self::EmailSummaries => "email_summaries",
            Self::WordDefinitions => "word_definitions",
            Self::DictionaryMeta => "meta",
            Self::Dictionary(lang) => lang.table_name(),
        }
    }

    /// Idempotent DDL creating the table and its indexes.
    pub(crate) fn create_statements(self) -> Vec<String> {
        match self {
            Self::GenericCache => vec![
                r"
                CREATE TABLE IF NOT EXISTS generic_cache (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    written_at INTEGER NOT NULL,
                    ttl_ms INTEGER NOT NULL
                )
                "
                .to_string(),
                r"
                CREATE INDEX IF NOT EXISTS idx_generic_cache_written_at
                ON generic_cache(written_at)
                "
                .to_string(),
            ],
            Self::EmailSummaries => vec![
                r"
                CREATE TABLE IF NOT EXISTS email_summaries (
                    email_id TEXT PRIMARY KEY,
                    summary TEXT NOT NULL,
                    written_at INTEGER NOT NULL,
                    metadata TEXT NOT NULL DEFAULT '{}'
                )
                "
                .to_string(),
            ],
            Self::WordDefinitions => vec![
                r"
                CREATE TABLE IF NOT EXISTS word_definitions (
                    word TEXT PRIMARY KEY,
                    definition TEXT NOT NULL
                )
                "
                .to_string(),
            ],
            Self::DictionaryMeta => vec![
                r"
                CREATE TABLE IF NOT EXISTS meta (
                    key TEXT PRIMARY KEY,
                    downloaded INTEGER NOT NULL DEFAULT 0,
                    completed_at TEXT
                )
                "
                .to_string(),
            ],
            Self::Dictionary(lang) => vec![format!(
                r"
                CREATE TABLE IF NOT EXISTS {} (
                    word TEXT PRIMARY KEY,
                    pos TEXT NOT NULL DEFAULT '',
                    definition TEXT NOT NULL DEFAULT ''
                )
                ",
                lang.table_name()
            )],
        }
    }
}

/// One schema version and the tables it introduces.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Value of `PRAGMA user_version` after this migration.
    pub version: u32,
    /// Tables created by this migration.
    pub tables: &'static [Table],
}

/// Cache database history.
pub const CACHE_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    tables: &[
        Table::GenericCache,
        Table::EmailSummaries,
        Table::WordDefinitions,
    ],
}];

/// Dictionary database history. A new language gets a new version here.
pub const DICTIONARY_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        tables: &[
            Table::DictionaryMeta,
            Table::Dictionary(Language::English),
            Table::Dictionary(Language::Spanish),
            Table::Dictionary(Language::French),
        ],
    },
    Migration {
        version: 2,
        tables: &[
            Table::Dictionary(Language::German),
            Table::Dictionary(Language::Italian),
            Table::Dictionary(Language::Portuguese),
        ],
    },
];
