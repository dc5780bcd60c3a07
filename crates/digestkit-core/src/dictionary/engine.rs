//! Per-language download state machine.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use digestkit_remote::{SHARD_LETTERS, ShardEntry};
use sqlx::Row;
use tokio::sync::{OwnedMutexGuard, watch};
use tracing::{debug, info, warn};

use super::model::{
    DictionaryEntry, DownloadProgress, DownloadReport, DownloadStatus, LanguageMeta,
    LanguageStatus, SyncOptions,
};
use super::source::ShardSource;
use crate::checkpoint::{CheckpointStore, DownloadCheckpoint};
use crate::entity::normalize_word;
use crate::language::Language;
use crate::schema::{Database, DatabaseKind, Table, is_missing_table};
use crate::{Error, Result};

/// Number of shards per language.
pub const SHARD_COUNT: usize = SHARD_LETTERS.len();

/// Handles a delete uses to stop a running download and wait for it.
struct ActiveEntry {
    abort: watch::Sender<bool>,
    running: Arc<tokio::sync::Mutex<()>>,
}

type ActiveDownloads = Mutex<HashMap<Language, ActiveEntry>>;

/// Downloads, queries and deletes offline dictionaries.
///
/// ```text
/// NotDownloaded --download_language--> Downloading
/// Downloading   --crash/restart------> Downloading (resumes at checkpoint)
/// Downloading   --26 shards, entries > 0--> Downloaded
/// Downloading   --26 shards, no entries---> NotDownloaded (checkpoint kept)
/// any           --delete_language-----> NotDownloaded
/// ```
///
/// Different languages may download concurrently: each owns a disjoint table
/// and checkpoint key.
pub struct DictionarySyncEngine<S> {
    db: Arc<Database>,
    checkpoints: Arc<CheckpointStore>,
    source: S,
    options: SyncOptions,
    active: ActiveDownloads,
}

/// Unregisters an in-process download when dropped, even if the download
/// future is cancelled. Holds the `running` lock until then.
struct ActiveDownload<'a> {
    active: &'a ActiveDownloads,
    language: Language,
    abort: watch::Receiver<bool>,
    _running: OwnedMutexGuard<()>,
}

impl ActiveDownload<'_> {
    fn aborted(&self) -> bool {
        *self.abort.borrow()
    }

    /// Completes once a delete asks this download to stop.
    async fn abort_requested(&self) {
        let mut abort = self.abort.clone();
        if abort.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for ActiveDownload<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.language);
    }
}

impl<S: ShardSource> DictionarySyncEngine<S> {
    /// Create an engine over an open dictionary database.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `db` is not a dictionary database.
    pub fn new(db: Arc<Database>, checkpoints: Arc<CheckpointStore>, source: S) -> Result<Self> {
        if db.kind() != DatabaseKind::Dictionary {
            return Err(Error::Config(format!(
                "dictionary engine needs the dictionary database, got the {} database",
                db.kind()
            )));
        }

        Ok(Self {
            db,
            checkpoints,
            source,
            options: SyncOptions::default(),
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Replace the per-shard fetch budget.
    #[must_use]
    pub const fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Where shards are fetched from.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Checkpoint area shared with status surfaces.
    #[must_use]
    pub const fn checkpoints(&self) -> &Arc<CheckpointStore> {
        &self.checkpoints
    }

    /// Download (or resume downloading) a language.
    ///
    /// Shards are fetched one after another. A shard that still fails after
    /// its retry budget is logged and skipped; the checkpoint advances past
    /// it either way. `on_progress` is called after each shard that was
    /// fetched and stored.
    ///
    /// Calling this for a language that is already downloaded returns
    /// [`DownloadStatus::AlreadyDownloaded`] without any network traffic.
    ///
    /// # Errors
    ///
    /// Returns `DownloadInProgress` if this process is already downloading
    /// the language, `SchemaMismatch` if its table cannot be recreated, and
    /// storage errors from the database or checkpoint file. Shard fetch
    /// failures are never returned.
    pub async fn download_language<F>(
        &self,
        lang: Language,
        on_progress: F,
    ) -> Result<DownloadReport>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        self.download_language_until(lang, on_progress, std::future::pending())
            .await
    }

    /// Like [`download_language`](Self::download_language), but stops when
    /// `cancel` completes.
    ///
    /// A cancelled download returns [`DownloadStatus::Interrupted`]. Its
    /// checkpoint is kept for a later resume and its downloading marker is
    /// cleared, as on every other outcome.
    ///
    /// # Errors
    ///
    /// Same as [`download_language`](Self::download_language).
    pub async fn download_language_until<F, C>(
        &self,
        lang: Language,
        mut on_progress: F,
        cancel: C,
    ) -> Result<DownloadReport>
    where
        F: FnMut(DownloadProgress) + Send,
        C: Future<Output = ()> + Send,
    {
        if self.is_language_downloaded(lang).await? {
            // A crash between completion and checkpoint cleanup leaves one behind.
            self.checkpoints.remove(lang).await?;
            info!("Dictionary {} already downloaded, skipping", lang);
            return Ok(DownloadReport::new(lang, DownloadStatus::AlreadyDownloaded));
        }

        self.db.ensure_table(Table::Dictionary(lang)).await?;
        self.db.ensure_table(Table::DictionaryMeta).await?;

        let guard = self.register(lang)?;
        self.checkpoints.mark_downloading(lang).await?;

        let result = tokio::select! {
            result = self.run_download(&guard, &mut on_progress) => result,
            () = cancel => Ok(self.interrupted_report(lang).await),
        };

        if let Err(e) = self.checkpoints.clear_downloading(lang).await {
            warn!("Failed to clear downloading marker for {}: {}", lang, e);
            if result.is_ok() {
                return Err(e);
            }
        }
        result
    }

    async fn run_download<F>(
        &self,
        guard: &ActiveDownload<'_>,
        on_progress: &mut F,
    ) -> Result<DownloadReport>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let lang = guard.language;
        let start = match self.checkpoints.get(lang).await {
            Some(checkpoint) if checkpoint.next_shard_index < SHARD_COUNT => {
                info!(
                    "Resuming {} download at shard {} ({} entries so far)",
                    lang, checkpoint.next_shard_index, checkpoint.entries_processed
                );
                checkpoint
            }
            Some(_) => {
                info!("Previous {} pass stored nothing, starting over", lang);
                DownloadCheckpoint::default()
            }
            None => {
                info!("Starting {} download", lang);
                DownloadCheckpoint::default()
            }
        };

        let mut report = DownloadReport::new(lang, DownloadStatus::Failed);
        report.entries_processed = start.entries_processed;

        for index in start.next_shard_index..SHARD_COUNT {
            if guard.aborted() {
                return Ok(aborted(report));
            }

            let letter = SHARD_LETTERS[index];
            let fetched = tokio::select! {
                fetched = self.fetch_with_retry(lang, letter) => fetched,
                () = guard.abort_requested() => return Ok(aborted(report)),
            };
            if guard.aborted() {
                return Ok(aborted(report));
            }

            match fetched {
                Ok(entries) => {
                    let stored = self.store_shard(lang, &entries).await?;
                    report.entries_processed += stored;
                    report.fetched_shards += 1;
                    debug!("Stored {} entries from {}/{}.json", stored, lang, letter);

                    on_progress(DownloadProgress {
                        language: lang,
                        letter,
                        percent_complete: percent_complete(index),
                        entries_processed: report.entries_processed,
                    });
                }
                Err(e) => {
                    warn!("Skipping shard: {}", e);
                    report.failed_letters.push(letter);
                }
            }

            if guard.aborted() {
                return Ok(aborted(report));
            }
            // Advances even past a failed shard so a permanently broken one
            // cannot trap every later pass.
            self.checkpoints
                .put(
                    lang,
                    DownloadCheckpoint {
                        next_shard_index: index + 1,
                        entries_processed: report.entries_processed,
                    },
                )
                .await?;
        }

        if guard.aborted() {
            return Ok(aborted(report));
        }

        if report.entries_processed > 0 {
            self.mark_downloaded(lang).await?;
            self.checkpoints.remove(lang).await?;
            report.status = DownloadStatus::Downloaded;
            info!(
                "Dictionary {} downloaded: {} entries, {} shard(s) skipped",
                lang,
                report.entries_processed,
                report.failed_letters.len()
            );
        } else {
            warn!("Dictionary {} download stored no entries", lang);
        }

        Ok(report)
    }

    async fn interrupted_report(&self, lang: Language) -> DownloadReport {
        info!("Download of {} stopped by the caller", lang);
        let mut report = DownloadReport::new(lang, DownloadStatus::Interrupted);
        if let Some(checkpoint) = self.checkpoints.get(lang).await {
            report.entries_processed = checkpoint.entries_processed;
        }
        report
    }

    fn register(&self, lang: Language) -> Result<ActiveDownload<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.contains_key(&lang) {
            return Err(Error::DownloadInProgress(lang));
        }

        let running = Arc::new(tokio::sync::Mutex::new(()));
        let held = running
            .clone()
            .try_lock_owned()
            .map_err(|_| Error::DownloadInProgress(lang))?;
        let (abort, abort_rx) = watch::channel(false);
        active.insert(lang, ActiveEntry { abort, running });

        Ok(ActiveDownload {
            active: &self.active,
            language: lang,
            abort: abort_rx,
            _running: held,
        })
    }

    fn is_active(&self, lang: Language) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&lang)
    }

    async fn fetch_with_retry(&self, lang: Language, letter: char) -> Result<Vec<ShardEntry>> {
        let attempts = self.options.max_attempts.max(1);
        let mut reason = String::new();

        for attempt in 1..=attempts {
            let fetch = self.source.fetch_shard(lang, letter);
            match tokio::time::timeout(self.options.shard_timeout, fetch).await {
                Ok(Ok(entries)) => return Ok(entries),
                Ok(Err(e)) => {
                    reason = e.to_string();
                    if is_permanent(&e) {
                        break;
                    }
                }
                Err(_) => {
                    reason = format!("timed out after {:?}", self.options.shard_timeout);
                }
            }

            if attempt < attempts {
                debug!(
                    "Shard {}/{}.json attempt {} failed ({}), retrying",
                    lang, letter, attempt, reason
                );
                tokio::time::sleep(self.options.retry_backoff * attempt).await;
            }
        }

        Err(Error::ShardFetch {
            language: lang,
            letter,
            reason,
        })
    }

    /// Upsert one shard in a single transaction, returning the entries stored.
    async fn store_shard(&self, lang: Language, entries: &[ShardEntry]) -> Result<u64> {
        let sql = format!(
            r"
            INSERT INTO {} (word, pos, definition)
            VALUES (?, ?, ?)
            ON CONFLICT(word) DO UPDATE SET
                pos = excluded.pos,
                definition = excluded.definition
            ",
            lang.table_name()
        );

        let pool = self.db.pool().await;
        let mut tx = pool.begin().await?;
        let mut stored = 0;
        for entry in entries {
            let word = normalize_word(&entry.word);
            if word.is_empty() {
                continue;
            }
            sqlx::query(&sql)
                .bind(word)
                .bind(&entry.pos)
                .bind(&entry.definition)
                .execute(&mut *tx)
                .await?;
            stored += 1;
        }
        tx.commit().await?;

        Ok(stored)
    }

    async fn mark_downloaded(&self, lang: Language) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO meta (key, downloaded, completed_at)
            VALUES (?, 1, ?)
            ON CONFLICT(key) DO UPDATE SET
                downloaded = excluded.downloaded,
                completed_at = excluded.completed_at
            ",
        )
        .bind(lang.meta_key())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db.pool().await)
        .await?;

        Ok(())
    }

    /// Look a word up offline.
    ///
    /// Returns `None` both when the word is absent and when the language's
    /// table does not exist; callers fall back to the network in either case.
    ///
    /// # Errors
    ///
    /// Returns an error only if the database itself fails.
    pub async fn lookup(&self, word: &str, lang: Language) -> Result<Option<DictionaryEntry>> {
        let word = normalize_word(word);
        if word.is_empty() {
            return Ok(None);
        }

        let sql = format!(
            "SELECT word, pos, definition FROM {} WHERE word = ?",
            lang.table_name()
        );
        match sqlx::query(&sql)
            .bind(&word)
            .fetch_optional(&self.db.pool().await)
            .await
        {
            Ok(row) => Ok(row.map(|row| DictionaryEntry {
                word: row.get("word"),
                part_of_speech: row.get("pos"),
                definition: row.get("definition"),
            })),
            Err(e) if is_missing_table(&e) => {
                debug!("No {} table, treating {:?} as not found", lang, word);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stored download state of a language, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails. A missing `meta` table
    /// is reported as `None`.
    pub async fn language_meta(&self, lang: Language) -> Result<Option<LanguageMeta>> {
        let result = sqlx::query(r"SELECT downloaded, completed_at FROM meta WHERE key = ?")
            .bind(lang.meta_key())
            .fetch_optional(&self.db.pool().await)
            .await;

        let row = match result {
            Ok(row) => row,
            Err(e) if is_missing_table(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(row.map(|row| {
            let completed_at: Option<String> = row.get("completed_at");
            LanguageMeta {
                language: lang,
                downloaded: row.get::<bool, _>("downloaded"),
                completed_at: completed_at
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
            }
        }))
    }

    /// Whether a language is ready for offline lookups.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn is_language_downloaded(&self, lang: Language) -> Result<bool> {
        Ok(self
            .language_meta(lang)
            .await?
            .is_some_and(|meta| meta.downloaded))
    }

    /// Current state of a language.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn language_status(&self, lang: Language) -> Result<LanguageStatus> {
        if let Some(meta) = self.language_meta(lang).await?
            && meta.downloaded
        {
            return Ok(LanguageStatus::Downloaded {
                completed_at: meta.completed_at,
            });
        }

        let active = self.is_active(lang) || self.checkpoints.is_downloading(lang).await;
        let status = match self.checkpoints.get(lang).await {
            Some(checkpoint) if active || checkpoint.next_shard_index < SHARD_COUNT => {
                LanguageStatus::Downloading {
                    next_shard_index: checkpoint.next_shard_index,
                    entries_processed: checkpoint.entries_processed,
                    active,
                }
            }
            None if active => LanguageStatus::Downloading {
                next_shard_index: 0,
                entries_processed: 0,
                active,
            },
            _ => LanguageStatus::NotDownloaded,
        };
        Ok(status)
    }

    /// State of every supported language.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn statuses(&self) -> Result<Vec<(Language, LanguageStatus)>> {
        let mut statuses = Vec::with_capacity(Language::ALL.len());
        for lang in Language::ALL {
            statuses.push((lang, self.language_status(lang).await?));
        }
        Ok(statuses)
    }

    /// Remove a language's dictionary and every trace of its download.
    ///
    /// Restores `NotDownloaded` from any state. A download of the language
    /// running in this process is stopped first, and this waits until it
    /// has made its last write.
    ///
    /// # Errors
    ///
    /// Returns an error if the database or checkpoint file cannot be written.
    pub async fn delete_language(&self, lang: Language) -> Result<()> {
        let running = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&lang)
            .map(|entry| {
                entry.abort.send_replace(true);
                entry.running.clone()
            });
        if let Some(running) = running {
            info!("Aborting running {} download", lang);
            drop(running.lock().await);
        }

        let pool = self.db.pool().await;
        let clear_table = format!("DELETE FROM {}", lang.table_name());
        match sqlx::query(&clear_table).execute(&pool).await {
            Ok(_) => {}
            Err(e) if is_missing_table(&e) => {}
            Err(e) => return Err(e.into()),
        }
        match sqlx::query(r"DELETE FROM meta WHERE key = ?")
            .bind(lang.meta_key())
            .execute(&pool)
            .await
        {
            Ok(_) => {}
            Err(e) if is_missing_table(&e) => {}
            Err(e) => return Err(e.into()),
        }

        self.checkpoints.remove(lang).await?;
        self.checkpoints.clear_downloading(lang).await?;

        info!("Deleted dictionary {}", lang);
        Ok(())
    }

    /// Find downloads a crash left behind.
    ///
    /// Clears downloading markers that no download in this process owns and
    /// returns the languages that have a resumable checkpoint or had such a
    /// stale marker. Resuming is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint file cannot be written.
    pub async fn recover_interrupted(&self) -> Result<Vec<Language>> {
        let mut interrupted = Vec::new();
        for lang in self.checkpoints.interrupted().await {
            if self.is_active(lang) {
                continue;
            }

            let stale_marker = self.checkpoints.is_downloading(lang).await;
            if stale_marker {
                self.checkpoints.clear_downloading(lang).await?;
            }
            let resumable = self
                .checkpoints
                .get(lang)
                .await
                .is_some_and(|c| c.next_shard_index < SHARD_COUNT);

            if stale_marker || resumable {
                interrupted.push(lang);
            }
        }

        if !interrupted.is_empty() {
            info!("Found {} interrupted download(s)", interrupted.len());
        }
        Ok(interrupted)
    }
}

fn aborted(mut report: DownloadReport) -> DownloadReport {
    info!("Download of {} aborted", report.language);
    report.status = DownloadStatus::Aborted;
    report
}

fn percent_complete(index: usize) -> u8 {
    u8::try_from((index + 1) * 100 / SHARD_COUNT).unwrap_or(100)
}

/// Failures that retrying the same request cannot fix.
fn is_permanent(err: &Error) -> bool {
    match err {
        Error::Remote(remote) => !remote.is_transient(),
        Error::Serde(_) => true,
        _ => false,
    }
}
