//! Integration tests for offline dictionary downloads.
//!
//! These tests drive the sync engine against an in-process shard source and
//! file-backed databases in a temporary directory, so restarts can be
//! simulated by reopening the same files.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::Row;
use tempfile::TempDir;
use tokio::sync::Notify;

use digestkit_core::{
    CheckpointStore, Database, DatabaseKind, DictionarySyncEngine, DownloadCheckpoint,
    DownloadProgress, DownloadStatus, Error, Language, LanguageStatus, Result, SHARD_COUNT,
    ShardEntry, ShardSource, SyncOptions,
};

const ENTRIES_PER_SHARD: usize = 4;

/// How the fake host answers one letter.
enum Shard {
    ServerError,
    NotFound,
    Empty,
    /// Answers 503 this many times, then succeeds.
    Flaky(AtomicU32),
    /// Never answers.
    Hang,
    /// Signals `started`, then waits for `release` before answering.
    Gated {
        started: Arc<Notify>,
        release: Arc<Notify>,
    },
}

/// Shard source serving `ENTRIES_PER_SHARD` words per letter unless told otherwise.
#[derive(Default)]
struct FakeShards {
    overrides: HashMap<char, Shard>,
    calls: Mutex<Vec<char>>,
}

impl FakeShards {
    fn with(mut self, letter: char, shard: Shard) -> Self {
        self.overrides.insert(letter, shard);
        self
    }

    fn calls(&self) -> Vec<char> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, letter: char) -> usize {
        self.calls().iter().filter(|&&c| c == letter).count()
    }
}

fn entries_for(letter: char) -> Vec<ShardEntry> {
    (0..ENTRIES_PER_SHARD)
        .map(|i| ShardEntry {
            word: format!("{}Word{i}", letter.to_ascii_uppercase()),
            pos: "noun".to_string(),
            definition: format!("definition {i} of {letter}"),
        })
        .collect()
}

fn server_error(status: u16, letter: char) -> Error {
    Error::Remote(digestkit_remote::Error::Status {
        status,
        url: format!("https://shards.test/Spanish/{letter}.json"),
    })
}

impl ShardSource for FakeShards {
    async fn fetch_shard(&self, _: Language, letter: char) -> Result<Vec<ShardEntry>> {
        self.calls.lock().unwrap().push(letter);

        match self.overrides.get(&letter) {
            None => Ok(entries_for(letter)),
            Some(Shard::ServerError) => Err(server_error(500, letter)),
            Some(Shard::NotFound) => Err(server_error(404, letter)),
            Some(Shard::Empty) => Ok(Vec::new()),
            Some(Shard::Flaky(remaining)) => {
                let failed = remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if failed {
                    Err(server_error(503, letter))
                } else {
                    Ok(entries_for(letter))
                }
            }
            Some(Shard::Hang) => std::future::pending().await,
            Some(Shard::Gated { started, release }) => {
                started.notify_one();
                release.notified().await;
                Ok(entries_for(letter))
            }
        }
    }
}

fn fast_options() -> SyncOptions {
    SyncOptions {
        shard_timeout: Duration::from_millis(200),
        max_attempts: 3,
        retry_backoff: Duration::from_millis(1),
    }
}

async fn open_engine(dir: &Path, source: FakeShards) -> DictionarySyncEngine<FakeShards> {
    let db = Database::open(DatabaseKind::Dictionary, dir.join("dictionary.db"))
        .await
        .unwrap();
    let checkpoints = CheckpointStore::open(dir.join("checkpoints.json"))
        .await
        .unwrap();
    DictionarySyncEngine::new(Arc::new(db), Arc::new(checkpoints), source)
        .unwrap()
        .with_options(fast_options())
}

async fn row_count(dir: &Path, lang: Language) -> i64 {
    let db = Database::open(DatabaseKind::Dictionary, dir.join("dictionary.db"))
        .await
        .unwrap();
    let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", lang.table_name()))
        .fetch_one(&db.pool().await)
        .await
        .unwrap();
    let count = row.get("count");
    db.close().await;
    count
}

fn all_shards_entries() -> u64 {
    (SHARD_COUNT * ENTRIES_PER_SHARD) as u64
}

#[tokio::test]
async fn test_failed_shard_is_skipped_and_rest_downloads() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(
        dir.path(),
        FakeShards::default().with('m', Shard::ServerError),
    )
    .await;

    let mut progress: Vec<DownloadProgress> = Vec::new();
    let report = engine
        .download_language(Language::Spanish, |p| progress.push(p))
        .await
        .unwrap();

    assert_eq!(report.status, DownloadStatus::Downloaded);
    assert_eq!(report.entries_processed, 25 * ENTRIES_PER_SHARD as u64);
    assert_eq!(report.failed_letters, vec!['m']);
    assert_eq!(report.fetched_shards, 25);
    assert!(engine.is_language_downloaded(Language::Spanish).await.unwrap());

    // 500 is transient, so the whole budget was spent on it.
    assert_eq!(engine_source_calls(&engine, 'm'), 3);

    // Progress only for stored shards, monotonically increasing.
    assert_eq!(progress.len(), 25);
    assert!(progress.iter().all(|p| p.letter != 'm'));
    assert!(progress.windows(2).all(|w| w[0].percent_complete <= w[1].percent_complete));
    assert_eq!(progress.last().unwrap().percent_complete, 100);
    assert_eq!(progress.last().unwrap().entries_processed, report.entries_processed);

    let found = engine.lookup("  AWORD2 ", Language::Spanish).await.unwrap().unwrap();
    assert_eq!(found.word, "aword2");
    assert_eq!(found.definition, "definition 2 of a");
    assert!(engine.lookup("mword0", Language::Spanish).await.unwrap().is_none());

    assert!(engine.checkpoints().get(Language::Spanish).await.is_none());
    assert!(matches!(
        engine.language_status(Language::Spanish).await.unwrap(),
        LanguageStatus::Downloaded { completed_at: Some(_) }
    ));
}

fn engine_source_calls(engine: &DictionarySyncEngine<FakeShards>, letter: char) -> usize {
    engine_source(engine).calls_for(letter)
}

fn engine_source(engine: &DictionarySyncEngine<FakeShards>) -> &FakeShards {
    engine.source()
}

#[tokio::test]
async fn test_second_download_fetches_nothing() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path(), FakeShards::default()).await;

    let first = engine
        .download_language(Language::French, |_| {})
        .await
        .unwrap();
    assert_eq!(first.status, DownloadStatus::Downloaded);
    let calls = engine_source(&engine).calls().len();
    assert_eq!(calls, SHARD_COUNT);

    let second = engine
        .download_language(Language::French, |_| {})
        .await
        .unwrap();
    assert_eq!(second.status, DownloadStatus::AlreadyDownloaded);
    assert_eq!(second.fetched_shards, 0);
    assert_eq!(engine_source(&engine).calls().len(), calls);
}

#[tokio::test]
async fn test_completed_download_drops_leftover_checkpoint() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path(), FakeShards::default()).await;
    engine
        .download_language(Language::German, |_| {})
        .await
        .unwrap();

    // Stored shards survive a crash that lands before the checkpoint is removed.
    engine
        .checkpoints()
        .put(
            Language::German,
            DownloadCheckpoint {
                next_shard_index: SHARD_COUNT,
                entries_processed: all_shards_entries(),
            },
        )
        .await
        .unwrap();

    let report = engine
        .download_language(Language::German, |_| {})
        .await
        .unwrap();
    assert_eq!(report.status, DownloadStatus::AlreadyDownloaded);
    assert!(engine.checkpoints().get(Language::German).await.is_none());
    assert!(engine.recover_interrupted().await.unwrap().is_empty());

    let reopened = CheckpointStore::open(dir.path().join("checkpoints.json"))
        .await
        .unwrap();
    assert!(reopened.interrupted().await.is_empty());
}

#[tokio::test]
async fn test_all_shards_failing_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let source = ('a'..='z').fold(FakeShards::default(), |source, letter| {
        source.with(letter, Shard::NotFound)
    });
    let engine = open_engine(dir.path(), source).await;

    let report = engine
        .download_language(Language::German, |_| {})
        .await
        .unwrap();

    assert_eq!(report.status, DownloadStatus::Failed);
    assert_eq!(report.entries_processed, 0);
    assert_eq!(report.failed_letters.len(), SHARD_COUNT);
    // 404 is permanent: one attempt per shard.
    assert_eq!(engine_source(&engine).calls().len(), SHARD_COUNT);

    assert!(!engine.is_language_downloaded(Language::German).await.unwrap());
    assert_eq!(
        engine.checkpoints().get(Language::German).await,
        Some(DownloadCheckpoint {
            next_shard_index: SHARD_COUNT,
            entries_processed: 0,
        })
    );
    assert_eq!(
        engine.language_status(Language::German).await.unwrap(),
        LanguageStatus::NotDownloaded
    );

    // A retry with a healthy host starts over from the first shard.
    let engine = open_engine(dir.path(), FakeShards::default()).await;
    let report = engine
        .download_language(Language::German, |_| {})
        .await
        .unwrap();
    assert_eq!(report.status, DownloadStatus::Downloaded);
    assert_eq!(report.entries_processed, all_shards_entries());
    assert_eq!(engine_source(&engine).calls().first(), Some(&'a'));
}

#[tokio::test]
async fn test_empty_shards_only_is_a_failed_pass() {
    let dir = TempDir::new().unwrap();
    let source = ('a'..='z').fold(FakeShards::default(), |source, letter| {
        source.with(letter, Shard::Empty)
    });
    let engine = open_engine(dir.path(), source).await;

    let report = engine
        .download_language(Language::Italian, |_| {})
        .await
        .unwrap();

    assert_eq!(report.status, DownloadStatus::Failed);
    assert!(report.failed_letters.is_empty());
    assert!(!engine.is_language_downloaded(Language::Italian).await.unwrap());
}

/// Run a download until the source starts fetching `stop_at`, then drop it
/// as a crash would.
async fn interrupt_at(dir: &Path, lang: Language, stop_at: char) {
    let started = Arc::new(Notify::new());
    let source = FakeShards::default().with(
        stop_at,
        Shard::Gated {
            started: started.clone(),
            release: Arc::new(Notify::new()),
        },
    );
    let engine = open_engine(dir, source).await;

    tokio::select! {
        result = engine.download_language(lang, |_| {}) => {
            panic!("download finished before the crash point: {result:?}");
        }
        () = started.notified() => {}
    }
}

#[tokio::test]
async fn test_resume_after_interruption() {
    let dir = TempDir::new().unwrap();
    interrupt_at(dir.path(), Language::Spanish, 'f').await;

    // Restart: fresh handles over the same files.
    let engine = open_engine(dir.path(), FakeShards::default()).await;
    let checkpoint = engine.checkpoints().get(Language::Spanish).await.unwrap();
    assert_eq!(checkpoint.next_shard_index, 5);
    assert_eq!(checkpoint.entries_processed, 5 * ENTRIES_PER_SHARD as u64);
    assert_eq!(
        engine.language_status(Language::Spanish).await.unwrap(),
        LanguageStatus::Downloading {
            next_shard_index: 5,
            entries_processed: 5 * ENTRIES_PER_SHARD as u64,
            active: true,
        }
    );

    assert_eq!(
        engine.recover_interrupted().await.unwrap(),
        vec![Language::Spanish]
    );
    assert!(!engine.checkpoints().is_downloading(Language::Spanish).await);

    let report = engine
        .download_language(Language::Spanish, |_| {})
        .await
        .unwrap();

    assert_eq!(report.status, DownloadStatus::Downloaded);
    assert_eq!(report.fetched_shards, SHARD_COUNT - 5);
    assert_eq!(report.entries_processed, all_shards_entries());
    let calls = engine_source(&engine).calls();
    assert_eq!(calls.first(), Some(&'f'));
    assert!(!calls.contains(&'a'));
    assert!(engine.recover_interrupted().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replayed_shard_is_not_double_counted() {
    let dir = TempDir::new().unwrap();
    interrupt_at(dir.path(), Language::Portuguese, 'd').await;

    // Crash between the data write of shard 'c' and its checkpoint.
    {
        let checkpoints = CheckpointStore::open(dir.path().join("checkpoints.json"))
            .await
            .unwrap();
        checkpoints
            .put(
                Language::Portuguese,
                DownloadCheckpoint {
                    next_shard_index: 2,
                    entries_processed: 2 * ENTRIES_PER_SHARD as u64,
                },
            )
            .await
            .unwrap();
    }

    let engine = open_engine(dir.path(), FakeShards::default()).await;
    let report = engine
        .download_language(Language::Portuguese, |_| {})
        .await
        .unwrap();

    assert_eq!(engine_source(&engine).calls().first(), Some(&'c'));
    assert_eq!(report.entries_processed, all_shards_entries());
    assert_eq!(
        row_count(dir.path(), Language::Portuguese).await,
        i64::try_from(all_shards_entries()).unwrap()
    );
}

#[tokio::test]
async fn test_delete_language_restores_not_downloaded() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path(), FakeShards::default()).await;

    engine
        .download_language(Language::English, |_| {})
        .await
        .unwrap();
    assert!(engine.lookup("bword1", Language::English).await.unwrap().is_some());

    engine.delete_language(Language::English).await.unwrap();

    assert!(!engine.is_language_downloaded(Language::English).await.unwrap());
    assert!(engine.lookup("bword1", Language::English).await.unwrap().is_none());
    assert_eq!(
        engine.language_status(Language::English).await.unwrap(),
        LanguageStatus::NotDownloaded
    );
    assert_eq!(row_count(dir.path(), Language::English).await, 0);
}

#[tokio::test]
async fn test_delete_interrupted_download_clears_checkpoint() {
    let dir = TempDir::new().unwrap();
    interrupt_at(dir.path(), Language::French, 'k').await;

    let engine = open_engine(dir.path(), FakeShards::default()).await;
    engine.delete_language(Language::French).await.unwrap();

    assert!(engine.checkpoints().get(Language::French).await.is_none());
    assert!(!engine.checkpoints().is_downloading(Language::French).await);
    assert!(engine.recover_interrupted().await.unwrap().is_empty());
    assert_eq!(row_count(dir.path(), Language::French).await, 0);
}

#[tokio::test]
async fn test_delete_aborts_running_download() {
    let dir = TempDir::new().unwrap();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = FakeShards::default().with(
        'c',
        Shard::Gated {
            started: started.clone(),
            release: release.clone(),
        },
    );
    let engine = Arc::new(open_engine(dir.path(), source).await);

    let download = tokio::spawn({
        let engine = engine.clone();
        async move { engine.download_language(Language::Spanish, |_| {}).await }
    });
    started.notified().await;

    engine.delete_language(Language::Spanish).await.unwrap();
    release.notify_one();

    let report = download.await.unwrap().unwrap();
    assert_eq!(report.status, DownloadStatus::Aborted);
    assert!(!engine.is_language_downloaded(Language::Spanish).await.unwrap());
    assert!(engine.checkpoints().get(Language::Spanish).await.is_none());
    assert!(engine.lookup("cword0", Language::Spanish).await.unwrap().is_none());
    assert_eq!(
        engine.language_status(Language::Spanish).await.unwrap(),
        LanguageStatus::NotDownloaded
    );
}

#[tokio::test]
async fn test_delete_waits_for_running_download_to_stop() {
    let dir = TempDir::new().unwrap();
    let started = Arc::new(Notify::new());
    let source = FakeShards::default().with(
        'h',
        Shard::Gated {
            started: started.clone(),
            release: Arc::new(Notify::new()),
        },
    );
    // The gated shard would only give up after a minute.
    let engine = open_engine(dir.path(), source).await.with_options(SyncOptions {
        shard_timeout: Duration::from_secs(60),
        max_attempts: 1,
        retry_backoff: Duration::from_millis(1),
    });
    let engine = Arc::new(engine);

    let download = tokio::spawn({
        let engine = engine.clone();
        async move { engine.download_language(Language::Italian, |_| {}).await }
    });
    started.notified().await;

    tokio::time::timeout(
        Duration::from_secs(5),
        engine.delete_language(Language::Italian),
    )
    .await
    .unwrap()
    .unwrap();

    // Nothing the download wrote outlives the delete.
    assert!(engine.checkpoints().get(Language::Italian).await.is_none());
    assert!(!engine.checkpoints().is_downloading(Language::Italian).await);
    assert_eq!(
        engine.language_status(Language::Italian).await.unwrap(),
        LanguageStatus::NotDownloaded
    );
    assert_eq!(row_count(dir.path(), Language::Italian).await, 0);

    let report = download.await.unwrap().unwrap();
    assert_eq!(report.status, DownloadStatus::Aborted);
    assert!(engine.checkpoints().get(Language::Italian).await.is_none());
    assert_eq!(row_count(dir.path(), Language::Italian).await, 0);
}

#[tokio::test]
async fn test_cancelled_download_clears_marker_and_resumes() {
    let dir = TempDir::new().unwrap();
    let started = Arc::new(Notify::new());
    let source = FakeShards::default().with(
        'k',
        Shard::Gated {
            started: started.clone(),
            release: Arc::new(Notify::new()),
        },
    );
    let engine = open_engine(dir.path(), source).await;

    let report = engine
        .download_language_until(Language::French, |_| {}, started.notified())
        .await
        .unwrap();
    assert_eq!(report.status, DownloadStatus::Interrupted);
    assert_eq!(report.entries_processed, 10 * ENTRIES_PER_SHARD as u64);

    assert!(!engine.checkpoints().is_downloading(Language::French).await);
    assert_eq!(
        engine.language_status(Language::French).await.unwrap(),
        LanguageStatus::Downloading {
            next_shard_index: 10,
            entries_processed: 10 * ENTRIES_PER_SHARD as u64,
            active: false,
        }
    );
    drop(engine);

    let engine = open_engine(dir.path(), FakeShards::default()).await;
    assert_eq!(
        engine.recover_interrupted().await.unwrap(),
        vec![Language::French]
    );
    let report = engine
        .download_language(Language::French, |_| {})
        .await
        .unwrap();
    assert_eq!(report.status, DownloadStatus::Downloaded);
    assert_eq!(report.entries_processed, all_shards_entries());
    assert_eq!(engine_source(&engine).calls().first(), Some(&'k'));
}

#[tokio::test]
async fn test_same_language_twice_is_rejected() {
    let dir = TempDir::new().unwrap();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = FakeShards::default().with(
        'a',
        Shard::Gated {
            started: started.clone(),
            release: release.clone(),
        },
    );
    let engine = Arc::new(open_engine(dir.path(), source).await);

    let download = tokio::spawn({
        let engine = engine.clone();
        async move { engine.download_language(Language::Spanish, |_| {}).await }
    });
    started.notified().await;

    assert!(matches!(
        engine.language_status(Language::Spanish).await.unwrap(),
        LanguageStatus::Downloading { active: true, .. }
    ));
    let second = engine.download_language(Language::Spanish, |_| {}).await;
    assert!(matches!(
        second,
        Err(Error::DownloadInProgress(Language::Spanish))
    ));

    release.notify_one();
    let report = download.await.unwrap().unwrap();
    assert_eq!(report.status, DownloadStatus::Downloaded);
}

#[tokio::test]
async fn test_languages_download_concurrently() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path(), FakeShards::default()).await;

    let (es, fr) = tokio::join!(
        engine.download_language(Language::Spanish, |_| {}),
        engine.download_language(Language::French, |_| {}),
    );

    assert_eq!(es.unwrap().entries_processed, all_shards_entries());
    assert_eq!(fr.unwrap().entries_processed, all_shards_entries());
    assert!(engine.is_language_downloaded(Language::Spanish).await.unwrap());
    assert!(engine.is_language_downloaded(Language::French).await.unwrap());
    assert!(engine.checkpoints().downloading().await.is_empty());

    // Both checkpoint updates reached the file, neither clobbered the other.
    let reopened = CheckpointStore::open(dir.path().join("checkpoints.json"))
        .await
        .unwrap();
    assert!(reopened.interrupted().await.is_empty());
}

#[tokio::test]
async fn test_flaky_shard_is_retried() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(
        dir.path(),
        FakeShards::default().with('q', Shard::Flaky(AtomicU32::new(2))),
    )
    .await;

    let report = engine
        .download_language(Language::Spanish, |_| {})
        .await
        .unwrap();

    assert!(report.failed_letters.is_empty());
    assert_eq!(report.entries_processed, all_shards_entries());
    assert_eq!(engine_source_calls(&engine, 'q'), 3);
}

#[tokio::test]
async fn test_hanging_shard_times_out() {
    let dir = TempDir::new().unwrap();
    let source = FakeShards::default().with('x', Shard::Hang);
    let engine = open_engine(dir.path(), source).await.with_options(SyncOptions {
        shard_timeout: Duration::from_millis(50),
        max_attempts: 2,
        retry_backoff: Duration::from_millis(1),
    });

    let report = engine
        .download_language(Language::English, |_| {})
        .await
        .unwrap();

    assert_eq!(report.status, DownloadStatus::Downloaded);
    assert_eq!(report.failed_letters, vec!['x']);
    assert_eq!(engine_source_calls(&engine, 'x'), 2);
}

#[tokio::test]
async fn test_dropped_table_is_recreated() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path(), FakeShards::default()).await;

    {
        let db = Database::open(DatabaseKind::Dictionary, dir.path().join("dictionary.db"))
            .await
            .unwrap();
        sqlx::query("DROP TABLE dict_es")
            .execute(&db.pool().await)
            .await
            .unwrap();
        db.close().await;
    }

    // Lookups treat the missing table as a miss.
    assert!(engine.lookup("aword0", Language::Spanish).await.unwrap().is_none());

    let report = engine
        .download_language(Language::Spanish, |_| {})
        .await
        .unwrap();
    assert_eq!(report.status, DownloadStatus::Downloaded);
    assert!(engine.lookup("aword0", Language::Spanish).await.unwrap().is_some());
}
