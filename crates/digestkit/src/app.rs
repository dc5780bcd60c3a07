//! Opened stores and the subcommands that drive them.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use digestkit_core::{
    CacheStore, CheckpointStore, Database, DatabaseKind, DefinitionOrigin, DictionarySyncEngine,
    DownloadReport, DownloadStatus, Language, LanguageStatus, Settings, ShardEntry, ShardSource,
    WordDefinitionStore, WordLookup,
};
use digestkit_remote::{DefinitionClient, ShardClient};
use tracing::{info, warn};

/// Shard source that reports a configuration error until a shard host is set.
pub struct ConfiguredShards(Option<ShardClient>);

impl ConfiguredShards {
    fn from_settings(settings: &Settings) -> Result<Self> {
        if settings.shard_base_url.trim().is_empty() {
            return Ok(Self(None));
        }

        let client = ShardClient::new(&settings.shard_base_url)
            .and_then(|client| client.with_timeout(settings.sync_options().shard_timeout))
            .context("Invalid shard_base_url")?;
        Ok(Self(Some(client)))
    }
}

impl ShardSource for ConfiguredShards {
    async fn fetch_shard(
        &self,
        language: Language,
        letter: char,
    ) -> digestkit_core::Result<Vec<ShardEntry>> {
        match &self.0 {
            Some(client) => ShardSource::fetch_shard(client, language, letter).await,
            None => Err(digestkit_core::Error::Config(
                "shard_base_url is not set".to_string(),
            )),
        }
    }
}

/// Everything a subcommand may need, opened once.
pub struct App {
    settings: Settings,
    cache_db: Arc<Database>,
    dictionary_db: Arc<Database>,
    dictionary: Arc<DictionarySyncEngine<ConfiguredShards>>,
}

impl App {
    /// Open both databases and the checkpoint file under the data directory.
    pub async fn open(settings: Settings, default_data_dir: &Path) -> Result<Self> {
        let paths = settings.paths(default_data_dir);
        info!(
            "Opening {} and {}",
            paths.cache_db.display(),
            paths.dictionary_db.display()
        );

        let cache_db = Database::open(DatabaseKind::Cache, &paths.cache_db)
            .await
            .context("Failed to open cache database")?;
        let dictionary_db = Arc::new(
            Database::open(DatabaseKind::Dictionary, &paths.dictionary_db)
                .await
                .context("Failed to open dictionary database")?,
        );
        let checkpoints = CheckpointStore::open(&paths.checkpoints)
            .await
            .context("Failed to open checkpoint file")?;

        let dictionary = DictionarySyncEngine::new(
            dictionary_db.clone(),
            Arc::new(checkpoints),
            ConfiguredShards::from_settings(&settings)?,
        )?
        .with_options(settings.sync_options());

        Ok(Self {
            settings,
            cache_db: Arc::new(cache_db),
            dictionary_db,
            dictionary: Arc::new(dictionary),
        })
    }

    /// Download one language, printing progress. Ctrl-C stops the download;
    /// the checkpoint lets `resume` continue it.
    pub async fn download(&self, lang: Language) -> Result<()> {
        self.download_until_interrupted(lang).await.map(|_| ())
    }

    /// Returns false if Ctrl-C stopped the download.
    async fn download_until_interrupted(&self, lang: Language) -> Result<bool> {
        if self.settings.shard_base_url.trim().is_empty()
            && !self.dictionary.is_language_downloaded(lang).await?
        {
            anyhow::bail!("shard_base_url is not set; add it to the settings file");
        }

        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let report = self
            .dictionary
            .download_language_until(
                lang,
                |progress| {
                    println!(
                        "{} {:>3}%  {}.json  {} entries",
                        progress.language,
                        progress.percent_complete,
                        progress.letter,
                        progress.entries_processed
                    );
                },
                ctrl_c,
            )
            .await?;

        if report.status == DownloadStatus::Interrupted {
            warn!("Download of {} interrupted; run `digestkit resume` to continue", lang);
            return Ok(false);
        }
        print_report(&report);
        Ok(true)
    }

    /// Offline-only lookup.
    pub async fn lookup(&self, word: &str, lang: Language) -> Result<()> {
        match self.dictionary.lookup(word, lang).await? {
            Some(entry) => println!(
                "{} ({}): {}",
                entry.word, entry.part_of_speech, entry.definition
            ),
            None => println!("{word:?} not found in the {lang} dictionary"),
        }
        Ok(())
    }

    /// Full lookup with cached and remote fallbacks.
    pub async fn define(&self, word: &str, lang: Language) -> Result<()> {
        let definitions = Arc::new(WordDefinitionStore::new(self.cache_db.clone()));
        let remote = DefinitionClient::new(&self.settings.definition_api_host)
            .context("Invalid definition_api_host")?;
        let lookup = WordLookup::new(self.dictionary.clone(), definitions).with_remote(remote);

        match lookup.define(word, lang).await? {
            Some(def) => {
                let origin = match def.origin {
                    DefinitionOrigin::Offline => "offline",
                    DefinitionOrigin::Cached => "cached",
                    DefinitionOrigin::Remote => "remote",
                };
                println!(
                    "{} ({}): {}  [{origin}]",
                    def.word, def.part_of_speech, def.definition
                );
            }
            None => println!("No definition found for {word:?}"),
        }
        Ok(())
    }

    /// Print every language's state.
    pub async fn status(&self) -> Result<()> {
        for (lang, status) in self.dictionary.statuses().await? {
            let line = match status {
                LanguageStatus::NotDownloaded => "not downloaded".to_string(),
                LanguageStatus::Downloading {
                    next_shard_index,
                    entries_processed,
                    active,
                } => format!(
                    "{} at shard {next_shard_index}/{} ({entries_processed} entries)",
                    if active { "downloading" } else { "interrupted" },
                    digestkit_core::SHARD_COUNT
                ),
                LanguageStatus::Downloaded { completed_at } => match completed_at {
                    Some(at) => format!("downloaded {}", at.format("%Y-%m-%d %H:%M UTC")),
                    None => "downloaded".to_string(),
                },
            };
            println!("{:<10} {line}", lang.remote_name());
        }

        println!("cache      {} entries", self.cache().len().await?);
        Ok(())
    }

    /// Delete one language.
    pub async fn delete(&self, lang: Language) -> Result<()> {
        self.dictionary.delete_language(lang).await?;
        println!("Deleted the {} dictionary", lang.remote_name());
        Ok(())
    }

    /// Drop expired generic cache entries.
    pub async fn sweep(&self) -> Result<()> {
        let removed = self.cache().sweep().await?;
        println!("Removed {removed} expired cache entries");
        Ok(())
    }

    /// Resume every interrupted download, one language after another.
    pub async fn resume(&self) -> Result<()> {
        let interrupted = self.dictionary.recover_interrupted().await?;
        if interrupted.is_empty() {
            println!("No interrupted downloads");
            return Ok(());
        }

        for lang in interrupted {
            if !self.download_until_interrupted(lang).await? {
                break;
            }
        }
        Ok(())
    }

    fn cache(&self) -> CacheStore {
        CacheStore::new(self.cache_db.clone()).with_default_ttl(self.settings.cache_ttl())
    }

    /// Close both databases.
    pub async fn close(&self) {
        self.cache_db.close().await;
        self.dictionary_db.close().await;
    }
}

fn print_report(report: &DownloadReport) {
    let lang = report.language.remote_name();
    match report.status {
        DownloadStatus::Downloaded => {
            println!("{lang}: downloaded {} entries", report.entries_processed);
        }
        DownloadStatus::AlreadyDownloaded => println!("{lang}: already downloaded"),
        DownloadStatus::Failed => {
            println!("{lang}: no entries stored; try again later");
        }
        DownloadStatus::Aborted => println!("{lang}: download aborted"),
        DownloadStatus::Interrupted => {
            println!("{lang}: interrupted at {} entries", report.entries_processed);
        }
    }

    if !report.failed_letters.is_empty() {
        let letters: String = report.failed_letters.iter().collect();
        println!("{lang}: skipped shards {letters}");
    }
}
