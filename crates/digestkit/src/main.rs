//! digestkit - local summary cache and offline dictionaries.
//!
//! A command-line host for `digestkit-core`: downloads and manages offline
//! dictionaries, resolves word definitions and maintains the result cache.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod app;
mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use digestkit_core::Settings;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app::App;
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "digestkit=info,digestkit_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let settings_path = cli.config.clone().unwrap_or_else(default_settings_path);
    let settings = Settings::load(&settings_path)
        .await
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    info!("Settings loaded from {}", settings_path.display());

    let app = App::open(settings, &default_data_dir()).await?;
    let result = match cli.command {
        Command::Download { lang } => app.download(lang).await,
        Command::Lookup { word, lang } => app.lookup(&word, lang).await,
        Command::Define { word, lang } => app.define(&word, lang).await,
        Command::Status => app.status().await,
        Command::Delete { lang } => app.delete(lang).await,
        Command::Sweep => app.sweep().await,
        Command::Resume => app.resume().await,
    };

    app.close().await;
    result
}

/// `{config_dir}/digestkit/settings.json`.
fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("digestkit")
        .join("settings.json")
}

/// `{data_dir}/digestkit`, used when the settings name no data directory.
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("digestkit")
}
