//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use digestkit_core::Language;

/// Local summary cache and offline dictionaries.
#[derive(Parser, Debug)]
#[command(name = "digestkit", version, about)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(short, long, env = "DIGESTKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download (or resume downloading) an offline dictionary.
    Download {
        /// Language code or name (`es`, `Spanish`).
        lang: Language,
    },

    /// Look a word up in the offline dictionary only.
    Lookup {
        /// Word to look up.
        word: String,
        /// Dictionary language.
        #[arg(short, long, default_value = "en")]
        lang: Language,
    },

    /// Define a word: offline first, then cached or remote definitions.
    Define {
        /// Word to define.
        word: String,
        /// Dictionary language.
        #[arg(short, long, default_value = "en")]
        lang: Language,
    },

    /// Show the download state of every language.
    Status,

    /// Delete an offline dictionary and its download progress.
    Delete {
        /// Language code or name.
        lang: Language,
    },

    /// Remove expired entries from the generic cache.
    Sweep,

    /// Resume downloads interrupted by a crash or Ctrl-C.
    Resume,
}
