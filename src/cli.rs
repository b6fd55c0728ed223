//! Command-line interface for inspecting and maintaining the lesson cache
//!
//! This module handles parsing of CLI arguments using clap and runs the
//! selected maintenance command against a `LocalStorageCache`.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::info;

use crate::cache::{CacheError, LocalStorageCache, Lookup};
use crate::config::{Config, ConfigError};

/// Error types for CLI commands
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// No cache directory was configured and none could be derived
    #[error("Could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,

    /// `show` found nothing usable for the key
    #[error("No live entry for '{key}': {reason}")]
    NoEntry { key: String, reason: String },

    #[error("Failed to format entry: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Lingocache - inspect and maintain the tutor's local lesson cache
#[derive(Parser, Debug)]
#[command(name = "lingocache")]
#[command(about = "Inspect and maintain the local lesson cache")]
#[command(version)]
pub struct Cli {
    /// Path to the config file (defaults to the XDG config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Cache directory, overriding the config file
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Cache maintenance commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show file counts and disk usage
    Stats,
    /// List cached keys
    Keys,
    /// Print the payload of a live entry as JSON
    Show { key: String },
    /// Remove one entry
    Delete { key: String },
    /// Remove every entry
    Clear,
    /// Remove expired and corrupt entries
    Prune,
}

/// Loads the config named on the command line (or the default one) and
/// applies command-line overrides
pub fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let mut config = match cli.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load_from(&path)?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.cache_dir {
        config.cache.dir = Some(dir.clone());
    }
    Ok(config)
}

/// Runs the selected command, writing human-readable output to `out`
pub async fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let cache: LocalStorageCache =
        LocalStorageCache::from_config(&config.cache).ok_or(CliError::NoCacheDir)?;

    match &cli.command {
        Command::Stats => {
            let stats = cache.stats().await?;
            writeln!(out, "Cache directory: {}", cache.cache_dir().display())?;
            writeln!(out, "Total files:     {}", stats.total_files)?;
            writeln!(out, "Valid entries:   {}", stats.valid_entries)?;
            writeln!(out, "Expired entries: {}", stats.expired_entries)?;
            writeln!(out, "Total size:      {} bytes", stats.total_size_bytes)?;
        }
        Command::Keys => {
            for key in cache.keys().await? {
                writeln!(out, "{}", key)?;
            }
        }
        Command::Show { key } => {
            let reason = match cache.lookup(key).await {
                Lookup::Hit(payload) => {
                    writeln!(out, "{}", serde_json::to_string_pretty(&payload)?)?;
                    return Ok(());
                }
                Lookup::Missing => "not cached".to_string(),
                Lookup::Expired => "expired".to_string(),
                Lookup::Corrupt(reason) => format!("corrupt: {}", reason),
                Lookup::Unreadable(reason) => format!("unreadable: {}", reason),
            };
            return Err(CliError::NoEntry {
                key: key.clone(),
                reason,
            });
        }
        Command::Delete { key } => {
            cache.delete(key).await?;
            info!(key = key.as_str(), "Deleted cache entry");
            writeln!(out, "Deleted {}", key)?;
        }
        Command::Clear => {
            cache.clear().await?;
            info!(dir = %cache.cache_dir().display(), "Cleared cache");
            writeln!(out, "Cache cleared")?;
        }
        Command::Prune => {
            let removed = cache.clear_expired().await?;
            info!(removed, "Pruned expired cache entries");
            writeln!(out, "Removed {} expired entries", removed)?;
        }
    }
    Ok(())
}
