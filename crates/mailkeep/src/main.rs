//! `mailkeep` - incremental IMAP archiver
//!
//! Pulls new messages from configured IMAP folders into an append-only file
//! archive and a full-text index, and answers searches over what it holds.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod commands;
mod config;

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mailkeep_core::ArchiveStore;

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "mailkeep", version, about = "Incremental IMAP archiver and search index")]
struct Cli {
    /// Configuration file (JSON).
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Archive new messages from every configured folder.
    Sync {
        /// Process at most N messages per folder this run.
        #[arg(long, value_name = "N")]
        max_messages: Option<usize>,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Full-text search over archived messages.
    Search {
        /// Search words; every word must match as a prefix.
        #[arg(required = true)]
        query: Vec<String>,
        /// Maximum results (1-200).
        #[arg(long, short, default_value_t = 20)]
        limit: u32,
    },
    /// Recompute checksums of every archived message.
    Verify,
    /// Show archive totals and top senders.
    Stats {
        /// Number of senders and domains to list.
        #[arg(long, default_value_t = 10)]
        top: u32,
    },
    /// Show the stored cursor of every synced folder.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(config.log_path.as_deref())?;

    let mut stdout = io::stdout().lock();
    let ok = match cli.command {
        Command::Sync { max_messages, json } => {
            config.ensure_valid()?;
            info!(accounts = config.accounts.len(), "starting sync");
            !commands::sync(&config, max_messages, json, &mut stdout).await?
        }
        Command::Search { query, limit } => {
            let db = commands::open_database(&config).await?;
            commands::search(&db.index(), &query.join(" "), limit, &mut stdout).await?;
            db.close().await;
            true
        }
        Command::Verify => {
            let db = commands::open_database(&config).await?;
            let archive = ArchiveStore::new(&config.archive_root);
            let report = commands::verify(&db.index(), &archive, &mut stdout).await?;
            db.close().await;
            report.is_clean()
        }
        Command::Stats { top } => {
            let db = commands::open_database(&config).await?;
            commands::stats(&db.index(), top, &mut stdout).await?;
            db.close().await;
            true
        }
        Command::Status => {
            let db = commands::open_database(&config).await?;
            commands::status(&db, &mut stdout).await?;
            db.close().await;
            true
        }
    };
    stdout.flush()?;

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Installs the stderr subscriber, plus a plain-text file layer when a log
/// path is configured.
fn init_logging(log_path: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mailkeep=info,mailkeep_core=info".into());

    let file_layer = match log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from(["mailkeep", "search", "invoice", "march", "--limit", "5"]);
        match cli.command {
            Command::Search { query, limit } => {
                assert_eq!(query, vec!["invoice", "march"]);
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_sync_with_global_config() {
        let cli = Cli::parse_from(["mailkeep", "sync", "--json", "--config", "/tmp/c.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(matches!(
            cli.command,
            Command::Sync {
                max_messages: None,
                json: true
            }
        ));
    }
}
