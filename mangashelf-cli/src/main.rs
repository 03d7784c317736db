//! mangashelf - Browse the Comick catalog from the terminal
//!
//! Reads go through the persistent query cache, so repeated commands within
//! the fresh window are served without touching the network.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use mangashelf_core::cache::persist::{PersistenceBridge, RestoreOutcome, SqlitePersister};
use mangashelf_core::cache::QueryCache;
use mangashelf_core::config::ShelfConfig;
use mangashelf_core::provider::{ProviderRegistry, DEFAULT_LIMIT};
use mangashelf_core::shelf::Shelf;

mod browse_cli;
mod cache_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mangashelf")]
#[command(about = "Browse the Comick manga catalog", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (overrides MANGASHELF_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for stderr output
    #[arg(long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Do not read or write the on-disk query cache
    #[arg(long, global = true)]
    no_persist: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Currently trending titles
    Trending {
        #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Titles with the newest chapters
    Latest {
        #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Search titles by name
    Search {
        query: String,

        #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Details of one title
    Show {
        /// Slug or internal id
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Chapters of a title
    Chapters {
        /// Slug or internal id
        id: String,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Page images of a chapter
    Pages {
        chapter_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Inspect or clear the on-disk query cache
    Cache {
        #[command(subcommand)]
        command: cache_cli::CacheCommand,
    },
}

fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::new(log_level.to_filter_directive());

    // stdout carries command output, so logs go to stderr
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// A shelf plus the persistence bridge feeding its cache, if any
struct Session {
    shelf: Shelf,
    bridge: Option<PersistenceBridge>,
}

impl Session {
    async fn open(config: &ShelfConfig, persist: bool) -> Result<Self> {
        let registry = Arc::new(
            ProviderRegistry::from_config(config).context("Failed to set up catalog provider")?,
        );
        let policy = config.cache.policy();

        if !(persist && config.persistence.enabled) {
            debug!("Query cache persistence disabled");
            return Ok(Self {
                shelf: Shelf::new(registry, QueryCache::new(policy)),
                bridge: None,
            });
        }

        let path = config.database_path()?;
        let persister = match SqlitePersister::open(&path) {
            Ok(persister) => persister,
            Err(e) => {
                warn!(
                    "Cannot open cache database {}: {}; continuing without it",
                    path.display(),
                    e
                );
                return Ok(Self {
                    shelf: Shelf::new(registry, QueryCache::new(policy)),
                    bridge: None,
                });
            }
        };

        let cache = QueryCache::gated(policy);
        let bridge =
            PersistenceBridge::start(cache.clone(), persister, config.persistence.options()).await;
        if let RestoreOutcome::Restored(count) = bridge.restore_outcome() {
            debug!("Loaded {} cached queries from {}", count, path.display());
        }

        Ok(Self {
            shelf: Shelf::new(registry, cache),
            bridge: Some(bridge),
        })
    }

    async fn close(self) {
        if let Some(bridge) = self.bridge {
            if let Err(e) = bridge.shutdown().await {
                warn!("Failed to save query cache: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level, cli.log_json);

    let config = ShelfConfig::load(cli.config.as_deref())?;

    // Cache maintenance works on the database directly, without a session
    // that would write the snapshot back on exit
    let command = match cli.command {
        Command::Cache { command } => return cache_cli::execute(&command, &config).await,
        command => command,
    };

    let session = Session::open(&config, !cli.no_persist).await?;
    let result = run(&session.shelf, command).await;
    session.close().await;
    result
}

async fn run(shelf: &Shelf, command: Command) -> Result<()> {
    match command {
        Command::Trending { limit, json } => browse_cli::trending(shelf, limit, json).await,
        Command::Latest { limit, json } => browse_cli::latest(shelf, limit, json).await,
        Command::Search { query, limit, json } => {
            browse_cli::search(shelf, &query, limit, json).await
        }
        Command::Show { id, json } => browse_cli::show(shelf, &id, json).await,
        Command::Chapters { id, limit, json } => {
            browse_cli::chapters(shelf, &id, limit, json).await
        }
        Command::Pages { chapter_id, json } => browse_cli::pages(shelf, &chapter_id, json).await,
        Command::Cache { .. } => bail!("Cache commands do not run inside a catalog session"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mangashelf",
            "search",
            "one piece",
            "--limit",
            "5",
            "--no-persist",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(cli.no_persist);
        assert!(matches!(cli.log_level, LogLevel::Debug));
        match cli.command {
            Command::Search { query, limit, json } => {
                assert_eq!(query, "one piece");
                assert_eq!(limit, 5);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_chapters_limit_is_optional() {
        let cli = Cli::try_parse_from(["mangashelf", "chapters", "solo-leveling"]).unwrap();
        assert!(matches!(cli.command, Command::Chapters { limit: None, .. }));
    }
}
