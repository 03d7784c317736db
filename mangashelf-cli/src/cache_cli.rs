//! On-disk query cache maintenance

use anyhow::{Context, Result};
use clap::Subcommand;
use std::collections::BTreeMap;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use mangashelf_core::cache::persist::SqlitePersister;
use mangashelf_core::config::ShelfConfig;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show where the cache lives and what it holds
    Info {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the stored snapshot
    Clear,
}

/// Table row for cached entries per operation
#[derive(Tabled)]
struct OperationRow {
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Entries")]
    entries: usize,
}

pub async fn execute(command: &CacheCommand, config: &ShelfConfig) -> Result<()> {
    let path = config.database_path()?;
    let persister = SqlitePersister::open(&path)
        .with_context(|| format!("Failed to open cache database: {}", path.display()))?;

    match command {
        CacheCommand::Info { json } => execute_info(&persister, config, &path, *json).await,
        CacheCommand::Clear => {
            if persister.remove().await? {
                println!("Cleared cached queries in {}", path.display());
            } else {
                println!("Cache at {} is already empty", path.display());
            }
            Ok(())
        }
    }
}

async fn execute_info(
    persister: &SqlitePersister,
    config: &ShelfConfig,
    path: &std::path::Path,
    json: bool,
) -> Result<()> {
    let stored = persister
        .load()
        .await
        .context("Stored cache snapshot is unreadable")?;

    let mut per_operation: BTreeMap<String, usize> = BTreeMap::new();
    if let Some(stored) = &stored {
        for key in stored.cache.entries.keys() {
            let operation = key.operation().unwrap_or_else(|| "other".to_string());
            *per_operation.entry(operation).or_default() += 1;
        }
    }

    let saved_at = stored
        .as_ref()
        .and_then(|s| chrono::DateTime::from_timestamp_millis(s.timestamp))
        .map(|t| t.to_rfc3339());

    if json {
        let info = serde_json::json!({
            "database": path.display().to_string(),
            "buster": stored.as_ref().map(|s| s.buster.clone()),
            "current_buster": config.persistence.buster,
            "saved_at": saved_at,
            "entries": per_operation.values().sum::<usize>(),
            "operations": per_operation,
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Database: {}", path.display());
    let Some(stored) = stored else {
        println!("No cached queries stored.");
        return Ok(());
    };

    println!("Saved:    {}", saved_at.unwrap_or_else(|| "unknown".to_string()));
    if stored.buster == config.persistence.buster {
        println!("Format:   {}", stored.buster);
    } else {
        println!(
            "Format:   {} (current is {}; will be discarded on next run)",
            stored.buster, config.persistence.buster
        );
    }

    let rows: Vec<OperationRow> = per_operation
        .into_iter()
        .map(|(operation, entries)| OperationRow { operation, entries })
        .collect();
    if rows.is_empty() {
        println!("No cached queries stored.");
    } else {
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()))
            .to_string();
        println!("{table}");
    }
    Ok(())
}
