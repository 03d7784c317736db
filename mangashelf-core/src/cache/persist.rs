//! SQLite persistence for the query cache
//!
//! The whole cache is stored as one JSON row in a key-value table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT, updated_at INTEGER)
//! ```
//!
//! At startup the bridge restores the row into a gated cache and then opens
//! the gate. Afterwards a single writer task listens for cache events and
//! rewrites the row at most one debounce period after the first unsaved
//! change, however busy the cache stays.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{CacheEvent, CacheSnapshot, QueryCache};
use crate::config::DEFAULT_BUSTER;

/// Row key of the snapshot
pub const SNAPSHOT_KEY: &str = "query_cache_v1";

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Persistence writer is not running")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, PersistError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOptions {
    /// Format tag; a stored snapshot with a different tag is ignored
    pub buster: String,
    /// Snapshots older than this are ignored
    pub max_age: Duration,
    /// Longest a change waits before it is written; later changes in the
    /// same window ride along instead of postponing the write
    pub debounce: Duration,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            buster: DEFAULT_BUSTER.to_string(),
            max_age: Duration::from_secs(24 * 60 * 60),
            debounce: Duration::from_secs(1),
        }
    }
}

/// Stored row contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCache {
    pub buster: String,
    /// Epoch millis at serialization
    pub timestamp: i64,
    pub cache: CacheSnapshot,
}

/// Key-value row storage on a SQLite connection
#[derive(Clone)]
pub struct SqlitePersister {
    conn: Arc<Mutex<Connection>>,
    key: String,
}

impl SqlitePersister {
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT,
                updated_at INTEGER
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            key: SNAPSHOT_KEY.to_string(),
        })
    }

    /// Use a different row key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    async fn run<R, F>(&self, op: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Connection, &str) -> rusqlite::Result<R> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let key = self.key.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&conn, &key)
        })
        .await?;
        Ok(result?)
    }

    /// Raw stored value, if any
    pub async fn read(&self) -> Result<Option<String>> {
        self.run(|conn, key| {
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(Option::flatten)
        })
        .await
    }

    /// Replace the stored value
    pub async fn write(&self, value: String, updated_at: i64) -> Result<()> {
        self.run(move |conn, key| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, updated_at],
            )
            .map(|_| ())
        })
        .await
    }

    /// Delete the stored value; `true` when a row existed
    pub async fn remove(&self) -> Result<bool> {
        self.run(|conn, key| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map(|deleted| deleted > 0)
        })
        .await
    }

    pub async fn updated_at(&self) -> Result<Option<i64>> {
        self.run(|conn, key| {
            conn.query_row(
                "SELECT updated_at FROM kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()
            .map(Option::flatten)
        })
        .await
    }

    /// Stored snapshot decoded, if any
    pub async fn load(&self) -> Result<Option<PersistedCache>> {
        match self.read().await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

/// What happened to the stored snapshot at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Snapshot loaded; number of live entries
    Restored(usize),
    /// Nothing stored
    Empty,
    /// Snapshot present but unusable
    Discarded(String),
}

enum Command {
    Flush(oneshot::Sender<Result<usize>>),
    Shutdown(oneshot::Sender<Result<usize>>),
}

/// Keeps a SQLite row in sync with a [`QueryCache`]
pub struct PersistenceBridge {
    cache: QueryCache,
    persister: SqlitePersister,
    restored: RestoreOutcome,
    commands: mpsc::UnboundedSender<Command>,
    writer: JoinHandle<()>,
}

impl PersistenceBridge {
    /// Restore, open the cache's hydration gate, and start the writer.
    ///
    /// Storage problems never fail startup; they are logged and the cache
    /// starts cold.
    pub async fn start(
        cache: QueryCache,
        persister: SqlitePersister,
        options: PersistOptions,
    ) -> Self {
        let restored = restore(&cache, &persister, &options).await;
        let events = cache.subscribe();
        cache.mark_ready();

        let (commands, inbox) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(
            cache.clone(),
            persister.clone(),
            options,
            events,
            inbox,
        ));

        Self {
            cache,
            persister,
            restored,
            commands,
            writer,
        }
    }

    pub fn restore_outcome(&self) -> &RestoreOutcome {
        &self.restored
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn persister(&self) -> &SqlitePersister {
        &self.persister
    }

    /// Write the current snapshot now; returns the number of entries written
    pub async fn flush(&self) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Flush(reply))
            .map_err(|_| PersistError::Stopped)?;
        response.await.map_err(|_| PersistError::Stopped)?
    }

    /// Write a final snapshot and stop the writer
    pub async fn shutdown(self) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(reply))
            .map_err(|_| PersistError::Stopped)?;
        let written = response.await.map_err(|_| PersistError::Stopped)?;
        self.writer.await?;
        written
    }
}

async fn restore(
    cache: &QueryCache,
    persister: &SqlitePersister,
    options: &PersistOptions,
) -> RestoreOutcome {
    let stored = match persister.load().await {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            debug!("No persisted query cache");
            return RestoreOutcome::Empty;
        }
        Err(e) => return discard(persister, format!("unreadable snapshot: {}", e)).await,
    };

    if stored.buster != options.buster {
        return discard(
            persister,
            format!(
                "buster mismatch (stored '{}', current '{}')",
                stored.buster, options.buster
            ),
        )
        .await;
    }

    let age_ms = cache.now_millis().saturating_sub(stored.timestamp);
    let max_age_ms = i64::try_from(options.max_age.as_millis()).unwrap_or(i64::MAX);
    if age_ms > max_age_ms {
        return discard(
            persister,
            format!("snapshot is {}s old", age_ms / 1000),
        )
        .await;
    }

    let restored = cache.restore(stored.cache);
    info!("Restored {} cached queries", restored);
    RestoreOutcome::Restored(restored)
}

async fn discard(persister: &SqlitePersister, reason: String) -> RestoreOutcome {
    warn!("Ignoring persisted query cache: {}", reason);
    if let Err(e) = persister.remove().await {
        warn!("Failed to remove persisted query cache: {}", e);
    }
    RestoreOutcome::Discarded(reason)
}

async fn write_snapshot(
    cache: &QueryCache,
    persister: &SqlitePersister,
    buster: &str,
) -> Result<usize> {
    let snapshot = cache.snapshot();
    let count = snapshot.entries.len();
    let timestamp = cache.now_millis();
    let value = serde_json::to_string(&PersistedCache {
        buster: buster.to_string(),
        timestamp,
        cache: snapshot,
    })?;
    persister.write(value, timestamp).await?;
    debug!("Persisted {} cached queries", count);
    Ok(count)
}

/// Single writer: throttled writes on cache events, immediate writes on
/// command
async fn run_writer(
    cache: QueryCache,
    persister: SqlitePersister,
    options: PersistOptions,
    mut events: broadcast::Receiver<CacheEvent>,
    mut inbox: mpsc::UnboundedReceiver<Command>,
) {
    let deadline = sleep(options.debounce);
    tokio::pin!(deadline);
    let mut dirty = false;
    let mut events_open = true;

    loop {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    // The window opens on the first unsaved change only
                    if !dirty {
                        dirty = true;
                        deadline.as_mut().reset(Instant::now() + options.debounce);
                    }
                }
                Err(RecvError::Closed) => events_open = false,
            },
            () = &mut deadline, if dirty => {
                dirty = false;
                if let Err(e) = write_snapshot(&cache, &persister, &options.buster).await {
                    warn!("Failed to persist query cache: {}", e);
                }
            }
            command = inbox.recv() => match command {
                Some(Command::Flush(reply)) => {
                    dirty = false;
                    let _ = reply.send(write_snapshot(&cache, &persister, &options.buster).await);
                }
                Some(Command::Shutdown(reply)) => {
                    let _ = reply.send(write_snapshot(&cache, &persister, &options.buster).await);
                    break;
                }
                None => {
                    if dirty {
                        if let Err(e) = write_snapshot(&cache, &persister, &options.buster).await {
                            warn!("Failed to persist query cache: {}", e);
                        }
                    }
                    break;
                }
            },
        }
    }
    debug!("Query cache writer stopped");
}
