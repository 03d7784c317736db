//! Query cache
//!
//! Keyed, TTL-aware store for the results of catalog operations. Each key
//! moves through
//!
//! ```text
//! absent ──read──► pending ──ok──► fresh ──age──► stale ──age──► evicted
//!                    ▲                              │
//!                    └────────────read──────────────┘
//! ```
//!
//! At most one fetch per key is outstanding; concurrent readers join it.
//! Failed fetches are retried with exponential backoff, and when every attempt
//! fails a still-servable previous value is returned alongside the error.
//!
//! Payloads are stored as JSON so the whole cache can be snapshotted and
//! restored by [`persist::PersistenceBridge`].

pub mod keys;
pub mod persist;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::error::CatalogError;

pub use keys::QueryKey;

/// Upper bound for the delay between two attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 64;

/// Timing and retry settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age at which an entry is refetched on the next read
    pub stale_after: Duration,
    /// Age at which an entry is discarded
    pub expire_after: Duration,
    /// Extra attempts after the first failed one
    pub retries: u32,
    /// Delay before the first retry, doubled for each further one
    pub retry_delay: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(60),
            expire_after: Duration::from_secs(24 * 60 * 60),
            retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl CachePolicy {
    /// Delay before retry number `retry` (zero-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.retry_delay.saturating_mul(factor).min(MAX_RETRY_DELAY)
    }
}

/// Source of wall-clock time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

/// One cached payload with its timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Value,
    /// Completion time of the fetch, epoch millis
    pub fetched_at: i64,
    pub stale_after_ms: u64,
    /// Epoch millis after which the entry is discarded
    pub expires_at: i64,
    /// Forced stale by [`QueryCache::invalidate`]
    #[serde(default)]
    pub invalidated: bool,
}

impl CacheEntry {
    fn new(payload: Value, now: i64, policy: &CachePolicy) -> Self {
        Self {
            payload,
            fetched_at: now,
            stale_after_ms: millis(policy.stale_after) as u64,
            expires_at: now.saturating_add(millis(policy.expire_after)),
            invalidated: false,
        }
    }

    pub fn freshness(&self, now: i64) -> Freshness {
        if now >= self.expires_at {
            Freshness::Expired
        } else if self.invalidated || now.saturating_sub(self.fetched_at) >= self.stale_after_ms as i64
        {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Observable state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Absent,
    Pending,
    Fresh,
    Stale,
    /// Expired but not yet discarded
    Evicted,
}

/// Emitted after every change to the stored entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Updated(QueryKey),
    Removed(QueryKey),
    Cleared,
}

#[derive(Error, Debug, Clone)]
pub enum QueryError {
    #[error("{source} (after {attempts} attempt(s))")]
    Fetch {
        attempts: u32,
        source: Arc<CatalogError>,
    },

    #[error("Cached value for {key} could not be decoded: {message}")]
    Decode { key: String, message: String },

    #[error("Fetch task ended unexpectedly: {0}")]
    Aborted(String),
}

impl QueryError {
    /// Underlying catalog error, when the fetch itself failed
    pub fn catalog_error(&self) -> Option<&CatalogError> {
        match self {
            QueryError::Fetch { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result of a successful read
#[derive(Debug, Clone)]
pub struct QueryOutcome<T> {
    pub data: T,
    /// `Stale` only when a refetch failed and an older value was served
    pub freshness: Freshness,
    /// Error of the failed refetch behind a stale value
    pub error: Option<QueryError>,
}

impl<T> QueryOutcome<T> {
    pub fn is_fresh(&self) -> bool {
        self.freshness == Freshness::Fresh
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

/// Serializable copy of every live entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub entries: BTreeMap<QueryKey, CacheEntry>,
}

type SharedFetch = Shared<BoxFuture<'static, Result<Value, QueryError>>>;

/// Clears the pending slot if a fetch task unwinds or is dropped before it
/// records its outcome
struct PendingGuard {
    cache: QueryCache,
    key: QueryKey,
    armed: bool,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.armed {
            self.cache.abandon(&self.key);
        }
    }
}

#[derive(Default)]
struct Slot {
    entry: Option<CacheEntry>,
    pending: Option<SharedFetch>,
    failures: u32,
}

struct Inner {
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<QueryKey, Slot>>,
    events: broadcast::Sender<CacheEvent>,
    ready: watch::Sender<bool>,
}

enum Plan {
    Serve(Value),
    Await(SharedFetch),
}

/// Cheap to clone; clones share the same entries
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    /// Cache that serves reads immediately
    pub fn new(policy: CachePolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock), true)
    }

    /// Cache whose reads wait for [`QueryCache::mark_ready`]
    pub fn gated(policy: CachePolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock), false)
    }

    pub fn with_clock(policy: CachePolicy, clock: Arc<dyn Clock>, ready: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (ready, _) = watch::channel(ready);
        Self {
            inner: Arc::new(Inner {
                policy,
                clock,
                slots: Mutex::new(HashMap::new()),
                events,
                ready,
            }),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    pub fn now_millis(&self) -> i64 {
        self.inner.clock.now_millis()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Hydration gate
    // ------------------------------------------------------------------

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow()
    }

    /// Open the gate; waiting readers proceed
    pub fn mark_ready(&self) {
        self.inner.ready.send_replace(true);
    }

    pub async fn wait_ready(&self) {
        let mut ready = self.inner.ready.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = ready.wait_for(|ready| *ready).await;
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read `key`, fetching through `fetch` when the key is absent, stale,
    /// or expired.
    ///
    /// `fetch` is called once per attempt. Readers arriving while a fetch is
    /// in flight share its result.
    pub async fn query<T, F, Fut>(
        &self,
        key: &QueryKey,
        fetch: F,
    ) -> Result<QueryOutcome<T>, QueryError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::Result<T>> + Send + 'static,
    {
        self.wait_ready().await;

        let plan = {
            let now = self.now_millis();
            let mut slots = self.slots();
            let slot = slots.entry(key.clone()).or_default();

            let mut evicted = false;
            if slot
                .entry
                .as_ref()
                .is_some_and(|e| e.freshness(now) == Freshness::Expired)
            {
                debug!("Cache evict {}", key);
                slot.entry = None;
                evicted = true;
            }

            let plan = if let Some(pending) = &slot.pending {
                debug!("Cache join {}", key);
                Plan::Await(pending.clone())
            } else if let Some(entry) = slot
                .entry
                .as_ref()
                .filter(|e| e.freshness(now) == Freshness::Fresh)
            {
                debug!("Cache hit {}", key);
                Plan::Serve(entry.payload.clone())
            } else {
                debug!("Cache fetch {}", key);
                let pending = self.spawn_fetch(key.clone(), fetch);
                slot.pending = Some(pending.clone());
                Plan::Await(pending)
            };

            drop(slots);
            if evicted {
                self.emit(CacheEvent::Removed(key.clone()));
            }
            plan
        };

        let error = match plan {
            Plan::Serve(payload) => {
                return Ok(QueryOutcome {
                    data: decode(key, payload)?,
                    freshness: Freshness::Fresh,
                    error: None,
                })
            }
            Plan::Await(pending) => match pending.await {
                Ok(payload) => {
                    return Ok(QueryOutcome {
                        data: decode(key, payload)?,
                        freshness: Freshness::Fresh,
                        error: None,
                    })
                }
                Err(error) => error,
            },
        };

        match self.peek(key) {
            Some(entry) => {
                debug!("Cache serve stale {} after failed refetch", key);
                Ok(QueryOutcome {
                    data: decode(key, entry.payload)?,
                    freshness: Freshness::Stale,
                    error: Some(error),
                })
            }
            None => Err(error),
        }
    }

    fn spawn_fetch<T, F, Fut>(&self, key: QueryKey, fetch: F) -> SharedFetch
    where
        T: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::Result<T>> + Send + 'static,
    {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut guard = PendingGuard {
                cache: cache.clone(),
                key: key.clone(),
                armed: true,
            };
            let retries = cache.inner.policy.retries;
            let mut attempts = 0;
            let result = loop {
                attempts += 1;
                match fetch().await {
                    Ok(data) => {
                        break serde_json::to_value(&data).map_err(|e| QueryError::Decode {
                            key: key.to_string(),
                            message: e.to_string(),
                        })
                    }
                    Err(e) => {
                        cache.record_failure(&key);
                        if attempts > retries {
                            break Err(QueryError::Fetch {
                                attempts,
                                source: Arc::new(e),
                            });
                        }
                        let delay = cache.inner.policy.backoff(attempts - 1);
                        debug!(
                            "Fetch {} failed (attempt {}), retrying in {:?}: {}",
                            key, attempts, delay, e
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            };
            guard.armed = false;
            cache.complete(&key, &result);
            result
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(QueryError::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }

    /// Release the pending slot of a fetch that never completed, dropping
    /// the slot when nothing else is left in it
    fn abandon(&self, key: &QueryKey) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(key) {
            slot.pending = None;
            if slot.entry.is_none() {
                slots.remove(key);
            }
        }
        warn!("Fetch {} ended without a result", key);
    }

    fn record_failure(&self, key: &QueryKey) {
        let mut slots = self.slots();
        slots.entry(key.clone()).or_default().failures += 1;
    }

    /// Store the outcome of a finished fetch and release the pending slot
    fn complete(&self, key: &QueryKey, result: &Result<Value, QueryError>) {
        let now = self.now_millis();
        let stored = {
            let mut slots = self.slots();
            let slot = slots.entry(key.clone()).or_default();
            slot.pending = None;
            match result {
                Ok(payload) => {
                    slot.entry = Some(CacheEntry::new(payload.clone(), now, &self.inner.policy));
                    slot.failures = 0;
                    true
                }
                Err(_) => false,
            }
        };
        if stored {
            self.emit(CacheEvent::Updated(key.clone()));
        }
    }

    // ------------------------------------------------------------------
    // Direct access
    // ------------------------------------------------------------------

    /// Stored entry, unless it has expired
    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        let now = self.now_millis();
        self.slots()
            .get(key)
            .and_then(|slot| slot.entry.clone())
            .filter(|entry| entry.freshness(now) != Freshness::Expired)
    }

    pub fn state(&self, key: &QueryKey) -> EntryState {
        let now = self.now_millis();
        let slots = self.slots();
        let Some(slot) = slots.get(key) else {
            return EntryState::Absent;
        };
        if slot.pending.is_some() {
            return EntryState::Pending;
        }
        match slot.entry.as_ref().map(|e| e.freshness(now)) {
            None => EntryState::Absent,
            Some(Freshness::Fresh) => EntryState::Fresh,
            Some(Freshness::Stale) => EntryState::Stale,
            Some(Freshness::Expired) => EntryState::Evicted,
        }
    }

    /// Failed attempts since the last successful fetch
    pub fn failure_count(&self, key: &QueryKey) -> u32 {
        self.slots().get(key).map(|slot| slot.failures).unwrap_or(0)
    }

    /// Number of stored entries, expired ones included until evicted
    pub fn len(&self) -> usize {
        self.slots().values().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark an entry stale so the next read refetches it
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let found = match self.slots().get_mut(key).and_then(|s| s.entry.as_mut()) {
            Some(entry) => {
                entry.invalidated = true;
                true
            }
            None => false,
        };
        if found {
            self.emit(CacheEvent::Updated(key.clone()));
        }
        found
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = {
            let mut slots = self.slots();
            let removed = slots
                .get_mut(key)
                .and_then(|slot| slot.entry.take())
                .is_some();
            if slots.get(key).is_some_and(|slot| slot.pending.is_none()) {
                slots.remove(key);
            }
            removed
        };
        if removed {
            self.emit(CacheEvent::Removed(key.clone()));
        }
        removed
    }

    /// Drop every stored entry; in-flight fetches still complete
    pub fn clear(&self) {
        self.slots().retain(|_, slot| {
            slot.entry = None;
            slot.pending.is_some()
        });
        self.emit(CacheEvent::Cleared);
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Copy every live entry, discarding expired ones on the way
    pub fn snapshot(&self) -> CacheSnapshot {
        let now = self.now_millis();
        let mut slots = self.slots();
        let mut entries = BTreeMap::new();

        for (key, slot) in slots.iter_mut() {
            match &slot.entry {
                Some(entry) if entry.freshness(now) == Freshness::Expired => {
                    debug!("Cache evict {} during snapshot", key);
                    slot.entry = None;
                }
                Some(entry) => {
                    entries.insert(key.clone(), entry.clone());
                }
                None => {}
            }
        }
        // Failure counts of keys with nothing stored go with their slots
        slots.retain(|_, slot| slot.entry.is_some() || slot.pending.is_some());

        CacheSnapshot { entries }
    }

    /// Load entries from a snapshot, skipping expired ones. Returns how many
    /// were loaded.
    pub fn restore(&self, snapshot: CacheSnapshot) -> usize {
        let now = self.now_millis();
        let mut slots = self.slots();
        let mut restored = 0;

        for (key, entry) in snapshot.entries {
            if entry.freshness(now) == Freshness::Expired {
                continue;
            }
            slots.entry(key).or_default().entry = Some(entry);
            restored += 1;
        }
        restored
    }
}

fn decode<T: DeserializeOwned>(key: &QueryKey, payload: Value) -> Result<T, QueryError> {
    serde_json::from_value(payload).map_err(|e| QueryError::Decode {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct TestClock(AtomicI64);

    impl Clock for TestClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn entry(fetched_at: i64) -> CacheEntry {
        CacheEntry::new(Value::from(1), fetched_at, &CachePolicy::default())
    }

    #[test]
    fn test_entry_freshness_boundaries() {
        let e = entry(0);
        assert_eq!(e.freshness(59_999), Freshness::Fresh);
        assert_eq!(e.freshness(60_000), Freshness::Stale);
        assert_eq!(e.freshness(86_399_999), Freshness::Stale);
        assert_eq!(e.freshness(86_400_000), Freshness::Expired);
    }

    #[test]
    fn test_invalidated_entry_is_stale() {
        let mut e = entry(0);
        e.invalidated = true;
        assert_eq!(e.freshness(1), Freshness::Stale);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = CachePolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(10), MAX_RETRY_DELAY);
        assert_eq!(policy.backoff(u32::MAX), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_snapshot_drops_expired_entries() {
        let clock = Arc::new(TestClock(AtomicI64::new(0)));
        let cache = QueryCache::with_clock(CachePolicy::default(), clock.clone(), true);

        let mut snapshot = CacheSnapshot::default();
        snapshot.entries.insert(QueryKey::new("a", Value::Null), entry(0));
        snapshot
            .entries
            .insert(QueryKey::new("b", Value::Null), entry(50_000_000));
        assert_eq!(cache.restore(snapshot), 2);

        clock.0.store(86_400_000, Ordering::SeqCst);
        let taken = cache.snapshot();
        assert_eq!(taken.entries.len(), 1);
        assert!(taken.entries.contains_key(&QueryKey::new("b", Value::Null)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_state_transitions_without_fetch() {
        let clock = Arc::new(TestClock(AtomicI64::new(0)));
        let cache = QueryCache::with_clock(CachePolicy::default(), clock.clone(), true);
        let key = QueryKey::new("k", Value::Null);
        assert_eq!(cache.state(&key), EntryState::Absent);

        let mut snapshot = CacheSnapshot::default();
        snapshot.entries.insert(key.clone(), entry(0));
        cache.restore(snapshot);
        assert_eq!(cache.state(&key), EntryState::Fresh);

        clock.0.store(61_000, Ordering::SeqCst);
        assert_eq!(cache.state(&key), EntryState::Stale);

        clock.0.store(90_000_000, Ordering::SeqCst);
        assert_eq!(cache.state(&key), EntryState::Evicted);
        assert!(cache.peek(&key).is_none());
    }

    #[test]
    fn test_events_for_mutations() {
        let cache = QueryCache::new(CachePolicy::default());
        let mut events = cache.subscribe();
        let key = QueryKey::new("k", Value::Null);

        cache.complete(&key, &Ok(Value::from("v")));
        assert!(cache.invalidate(&key));
        assert!(cache.remove(&key));
        assert!(!cache.remove(&key));
        cache.clear();

        assert_eq!(events.try_recv().unwrap(), CacheEvent::Updated(key.clone()));
        assert_eq!(events.try_recv().unwrap(), CacheEvent::Updated(key.clone()));
        assert_eq!(events.try_recv().unwrap(), CacheEvent::Removed(key));
        assert_eq!(events.try_recv().unwrap(), CacheEvent::Cleared);
        assert!(events.try_recv().is_err());
    }
}
