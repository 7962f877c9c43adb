//! Query cache: fetched results by key, with invalidation, patching and an
//! event stream.
//!
//! # Design
//! `QueryCache` is a cheap handle (`Clone`) to one cache instance; every
//! test or application scope creates its own. Values of different types
//! share the map through `Arc<dyn Any>` and are downcast on read, the same
//! way a key is always used with one value type.
//!
//! Writers never replace an entry blindly. A fetch overwrites it wholesale,
//! a mutation handler patches the value that is current when the patch runs.
//! `set_data`, patches and invalidations bump a per-entry revision; a fetch
//! that finishes after its entry's revision moved on is superseded and runs
//! again. When it is still superseded after the last attempt, the patched
//! value is kept and the response dropped, so a slow response can never undo
//! a patch applied while it was in flight.
//!
//! At most one fetch per key is in flight. Callers arriving while it runs
//! wait for it and share its outcome; if the fetching task is cancelled, one
//! of them takes over.
//!
//! Listeners are kept in an ordered registry. Dispatch snapshots the
//! registered ids and re-checks each one right before calling it, so a
//! listener removed during dispatch (or earlier) is never called again.
//! Listeners run with the registry unlocked and may use the cache freely.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::QueryConfig;
use crate::error::RequestError;
use crate::key::QueryKey;

/// Attempts a fetch gets before it stops retrying when superseded. The last
/// attempt keeps the cached data if there is any and stores its response
/// otherwise, either way left stale.
pub const MAX_SUPERSEDED_FETCHES: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchStatus {
    /// Created by an observer, never fetched.
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

/// Snapshot of one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    /// Last known value; kept when a later fetch fails.
    pub data: Option<T>,
    pub status: FetchStatus,
    /// Error of the last fetch, cleared by the next successful one.
    pub error: Option<RequestError>,
    pub is_stale: bool,
    pub updated_at: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub key: QueryKey,
    pub error: RequestError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// The entry's data changed (fetch result, `set_data` or a patch).
    Updated { key: QueryKey },
    Invalidated { key: QueryKey },
    /// A fetch for the entry failed.
    Error(ErrorEvent),
    /// The entry was garbage collected.
    Removed { key: QueryKey },
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            CacheEvent::Updated { key } | CacheEvent::Invalidated { key } | CacheEvent::Removed { key } => key,
            CacheEvent::Error(event) => &event.key,
        }
    }
}

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;
type Value = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Slot {
    data: Option<Value>,
    status: FetchStatus,
    error: Option<RequestError>,
    is_stale: bool,
    updated_at: Option<Instant>,
    revision: u64,
    observers: usize,
    /// Closed or signalled once the running fetch settles.
    in_flight: Option<watch::Receiver<()>>,
}

impl Slot {
    fn is_stale(&self, config: &QueryConfig) -> bool {
        if self.is_stale {
            return true;
        }
        match (config.stale_time, self.updated_at) {
            (Some(stale_time), Some(updated_at)) => updated_at.elapsed() > stale_time,
            _ => false,
        }
    }

    fn data<T: Clone + 'static>(&self) -> Option<T> {
        self.data.as_ref()?.downcast_ref::<T>().cloned()
    }

    fn store(&mut self, value: Value, is_stale: bool) {
        self.data = Some(value);
        self.status = FetchStatus::Success;
        self.error = None;
        self.is_stale = is_stale;
        self.updated_at = Some(Instant::now());
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<QueryKey, Slot>,
    listeners: BTreeMap<u64, Listener>,
    next_listener: u64,
}

struct Shared {
    state: Mutex<State>,
    config: QueryConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct QueryCache {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("QueryCache")
            .field("entries", &state.entries.len())
            .field("listeners", &state.listeners.len())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    pub fn with_config(config: QueryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.shared.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.lock()
    }

    /// Returns the entry for `key`, or `None` if there is none. An entry
    /// holding a value of another type reads as having no data.
    pub fn read<T: Clone + 'static>(&self, key: &QueryKey) -> Option<CacheEntry<T>> {
        let state = self.lock();
        let slot = state.entries.get(key)?;
        Some(CacheEntry {
            data: slot.data(),
            status: slot.status,
            error: slot.error.clone(),
            is_stale: slot.is_stale(&self.shared.config),
            updated_at: slot.updated_at,
        })
    }

    /// Shorthand for the data of [`QueryCache::read`].
    pub fn data<T: Clone + 'static>(&self, key: &QueryKey) -> Option<T> {
        self.read(key).and_then(|entry| entry.data)
    }

    pub fn status(&self, key: &QueryKey) -> Option<FetchStatus> {
        self.lock().entries.get(key).map(|slot| slot.status)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Overwrites the entry's data wholesale and marks it fresh.
    pub fn set_data<T: Send + Sync + 'static>(&self, key: &QueryKey, value: T) {
        {
            let mut state = self.lock();
            let slot = state.entries.entry(key.clone()).or_default();
            slot.store(Arc::new(value), false);
            slot.revision += 1;
        }
        debug!(%key, "cache data set");
        self.emit(&CacheEvent::Updated { key: key.clone() });
    }

    /// Replaces the entry's data with `patch(current)`.
    ///
    /// Nothing happens when the entry has no data of type `T`: patches never
    /// conjure a value. A patch returning a value equal to the current one is
    /// a no-op and emits nothing. Returns whether the data changed.
    ///
    /// `patch` runs with the cache locked and must not call back into it.
    pub fn update_data<T, F>(&self, key: &QueryKey, patch: F) -> bool
    where
        T: PartialEq + Send + Sync + 'static,
        F: FnOnce(&T) -> T,
    {
        {
            let mut state = self.lock();
            let Some(slot) = state.entries.get_mut(key) else {
                return false;
            };
            let Some(current) = slot.data.as_ref().and_then(|data| data.downcast_ref::<T>()) else {
                return false;
            };
            let next = patch(current);
            if next == *current {
                return false;
            }
            slot.data = Some(Arc::new(next));
            slot.revision += 1;
        }
        debug!(%key, "cache data patched");
        self.emit(&CacheEvent::Updated { key: key.clone() });
        true
    }

    /// Marks the entry stale without discarding its data; the next
    /// `fetch_query` for it goes to the network. Returns `false` when there
    /// is no entry for `key`.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        {
            let mut state = self.lock();
            let Some(slot) = state.entries.get_mut(key) else {
                return false;
            };
            slot.is_stale = true;
            slot.revision += 1;
        }
        debug!(%key, "cache entry invalidated");
        self.emit(&CacheEvent::Invalidated { key: key.clone() });
        true
    }

    /// Returns the cached data when it is present and fresh, fetches
    /// otherwise.
    pub async fn fetch_query<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T, RequestError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        {
            let state = self.lock();
            if let Some(slot) = state.entries.get(key) {
                if !slot.is_stale(&self.shared.config) {
                    if let Some(data) = slot.data::<T>() {
                        return Ok(data);
                    }
                }
            }
        }
        self.refetch(key, fetcher).await
    }

    /// Fetches regardless of staleness and stores the result. If a fetch for
    /// `key` is already running, waits for it and returns its outcome
    /// instead of starting another one.
    pub async fn refetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T, RequestError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        loop {
            let turn = {
                let mut state = self.lock();
                let slot = state.entries.entry(key.clone()).or_default();
                if let Some(pending) = slot.in_flight.clone() {
                    Turn::Wait(pending)
                } else {
                    let (done, pending) = watch::channel(());
                    slot.in_flight = Some(pending);
                    let previous = std::mem::replace(&mut slot.status, FetchStatus::Pending);
                    Turn::Lead(InFlight {
                        cache: self,
                        key,
                        previous,
                        done,
                    })
                }
            };

            match turn {
                Turn::Lead(flight) => return self.lead_fetch(key, fetcher, flight).await,
                Turn::Wait(mut pending) => {
                    // Err: the fetching task was dropped before settling.
                    if pending.changed().await.is_err() {
                        continue;
                    }
                    if let Some(outcome) = self.settled::<T>(key) {
                        return outcome;
                    }
                }
            }
        }
    }

    async fn lead_fetch<T, F, Fut>(
        &self,
        key: &QueryKey,
        mut fetcher: F,
        flight: InFlight<'_>,
    ) -> Result<T, RequestError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started_at = self.lock().entries.entry(key.clone()).or_default().revision;
            debug!(%key, attempt, "fetching");

            let result = fetcher().await;

            let mut state = self.lock();
            let slot = state.entries.entry(key.clone()).or_default();
            let superseded = slot.revision != started_at;
            match result {
                Ok(data) => {
                    if superseded && attempt < MAX_SUPERSEDED_FETCHES {
                        debug!(%key, attempt, "fetch superseded by a newer write, refetching");
                        continue;
                    }
                    if superseded {
                        if let Some(current) = slot.data::<T>() {
                            slot.status = FetchStatus::Success;
                            slot.error = None;
                            slot.is_stale = true;
                            drop(state);
                            warn!(%key, attempt, "fetch kept being superseded, keeping cached data");
                            flight.finish();
                            return Ok(current);
                        }
                    }
                    slot.store(Arc::new(data.clone()), superseded);
                    drop(state);
                    if superseded {
                        warn!(%key, attempt, "fetch kept being superseded, storing stale result");
                    }
                    flight.finish();
                    self.emit(&CacheEvent::Updated { key: key.clone() });
                    return Ok(data);
                }
                Err(error) => {
                    slot.status = FetchStatus::Error;
                    slot.error = Some(error.clone());
                    drop(state);
                    debug!(%key, %error, "fetch failed");
                    flight.finish();
                    self.emit(&CacheEvent::Error(ErrorEvent {
                        key: key.clone(),
                        error: error.clone(),
                    }));
                    return Err(error);
                }
            }
        }
    }

    /// Outcome of the fetch that just settled for `key`.
    fn settled<T: Clone + 'static>(&self, key: &QueryKey) -> Option<Result<T, RequestError>> {
        let state = self.lock();
        let slot = state.entries.get(key)?;
        match (slot.status, &slot.error) {
            (FetchStatus::Error, Some(error)) => Some(Err(error.clone())),
            (FetchStatus::Success, _) => slot.data::<T>().map(Ok),
            _ => None,
        }
    }

    /// Registers `handler` for every cache event. The handler stays
    /// registered until the returned [`Subscription`] is dropped or
    /// unsubscribed.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let id = state.next_listener;
        state.next_listener += 1;
        state.listeners.insert(id, Arc::new(handler));
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// Registers `handler` for failed fetches only.
    pub fn subscribe_to_errors<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ErrorEvent) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let CacheEvent::Error(error) = event {
                handler(error);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Registers interest in `key`, creating an idle entry if needed. Entries
    /// with live observers are never garbage collected.
    pub fn watch(&self, key: &QueryKey) -> QueryObserver {
        self.lock().entries.entry(key.clone()).or_default().observers += 1;
        QueryObserver {
            shared: Arc::downgrade(&self.shared),
            key: key.clone(),
        }
    }

    pub fn observer_count(&self, key: &QueryKey) -> usize {
        self.lock().entries.get(key).map_or(0, |slot| slot.observers)
    }

    /// Drops unobserved entries whose data is older than `gc_time` (or that
    /// never got any). Entries with a fetch in flight are kept. Returns the
    /// number of entries removed.
    ///
    /// Nothing runs this automatically; the host calls it, typically from a
    /// periodic task, and holds a [`QueryObserver`] for every key on screen.
    pub fn collect_garbage(&self) -> usize {
        let gc_time = self.shared.config.gc_time;
        let removed: Vec<QueryKey> = {
            let mut state = self.lock();
            let expired: Vec<QueryKey> = state
                .entries
                .iter()
                .filter(|(_, slot)| {
                    slot.observers == 0
                        && slot.in_flight.is_none()
                        && slot.updated_at.map_or(true, |at| at.elapsed() >= gc_time)
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                state.entries.remove(key);
            }
            expired
        };
        for key in &removed {
            debug!(%key, "cache entry collected");
            self.emit(&CacheEvent::Removed { key: key.clone() });
        }
        removed.len()
    }

    fn emit(&self, event: &CacheEvent) {
        let ids: Vec<u64> = self.lock().listeners.keys().copied().collect();
        for id in ids {
            let listener = self.lock().listeners.get(&id).cloned();
            if let Some(listener) = listener {
                listener(event);
            }
        }
    }
}

enum Turn<'a> {
    Lead(InFlight<'a>),
    Wait(watch::Receiver<()>),
}

/// Marks the running fetch for one key. Waiters are woken by `finish`, or
/// by the drop when the fetching task is cancelled; the drop also restores
/// the status the entry had before the fetch started if it never settled.
struct InFlight<'a> {
    cache: &'a QueryCache,
    key: &'a QueryKey,
    previous: FetchStatus,
    done: watch::Sender<()>,
}

impl InFlight<'_> {
    fn finish(&self) {
        self.done.send_replace(());
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.cache.lock();
        if let Some(slot) = state.entries.get_mut(self.key) {
            slot.in_flight = None;
            if slot.status == FetchStatus::Pending {
                slot.status = self.previous;
            }
        }
    }
}

/// Keeps a cache listener registered. Dropping it (or calling
/// [`Subscription::unsubscribe`]) removes the listener before returning.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.lock().listeners.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Interest in one key; see [`QueryCache::watch`].
#[must_use = "dropping a QueryObserver releases the entry immediately"]
pub struct QueryObserver {
    shared: Weak<Shared>,
    key: QueryKey,
}

impl QueryObserver {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut state = shared.lock();
        if let Some(slot) = state.entries.get_mut(&self.key) {
            slot.observers = slot.observers.saturating_sub(1);
        }
    }
}
