//! Query cache engine.
//!
//! [`QueryCache`] is a keyed cache of asynchronous read results. Each
//! [`CacheKey`] owns one entry that moves through
//! [`EntryStatus`] `Pending → Fresh → Stale → …` (or `Error`), and the engine
//! decides per read whether to serve from cache, start a fetch, or attach to
//! a fetch that is already running.
//!
//! # Read semantics
//!
//! - **No entry** — a Pending entry is created and exactly one fetch starts.
//! - **Fresh within the freshness window** — served, no fetch.
//! - **Stale, or window elapsed** — the last value is served immediately and
//!   one background refetch starts unless one is already in flight.
//! - **Error** — the entry goes back to Pending (the old error is dropped)
//!   and a new fetch starts.
//!
//! [`QueryCache::read`] returns a snapshot without waiting;
//! [`QueryCache::fetch`] applies the same rules but waits for fresh data.
//!
//! # Deduplication
//!
//! A fetch is identified solely by its key. While a fetch is in flight every
//! reader of that key attaches to the same shared future, so all of them
//! observe the identical value or error and only one network call is made.
//!
//! # Ordering
//!
//! Every fetch gets a sequence number from a cache-wide monotonic counter. A
//! response is applied only if its sequence is higher than the last one
//! applied to that entry, so a slow response can never overwrite a newer
//! one. Invalidating an entry detaches its in-flight fetch (the request keeps
//! running, nothing is cancelled) so the next read issues a newer request;
//! a detached response that still lands first is applied but leaves the
//! entry Stale, because it was requested before the invalidation.
//!
//! # Garbage collection
//!
//! An entry with no subscribers and no outstanding fetch is evicted once it
//! has been idle for [`QueryConfig::gc_grace`]. Entries are never evicted
//! while any fetch for them is still outstanding.
//!
//! # Clearing
//!
//! [`QueryCache::clear`] drops every idle entry. Entries that are observed
//! or still fetching are emptied in place instead: they go back to Pending
//! without value or error, subscribers are told, and successful responses
//! requested before the clear are discarded. Failures of those requests
//! still land, so a read cut short by the clear ends in Error.
//!
//! # Runtime
//!
//! Fetches and GC timers run on `tokio::spawn`; reads that start a fetch must
//! be made from within a tokio runtime. Bookkeeping happens under a
//! `std::sync::Mutex` that is never held across an `.await`, and subscriber
//! callbacks run after the lock is released.

pub mod config;
pub mod entry;
pub mod key;
mod subscription;

pub use config::{QueryConfig, ReadOptions};
pub use entry::{CacheEntry, EntryStatus};
pub use key::{CacheKey, KeyMatcher, ParamValue};
pub use subscription::{EntryStream, Subscription};

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use crate::telemetry;
use crate::{Result, SyncError};

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V>>>;
type Callback<V> = Arc<dyn Fn(&CacheEntry<V>) + Send + Sync>;

/// A fetch already issued for a key. Cloning the shared future attaches
/// another waiter to the same request.
struct InFlight<V> {
    seq: u64,
    future: SharedFetch<V>,
}

/// Live entry state, owned by the engine.
struct Slot<V> {
    status: EntryStatus,
    value: Option<V>,
    error: Option<SyncError>,
    last_fetched_at: Option<Instant>,
    subscribers: Vec<(u64, Callback<V>)>,
    /// The current fetch readers attach to. Detached fetches are not here
    /// but still appear in `outstanding`.
    in_flight: Option<InFlight<V>>,
    /// Sequence numbers of fetches that have not completed yet.
    outstanding: BTreeSet<u64>,
    applied_seq: u64,
    /// Fetches with a sequence at or below this were issued before the most
    /// recent invalidation.
    invalidated_through: u64,
    /// Successful responses from fetches with a sequence at or below this
    /// were requested before the last clear and are discarded.
    cleared_through: u64,
    idle_since: Option<Instant>,
}

impl<V: Clone> Slot<V> {
    fn new() -> Self {
        Self {
            status: EntryStatus::Pending,
            value: None,
            error: None,
            last_fetched_at: None,
            subscribers: Vec::new(),
            in_flight: None,
            outstanding: BTreeSet::new(),
            applied_seq: 0,
            invalidated_through: 0,
            cleared_through: 0,
            idle_since: Some(Instant::now()),
        }
    }

    fn snapshot(&self, key: &CacheKey) -> CacheEntry<V> {
        CacheEntry {
            key: key.clone(),
            status: self.status,
            value: self.value.clone(),
            error: self.error.clone(),
            last_fetched_at: self.last_fetched_at,
            subscriber_count: self.subscribers.len(),
            is_fetching: !self.outstanding.is_empty(),
        }
    }

    fn is_fresh(&self, window: Duration) -> bool {
        self.status == EntryStatus::Fresh
            && self.value.is_some()
            && self.last_fetched_at.is_some_and(|t| t.elapsed() < window)
    }

    fn is_idle(&self) -> bool {
        self.subscribers.is_empty() && self.outstanding.is_empty()
    }

    fn is_collectable(&self, grace: Duration) -> bool {
        self.is_idle() && self.idle_since.is_some_and(|t| t.elapsed() >= grace)
    }

    /// Forget the value and error; readers start over from Pending.
    fn reset(&mut self, issued: u64) {
        self.status = EntryStatus::Pending;
        self.value = None;
        self.error = None;
        self.last_fetched_at = None;
        self.in_flight = None;
        self.cleared_through = issued;
        self.invalidated_through = issued;
    }

    fn notification(&self, key: &CacheKey) -> Option<Notification<V>> {
        if self.subscribers.is_empty() {
            return None;
        }
        Some(Notification {
            callbacks: self.subscribers.iter().map(|(_, cb)| cb.clone()).collect(),
            entry: self.snapshot(key),
        })
    }
}

/// Callbacks collected under the lock, delivered after it is released.
struct Notification<V> {
    callbacks: Vec<Callback<V>>,
    entry: CacheEntry<V>,
}

impl<V> Notification<V> {
    fn deliver(self) {
        for callback in &self.callbacks {
            callback(&self.entry);
        }
    }
}

/// Outcome of the synchronous half of a read.
enum Prepared<V> {
    Hit(CacheEntry<V>),
    Attached {
        seq: u64,
        future: SharedFetch<V>,
        entry: CacheEntry<V>,
        notify: Option<Notification<V>>,
    },
}

pub(crate) struct Inner<V> {
    slots: Mutex<HashMap<CacheKey, Slot<V>>>,
    config: QueryConfig,
    next_seq: AtomicU64,
    next_subscriber: AtomicU64,
}

/// Keyed cache of asynchronous read results.
///
/// Cheap to clone; clones share the same entries.
///
/// ```rust
/// # use threatsync::{CacheKey, QueryCache, QueryConfig, ReadOptions};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> threatsync::Result<()> {
/// let cache: QueryCache<u32> = QueryCache::new(QueryConfig::default());
/// let key = CacheKey::new("incidents").param("page", 1u32);
///
/// let value = cache
///     .fetch(&key, || async { Ok(42) }, ReadOptions::default())
///     .await?;
/// assert_eq!(value, 42);
/// assert!(cache.snapshot(&key).unwrap().is_fresh());
/// # Ok(())
/// # }
/// ```
pub struct QueryCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: QueryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                config,
                next_seq: AtomicU64::new(0),
                next_subscriber: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Default read options for this cache.
    pub fn read_options(&self) -> ReadOptions {
        self.inner.config.read_options()
    }

    /// Return the current entry for `key`, scheduling a fetch if the entry is
    /// missing, stale, expired or failed.
    ///
    /// Never waits for the network. `fetcher` is only invoked if a new fetch
    /// is actually started.
    ///
    /// # Panics
    ///
    /// Starting a fetch requires a tokio runtime context.
    pub fn read<F, Fut>(&self, key: &CacheKey, fetcher: F, options: ReadOptions) -> CacheEntry<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        match self.prepare(key, fetcher, options) {
            Prepared::Hit(entry) => entry,
            Prepared::Attached { entry, notify, .. } => {
                if let Some(notify) = notify {
                    notify.deliver();
                }
                entry
            }
        }
    }

    /// Resolve `key` to a fresh value.
    ///
    /// Returns a Fresh hit immediately; otherwise attaches to the in-flight
    /// fetch for `key` (starting one if needed) and waits for it. Every
    /// caller attached to the same fetch receives the identical outcome.
    ///
    /// # Panics
    ///
    /// Starting a fetch requires a tokio runtime context.
    pub async fn fetch<F, Fut>(&self, key: &CacheKey, fetcher: F, options: ReadOptions) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        match self.prepare(key, fetcher, options) {
            Prepared::Hit(entry) => entry
                .value
                .ok_or_else(|| SyncError::NotFound(key.to_string())),
            Prepared::Attached {
                seq,
                future,
                notify,
                ..
            } => {
                if let Some(notify) = notify {
                    notify.deliver();
                }
                let outcome = future.await;
                self.complete(key, seq, outcome.clone());
                outcome
            }
        }
    }

    /// Mark every entry selected by `matcher` Stale.
    ///
    /// Values are kept so consumers can keep rendering them; the next read of
    /// each entry refetches. Returns the number of matching entries.
    pub fn invalidate(&self, matcher: impl Into<KeyMatcher>) -> usize {
        let matcher = matcher.into();
        let mut notifications = Vec::new();
        let count = {
            let mut slots = self.lock();
            // Fetches get their sequence under this lock.
            let issued = self.inner.next_seq.load(Ordering::SeqCst);
            let mut count = 0;
            for (key, slot) in slots.iter_mut().filter(|(k, _)| matcher.matches(k)) {
                slot.invalidated_through = issued;
                if let Some(detached) = slot.in_flight.take() {
                    debug!(key = %key, seq = detached.seq, "detached in-flight fetch");
                }
                if slot.status == EntryStatus::Fresh {
                    slot.status = EntryStatus::Stale;
                }
                notifications.extend(slot.notification(key));
                count += 1;
            }
            count
        };
        metrics::counter!(telemetry::INVALIDATIONS_TOTAL).increment(count as u64);
        debug!(?matcher, count, "invalidated cache entries");
        for notification in notifications {
            notification.deliver();
        }
        count
    }

    /// Register `callback` for every state change of `key`.
    ///
    /// Creates an empty Pending entry if none exists; no fetch is started
    /// until someone reads the key.
    pub fn subscribe(
        &self,
        key: &CacheKey,
        callback: impl Fn(&CacheEntry<V>) + Send + Sync + 'static,
    ) -> Subscription {
        self.add_subscriber(key, Arc::new(callback), |_| {})
    }

    /// Subscribe as a stream of snapshots.
    ///
    /// The current snapshot (if the entry exists) is yielded first.
    pub fn subscribe_stream(&self, key: &CacheKey) -> EntryStream<V> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let sender = tx.clone();
        let subscription = self.add_subscriber(
            key,
            Arc::new(move |entry: &CacheEntry<V>| {
                let _ = sender.send(entry.clone());
            }),
            move |current| {
                let _ = tx.send(current);
            },
        );
        EntryStream::new(UnboundedReceiverStream::new(rx), subscription)
    }

    /// Seed `key` with a Fresh value, as if a fetch had just returned it.
    ///
    /// Any fetch still running for the key is detached and its response will
    /// be discarded.
    pub fn set_value(&self, key: &CacheKey, value: V) {
        let seq = self.next_seq();
        let (notify, idle) = {
            let mut slots = self.lock();
            let slot = slots.entry(key.clone()).or_insert_with(Slot::new);
            slot.in_flight = None;
            slot.applied_seq = seq;
            slot.value = Some(value);
            slot.error = None;
            slot.last_fetched_at = Some(Instant::now());
            slot.status = EntryStatus::Fresh;
            (slot.notification(key), slot.is_idle())
        };
        if let Some(notify) = notify {
            notify.deliver();
        }
        if idle {
            self.schedule_gc(key.clone());
        }
    }

    /// Current snapshot of `key`, without scheduling anything.
    pub fn snapshot(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.lock().get(key).map(|slot| slot.snapshot(key))
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.lock().keys().cloned().collect()
    }

    /// Drop `key` and its subscriber registrations. A fetch still running
    /// for it completes but its response is discarded.
    pub fn remove(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.lock().remove(key).map(|slot| slot.snapshot(key))
    }

    /// Drop every cached value.
    ///
    /// Idle entries are removed. Entries with subscribers or an outstanding
    /// fetch stay registered but are emptied back to Pending, and their
    /// subscribers are notified; a successful response requested before the
    /// clear is discarded, a failed one still lands as Error. Returns how
    /// many entries were removed or emptied.
    pub fn clear(&self) -> usize {
        let (notifications, removed, emptied) = {
            let mut slots = self.lock();
            let issued = self.inner.next_seq.load(Ordering::SeqCst);
            let before = slots.len();
            slots.retain(|_, slot| !slot.is_idle());
            let removed = before - slots.len();
            let mut notifications = Vec::new();
            for (key, slot) in slots.iter_mut() {
                slot.reset(issued);
                notifications.extend(slot.notification(key));
            }
            (notifications, removed, slots.len())
        };
        debug!(removed, emptied, "cleared query cache");
        for notification in notifications {
            notification.deliver();
        }
        removed + emptied
    }

    /// Evict every entry that has been idle for at least the grace period.
    ///
    /// Runs automatically on timers; exposed for callers that want to bound
    /// memory eagerly. Returns the number of evicted entries.
    pub fn collect_garbage(&self) -> usize {
        let grace = self.inner.config.gc_grace;
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_collectable(grace));
        let evicted = before - slots.len();
        if evicted > 0 {
            metrics::counter!(telemetry::EVICTIONS_TOTAL).increment(evicted as u64);
            debug!(evicted, "collected idle cache entries");
        }
        evicted
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot<V>>> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_seq(&self) -> u64 {
        self.inner.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn prepare<F, Fut>(&self, key: &CacheKey, fetcher: F, options: ReadOptions) -> Prepared<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let resource = key.family().to_owned();
        let mut slots = self.lock();
        let mut changed = !slots.contains_key(key);
        let slot = slots.entry(key.clone()).or_insert_with(Slot::new);

        if slot.is_fresh(options.freshness_window) {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "resource" => resource).increment(1);
            return Prepared::Hit(slot.snapshot(key));
        }

        match slot.status {
            EntryStatus::Error => {
                slot.status = EntryStatus::Pending;
                slot.error = None;
                changed = true;
            }
            EntryStatus::Fresh => {
                slot.status = EntryStatus::Stale;
                changed = true;
            }
            EntryStatus::Pending | EntryStatus::Stale => {}
        }

        if slot.value.is_some() {
            metrics::counter!(telemetry::CACHE_STALE_HITS_TOTAL, "resource" => resource.clone())
                .increment(1);
        } else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "resource" => resource.clone())
                .increment(1);
        }

        let (seq, future) = match &slot.in_flight {
            Some(in_flight) => {
                metrics::counter!(telemetry::DEDUPLICATED_TOTAL, "resource" => resource)
                    .increment(1);
                (in_flight.seq, in_flight.future.clone())
            }
            None => {
                changed = true;
                self.start_fetch(key, slot, fetcher)
            }
        };

        let entry = slot.snapshot(key);
        let notify = if changed {
            slot.notification(key)
        } else {
            None
        };
        Prepared::Attached {
            seq,
            future,
            entry,
            notify,
        }
    }

    fn start_fetch<F, Fut>(&self, key: &CacheKey, slot: &mut Slot<V>, fetcher: F) -> (u64, SharedFetch<V>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let seq = self.next_seq();
        let timeout = self.inner.config.fetch_timeout;
        // The fetcher runs on first poll, outside the lock.
        let future = async move {
            match timeout {
                Some(after) => tokio::time::timeout(after, fetcher())
                    .await
                    .unwrap_or_else(|_| Err(SyncError::Timeout { after })),
                None => fetcher().await,
            }
        }
        .boxed()
        .shared();

        slot.outstanding.insert(seq);
        slot.idle_since = None;
        slot.in_flight = Some(InFlight {
            seq,
            future: future.clone(),
        });
        metrics::counter!(telemetry::FETCHES_TOTAL, "resource" => key.family().to_owned())
            .increment(1);
        debug!(key = %key, seq, "starting fetch");

        let weak = Arc::downgrade(&self.inner);
        let owned_key = key.clone();
        let driver = future.clone();
        tokio::spawn(async move {
            let outcome = driver.await;
            if let Some(inner) = weak.upgrade() {
                QueryCache { inner }.complete(&owned_key, seq, outcome);
            }
        });

        (seq, future)
    }

    /// Apply the outcome of fetch `seq`. Safe to call more than once per
    /// fetch; only the first call has any effect.
    fn complete(&self, key: &CacheKey, seq: u64, outcome: Result<V>) {
        let (notify, idle) = {
            let mut slots = self.lock();
            let Some(slot) = slots.get_mut(key) else {
                return;
            };
            if !slot.outstanding.remove(&seq) {
                return;
            }
            if slot.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
                slot.in_flight = None;
            }

            let applied = if outcome.is_ok() && seq <= slot.cleared_through {
                metrics::counter!(
                    telemetry::DISCARDED_RESPONSES_TOTAL,
                    "resource" => key.family().to_owned()
                )
                .increment(1);
                debug!(key = %key, seq, "discarding response requested before the cache was cleared");
                false
            } else if seq <= slot.applied_seq {
                metrics::counter!(
                    telemetry::DISCARDED_RESPONSES_TOTAL,
                    "resource" => key.family().to_owned()
                )
                .increment(1);
                warn!(
                    key = %key,
                    seq,
                    applied_seq = slot.applied_seq,
                    "discarding response older than the applied one"
                );
                false
            } else {
                slot.applied_seq = seq;
                match outcome {
                    Ok(value) => {
                        slot.value = Some(value);
                        slot.error = None;
                        slot.last_fetched_at = Some(Instant::now());
                        slot.status = if seq <= slot.invalidated_through {
                            EntryStatus::Stale
                        } else {
                            EntryStatus::Fresh
                        };
                        debug!(key = %key, seq, status = slot.status.as_str(), "fetch applied");
                    }
                    Err(e) => {
                        debug!(key = %key, seq, error = %e, "fetch failed");
                        slot.error = Some(e);
                        slot.status = EntryStatus::Error;
                    }
                }
                true
            };

            let idle = slot.is_idle();
            if idle {
                slot.idle_since = Some(Instant::now());
            }
            let notify = if applied {
                slot.notification(key)
            } else {
                None
            };
            (notify, idle)
        };

        if let Some(notify) = notify {
            notify.deliver();
        }
        if idle {
            self.schedule_gc(key.clone());
        }
    }

    /// Register `callback` on `key`. `current` receives the snapshot of an
    /// already existing entry while the lock is still held, so it is ordered
    /// before any notification the callback can receive.
    fn add_subscriber(
        &self,
        key: &CacheKey,
        callback: Callback<V>,
        current: impl FnOnce(CacheEntry<V>),
    ) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        {
            let mut slots = self.lock();
            if let Some(slot) = slots.get(key) {
                current(slot.snapshot(key));
            }
            let slot = slots.entry(key.clone()).or_insert_with(Slot::new);
            slot.subscribers.push((id, callback));
            slot.idle_since = None;
        }
        let weak = Arc::downgrade(&self.inner);
        let owned_key = key.clone();
        Subscription::new(key.clone(), move || {
            if let Some(inner) = weak.upgrade() {
                QueryCache { inner }.remove_subscriber(&owned_key, id);
            }
        })
    }

    fn remove_subscriber(&self, key: &CacheKey, id: u64) {
        let idle = {
            let mut slots = self.lock();
            let Some(slot) = slots.get_mut(key) else {
                return;
            };
            slot.subscribers.retain(|(sid, _)| *sid != id);
            let idle = slot.is_idle();
            if idle {
                slot.idle_since = Some(Instant::now());
            }
            idle
        };
        if idle {
            self.schedule_gc(key.clone());
        }
    }

    fn schedule_gc(&self, key: CacheKey) {
        // Subscriptions may be dropped outside a runtime; collect_garbage()
        // still covers those entries.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let grace = self.inner.config.gc_grace;
        let weak = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                QueryCache { inner }.collect_if_idle(&key);
            }
        });
    }

    fn collect_if_idle(&self, key: &CacheKey) -> bool {
        let grace = self.inner.config.gc_grace;
        let mut slots = self.lock();
        let collectable = slots
            .get(key)
            .is_some_and(|slot| slot.is_collectable(grace));
        if collectable {
            slots.remove(key);
            metrics::counter!(telemetry::EVICTIONS_TOTAL).increment(1);
            debug!(key = %key, "evicted idle cache entry");
        }
        collectable
    }
}

impl<V> Default for QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_populates_fresh_entry() {
        let cache: QueryCache<String> = QueryCache::default();
        let key = CacheKey::new("sources");
        let value = cache
            .fetch(&key, || async { Ok("list".to_string()) }, ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(value, "list");

        let entry = cache.snapshot(&key).unwrap();
        assert_eq!(entry.status, EntryStatus::Fresh);
        assert_eq!(entry.value.as_deref(), Some("list"));
        assert!(entry.error.is_none());
        assert!(!entry.is_fetching);
    }

    #[tokio::test]
    async fn fresh_hit_does_not_call_fetcher() {
        let cache: QueryCache<u32> = QueryCache::default();
        let key = CacheKey::new("dashboard/stats");
        cache.set_value(&key, 7);

        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = called.clone();
        let entry = cache.read(
            &key,
            move || {
                flag.store(true, Ordering::SeqCst);
                async { Ok(0) }
            },
            ReadOptions::default(),
        );
        assert!(entry.is_fresh());
        assert_eq!(entry.value, Some(7));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_fetch_sets_error_only() {
        let cache: QueryCache<u32> = QueryCache::default();
        let key = CacheKey::new("incidents/9");
        let err = cache
            .fetch(
                &key,
                || async { Err(SyncError::NotFound("incident".into())) },
                ReadOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));

        let entry = cache.snapshot(&key).unwrap();
        assert_eq!(entry.status, EntryStatus::Error);
        assert!(entry.value.is_none());
        assert!(matches!(entry.error, Some(SyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn complete_is_idempotent() {
        let cache: QueryCache<u32> = QueryCache::default();
        let key = CacheKey::new("sources");
        cache.fetch(&key, || async { Ok(1) }, ReadOptions::default()).await.unwrap();
        // The driver task and the waiting caller both report the same seq.
        tokio::task::yield_now().await;
        let entry = cache.snapshot(&key).unwrap();
        assert_eq!(entry.value, Some(1));
        assert!(!entry.is_fetching);
    }
}
