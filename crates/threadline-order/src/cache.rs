//! Per-discussion cache of precomputed order tables.
//!
//! ## Contract
//!
//! - `fetch(discussion, force)`: refresh from the [`OrderSource`]. At most one
//!   fetch per discussion is in flight; concurrent callers join it. `force`
//!   bypasses the TTL, never the in-flight de-duplication.
//! - `read(discussion)`: the current snapshot, possibly stale or empty. Never
//!   blocks on the network.
//! - `wait(discussion)`: join an in-flight fetch, or return data within TTL,
//!   or fetch.
//! - `invalidate(discussion)`: mark stale; `read` keeps serving the old table.
//! - `evict(discussion)` / `clear()`: discard on discussion context switch.
//!
//! ## Failure
//!
//! A failed fetch keeps the previous table (or an empty one) and still marks
//! it fresh, so a broken endpoint is asked again only after the TTL. Panics in
//! the source are caught and treated the same way.
//!
//! ## Snapshots
//!
//! Tables are shared as `Arc<OrderTable>` and swapped wholesale on refresh;
//! readers never observe a half-built table.
//!
//! ## Capacity
//!
//! Discussions are kept in LRU order (`IndexMap`); the oldest is evicted when
//! `max_cached_discussions` is reached.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;
use threadline_core::{Config, DiscussionId, OrderTable, PostEntry, PostId};

use crate::coalesce::{InflightMap, Role, Slot};
use crate::depth::{DepthResolver, ParentIndex};
use crate::source::OrderSource;

/// Broadcast after a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderReady {
    pub discussion_id: DiscussionId,
}

/// What a call to [`OrderCache::fetch`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// New rows were fetched and published.
    Refreshed { records: usize },
    /// The source failed; the previous table was kept and marked fresh.
    Failed,
    /// Joined a fetch already in flight.
    Joined,
    /// The cached table was within TTL; nothing was requested.
    Fresh,
    /// Joining timed out; the cached snapshot stands.
    TimedOut,
    /// The discussion was evicted while the fetch ran; the result was dropped.
    Discarded,
}

/// Lock-free cache counters.
#[derive(Debug, Default)]
pub struct OrderCacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    joins: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    discarded: AtomicU64,
}

/// Snapshot of cache metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderCacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub joins: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub discarded: u64,
}

impl OrderCacheMetricsSnapshot {
    /// Hit rate (0.0–1.0). Returns 0.0 if no lookups yet.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl OrderCacheMetrics {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the current metric values.
    pub fn snapshot(&self) -> OrderCacheMetricsSnapshot {
        OrderCacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

struct CacheEntry {
    table: Arc<OrderTable>,
    fetched_at: Instant,
    stale: bool,
}

impl CacheEntry {
    fn new(table: Arc<OrderTable>) -> Self {
        Self {
            table,
            fetched_at: Instant::now(),
            stale: false,
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        !self.stale && self.fetched_at.elapsed() <= ttl
    }
}

/// Order tables keyed by discussion.
pub struct OrderCache {
    source: Arc<dyn OrderSource>,
    entries: Mutex<IndexMap<DiscussionId, CacheEntry>>,
    inflight: InflightMap<DiscussionId, Arc<OrderTable>>,
    subscribers: Mutex<Vec<Sender<OrderReady>>>,
    metrics: OrderCacheMetrics,
    empty: Arc<OrderTable>,
    ttl: Duration,
    join_timeout: Duration,
    missing_refetch_cooldown: Duration,
    capacity: usize,
    max_depth: u32,
    max_parent_hops: u32,
}

impl OrderCache {
    #[must_use]
    pub fn new(source: Arc<dyn OrderSource>, config: &Config) -> Self {
        Self {
            source,
            entries: Mutex::new(IndexMap::new()),
            inflight: InflightMap::new(),
            subscribers: Mutex::new(Vec::new()),
            metrics: OrderCacheMetrics::default(),
            empty: Arc::new(OrderTable::new()),
            ttl: config.order_ttl,
            join_timeout: config.fetch_join_timeout,
            missing_refetch_cooldown: config.missing_refetch_cooldown,
            capacity: config.max_cached_discussions.max(1),
            max_depth: config.max_depth,
            max_parent_hops: config.max_parent_hops,
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Current snapshot for `discussion_id`; empty if never fetched.
    pub fn read(&self, discussion_id: DiscussionId) -> Arc<OrderTable> {
        let mut map = self.lock_entries();
        let Some(idx) = map.get_index_of(&discussion_id) else {
            OrderCacheMetrics::bump(&self.metrics.misses);
            return Arc::clone(&self.empty);
        };
        let last = map.len() - 1;
        map.move_index(idx, last);
        OrderCacheMetrics::bump(&self.metrics.hits);
        map.get_index(last)
            .map_or_else(|| Arc::clone(&self.empty), |(_, e)| Arc::clone(&e.table))
    }

    /// Await an in-flight fetch, or return data within TTL, or fetch now.
    pub fn wait(&self, discussion_id: DiscussionId) -> Arc<OrderTable> {
        if let Some(slot) = self.inflight.get(&discussion_id) {
            return match slot.wait(self.join_timeout) {
                Ok(table) => {
                    OrderCacheMetrics::bump(&self.metrics.joins);
                    table
                }
                Err(e) => {
                    OrderCacheMetrics::bump(&self.metrics.timeouts);
                    tracing::debug!(discussion_id, error = %e, "order wait fell back to snapshot");
                    self.read(discussion_id)
                }
            };
        }
        if let Some(table) = self.fresh_table(discussion_id) {
            OrderCacheMetrics::bump(&self.metrics.hits);
            return table;
        }
        self.fetch(discussion_id, false);
        self.read(discussion_id)
    }

    /// Whether a table exists and is within TTL.
    pub fn is_fresh(&self, discussion_id: DiscussionId) -> bool {
        self.fresh_table(discussion_id).is_some()
    }

    /// Whether a fetch for `discussion_id` is running.
    pub fn is_fetching(&self, discussion_id: DiscussionId) -> bool {
        self.inflight.contains(&discussion_id)
    }

    /// Depth of `post` using this cache's table for the post's discussion,
    /// falling back to the post's own hint and then the local parent chain.
    pub fn depth_of(&self, post: &PostEntry, parents: &ParentIndex) -> u32 {
        let table = self.read(post.discussion_id);
        DepthResolver::with_limits(&table, parents, self.max_depth, self.max_parent_hops)
            .depth_of(post)
    }

    /// Whether `ids` contains posts the table does not know about and the
    /// table is old enough that asking again is reasonable.
    pub fn needs_refresh_for(
        &self,
        discussion_id: DiscussionId,
        ids: impl IntoIterator<Item = PostId>,
    ) -> bool {
        if self.inflight.contains(&discussion_id) {
            return false;
        }
        let map = self.lock_entries();
        let Some(entry) = map.get(&discussion_id) else {
            return true;
        };
        if entry.stale {
            return true;
        }
        entry.fetched_at.elapsed() >= self.missing_refetch_cooldown
            && !entry.table.missing(ids).is_empty()
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Refresh the table for `discussion_id` from the source.
    pub fn fetch(&self, discussion_id: DiscussionId, force: bool) -> FetchOutcome {
        if !force && !self.inflight.contains(&discussion_id) && self.is_fresh(discussion_id) {
            return FetchOutcome::Fresh;
        }
        match self.inflight.claim(&discussion_id) {
            Role::Joiner(slot) => match slot.wait(self.join_timeout) {
                Ok(_) => {
                    OrderCacheMetrics::bump(&self.metrics.joins);
                    FetchOutcome::Joined
                }
                Err(e) => {
                    OrderCacheMetrics::bump(&self.metrics.timeouts);
                    tracing::debug!(discussion_id, error = %e, "order fetch join gave up");
                    FetchOutcome::TimedOut
                }
            },
            Role::Leader(slot) => {
                let _leader = LeaderGuard {
                    inflight: &self.inflight,
                    key: discussion_id,
                    slot: Arc::clone(&slot),
                };
                OrderCacheMetrics::bump(&self.metrics.fetches);
                let (table, outcome) = self.run_source(discussion_id);

                if slot.is_discarded() {
                    OrderCacheMetrics::bump(&self.metrics.discarded);
                    tracing::debug!(discussion_id, "discarding order fetched for evicted discussion");
                    slot.complete(&table);
                    return FetchOutcome::Discarded;
                }

                self.store(discussion_id, Arc::clone(&table));
                if matches!(outcome, FetchOutcome::Refreshed { .. }) {
                    self.notify(OrderReady { discussion_id });
                }
                slot.complete(&table);
                outcome
            }
        }
    }

    /// Run [`fetch`](Self::fetch) on a worker thread.
    pub fn fetch_in_background(
        self: &Arc<Self>,
        discussion_id: DiscussionId,
        force: bool,
    ) -> std::io::Result<JoinHandle<FetchOutcome>> {
        let cache = Arc::clone(self);
        std::thread::Builder::new()
            .name(format!("threadline-order-{discussion_id}"))
            .spawn(move || cache.fetch(discussion_id, force))
    }

    /// Install a table directly (locally computed or preloaded data).
    pub fn prime(&self, discussion_id: DiscussionId, table: OrderTable) {
        self.store(discussion_id, Arc::new(table));
        self.notify(OrderReady { discussion_id });
    }

    // -------------------------------------------------------------------------
    // Invalidation
    // -------------------------------------------------------------------------

    /// Mark the table stale; the next `fetch`/`wait` goes to the source.
    pub fn invalidate(&self, discussion_id: DiscussionId) {
        if let Some(entry) = self.lock_entries().get_mut(&discussion_id) {
            entry.stale = true;
        }
    }

    /// Drop everything cached for `discussion_id`, including a running fetch's
    /// eventual result.
    pub fn evict(&self, discussion_id: DiscussionId) {
        self.lock_entries().shift_remove(&discussion_id);
        if self.inflight.detach(&discussion_id) {
            tracing::debug!(discussion_id, "evicted discussion with fetch in flight");
        }
    }

    /// Drop all discussions.
    pub fn clear(&self) {
        self.lock_entries().clear();
        self.inflight.detach_all();
    }

    /// Number of cached discussions.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    /// Receive [`OrderReady`] after each successful refresh.
    ///
    /// Delivery is asynchronous; a receiver that is dropped is pruned on the
    /// next broadcast.
    pub fn subscribe(&self) -> Receiver<OrderReady> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn metrics(&self) -> OrderCacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, IndexMap<DiscussionId, CacheEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn fresh_table(&self, discussion_id: DiscussionId) -> Option<Arc<OrderTable>> {
        self.lock_entries()
            .get(&discussion_id)
            .filter(|e| e.is_fresh(self.ttl))
            .map(|e| Arc::clone(&e.table))
    }

    fn previous_or_empty(&self, discussion_id: DiscussionId) -> Arc<OrderTable> {
        self.lock_entries()
            .get(&discussion_id)
            .map_or_else(|| Arc::clone(&self.empty), |e| Arc::clone(&e.table))
    }

    /// Call the source without holding any lock.
    fn run_source(&self, discussion_id: DiscussionId) -> (Arc<OrderTable>, FetchOutcome) {
        let result = catch_unwind(AssertUnwindSafe(|| self.source.fetch_order(discussion_id)));
        match result {
            Ok(Ok(rows)) => {
                let table = OrderTable::from_rows(rows);
                let records = table.len();
                tracing::debug!(discussion_id, records, "order table refreshed");
                (Arc::new(table), FetchOutcome::Refreshed { records })
            }
            Ok(Err(e)) => {
                OrderCacheMetrics::bump(&self.metrics.failures);
                tracing::warn!(discussion_id, error = %e, "order fetch failed; keeping previous table");
                (self.previous_or_empty(discussion_id), FetchOutcome::Failed)
            }
            Err(payload) => {
                OrderCacheMetrics::bump(&self.metrics.failures);
                tracing::warn!(
                    discussion_id,
                    panic = panic_payload_message(payload.as_ref()),
                    "order source panicked; keeping previous table"
                );
                (self.previous_or_empty(discussion_id), FetchOutcome::Failed)
            }
        }
    }

    fn store(&self, discussion_id: DiscussionId, table: Arc<OrderTable>) {
        let mut map = self.lock_entries();
        if !map.contains_key(&discussion_id) {
            while map.len() >= self.capacity {
                if let Some((evicted, _)) = map.shift_remove_index(0) {
                    tracing::debug!(discussion_id = evicted, "order cache LRU eviction");
                }
            }
        }
        map.shift_remove(&discussion_id);
        map.insert(discussion_id, CacheEntry::new(table));
    }

    fn notify(&self, event: OrderReady) {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|tx| tx.send(event).is_ok());
    }
}

/// Unregisters the leader's slot on every exit path. Joiners of a leader that
/// never completed are woken with [`JoinError::Abandoned`](crate::coalesce::JoinError).
struct LeaderGuard<'a> {
    inflight: &'a InflightMap<DiscussionId, Arc<OrderTable>>,
    key: DiscussionId,
    slot: Arc<Slot<Arc<OrderTable>>>,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        self.slot.abandon();
        self.inflight.finish(&self.key, &self.slot);
    }
}

fn panic_payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
