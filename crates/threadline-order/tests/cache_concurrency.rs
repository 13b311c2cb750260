//! Concurrency tests for the order cache's single-flight fetches.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use threadline_core::{Config, DiscussionId, OrderRow, ThreadlineResult};
use threadline_order::{FetchOutcome, OrderCache, OrderSource};

fn rows(n: i64) -> Vec<OrderRow> {
    (0..n)
        .map(|i| OrderRow {
            post_id: i + 1,
            order: i,
            depth: 0,
            parent_post_id: None,
        })
        .collect()
}

fn slow_source(exec_count: Arc<AtomicUsize>, delay: Duration) -> Arc<dyn OrderSource> {
    Arc::new(
        move |_discussion_id: DiscussionId| -> ThreadlineResult<Vec<OrderRow>> {
            exec_count.fetch_add(1, Ordering::SeqCst);
            thread::sleep(delay);
            Ok(rows(5))
        },
    )
}

/// 32 threads force-fetching the same discussion. Coalescing must collapse
/// most of them onto a shared request.
#[test]
#[allow(clippy::needless_collect)]
fn many_threads_same_discussion_share_fetch() {
    let n = 32;
    let exec_count = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(OrderCache::new(
        slow_source(Arc::clone(&exec_count), Duration::from_millis(30)),
        &Config::default(),
    ));
    let barrier = Arc::new(Barrier::new(n));

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.fetch(7, true)
            })
        })
        .collect();

    let outcomes: Vec<FetchOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(outcomes.len(), n);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, FetchOutcome::Refreshed { records: 5 } | FetchOutcome::Joined))
    );
    let execs = exec_count.load(Ordering::SeqCst);
    assert!(execs < n, "expected coalescing below {n} requests, got {execs}");
    assert!(cache.metrics().joins > 0);
    assert!(!cache.is_fetching(7));
    assert_eq!(cache.read(7).len(), 5);
}

/// Distinct discussions never coalesce with each other.
#[test]
#[allow(clippy::needless_collect)]
fn distinct_discussions_fetch_independently() {
    let n = 16;
    let exec_count = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(OrderCache::new(
        slow_source(Arc::clone(&exec_count), Duration::from_millis(5)),
        &Config::default(),
    ));
    let barrier = Arc::new(Barrier::new(n));

    let handles: Vec<_> = (0..n)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.fetch(i64::try_from(i).unwrap(), false)
            })
        })
        .collect();
    for h in handles {
        assert!(matches!(h.join().unwrap(), FetchOutcome::Refreshed { .. }));
    }
    assert_eq!(exec_count.load(Ordering::SeqCst), n);
    assert_eq!(cache.len(), n);
}

/// A joiner that gives up falls back to the snapshot and never issues its
/// own request.
#[test]
fn join_timeout_falls_back_without_duplicate_request() {
    let exec_count = Arc::new(AtomicUsize::new(0));
    let config = Config {
        fetch_join_timeout: Duration::from_millis(10),
        ..Config::default()
    };
    let cache = Arc::new(OrderCache::new(
        slow_source(Arc::clone(&exec_count), Duration::from_millis(200)),
        &config,
    ));

    let leader = cache.fetch_in_background(3, false).unwrap();
    while cache.metrics().fetches == 0 {
        thread::yield_now();
    }
    assert_eq!(cache.fetch(3, true), FetchOutcome::TimedOut);
    assert!(cache.wait(3).is_empty(), "snapshot is still empty mid-fetch");

    assert!(matches!(leader.join().unwrap(), FetchOutcome::Refreshed { .. }));
    assert_eq!(exec_count.load(Ordering::SeqCst), 1);
    assert!(cache.metrics().timeouts >= 2);
}

/// Evicting a discussion mid-fetch drops the late result.
#[test]
fn eviction_discards_in_flight_result() {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = std::sync::Mutex::new(release_rx);
    let source: Arc<dyn OrderSource> = Arc::new(
        move |_discussion_id: DiscussionId| -> ThreadlineResult<Vec<OrderRow>> {
            let _ = started_tx.send(());
            let _ = release_rx.lock().unwrap().recv();
            Ok(rows(3))
        },
    );
    let cache = Arc::new(OrderCache::new(source, &Config::default()));
    let ready = cache.subscribe();

    let fetch = cache.fetch_in_background(11, false).unwrap();
    started_rx.recv().unwrap();
    cache.evict(11);
    release_tx.send(()).unwrap();

    assert_eq!(fetch.join().unwrap(), FetchOutcome::Discarded);
    assert!(cache.read(11).is_empty());
    assert!(ready.try_recv().is_err(), "no ready signal for a discarded table");
    assert_eq!(cache.metrics().discarded, 1);
}

/// Waiters on an in-flight fetch receive the leader's table.
#[test]
fn wait_joins_in_flight_fetch() {
    let exec_count = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(OrderCache::new(
        slow_source(Arc::clone(&exec_count), Duration::from_millis(50)),
        &Config::default(),
    ));
    let leader = cache.fetch_in_background(2, false).unwrap();
    while cache.metrics().fetches == 0 {
        thread::yield_now();
    }
    let table = cache.wait(2);
    assert_eq!(table.len(), 5);
    leader.join().unwrap();
    assert_eq!(exec_count.load(Ordering::SeqCst), 1);
}
