//! Integration tests for the query cache engine: deduplication, staleness,
//! ordering, subscriptions and garbage collection.
//!
//! Time-dependent tests run with a paused clock so sleeps advance instantly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tokio::time::sleep;

use threatsync::{
    CacheKey, EntryStatus, QueryCache, QueryConfig, ReadOptions, Result, SyncError,
};

// ============================================================================
// Helpers
// ============================================================================

type Fetcher<V> = Box<dyn FnOnce() -> BoxFuture<'static, Result<V>> + Send>;

/// Fetcher that counts invocations and resolves to `value` after `delay`.
fn counting<V: Send + 'static>(calls: Arc<AtomicU32>, delay: Duration, value: V) -> Fetcher<V> {
    Box::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            sleep(delay).await;
            Ok(value)
        })
    })
}

/// Fetcher that fails with `error` after `delay`.
fn failing<V: Send + 'static>(delay: Duration, error: SyncError) -> Fetcher<V> {
    Box::new(move || {
        Box::pin(async move {
            sleep(delay).await;
            Err(error)
        })
    })
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// ============================================================================
// Read semantics
// ============================================================================

#[tokio::test(start_paused = true)]
async fn read_of_missing_key_is_pending_then_fresh() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    let calls = Arc::new(AtomicU32::new(0));

    let entry = cache.read(&key, counting(calls.clone(), ms(50), 3), ReadOptions::default());
    assert_eq!(entry.status, EntryStatus::Pending);
    assert!(entry.value.is_none());
    assert!(entry.is_fetching);

    sleep(ms(100)).await;
    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.status, EntryStatus::Fresh);
    assert_eq!(entry.value, Some(3));
    assert!(!entry.is_fetching);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn fresh_entry_is_served_without_fetching() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("dashboard/stats");
    let calls = Arc::new(AtomicU32::new(0));

    cache
        .fetch(&key, counting(calls.clone(), ms(10), 1), ReadOptions::default())
        .await
        .unwrap();
    let entry = cache.read(&key, counting(calls.clone(), ms(10), 2), ReadOptions::default());
    assert!(entry.is_fresh());
    assert_eq!(entry.value, Some(1));

    sleep(ms(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_window_serves_value_and_refetches_once() {
    let cache: QueryCache<u32> =
        QueryCache::new(QueryConfig::new().freshness_window(Duration::from_secs(30)));
    let key = CacheKey::new("incidents").param("page", 1u32);
    let calls = Arc::new(AtomicU32::new(0));

    cache
        .fetch(&key, counting(calls.clone(), ms(10), 1), ReadOptions::default())
        .await
        .unwrap();
    sleep(Duration::from_secs(31)).await;

    let first = cache.read(&key, counting(calls.clone(), ms(50), 2), ReadOptions::default());
    let second = cache.read(&key, counting(calls.clone(), ms(50), 3), ReadOptions::default());
    assert_eq!(first.status, EntryStatus::Stale);
    assert_eq!(first.value, Some(1));
    assert_eq!(second.value, Some(1));
    assert!(second.is_fetching);

    sleep(ms(100)).await;
    let entry = cache.snapshot(&key).unwrap();
    assert!(entry.is_fresh());
    assert_eq!(entry.value, Some(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn per_read_window_overrides_config() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    let calls = Arc::new(AtomicU32::new(0));

    cache
        .fetch(&key, counting(calls.clone(), ms(10), 1), ReadOptions::default())
        .await
        .unwrap();
    let value = cache
        .fetch(&key, counting(calls.clone(), ms(10), 2), ReadOptions::always_refetch())
        .await
        .unwrap();
    assert_eq!(value, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Deduplication
// ============================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_share_one_request() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    let calls = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let key = key.clone();
        let fetcher = counting(calls.clone(), ms(50), 7);
        handles.push(tokio::spawn(async move {
            cache.fetch(&key, fetcher, ReadOptions::default()).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 7);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn attached_callers_share_the_failure() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("incidents/404");

    let first = cache.fetch(
        &key,
        failing(ms(20), SyncError::NotFound("Incident not found".into())),
        ReadOptions::default(),
    );
    let second = cache.fetch(&key, failing(ms(20), SyncError::Unauthorized), ReadOptions::default());
    let (a, b) = tokio::join!(first, second);
    assert!(matches!(a, Err(SyncError::NotFound(_))));
    assert!(matches!(b, Err(SyncError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn different_params_are_different_entries() {
    let cache: QueryCache<u32> = QueryCache::default();
    let calls = Arc::new(AtomicU32::new(0));
    let page1 = CacheKey::new("incidents").param("page", 1u32);
    let page2 = CacheKey::new("incidents").param("page", 2u32);

    let (a, b) = tokio::join!(
        cache.fetch(&page1, counting(calls.clone(), ms(10), 1), ReadOptions::default()),
        cache.fetch(&page2, counting(calls.clone(), ms(10), 2), ReadOptions::default()),
    );
    assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);
}

// ============================================================================
// Invalidation & ordering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn invalidate_marks_stale_and_keeps_value() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    let calls = Arc::new(AtomicU32::new(0));

    cache
        .fetch(&key, counting(calls.clone(), ms(10), 1), ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(cache.invalidate("sources"), 1);

    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.status, EntryStatus::Stale);
    assert_eq!(entry.value, Some(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "invalidation alone never fetches");

    let entry = cache.read(&key, counting(calls.clone(), ms(10), 2), ReadOptions::default());
    assert_eq!(entry.value, Some(1));
    sleep(ms(50)).await;
    assert_eq!(cache.snapshot(&key).unwrap().value, Some(2));
    assert!(cache.snapshot(&key).unwrap().is_fresh());
}

#[tokio::test]
async fn prefix_invalidation_respects_path_segments() {
    let cache: QueryCache<u32> = QueryCache::default();
    for resource in ["sources", "sources/1", "sourcesX", "incidents"] {
        cache.set_value(&CacheKey::new(resource), 1);
    }

    assert_eq!(cache.invalidate("sources"), 2);
    assert!(cache.snapshot(&CacheKey::new("sources")).unwrap().is_stale());
    assert!(cache.snapshot(&CacheKey::new("sources/1")).unwrap().is_stale());
    assert!(cache.snapshot(&CacheKey::new("sourcesX")).unwrap().is_fresh());
    assert!(cache.snapshot(&CacheKey::new("incidents")).unwrap().is_fresh());
}

#[tokio::test]
async fn invalidating_nothing_is_a_no_op() {
    let cache: QueryCache<u32> = QueryCache::default();
    assert_eq!(cache.invalidate("incidents"), 0);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_old_response_never_overwrites_newer_one() {
    let cache: QueryCache<&'static str> = QueryCache::default();
    let key = CacheKey::new("sources");
    let calls = Arc::new(AtomicU32::new(0));

    // A is slow, B is issued after an invalidation and returns first.
    cache.read(&key, counting(calls.clone(), ms(100), "A"), ReadOptions::default());
    cache.invalidate(key.clone());
    cache.read(&key, counting(calls.clone(), ms(10), "B"), ReadOptions::default());

    sleep(ms(50)).await;
    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.value, Some("B"));
    assert!(entry.is_fresh());

    sleep(ms(100)).await;
    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.value, Some("B"), "A landed last but is older");
    assert!(entry.is_fresh());
    assert!(!entry.is_fetching);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn response_requested_before_invalidation_lands_stale() {
    let cache: QueryCache<&'static str> = QueryCache::default();
    let key = CacheKey::new("sources");
    let calls = Arc::new(AtomicU32::new(0));

    // A returns first but predates the invalidation; B is the real refresh.
    cache.read(&key, counting(calls.clone(), ms(10), "A"), ReadOptions::default());
    cache.invalidate(key.clone());
    cache.read(&key, counting(calls.clone(), ms(100), "B"), ReadOptions::default());

    sleep(ms(50)).await;
    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.value, Some("A"));
    assert_eq!(entry.status, EntryStatus::Stale);
    assert!(entry.is_fetching);

    sleep(ms(100)).await;
    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.value, Some("B"));
    assert!(entry.is_fresh());
}

#[tokio::test(start_paused = true)]
async fn set_value_discards_in_flight_response() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    let calls = Arc::new(AtomicU32::new(0));

    cache.read(&key, counting(calls.clone(), ms(50), 1), ReadOptions::default());
    cache.set_value(&key, 5);
    sleep(ms(100)).await;

    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.value, Some(5));
    assert!(entry.is_fresh());
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test(start_paused = true)]
async fn error_entry_refetches_on_next_read() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("dashboard/stats");
    let calls = Arc::new(AtomicU32::new(0));

    let err = cache
        .fetch(
            &key,
            failing(ms(10), SyncError::Server { status: 500, message: "boom".into() }),
            ReadOptions::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.status, EntryStatus::Error);
    assert!(entry.error.is_some());

    let entry = cache.read(&key, counting(calls.clone(), ms(10), 9), ReadOptions::default());
    assert_eq!(entry.status, EntryStatus::Pending);
    assert!(entry.error.is_none());

    sleep(ms(50)).await;
    let entry = cache.snapshot(&key).unwrap();
    assert!(entry.is_fresh());
    assert_eq!(entry.value, Some(9));
    assert!(entry.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn failed_refetch_keeps_last_value() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");

    cache.set_value(&key, 1);
    cache.invalidate(key.clone());
    let result = cache
        .fetch(&key, failing(ms(10), SyncError::Network("reset".into())), ReadOptions::default())
        .await;
    assert!(result.unwrap_err().is_network_failure());

    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.status, EntryStatus::Error);
    assert_eq!(entry.value, Some(1));
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out_into_error_entry() {
    let cache: QueryCache<u32> =
        QueryCache::new(QueryConfig::new().fetch_timeout(Duration::from_secs(1)));
    let key = CacheKey::new("analytics/trends").param("days", 30u32);
    let calls = Arc::new(AtomicU32::new(0));

    let err = cache
        .fetch(
            &key,
            counting(calls.clone(), Duration::from_secs(10), 1),
            ReadOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let entry = cache.snapshot(&key).unwrap();
    assert!(entry.is_error());
    assert!(entry.error.as_ref().is_some_and(SyncError::is_timeout));
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn subscriber_sees_pending_then_fresh() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let _subscription = cache.subscribe(&key, move |entry| {
        sink.lock().unwrap().push((entry.status, entry.value));
    });
    cache
        .fetch(&key, counting(Arc::default(), ms(10), 4), ReadOptions::default())
        .await
        .unwrap();
    sleep(ms(10)).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(EntryStatus::Pending, None), (EntryStatus::Fresh, Some(4))]
    );
}

#[tokio::test]
async fn subscriber_count_tracks_handles() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");

    let a = cache.subscribe(&key, |_| {});
    let b = cache.subscribe(&key, |_| {});
    assert_eq!(cache.snapshot(&key).unwrap().subscriber_count, 2);
    assert_eq!(cache.snapshot(&key).unwrap().status, EntryStatus::Pending);

    drop(a);
    assert_eq!(cache.snapshot(&key).unwrap().subscriber_count, 1);
    b.unsubscribe();
    assert_eq!(cache.snapshot(&key).unwrap().subscriber_count, 0);
}

#[tokio::test(start_paused = true)]
async fn unsubscribing_does_not_cancel_fetch() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    let subscription = cache.subscribe(&key, |_| {});

    cache.read(&key, counting(Arc::default(), ms(50), 8), ReadOptions::default());
    drop(subscription);
    sleep(ms(100)).await;

    assert_eq!(cache.snapshot(&key).unwrap().value, Some(8));
}

#[tokio::test(start_paused = true)]
async fn stream_yields_current_then_changes() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    cache.set_value(&key, 1);

    let mut stream = cache.subscribe_stream(&key);
    let first = stream.next().await.unwrap();
    assert_eq!((first.status, first.value), (EntryStatus::Fresh, Some(1)));

    cache.invalidate(key.clone());
    let second = stream.next().await.unwrap();
    assert_eq!((second.status, second.value), (EntryStatus::Stale, Some(1)));

    cache.read(&key, counting(Arc::default(), ms(10), 2), ReadOptions::default());
    let third = stream.next().await.unwrap();
    assert_eq!(third.value, Some(1));
    assert!(third.is_fetching);
    let fourth = stream.next().await.unwrap();
    assert_eq!((fourth.status, fourth.value), (EntryStatus::Fresh, Some(2)));

    assert_eq!(cache.snapshot(&key).unwrap().subscriber_count, 1);
    drop(stream);
    assert_eq!(cache.snapshot(&key).unwrap().subscriber_count, 0);
}

// ============================================================================
// Garbage collection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn unobserved_entry_is_evicted_after_grace() {
    let cache: QueryCache<u32> =
        QueryCache::new(QueryConfig::new().gc_grace(Duration::from_secs(60)));
    let key = CacheKey::new("sources");

    cache
        .fetch(&key, counting(Arc::default(), ms(10), 1), ReadOptions::default())
        .await
        .unwrap();
    sleep(Duration::from_secs(30)).await;
    assert!(cache.contains(&key));

    sleep(Duration::from_secs(31)).await;
    assert!(!cache.contains(&key));
}

#[tokio::test(start_paused = true)]
async fn observed_entry_survives_until_unsubscribed() {
    let cache: QueryCache<u32> =
        QueryCache::new(QueryConfig::new().gc_grace(Duration::from_secs(60)));
    let key = CacheKey::new("sources");
    let subscription = cache.subscribe(&key, |_| {});

    cache
        .fetch(&key, counting(Arc::default(), ms(10), 1), ReadOptions::default())
        .await
        .unwrap();
    sleep(Duration::from_secs(600)).await;
    assert!(cache.contains(&key));
    assert_eq!(cache.collect_garbage(), 0);

    drop(subscription);
    sleep(Duration::from_secs(59)).await;
    assert!(cache.contains(&key));
    sleep(Duration::from_secs(2)).await;
    assert!(!cache.contains(&key));
}

#[tokio::test(start_paused = true)]
async fn pending_entry_is_never_evicted() {
    let cache: QueryCache<u32> =
        QueryCache::new(QueryConfig::new().gc_grace(Duration::from_secs(60)));
    let key = CacheKey::new("sources");

    cache.read(
        &key,
        counting(Arc::default(), Duration::from_secs(120), 1),
        ReadOptions::default(),
    );
    sleep(Duration::from_secs(90)).await;
    assert_eq!(cache.collect_garbage(), 0);
    assert!(cache.snapshot(&key).unwrap().is_pending());

    // Fetch lands at 120s; eviction follows one grace period later.
    sleep(Duration::from_secs(60)).await;
    assert_eq!(cache.snapshot(&key).unwrap().value, Some(1));
    sleep(Duration::from_secs(40)).await;
    assert!(!cache.contains(&key));
}

#[tokio::test(start_paused = true)]
async fn resubscribing_within_grace_keeps_entry() {
    let cache: QueryCache<u32> =
        QueryCache::new(QueryConfig::new().gc_grace(Duration::from_secs(60)));
    let key = CacheKey::new("sources");
    cache.set_value(&key, 1);

    sleep(Duration::from_secs(30)).await;
    let _subscription = cache.subscribe(&key, |_| {});
    sleep(Duration::from_secs(60)).await;

    assert_eq!(cache.snapshot(&key).unwrap().value, Some(1));
}

#[tokio::test]
async fn clear_and_remove() {
    let cache: QueryCache<u32> = QueryCache::default();
    cache.set_value(&CacheKey::new("sources"), 1);
    cache.set_value(&CacheKey::new("incidents"), 2);

    let removed = cache.remove(&CacheKey::new("sources")).unwrap();
    assert_eq!(removed.value, Some(1));
    assert!(cache.remove(&CacheKey::new("sources")).is_none());
    assert_eq!(cache.clear(), 1);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn clear_empties_observed_entries_and_keeps_them_live() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let _subscription = cache.subscribe(&key, move |entry| {
        sink.lock().unwrap().push((entry.status, entry.value));
    });
    cache.set_value(&key, 1);
    cache.set_value(&CacheKey::new("incidents"), 2);

    assert_eq!(cache.clear(), 2);
    assert!(!cache.contains(&CacheKey::new("incidents")));
    let entry = cache.snapshot(&key).unwrap();
    assert_eq!((entry.status, entry.value), (EntryStatus::Pending, None));
    assert_eq!(entry.subscriber_count, 1);

    cache
        .fetch(&key, counting(Arc::default(), ms(10), 3), ReadOptions::default())
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (EntryStatus::Fresh, Some(1)),
            (EntryStatus::Pending, None),
            (EntryStatus::Pending, None),
            (EntryStatus::Fresh, Some(3)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn clear_discards_success_requested_before_it() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    cache.read(&key, counting(Arc::default(), ms(50), 1), ReadOptions::default());

    cache.clear();
    assert!(cache.contains(&key), "an entry with a fetch outstanding stays");
    sleep(ms(100)).await;

    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.status, EntryStatus::Pending);
    assert!(entry.value.is_none());
    assert!(!entry.is_fetching);
}

#[tokio::test(start_paused = true)]
async fn clear_lets_failure_requested_before_it_land() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    cache.read(
        &key,
        failing(ms(50), SyncError::Unauthorized),
        ReadOptions::default(),
    );

    cache.clear();
    sleep(ms(100)).await;

    let entry = cache.snapshot(&key).unwrap();
    assert_eq!(entry.status, EntryStatus::Error);
    assert!(matches!(entry.error, Some(SyncError::Unauthorized)));
}

#[tokio::test(start_paused = true)]
async fn read_after_clear_does_not_attach_to_old_fetch() {
    let cache: QueryCache<u32> = QueryCache::default();
    let key = CacheKey::new("sources");
    let calls = Arc::new(AtomicU32::new(0));
    cache.read(&key, counting(calls.clone(), ms(50), 1), ReadOptions::default());

    cache.clear();
    let value = cache
        .fetch(&key, counting(calls.clone(), ms(80), 2), ReadOptions::default())
        .await
        .unwrap();

    assert_eq!(value, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.snapshot(&key).unwrap().value, Some(2));
}
