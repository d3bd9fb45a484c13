//! Integration tests for the cache service
//!
//! These tests drive the public API end to end: store, tracking table,
//! events and statistics together.

use budget_kit::backend::{CachePriority, EntryOptions, EvictionReason};
use budget_kit::{cache_key, CacheConfig, CacheEvent, CacheService, ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct Account {
    id: u32,
    name: String,
    balance_cents: i64,
}

fn account(id: u32) -> Account {
    Account {
        id,
        name: format!("Account {}", id),
        balance_cents: 10_000 * id as i64,
    }
}

fn recorded_events(cache: &CacheService) -> Arc<Mutex<Vec<CacheEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    cache.subscribe(move |event| sink.lock().expect("lock").push(event.clone()));
    events
}

/// Miss, factory, then hit: the factory runs once and stats agree.
#[tokio::test]
async fn test_read_through_flow() {
    let cache = CacheService::in_memory();
    let loads = Arc::new(AtomicUsize::new(0));
    let key = cache_key!("account", 7);

    for _ in 0..3 {
        let loads = Arc::clone(&loads);
        let loaded = cache
            .get_or_set(
                &key,
                || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(account(7))
                },
                Some(Duration::from_secs(60)),
            )
            .await
            .expect("Failed to read through");
        assert_eq!(loaded, account(7));
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let stats = cache.statistics().expect("Failed to read statistics");
    assert_eq!(stats.miss_count, 1);
    assert_eq!(stats.hit_count, 2);
    assert_eq!(stats.set_count, 1);
    assert_eq!(stats.item_count, 1);
}

/// Pattern invalidation removes only matching keys and reports each one.
#[tokio::test]
async fn test_pattern_invalidation_with_events() {
    let cache = CacheService::in_memory();
    let events = recorded_events(&cache);

    for id in 1..=3 {
        cache
            .set(&cache_key!("account", id), account(id), None)
            .await
            .expect("Failed to set");
    }
    cache
        .set("report:monthly", "ok".to_string(), None)
        .await
        .expect("Failed to set");

    let removed = cache
        .remove_by_pattern("account:*")
        .await
        .expect("Failed to remove by pattern");
    assert_eq!(removed, 3);
    assert_eq!(cache.keys(), vec!["report:monthly".to_string()]);

    let events = events.lock().expect("lock");
    let removals = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                CacheEvent::ItemRemoved {
                    reason: EvictionReason::Removed,
                    ..
                }
            )
        })
        .count();
    assert_eq!(removals, 3);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, CacheEvent::ItemAdded { .. }))
            .count(),
        4
    );
}

/// Expired entries disappear from reads, tracking and statistics.
#[tokio::test]
async fn test_expiration_end_to_end() {
    let cache = CacheService::in_memory();
    let events = recorded_events(&cache);

    cache
        .set("session", account(1), Some(Duration::from_millis(50)))
        .await
        .expect("Failed to set");
    assert!(cache.exists("session").await.expect("Failed to check"));

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(cache.get::<Account>("session").await.expect("Failed to get"), None);
    assert!(cache.entry_info("session").is_none());

    let stats = cache.statistics().expect("Failed to read statistics");
    assert_eq!(stats.expiration_count, 1);
    assert!(events
        .lock()
        .expect("lock")
        .contains(&CacheEvent::ItemExpired {
            key: "session".to_string()
        }));
}

/// Compaction drops low-priority entries first and keeps pinned ones.
#[tokio::test]
async fn test_size_limit_compaction_respects_priority() {
    let config = CacheConfig::default()
        .with_size_limit(4)
        .with_compaction_percentage(0.5)
        .without_default_expiration();
    let cache = CacheService::from_config(config).expect("Failed to build cache");

    cache
        .set_with_options(
            "pinned",
            account(1),
            EntryOptions::default().with_priority(CachePriority::NeverRemove),
        )
        .await
        .expect("Failed to set");
    cache
        .set_with_options(
            "low",
            account(2),
            EntryOptions::default().with_priority(CachePriority::Low),
        )
        .await
        .expect("Failed to set");
    for id in 3..=5 {
        cache
            .set(&cache_key!("normal", id), account(id), None)
            .await
            .expect("Failed to set");
    }

    assert!(cache.exists("pinned").await.expect("Failed to check"));
    assert!(!cache.exists("low").await.expect("Failed to check"));

    let stats = cache.statistics().expect("Failed to read statistics");
    assert!(stats.eviction_count >= 1);
}

/// Batch calls skip missing keys and count what they touched.
#[tokio::test]
async fn test_batch_round_trip() {
    let cache = CacheService::in_memory();

    let stored = cache
        .set_many(
            (1..=4).map(|id| (cache_key!("account", id), account(id))),
            Some(Duration::from_secs(30)),
        )
        .await
        .expect("Failed to set many");
    assert_eq!(stored, 4);

    let found = cache
        .get_many::<Account>(&["account:1", "account:4", "account:9"])
        .await
        .expect("Failed to get many");
    assert_eq!(found.len(), 2);
    assert_eq!(found["account:4"], account(4));

    let removed = cache
        .remove_many(&["account:1", "account:2", "account:9"])
        .await
        .expect("Failed to remove many");
    assert_eq!(removed, 2);
    assert_eq!(cache.keys().len(), 2);
}

/// Refresh extends a live entry and rejects a missing one.
#[tokio::test]
async fn test_refresh_extends_ttl() {
    let cache = CacheService::in_memory();
    cache
        .set("rates", 1.25_f64, Some(Duration::from_secs(5)))
        .await
        .expect("Failed to set");

    cache
        .refresh("rates", Some(Duration::from_secs(600)))
        .await
        .expect("Failed to refresh");
    let ttl = cache
        .get_ttl("rates")
        .await
        .expect("Failed to read ttl")
        .expect("ttl should be set");
    assert!(ttl > Duration::from_secs(500));

    let err = cache
        .refresh("missing", None)
        .await
        .expect_err("refresh of a missing key should fail");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// Clones share one store across tasks.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_share_state() {
    let cache = CacheService::in_memory();

    let tasks: Vec<_> = (0..8)
        .map(|worker| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..25 {
                    let key = cache_key!("worker", worker, i);
                    cache
                        .set(&key, i, None)
                        .await
                        .expect("Failed to set");
                    assert_eq!(cache.get::<i32>(&key).await.expect("Failed to get"), Some(i));
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.expect("Task panicked");
    }

    assert_eq!(cache.keys().len(), 200);
    let stats = cache.statistics().expect("Failed to read statistics");
    assert_eq!(stats.hit_count, 200);
}

/// Clearing empties the store and resets counters.
#[tokio::test]
async fn test_clear() {
    let cache = CacheService::in_memory();
    let events = recorded_events(&cache);

    cache.set("a", 1_u8, None).await.expect("Failed to set");
    let _ = cache.get::<u8>("a").await.expect("Failed to get");
    cache.clear().await.expect("Failed to clear");

    assert!(cache.keys().is_empty());
    let stats = cache.statistics().expect("Failed to read statistics");
    assert_eq!(stats.total_requests(), 0);
    assert_eq!(events.lock().expect("lock").last(), Some(&CacheEvent::CacheCleared));
}
