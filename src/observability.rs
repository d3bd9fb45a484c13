//! Observability for cache operations: statistics and metrics hooks.
//!
//! The cache service keeps two views of its own behavior:
//!
//! - **Statistics (`CacheStatistics`)**: process-wide counters kept by the
//!   service itself (hits, misses, evictions, expirations), snapshotted on
//!   demand and reset only by `clear`.
//! - **Metrics (`CacheMetrics`)**: per-operation hooks with timings, for
//!   forwarding to an external monitoring system.
//!
//! # Metrics
//!
//! ```ignore
//! use budget_kit::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("cache_hits").inc();
//!     }
//! }
//!
//! // let cache = CacheService::new(backend).with_metrics(Box::new(PrometheusMetrics));
//! ```
//!
//! Default behavior uses `NoOpMetrics`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a cache hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a cache miss.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// Record a cache set operation.
    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    /// Record a cache delete operation.
    fn record_delete(&self, key: &str, duration: Duration) {
        debug!("Cache DELETE: {} took {:?}", key, duration);
    }

    /// Record an error.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_delete(&self, _key: &str, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Snapshot of the cache service counters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub hit_count: u64,
    pub miss_count: u64,
    /// Entries compacted away by the store.
    pub eviction_count: u64,
    pub expiration_count: u64,
    pub set_count: u64,
    pub remove_count: u64,
    /// Live tracked keys at snapshot time.
    pub item_count: usize,
    pub last_reset: DateTime<Utc>,
}

impl CacheStatistics {
    pub fn total_requests(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    /// Hits over total lookups; `0.0` before the first lookup.
    pub fn hit_ratio(&self) -> f64 {
        match self.total_requests() {
            0 => 0.0,
            total => self.hit_count as f64 / total as f64,
        }
    }
}

#[derive(Clone, Debug)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    sets: u64,
    removes: u64,
    last_reset: DateTime<Utc>,
}

impl Counters {
    fn fresh() -> Self {
        Counters {
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
            sets: 0,
            removes: 0,
            last_reset: Utc::now(),
        }
    }
}

/// Counter kinds tracked by [`StatisticsRecorder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Counter {
    Hit,
    Miss,
    Eviction,
    Expiration,
    Set,
    Remove,
}

/// Counters behind one coarse lock.
pub struct StatisticsRecorder {
    counters: Mutex<Counters>,
}

impl Default for StatisticsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsRecorder {
    pub fn new() -> Self {
        StatisticsRecorder {
            counters: Mutex::new(Counters::fresh()),
        }
    }

    fn with_counters<R>(&self, f: impl FnOnce(&mut Counters) -> R) -> R {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut counters)
    }

    pub fn increment(&self, counter: Counter) {
        self.with_counters(|c| match counter {
            Counter::Hit => c.hits += 1,
            Counter::Miss => c.misses += 1,
            Counter::Eviction => c.evictions += 1,
            Counter::Expiration => c.expirations += 1,
            Counter::Set => c.sets += 1,
            Counter::Remove => c.removes += 1,
        });
    }

    pub fn reset(&self) {
        self.with_counters(|c| *c = Counters::fresh());
    }

    pub fn snapshot(&self, item_count: usize) -> CacheStatistics {
        let c = self.with_counters(|c| c.clone());
        CacheStatistics {
            hit_count: c.hits,
            miss_count: c.misses,
            eviction_count: c.evictions,
            expiration_count: c.expirations,
            set_count: c.sets,
            remove_count: c.removes,
            item_count,
            last_reset: c.last_reset,
        }
    }
}
