//! In-memory expiring store (default, thread-safe, async).
//!
//! Uses DashMap for concurrent access with per-key sharding.
//! Expired entries are dropped lazily on access and by a periodic scan that
//! piggybacks on store operations. When a size limit is configured, inserts
//! that would exceed it trigger a compaction pass.

use super::{CacheBackend, CacheValue, CachePriority, EntryOptions, EvictionCallback, EvictionReason};
use crate::config::CacheConfig;
use crate::error::Result;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// In-memory cache entry with optional expiration.
struct CacheEntry {
    value: CacheValue,
    expires_at: Option<Instant>,
    last_accessed: Instant,
    priority: CachePriority,
    size: usize,
    on_evicted: Option<EvictionCallback>,
}

impl CacheEntry {
    fn new(value: CacheValue, options: EntryOptions) -> Self {
        let now = Instant::now();
        CacheEntry {
            value,
            expires_at: options.ttl.and_then(|d| now.checked_add(d)),
            last_accessed: now,
            priority: options.priority,
            size: options.size,
            on_evicted: options.on_evicted,
        }
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// An entry that left the store and still has to be reported.
type Evicted = (String, Option<EvictionCallback>, EvictionReason);

fn notify(evicted: Vec<Evicted>) {
    for (key, callback, reason) in evicted {
        if let Some(callback) = callback {
            callback(&key, reason);
        }
    }
}

/// Thread-safe async in-memory store.
///
/// Cloning is cheap and every clone shares the same entries.
///
/// # Example
///
/// ```no_run
/// use budget_kit::backend::{CacheBackend, EntryOptions, InMemoryBackend};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = InMemoryBackend::new();
///
///     backend.set("key1", Arc::new(42_i32), EntryOptions::default()).await?;
///     let value = backend.get("key1").await?;
///     assert!(value.is_some());
///
///     let options = EntryOptions::default().with_ttl(Duration::from_secs(300));
///     backend.set("key2", Arc::new("expires"), options).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheEntry>>,
    config: Arc<CacheConfig>,
    last_scan: Arc<Mutex<Instant>>,
}

impl InMemoryBackend {
    /// Create a store with [`CacheConfig::default`].
    pub fn new() -> Self {
        Self::build(CacheConfig::default())
    }

    /// Create a store with explicit limits.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the configuration is invalid.
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CacheConfig) -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
            config: Arc::new(config),
            last_scan: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the current number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Get store statistics.
    pub async fn stats(&self) -> StoreStats {
        let now = Instant::now();
        let expired_entries = self
            .store
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .count();
        let total_size = self.store.iter().map(|entry| entry.size).sum();

        StoreStats {
            total_entries: self.store.len(),
            expired_entries,
            total_size,
        }
    }

    /// Remove every expired entry now. Returns the number removed.
    pub fn scan_expired(&self) -> usize {
        let now = Instant::now();
        let expired_keys: Vec<String> = self
            .store
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = Vec::with_capacity(expired_keys.len());
        for key in expired_keys {
            if let Some((key, entry)) = self.store.remove_if(&key, |_, e| e.is_expired_at(now)) {
                evicted.push((key, entry.on_evicted, EvictionReason::Expired));
            }
        }

        let count = evicted.len();
        if count > 0 {
            debug!("✓ InMemory SCAN removed {} expired entries", count);
        }
        notify(evicted);
        count
    }

    /// Run a scan if the configured scan frequency has elapsed.
    fn maybe_scan(&self) {
        let due = match self.last_scan.try_lock() {
            Ok(mut last) if last.elapsed() >= self.config.expiration_scan_frequency => {
                *last = Instant::now();
                true
            }
            _ => false,
        };

        if due {
            self.scan_expired();
        }
    }

    /// Drop `key` if it is expired. Returns `true` if it was dropped.
    fn evict_if_expired(&self, key: &str, now: Instant) -> bool {
        match self.store.remove_if(key, |_, e| e.is_expired_at(now)) {
            Some((key, entry)) => {
                notify(vec![(key, entry.on_evicted, EvictionReason::Expired)]);
                true
            }
            None => false,
        }
    }

    /// Free room for `incoming` units ahead of inserting `skip_key`.
    ///
    /// Expired entries go first, then by ascending priority, then least
    /// recently accessed. `NeverRemove` entries are only taken if expired.
    fn compact(&self, current: usize, incoming: usize, limit: usize, skip_key: &str) -> Vec<Evicted> {
        let now = Instant::now();
        let needed = (current + incoming).saturating_sub(limit);
        let by_percentage = (current as f64 * self.config.compaction_percentage).ceil() as usize;
        let target = needed.max(by_percentage);

        let mut candidates: Vec<(bool, CachePriority, Instant, String)> = self
            .store
            .iter()
            .filter(|entry| entry.key() != skip_key)
            .filter(|entry| entry.priority != CachePriority::NeverRemove || entry.is_expired_at(now))
            .map(|entry| {
                (
                    !entry.is_expired_at(now),
                    entry.priority,
                    entry.last_accessed,
                    entry.key().clone(),
                )
            })
            .collect();
        candidates.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));

        let mut freed = 0;
        let mut evicted = Vec::new();
        for (live, _, _, key) in candidates {
            if freed >= target {
                break;
            }
            if let Some((key, entry)) = self.store.remove(&key) {
                freed += entry.size;
                let reason = if live {
                    EvictionReason::Capacity
                } else {
                    EvictionReason::Expired
                };
                evicted.push((key, entry.on_evicted, reason));
            }
        }

        if freed < needed {
            warn!(
                "⚠ InMemory size limit {} exceeded: freed {} of {} required",
                limit, freed, needed
            );
        }
        debug!(
            "✓ InMemory COMPACT evicted {} entries (freed {})",
            evicted.len(),
            freed
        );
        evicted
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.maybe_scan();
        let now = Instant::now();

        if let Some(mut entry) = self.store.get_mut(key) {
            if !entry.is_expired_at(now) {
                entry.last_accessed = now;
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(Arc::clone(&entry.value)));
            }
        }

        self.evict_if_expired(key, now);
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: CacheValue, options: EntryOptions) -> Result<()> {
        self.maybe_scan();
        let ttl = options.ttl;
        let entry = CacheEntry::new(value, options);
        let mut evicted = Vec::new();

        if let Some(limit) = self.config.size_limit {
            let current: usize = self
                .store
                .iter()
                .filter(|e| e.key() != key)
                .map(|e| e.size)
                .sum();
            if current + entry.size > limit {
                evicted.extend(self.compact(current, entry.size, limit, key));
            }
        }

        if let Some(previous) = self.store.insert(key.to_string(), entry) {
            let reason = if previous.is_expired_at(Instant::now()) {
                EvictionReason::Expired
            } else {
                EvictionReason::Replaced
            };
            evicted.push((key.to_string(), previous.on_evicted, reason));
        }

        if let Some(d) = ttl {
            debug!("✓ InMemory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ InMemory SET {}", key);
        }

        notify(evicted);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.maybe_scan();
        let now = Instant::now();

        match self.store.remove(key) {
            Some((key, entry)) => {
                let live = !entry.is_expired_at(now);
                let reason = if live {
                    EvictionReason::Removed
                } else {
                    EvictionReason::Expired
                };
                debug!("✓ InMemory DELETE {}", key);
                notify(vec![(key, entry.on_evicted, reason)]);
                Ok(live)
            }
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let live = self
            .store
            .get(key)
            .map(|entry| !entry.is_expired_at(now));

        match live {
            Some(true) => Ok(true),
            Some(false) => {
                self.evict_if_expired(key, now);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Option<Duration>>> {
        let now = Instant::now();
        let remaining = self.store.get(key).map(|entry| {
            if entry.is_expired_at(now) {
                None
            } else {
                Some(entry.expires_at.map(|exp| exp.saturating_duration_since(now)))
            }
        });

        match remaining {
            Some(Some(ttl)) => Ok(Some(ttl)),
            Some(None) => {
                self.evict_if_expired(key, now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn expire(&self, key: &str, ttl: Option<Duration>) -> Result<bool> {
        let now = Instant::now();
        let refreshed = match self.store.get_mut(key) {
            Some(mut entry) if !entry.is_expired_at(now) => {
                entry.expires_at = ttl.and_then(|d| now.checked_add(d));
                entry.last_accessed = now;
                Some(true)
            }
            Some(_) => Some(false),
            None => None,
        };

        match refreshed {
            Some(true) => {
                debug!("✓ InMemory EXPIRE {} (TTL: {:?})", key, ttl);
                Ok(true)
            }
            Some(false) => {
                self.evict_if_expired(key, now);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn clear_all(&self) -> Result<()> {
        self.store.clear();
        warn!("⚠ InMemory CLEAR_ALL executed - all entries dropped!");
        Ok(())
    }
}

/// Store statistics.
#[derive(Clone, Debug)]
pub struct StoreStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_size: usize,
}
