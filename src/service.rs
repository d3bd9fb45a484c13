//! High-level cache service.
//!
//! Wraps an expiring store with key tracking, statistics, lifecycle events and
//! metrics hooks. Every operation returns [`Result`]; store failures are logged
//! and converted into `System` errors instead of escaping as panics.

use crate::backend::{
    CacheBackend, CacheValue, EntryOptions, EvictionCallback, EvictionReason, InMemoryBackend,
};
use crate::config::CacheConfig;
use crate::error::{codes, Error, Result};
use crate::events::{CacheEvent, CacheEvents, SubscriptionId};
use crate::key::glob_to_regex;
use crate::observability::{CacheMetrics, CacheStatistics, Counter, NoOpMetrics, StatisticsRecorder};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What the service knows about a live key.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedEntry {
    pub created_at: DateTime<Utc>,
    pub ttl: Option<Duration>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TrackedEntry {
    fn new(ttl: Option<Duration>) -> Self {
        TrackedEntry {
            created_at: Utc::now(),
            ttl,
            expires_at: expiry_from_now(ttl),
        }
    }
}

/// `None` when there is no TTL or the expiry is past the representable range.
fn expiry_from_now(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.and_then(|d| chrono::Duration::from_std(d).ok())
        .and_then(|d| Utc::now().checked_add_signed(d))
}

/// State shared between the service and the eviction callbacks it registers.
#[derive(Default)]
struct CacheState {
    tracked: DashMap<String, TrackedEntry>,
    stats: StatisticsRecorder,
    events: CacheEvents,
}

impl CacheState {
    fn on_evicted(&self, key: &str, reason: EvictionReason) {
        match reason {
            // The new value is tracked by the `set` that replaced it.
            EvictionReason::Replaced => {}
            EvictionReason::Expired => {
                self.tracked.remove(key);
                self.stats.increment(Counter::Expiration);
                debug!("✓ Cache EXPIRED {}", key);
                self.events.emit(&CacheEvent::ItemExpired {
                    key: key.to_string(),
                });
            }
            EvictionReason::Capacity => {
                self.tracked.remove(key);
                self.stats.increment(Counter::Eviction);
                debug!("✓ Cache EVICTED {} (capacity)", key);
                self.events.emit(&CacheEvent::ItemRemoved {
                    key: key.to_string(),
                    reason,
                });
            }
            EvictionReason::Removed => {
                self.tracked.remove(key);
                self.stats.increment(Counter::Remove);
                self.events.emit(&CacheEvent::ItemRemoved {
                    key: key.to_string(),
                    reason,
                });
            }
        }
    }
}

/// In-process cache service.
///
/// Cloning is cheap; clones share the store, tracking table, statistics and
/// subscribers.
///
/// # Example
///
/// ```
/// use budget_kit::CacheService;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> budget_kit::Result<()> {
/// let cache = CacheService::in_memory();
///
/// cache.set("answer", 42_i32, Some(Duration::from_secs(60))).await?;
/// assert_eq!(cache.get::<i32>("answer").await?, Some(42));
///
/// let total = cache
///     .get_or_set("total", || async { Ok::<_, String>(7_u64) }, None)
///     .await?;
/// assert_eq!(total, 7);
/// # Ok(())
/// # }
/// ```
///
/// # Concurrency
///
/// `get_or_set` does not coalesce concurrent misses on the same key: two
/// callers that miss at the same time both run their factory, and the last
/// write wins.
#[derive(Clone)]
pub struct CacheService<B: CacheBackend = InMemoryBackend> {
    backend: B,
    state: Arc<CacheState>,
    metrics: Arc<dyn CacheMetrics>,
    default_ttl: Option<Duration>,
}

impl CacheService<InMemoryBackend> {
    /// Service over an in-memory store with default limits and no default TTL.
    pub fn in_memory() -> Self {
        CacheService::new(InMemoryBackend::new())
    }

    /// Service over an in-memory store configured by `config`.
    ///
    /// `config.default_expiration` becomes the service's default TTL.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the configuration is invalid.
    pub fn from_config(config: CacheConfig) -> Result<Self> {
        let default_ttl = config.default_expiration;
        let backend = InMemoryBackend::with_config(config)?;
        Ok(CacheService::new(backend).with_default_ttl(default_ttl))
    }
}

impl<B: CacheBackend> CacheService<B> {
    /// Create a new cache service with the given backend.
    pub fn new(backend: B) -> Self {
        CacheService {
            backend,
            state: Arc::new(CacheState::default()),
            metrics: Arc::new(NoOpMetrics),
            default_ttl: None,
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = Arc::from(metrics);
        self
    }

    /// TTL used by `set`/`get_or_set` when the caller passes `None`.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Register a lifecycle event subscriber.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.state.events.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.events.unsubscribe(id)
    }

    fn check_key(key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(Error::validation(
                codes::INVALID_KEY,
                "Cache key cannot be empty",
            ));
        }
        Ok(())
    }

    /// Log a store failure and convert it into a `System` error.
    fn failure(&self, operation: &str, key: &str, err: Error) -> Error {
        error!("Cache {} failed for {}: {}", operation, key, err);
        self.metrics.record_error(key, err.message());
        Error::system(
            codes::CACHE_ERROR,
            format!("Cache {} failed for '{}': {}", operation, key, err.message()),
        )
        .with_metadata("key", key)
        .with_metadata("operation", operation)
    }

    fn eviction_callback(&self, chained: Option<EvictionCallback>) -> EvictionCallback {
        let state = Arc::clone(&self.state);
        Arc::new(move |key: &str, reason: EvictionReason| {
            state.on_evicted(key, reason);
            if let Some(chained) = &chained {
                chained(key, reason);
            }
        })
    }

    /// Look up a live value of type `T`.
    ///
    /// # Returns
    /// - `Ok(Some(value))` - Live entry stored as `T`
    /// - `Ok(None)` - Absent, expired, or stored as another type
    ///
    /// # Errors
    /// - `Validation` for an empty key
    /// - `System` if the store fails
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: Any + Send + Sync + Clone,
    {
        Self::check_key(key)?;
        let start = Instant::now();

        let found = match self.backend.get(key).await {
            Ok(found) => found,
            Err(e) => return Err(self.failure("get", key, e)),
        };

        let value = found.and_then(|value| match value.downcast::<T>() {
            Ok(typed) => Some(T::clone(&typed)),
            Err(_) => {
                debug!(
                    "Cache GET {} -> stored type is not {}",
                    key,
                    std::any::type_name::<T>()
                );
                None
            }
        });

        if value.is_some() {
            self.state.stats.increment(Counter::Hit);
            self.metrics.record_hit(key, start.elapsed());
        } else {
            self.state.stats.increment(Counter::Miss);
            self.metrics.record_miss(key, start.elapsed());
        }

        Ok(value)
    }

    /// Insert or overwrite `key`.
    ///
    /// `ttl` of `None` falls back to the service's default TTL.
    ///
    /// # Errors
    /// - `Validation` for an empty key
    /// - `System` if the store fails
    pub async fn set<T>(&self, key: &str, value: T, ttl: Option<Duration>) -> Result<()>
    where
        T: Any + Send + Sync,
    {
        let options = EntryOptions {
            ttl: ttl.or(self.default_ttl),
            ..EntryOptions::default()
        };
        self.set_with_options(key, value, options).await
    }

    /// Insert an optional value; `None` is rejected.
    ///
    /// # Errors
    /// - `Validation` (`INVALID_VALUE`) when `value` is `None`
    pub async fn set_option<T>(&self, key: &str, value: Option<T>, ttl: Option<Duration>) -> Result<()>
    where
        T: Any + Send + Sync,
    {
        match value {
            Some(value) => self.set(key, value, ttl).await,
            None => Err(Error::validation(
                codes::INVALID_VALUE,
                format!("Cannot cache an empty value for '{}'", key),
            )
            .with_metadata("key", key)),
        }
    }

    /// Insert with explicit store options.
    ///
    /// `options.ttl` is used as given: `None` means the entry never expires.
    /// A callback in `options.on_evicted` is chained after the service's own.
    ///
    /// # Errors
    /// - `Validation` for an empty key
    /// - `System` if the store fails
    pub async fn set_with_options<T>(&self, key: &str, value: T, options: EntryOptions) -> Result<()>
    where
        T: Any + Send + Sync,
    {
        Self::check_key(key)?;
        let start = Instant::now();
        let ttl = options.ttl;
        let options = EntryOptions {
            on_evicted: Some(self.eviction_callback(options.on_evicted.clone())),
            ..options
        };
        let value: CacheValue = Arc::new(value);

        if let Err(e) = self.backend.set(key, value, options).await {
            return Err(self.failure("set", key, e));
        }

        self.state
            .tracked
            .insert(key.to_string(), TrackedEntry::new(ttl));
        self.state.stats.increment(Counter::Set);
        self.metrics.record_set(key, start.elapsed());
        self.state.events.emit(&CacheEvent::ItemAdded {
            key: key.to_string(),
            ttl,
        });
        Ok(())
    }

    /// Remove `key`. Returns `true` if a live entry was removed.
    ///
    /// # Errors
    /// - `Validation` for an empty key
    /// - `System` if the store fails
    pub async fn remove(&self, key: &str) -> Result<bool> {
        Self::check_key(key)?;
        let start = Instant::now();

        match self.backend.delete(key).await {
            Ok(removed) => {
                if !removed {
                    self.state.tracked.remove(key);
                }
                self.metrics.record_delete(key, start.elapsed());
                Ok(removed)
            }
            Err(e) => Err(self.failure("remove", key, e)),
        }
    }

    /// Remove every tracked key matching the glob `pattern` (`*`, `?`).
    ///
    /// Each key is removed independently; failures on some keys are logged
    /// and do not stop the others. Returns the number of keys removed.
    ///
    /// # Errors
    /// - `Validation` (`INVALID_PATTERN`) if the pattern cannot be compiled
    pub async fn remove_by_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = glob_to_regex(pattern)?;
        let matching: Vec<String> = self
            .state
            .tracked
            .iter()
            .filter(|entry| regex.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        let mut failures = Vec::new();
        for key in &matching {
            match self.remove(key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => failures.push(format!("{}: {}", key, e.message())),
            }
        }

        if !failures.is_empty() {
            warn!(
                "⚠ Cache REMOVE_BY_PATTERN {}: {} of {} keys failed: {}",
                pattern,
                failures.len(),
                matching.len(),
                failures.join("; ")
            );
        }
        debug!("✓ Cache REMOVE_BY_PATTERN {} -> {} removed", pattern, removed);
        Ok(removed)
    }

    /// Return the cached value, or run `factory` and cache its result.
    ///
    /// The factory runs at most once per call. Its error is returned as a
    /// `System` error (`FACTORY_FAILED`) and nothing is cached. A store
    /// failure while caching the fresh value is logged; the value is still
    /// returned.
    pub async fn get_or_set<T, F, Fut, E>(&self, key: &str, factory: F, ttl: Option<Duration>) -> Result<T>
    where
        T: Any + Send + Sync + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        if let Some(cached) = self.get::<T>(key).await? {
            return Ok(cached);
        }

        let value = factory().await.map_err(|e| self.factory_failure(key, e))?;
        self.store_fresh(key, value.clone(), ttl).await;
        Ok(value)
    }

    /// Like [`get_or_set`](Self::get_or_set) for factories that may produce
    /// nothing. `None` is returned to the caller but not cached.
    pub async fn get_or_set_option<T, F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        ttl: Option<Duration>,
    ) -> Result<Option<T>>
    where
        T: Any + Send + Sync + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<T>, E>>,
        E: Display,
    {
        if let Some(cached) = self.get::<T>(key).await? {
            return Ok(Some(cached));
        }

        let value = factory().await.map_err(|e| self.factory_failure(key, e))?;
        if let Some(value) = &value {
            self.store_fresh(key, value.clone(), ttl).await;
        }
        Ok(value)
    }

    fn factory_failure(&self, key: &str, err: impl Display) -> Error {
        error!("Cache factory failed for {}: {}", key, err);
        self.metrics.record_error(key, &err.to_string());
        Error::system(
            codes::FACTORY_FAILED,
            format!("Value factory failed for '{}': {}", key, err),
        )
        .with_metadata("key", key)
    }

    async fn store_fresh<T>(&self, key: &str, value: T, ttl: Option<Duration>)
    where
        T: Any + Send + Sync,
    {
        if let Err(e) = self.set(key, value, ttl).await {
            warn!("⚠ Cache could not store fresh value for {}: {}", key, e);
        }
    }

    /// Check whether `key` is live.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        Self::check_key(key)?;
        self.backend
            .exists(key)
            .await
            .map_err(|e| self.failure("exists", key, e))
    }

    /// Remaining lifetime of `key`; `None` when absent or without expiry.
    pub async fn get_ttl(&self, key: &str) -> Result<Option<Duration>> {
        Self::check_key(key)?;
        match self.backend.ttl(key).await {
            Ok(remaining) => Ok(remaining.flatten()),
            Err(e) => Err(self.failure("get_ttl", key, e)),
        }
    }

    /// Restart the lifetime of a live entry.
    ///
    /// `ttl` of `None` reuses the entry's original TTL, then the default TTL.
    ///
    /// # Errors
    /// - `NotFound` (`KEY_NOT_FOUND`) if the key is absent or expired
    /// - `System` if the store fails
    pub async fn refresh(&self, key: &str, ttl: Option<Duration>) -> Result<()> {
        Self::check_key(key)?;
        let ttl = ttl
            .or_else(|| self.state.tracked.get(key).and_then(|entry| entry.ttl))
            .or(self.default_ttl);

        match self.backend.expire(key, ttl).await {
            Ok(true) => {
                if let Some(mut entry) = self.state.tracked.get_mut(key) {
                    entry.ttl = ttl;
                    entry.expires_at = expiry_from_now(ttl);
                }
                debug!("✓ Cache REFRESH {} (TTL: {:?})", key, ttl);
                Ok(())
            }
            Ok(false) => Err(Error::not_found(
                codes::KEY_NOT_FOUND,
                format!("Cache key '{}' not found", key),
            )
            .with_metadata("key", key)),
            Err(e) => Err(self.failure("refresh", key, e)),
        }
    }

    /// Fetch several keys. Missing keys are absent from the map; per-key
    /// failures are logged once as a warning.
    pub async fn get_many<T>(&self, keys: &[&str]) -> Result<HashMap<String, T>>
    where
        T: Any + Send + Sync + Clone,
    {
        let mut found = HashMap::with_capacity(keys.len());
        let mut failures = Vec::new();

        for key in keys {
            match self.get::<T>(key).await {
                Ok(Some(value)) => {
                    found.insert(key.to_string(), value);
                }
                Ok(None) => {}
                Err(e) => failures.push(format!("{}: {}", key, e.message())),
            }
        }

        if !failures.is_empty() {
            warn!(
                "⚠ Cache GET_MANY: {} of {} keys failed: {}",
                failures.len(),
                keys.len(),
                failures.join("; ")
            );
        }
        Ok(found)
    }

    /// Store several values with one TTL. Returns the number stored.
    pub async fn set_many<T, I>(&self, items: I, ttl: Option<Duration>) -> Result<usize>
    where
        T: Any + Send + Sync,
        I: IntoIterator<Item = (String, T)>,
    {
        let mut stored = 0;
        let mut total = 0;
        let mut failures = Vec::new();

        for (key, value) in items {
            total += 1;
            match self.set(&key, value, ttl).await {
                Ok(()) => stored += 1,
                Err(e) => failures.push(format!("{}: {}", key, e.message())),
            }
        }

        if !failures.is_empty() {
            warn!(
                "⚠ Cache SET_MANY: {} of {} keys failed: {}",
                failures.len(),
                total,
                failures.join("; ")
            );
        }
        Ok(stored)
    }

    /// Remove several keys. Returns the number removed.
    pub async fn remove_many(&self, keys: &[&str]) -> Result<usize> {
        let mut removed = 0;
        let mut failures = Vec::new();

        for key in keys {
            match self.remove(key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => failures.push(format!("{}: {}", key, e.message())),
            }
        }

        if !failures.is_empty() {
            warn!(
                "⚠ Cache REMOVE_MANY: {} of {} keys failed: {}",
                failures.len(),
                keys.len(),
                failures.join("; ")
            );
        }
        Ok(removed)
    }

    /// Snapshot of tracked keys.
    pub fn keys(&self) -> Vec<String> {
        self.state
            .tracked
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn entry_info(&self, key: &str) -> Option<TrackedEntry> {
        self.state.tracked.get(key).map(|entry| entry.clone())
    }

    /// Drop every entry and reset statistics.
    ///
    /// # Errors
    /// - `System` if the store fails
    pub async fn clear(&self) -> Result<()> {
        if let Err(e) = self.backend.clear_all().await {
            return Err(self.failure("clear", "*", e));
        }

        self.state.tracked.clear();
        self.state.stats.reset();
        self.state.events.emit(&CacheEvent::CacheCleared);
        info!("Cache cleared");
        Ok(())
    }

    /// Snapshot of the service counters.
    pub fn statistics(&self) -> Result<CacheStatistics> {
        Ok(self.state.stats.snapshot(self.state.tracked.len()))
    }
}
