//! Expiring key-value stores the cache service is built on.

use crate::error::Result;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod inmemory;

pub use inmemory::{InMemoryBackend, StoreStats};

/// Opaque cached value. Typed at the call site by downcasting.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Callback fired when an entry leaves the store.
///
/// Invoked after the store has released its internal locks, so it may call
/// back into the store.
pub type EvictionCallback = Arc<dyn Fn(&str, EvictionReason) + Send + Sync>;

/// Why an entry left the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// Explicit removal.
    Removed,
    /// Overwritten by a new `set` on the same key.
    Replaced,
    /// TTL elapsed.
    Expired,
    /// Compacted away because the size limit was exceeded.
    Capacity,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionReason::Removed => write!(f, "Removed"),
            EvictionReason::Replaced => write!(f, "Replaced"),
            EvictionReason::Expired => write!(f, "Expired"),
            EvictionReason::Capacity => write!(f, "Capacity"),
        }
    }
}

/// Compaction priority. Lower priorities are evicted first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
    /// Never compacted; still expires.
    NeverRemove,
}

/// Per-entry options for [`CacheBackend::set`].
#[derive(Clone)]
pub struct EntryOptions {
    /// Time-to-live. `None` = entry never expires.
    pub ttl: Option<Duration>,
    pub priority: CachePriority,
    /// Size counted against the store's size limit.
    pub size: usize,
    pub on_evicted: Option<EvictionCallback>,
}

impl Default for EntryOptions {
    fn default() -> Self {
        EntryOptions {
            ttl: None,
            priority: CachePriority::Normal,
            size: 1,
            on_evicted: None,
        }
    }
}

impl fmt::Debug for EntryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryOptions")
            .field("ttl", &self.ttl)
            .field("priority", &self.priority)
            .field("size", &self.size)
            .field("on_evicted", &self.on_evicted.is_some())
            .finish()
    }
}

impl EntryOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_priority(mut self, priority: CachePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_eviction_callback(mut self, callback: EvictionCallback) -> Self {
        self.on_evicted = Some(callback);
        self
    }
}

/// Trait for expiring store implementations.
///
/// All methods use `&self`; implementations rely on interior mutability so a
/// single store can be shared across tasks.
///
/// **ASYNC:** All methods are async and must be awaited.
#[allow(async_fn_in_trait)]
pub trait CacheBackend: Send + Sync + Clone {
    /// Retrieve a live value.
    ///
    /// # Returns
    /// - `Ok(Some(value))` - Live entry found
    /// - `Ok(None)` - Absent or expired
    ///
    /// # Errors
    /// Returns `Err` if the store fails
    async fn get(&self, key: &str) -> Result<Option<CacheValue>>;

    /// Insert or overwrite an entry.
    ///
    /// Overwriting fires the previous entry's callback with
    /// [`EvictionReason::Replaced`].
    ///
    /// # Errors
    /// Returns `Err` if the store fails
    async fn set(&self, key: &str, value: CacheValue, options: EntryOptions) -> Result<()>;

    /// Remove an entry. Returns `true` if a live entry was removed.
    ///
    /// # Errors
    /// Returns `Err` if the store fails
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Check whether a live entry exists.
    ///
    /// # Errors
    /// Returns `Err` if the store fails
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Remaining lifetime of an entry.
    ///
    /// # Returns
    /// - `Ok(None)` - Absent or expired
    /// - `Ok(Some(None))` - Live, never expires
    /// - `Ok(Some(Some(d)))` - Live, expires in `d`
    ///
    /// # Errors
    /// Returns `Err` if the store fails
    async fn ttl(&self, key: &str) -> Result<Option<Option<Duration>>>;

    /// Reset the lifetime of a live entry to `ttl` from now.
    /// Returns `false` if the entry is absent or expired.
    ///
    /// # Errors
    /// Returns `Err` if the store fails
    async fn expire(&self, key: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Drop every entry without firing eviction callbacks.
    ///
    /// # Errors
    /// Returns `Err` if the store fails
    async fn clear_all(&self) -> Result<()>;
}
