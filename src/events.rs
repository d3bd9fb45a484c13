//! Cache lifecycle events.
//!
//! Subscribers are plain callbacks invoked synchronously, on the thread that
//! performed the change, after the change has been applied.

use crate::backend::EvictionReason;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A change in the cache's contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    ItemAdded {
        key: String,
        ttl: Option<Duration>,
    },
    /// Removed explicitly or evicted by the store.
    ItemRemoved {
        key: String,
        reason: EvictionReason,
    },
    ItemExpired {
        key: String,
    },
    CacheCleared,
}

impl CacheEvent {
    /// Key the event is about, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::ItemAdded { key, .. }
            | CacheEvent::ItemRemoved { key, .. }
            | CacheEvent::ItemExpired { key } => Some(key),
            CacheEvent::CacheCleared => None,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Handle returned by [`CacheEvents::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber registry.
#[derive(Default)]
pub struct CacheEvents {
    handlers: RwLock<Vec<(SubscriptionId, EventHandler)>>,
    next_id: AtomicU64,
}

impl CacheEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Deliver `event` to every subscriber.
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: &CacheEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(event);
        }
    }
}
