//! Request-scoped context passed explicitly through the pipeline.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Identifier shared by every log line emitted for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Cooperative cancellation flag.
///
/// Clones observe the same flag. Once cancelled it stays cancelled.
#[derive(Clone, Debug)]
pub struct CancellationSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        CancellationSignal {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // The sender lives as long as `self`, so this is unreachable in
            // practice; never resolve rather than report a false cancellation.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request context: correlation id, cancellation and start time.
///
/// Created by the mediator for each top-level dispatch. Nested dispatches
/// use [`child`](Self::child), which keeps the correlation id and the
/// cancellation signal; dropping the child leaves the parent untouched.
#[derive(Clone, Debug)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationSignal,
    started_at: DateTime<Utc>,
    depth: u32,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationSignal::new())
    }

    pub fn with_cancellation(cancellation: CancellationSignal) -> Self {
        RequestContext {
            correlation_id: CorrelationId::new(),
            cancellation,
            started_at: Utc::now(),
            depth: 0,
        }
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = id;
        self
    }

    /// Context for a request dispatched from inside another one.
    pub fn child(&self) -> Self {
        RequestContext {
            correlation_id: self.correlation_id,
            cancellation: self.cancellation.clone(),
            started_at: Utc::now(),
            depth: self.depth + 1,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Nesting level; `0` for a top-level dispatch.
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_correlation_id_display_has_no_hyphens() {
        let id = CorrelationId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert!(!text.contains('-'));
    }

    #[test]
    fn test_child_shares_correlation_and_cancellation() {
        let parent = RequestContext::new();
        let child = parent.child();

        assert_eq!(child.correlation_id(), parent.correlation_id());
        assert_eq!(child.depth(), 1);

        child.cancellation().cancel();
        assert!(parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let signal = CancellationSignal::new();
        let remote = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.cancel();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("cancellation observed");
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let signal = CancellationSignal::new();
        signal.cancel();

        tokio::time::timeout(Duration::from_millis(50), signal.cancelled())
            .await
            .expect("already cancelled");
    }
}
