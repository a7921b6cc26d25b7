//! Scoped registrations.

use crate::registry::Dispatcher;
use pulse_core::{ExecutionContext, ProgressKey};
use pulse_progress::ProgressTracker;
use std::sync::Arc;
use tracing::info;

/// Keeps a session registered for as long as it is alive.
pub struct SessionGuard {
    dispatcher: Arc<Dispatcher>,
    key: ProgressKey,
}

impl SessionGuard {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>, key: ProgressKey) -> Self {
        Self { dispatcher, key }
    }

    /// Key to hand to whoever reports progress for this session.
    pub fn key(&self) -> &ProgressKey {
        &self.key
    }

    /// Tracker reporting to this session.
    pub fn tracker(&self, code: &str) -> ProgressTracker {
        self.dispatcher.tracker(&self.key, code)
    }

    /// Tracker reporting to this session, carrying the context's metadata.
    pub fn tracker_in(&self, ctx: &ExecutionContext, code: &str) -> ProgressTracker {
        self.dispatcher.tracker_in(ctx, &self.key, code)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.dispatcher.unregister(&self.key).is_some() {
            info!("Closed progress session {}", self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::MemoryTransport;
    use std::time::Duration;

    #[test]
    fn test_key_carries_code_prefix() {
        let dispatcher = Arc::new(Dispatcher::new());
        let guard = dispatcher.open_session("import", Arc::new(MemoryTransport::default()));

        assert!(guard.key().as_str().starts_with("import-"));
        assert!(dispatcher.lookup(guard.key()).is_some());
    }

    #[test]
    fn test_drop_unregisters() {
        let dispatcher = Arc::new(Dispatcher::new());
        let guard = dispatcher.open_session("import", Arc::new(MemoryTransport::default()));
        let key = guard.key().clone();

        drop(guard);
        assert!(dispatcher.lookup(&key).is_none());
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_sessions_get_distinct_keys() {
        let dispatcher = Arc::new(Dispatcher::new());
        let a = dispatcher.open_session("sync", Arc::new(MemoryTransport::default()));
        let b = dispatcher.open_session("sync", Arc::new(MemoryTransport::default()));

        assert_ne!(a.key(), b.key());
        assert_eq!(dispatcher.len(), 2);
    }

    #[tokio::test]
    async fn test_guard_tracker_reaches_transport() {
        let dispatcher = Arc::new(Dispatcher::new());
        let transport = Arc::new(MemoryTransport::default());
        let guard = dispatcher.open_session("render", transport.clone());

        let tracker = guard.tracker("render");
        tracker.success(None).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.percents(), vec![100]);
    }
}
