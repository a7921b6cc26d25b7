//! Delivery targets for root trackers.

use async_trait::async_trait;
use pulse_core::{format_progress_line, LineLogger, ProgressPayload, TracingLineLogger};
use std::sync::Arc;

/// Receives the effective state of a root tracker whenever it changes.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Deliver one payload. Delivery failures are handled by the sink.
    async fn deliver(&self, payload: ProgressPayload);
}

/// Observer registered with a [`SubscriberSink`].
#[async_trait]
pub trait ProgressSubscriber: Send + Sync {
    /// Called with every delivered payload.
    async fn progress_set(&self, payload: &ProgressPayload);
}

/// Fans payloads out to a fixed subscriber set.
///
/// With no subscribers every payload is written to the line logger instead.
pub struct SubscriberSink {
    subscribers: Vec<Arc<dyn ProgressSubscriber>>,
    logger: Arc<dyn LineLogger>,
}

impl SubscriberSink {
    /// Create a sink for `subscribers`.
    pub fn new(subscribers: Vec<Arc<dyn ProgressSubscriber>>) -> Self {
        Self {
            subscribers,
            logger: Arc::new(TracingLineLogger),
        }
    }

    /// Create a sink that only logs.
    pub fn logging() -> Self {
        Self::new(Vec::new())
    }

    /// Replace the fallback line logger.
    pub fn with_logger(mut self, logger: Arc<dyn LineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether the sink only logs.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[async_trait]
impl ProgressSink for SubscriberSink {
    async fn deliver(&self, payload: ProgressPayload) {
        if self.subscribers.is_empty() {
            self.logger.info(&format_progress_line(&payload));
            return;
        }
        for subscriber in &self.subscribers {
            subscriber.progress_set(&payload).await;
        }
    }
}
