//! Recording fakes shared by the unit tests.

use crate::sink::{ProgressSink, ProgressSubscriber};
use async_trait::async_trait;
use pulse_core::{LineLogger, ProgressPayload, Transport, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl LineLogger for RecordingLogger {
    fn info(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

#[derive(Default)]
pub struct RecordingSubscriber {
    received: Mutex<Vec<ProgressPayload>>,
}

impl RecordingSubscriber {
    pub fn percents(&self) -> Vec<i32> {
        self.received.lock().unwrap().iter().map(|p| p.percent).collect()
    }
}

#[async_trait]
impl ProgressSubscriber for RecordingSubscriber {
    async fn progress_set(&self, payload: &ProgressPayload) {
        self.received.lock().unwrap().push(payload.clone());
    }
}

#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<ProgressPayload>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<ProgressPayload> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn percents(&self) -> Vec<i32> {
        self.delivered().iter().map(|p| p.percent).collect()
    }

    pub fn last(&self) -> Option<ProgressPayload> {
        self.delivered.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn deliver(&self, payload: ProgressPayload) {
        self.delivered.lock().unwrap().push(payload);
    }
}

pub struct RecordingTransport {
    open: AtomicBool,
    failing: AtomicBool,
    delay: Option<Duration>,
    sent: Mutex<Vec<ProgressPayload>>,
}

impl RecordingTransport {
    pub fn open() -> Self {
        Self {
            open: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            delay: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Open transport whose every send takes `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::open()
        }
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ProgressPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(&self, payload: &ProgressPayload) -> Result<(), TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Other("socket write failed".into()));
        }
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
