//! Debounced delivery to a [`Transport`].
//!
//! The first payload after a quiet period opens a cooldown window and is
//! handed to a background task that owns the window. Payloads arriving
//! inside the window replace each other as `pending`; when the window
//! elapses the task sends whatever is pending and opens a new window, or
//! closes the window if nothing is. The newest state therefore always
//! reaches the transport, at most one cooldown (plus one send) late.
//!
//! Only the task owning the window talks to the transport, and it never
//! holds the state lock while doing so.

use crate::sink::ProgressSink;
use async_trait::async_trait;
use pulse_core::{format_progress_line, LineLogger, ProgressPayload, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Coalesces bursts of payloads into at most one send per cooldown window.
#[derive(Clone)]
pub struct ThrottledSender {
    shared: Arc<Shared>,
}

struct Shared {
    transport: Option<Arc<dyn Transport>>,
    logger: Arc<dyn LineLogger>,
    cooldown: Duration,
    state: Mutex<SenderState>,
}

#[derive(Default)]
struct SenderState {
    last_delivered: Option<ProgressPayload>,
    pending: Option<ProgressPayload>,
    cooling: bool,
}

impl ThrottledSender {
    /// Create a sender with an explicit logger and cooldown.
    pub fn new(
        transport: Option<Arc<dyn Transport>>,
        logger: Arc<dyn LineLogger>,
        cooldown: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                logger,
                cooldown,
                state: Mutex::new(SenderState::default()),
            }),
        }
    }

    /// Whether a transport is attached and open.
    pub fn transport_open(&self) -> bool {
        self.shared.transport_open()
    }

    /// Whether a cooldown window is currently open.
    pub async fn is_cooling(&self) -> bool {
        self.shared.state.lock().await.cooling
    }

    /// Payload waiting for the current window to elapse.
    pub async fn pending(&self) -> Option<ProgressPayload> {
        self.shared.state.lock().await.pending.clone()
    }

    /// Last payload handed to the transport or the logger.
    pub async fn last_delivered(&self) -> Option<ProgressPayload> {
        self.shared.state.lock().await.last_delivered.clone()
    }

    /// Send a payload, or queue it until the cooldown window elapses.
    ///
    /// Never waits for a window or for the transport; returns as soon as
    /// the payload is handed to the window task or recorded as pending.
    pub async fn send(&self, payload: ProgressPayload) {
        let mut state = self.shared.state.lock().await;

        let latest = state.pending.as_ref().or(state.last_delivered.as_ref());
        if latest == Some(&payload) {
            return;
        }

        if !self.shared.transport_open() {
            state.pending = None;
            state.last_delivered = Some(payload.clone());
            drop(state);
            self.shared.logger.info(&format_progress_line(&payload));
            return;
        }

        if state.cooling {
            if state.last_delivered.as_ref() == Some(&payload) {
                state.pending = None;
            } else {
                trace!("Cooling down, holding progress {}% for {}", payload.percent, payload.code);
                state.pending = Some(payload);
            }
            return;
        }

        state.cooling = true;
        state.last_delivered = Some(payload.clone());
        drop(state);

        tokio::spawn(Shared::drain(Arc::clone(&self.shared), payload));
    }
}

impl Shared {
    fn transport_open(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    async fn transmit(&self, payload: &ProgressPayload) {
        match &self.transport {
            Some(transport) => {
                if let Err(e) = transport.send(payload).await {
                    warn!("Failed to send progress for {}: {}", payload.code, e);
                    self.logger.info(&format_progress_line(payload));
                }
            }
            None => self.logger.info(&format_progress_line(payload)),
        }
    }

    /// Window owner: send `first`, then one iteration per cooldown window.
    async fn drain(shared: Arc<Shared>, first: ProgressPayload) {
        shared.transmit(&first).await;

        loop {
            tokio::time::sleep(shared.cooldown).await;

            let payload = {
                let mut state = shared.state.lock().await;
                let Some(payload) = state.pending.take() else {
                    state.cooling = false;
                    return;
                };
                state.last_delivered = Some(payload.clone());
                if !shared.transport_open() {
                    state.cooling = false;
                    drop(state);
                    debug!("Transport closed during cooldown for {}", payload.code);
                    shared.logger.info(&format_progress_line(&payload));
                    return;
                }
                payload
            };

            shared.transmit(&payload).await;
        }
    }
}

#[async_trait]
impl ProgressSink for ThrottledSender {
    async fn deliver(&self, payload: ProgressPayload) {
        self.send(payload).await;
    }
}
