//! Delivery capabilities consumed by the progress engine.

use crate::progress::ProgressPayload;
use async_trait::async_trait;

/// Errors a transport may report from `send`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection is gone
    #[error("transport closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// A push channel progress payloads are sent over, e.g. a live socket.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the channel currently has an active connection.
    fn is_open(&self) -> bool;

    /// Send one payload.
    async fn send(&self, payload: &ProgressPayload) -> Result<(), TransportError>;
}

/// Line-oriented logger used when no transport can take a payload.
pub trait LineLogger: Send + Sync {
    /// Record one formatted line.
    fn info(&self, line: &str);
}

/// [`LineLogger`] that emits `tracing` events on target `pulse::progress`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLineLogger;

impl LineLogger for TracingLineLogger {
    fn info(&self, line: &str) {
        tracing::info!(target: "pulse::progress", "{}", line);
    }
}
