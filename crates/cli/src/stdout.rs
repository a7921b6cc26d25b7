//! Transport that prints payloads as JSON lines.

use async_trait::async_trait;
use pulse_core::{ProgressPayload, Transport, TransportError};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

/// Writes one JSON object per payload to stdout.
pub struct StdoutTransport {
    open: AtomicBool,
}

impl StdoutTransport {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
        }
    }

    /// Stop accepting payloads; later progress goes to the log.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl Default for StdoutTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdoutTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn send(&self, payload: &ProgressPayload) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let line = serde_json::to_string(payload)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{ProgressSnapshot, Status};

    #[tokio::test]
    async fn test_closed_transport_rejects_sends() {
        let transport = StdoutTransport::new();
        assert!(transport.is_open());

        transport.close();
        let payload = ProgressPayload::new("job", ProgressSnapshot::new(10, Status::Active, None));
        let result = transport.send(&payload).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
