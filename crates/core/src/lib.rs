//! Pulse core data models.
//!
//! This crate defines the values and capabilities shared by the progress
//! engine: identifiers, metadata, progress state, the transport and logger
//! seams, and configuration.

#![warn(missing_docs)]

mod id;
mod metadata;
mod context;
mod progress;
mod transport;
mod config;

// Re-exports
pub use id::{ChildId, ProgressKey};
pub use metadata::Metadata;
pub use context::{ContextHolder, ExecutionContext};
pub use progress::{format_progress_line, Message, ProgressPayload, ProgressSnapshot, Status};
pub use transport::{LineLogger, TracingLineLogger, Transport, TransportError};
pub use config::{ConfigError, LogConfig, PulseConfig, RegistryConfig, SenderConfig};
