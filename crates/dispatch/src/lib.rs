//! Session registry for transport-backed progress.
//!
//! A [`Dispatcher`] maps [`ProgressKey`](pulse_core::ProgressKey)s to live
//! transports so that work started elsewhere can report to the client that
//! opened the session.

#![warn(missing_docs)]

pub mod registry;
pub mod session;

pub use registry::{Dispatcher, SessionInfo};
pub use session::SessionGuard;
