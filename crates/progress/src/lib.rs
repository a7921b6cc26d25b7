//! Hierarchical progress tracking.
//!
//! A [`ProgressTracker`] reports `(percent, status, message)` for one unit of
//! work. Work can be split into weighted sub-trackers whose progress is
//! folded into the parent, and the root delivers its effective state to a
//! [`ProgressSink`]: a set of subscribers, a throttled transport, or the log.

#![warn(missing_docs)]

pub mod tracker;
pub mod sink;
pub mod sender;
mod auto;

#[cfg(test)]
mod testing;

pub use auto::AdvancePhase;
pub use sender::ThrottledSender;
pub use sink::{ProgressSink, ProgressSubscriber, SubscriberSink};
pub use tracker::{ProgressTracker, SubProgressOptions, TrackerBuilder};
