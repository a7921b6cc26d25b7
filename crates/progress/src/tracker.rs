//! Hierarchical progress trackers.
//!
//! A [`ProgressTracker`] holds its own `(percent, status, message)` plus a
//! set of weighted children. Whenever the tracker or one of its children
//! changes, the effective state is recomputed:
//!
//! ```text
//! effective percent = own percent + Σ live contributions
//! contribution      = proportion * child percent / 100   (proportion once done)
//! ```
//!
//! A child that reaches 100 is retired and its proportion is folded into the
//! parent's own percent, so a later absolute write on the parent (`set`,
//! `success`, `done`) replaces it while `step` adds to it.
//!
//! and forwarded upstream (to the parent for a sub-tracker, to the sink for
//! a root) unless it equals the last forwarded state.
//!
//! Each tracker serialises its mutations behind its own lock. Forwarding
//! happens after that lock is released and every forwarded state carries a
//! per-tracker sequence number, so the receiving side can discard a state
//! that was overtaken while in flight.

use crate::auto::{AdvancePhase, AutoAdvance, Tick};
use crate::sender::ThrottledSender;
use crate::sink::{ProgressSink, ProgressSubscriber, SubscriberSink};
use pulse_core::{
    ChildId, LineLogger, Message, Metadata, ProgressPayload, ProgressSnapshot, SenderConfig,
    Status, TracingLineLogger, Transport,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace};

type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Cloneable handle to a node in a progress tree.
#[derive(Clone)]
pub struct ProgressTracker {
    pub(crate) inner: Arc<TrackerInner>,
}

/// Options for [`ProgressTracker::new_sub_progress_with`].
#[derive(Debug, Clone, Default)]
pub struct SubProgressOptions {
    /// Weight out of 100 of the parent's scale
    pub proportion: i32,
    /// Whether an `exception` in the child forces the parent to `exception`
    pub propagation: bool,
    /// Entries layered over the parent's metadata
    pub metadata: Vec<(String, String)>,
}

impl SubProgressOptions {
    /// Options for a child of the given weight.
    pub fn new(proportion: i32) -> Self {
        Self {
            proportion,
            ..Default::default()
        }
    }

    /// Propagate `exception` to the parent.
    pub fn with_propagation(mut self) -> Self {
        self.propagation = true;
        self
    }

    /// Add a metadata entry for the child.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Builder for root trackers.
pub struct TrackerBuilder {
    code: String,
    metadata: Metadata,
    logger: Arc<dyn LineLogger>,
    delivery: Delivery,
}

enum Delivery {
    Subscribers(Vec<Arc<dyn ProgressSubscriber>>),
    Throttled(Option<Arc<dyn Transport>>, Duration),
    Sink(Arc<dyn ProgressSink>),
}

impl TrackerBuilder {
    fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            metadata: Metadata::new(),
            logger: Arc::new(TracingLineLogger),
            delivery: Delivery::Subscribers(Vec::new()),
        }
    }

    /// Stamp metadata on the tracker; children inherit it.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Logger used when nothing else can take a payload.
    pub fn with_line_logger(mut self, logger: Arc<dyn LineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Deliver to subscribers (or the logger when the list is empty).
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn ProgressSubscriber>>) -> Self {
        self.delivery = Delivery::Subscribers(subscribers);
        self
    }

    /// Deliver through a throttled transport.
    pub fn with_transport(mut self, transport: Option<Arc<dyn Transport>>, config: &SenderConfig) -> Self {
        self.delivery = Delivery::Throttled(transport, config.cooldown());
        self
    }

    /// Deliver to a custom sink.
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.delivery = Delivery::Sink(sink);
        self
    }

    /// Build the root tracker.
    pub fn build(self) -> ProgressTracker {
        let sink: Arc<dyn ProgressSink> = match self.delivery {
            Delivery::Subscribers(subscribers) => {
                Arc::new(SubscriberSink::new(subscribers).with_logger(self.logger))
            }
            Delivery::Throttled(transport, cooldown) => {
                Arc::new(ThrottledSender::new(transport, self.logger, cooldown))
            }
            Delivery::Sink(sink) => sink,
        };

        ProgressTracker {
            inner: Arc::new(TrackerInner::new(
                self.code,
                self.metadata,
                Upstream::Sink {
                    sink,
                    forwarded: Mutex::new(0),
                },
            )),
        }
    }
}

impl ProgressTracker {
    /// Start building a root tracker labelled `code`.
    pub fn builder(code: impl Into<String>) -> TrackerBuilder {
        TrackerBuilder::new(code)
    }

    /// Root tracker that writes every change to the log.
    pub fn logging(code: impl Into<String>) -> Self {
        Self::builder(code).build()
    }

    /// Root tracker that notifies `subscribers`.
    pub fn with_subscribers(code: impl Into<String>, subscribers: Vec<Arc<dyn ProgressSubscriber>>) -> Self {
        Self::builder(code).with_subscribers(subscribers).build()
    }

    /// Root tracker that pushes through a throttled transport.
    ///
    /// Without a transport, or once it closes, changes are logged instead.
    pub fn over_transport(
        code: impl Into<String>,
        transport: Option<Arc<dyn Transport>>,
        config: &SenderConfig,
    ) -> Self {
        Self::builder(code).with_transport(transport, config).build()
    }

    /// Label used in payloads and log lines.
    pub fn code(&self) -> &str {
        self.inner.code()
    }

    /// Metadata stamped on this tracker.
    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Set percent, status and (optionally) message.
    pub async fn set(&self, percent: i32, status: Status, message: Option<Message>) {
        self.stop_auto_advance().await;
        self.inner
            .mutate(move |state| {
                state.percent = percent;
                state.status = status;
                state.replace_message(message);
                true
            })
            .await;
    }

    /// Change the status, keeping the current percent.
    pub async fn set_status(&self, status: Status, message: Option<Message>) {
        self.stop_auto_advance().await;
        self.inner
            .mutate(move |state| {
                state.status = status;
                state.replace_message(message);
                true
            })
            .await;
    }

    /// Report an error at `percent`.
    pub async fn exception(&self, percent: i32, message: Option<Message>) {
        self.set(percent, Status::Exception, message).await;
    }

    /// Report ongoing work at `percent`.
    pub async fn active(&self, percent: i32, message: Option<Message>) {
        self.set(percent, Status::Active, message).await;
    }

    /// Finish successfully. Without a message the message is cleared to
    /// empty text.
    pub async fn success(&self, message: Option<Message>) {
        self.set(100, Status::Success, Some(message.unwrap_or_else(empty_text)))
            .await;
    }

    /// Finish with `status`, or when none is given with `success` if the
    /// tracker is active and its current status otherwise.
    pub async fn done(&self, status: Option<Status>, message: Option<Message>) {
        self.stop_auto_advance().await;
        let message = message.unwrap_or_else(empty_text);
        self.inner
            .mutate(move |state| {
                state.status = match status {
                    Some(status) => status,
                    None if state.status == Status::Active => Status::Success,
                    None => state.status.clone(),
                };
                state.percent = 100;
                state.message = Some(message);
                true
            })
            .await;
    }

    /// Add `delta` to the current percent and mark the tracker active.
    pub async fn step(&self, delta: i32, message: Option<Message>) {
        self.stop_auto_advance().await;
        self.inner
            .mutate(move |state| {
                state.percent += delta;
                state.status = Status::Active;
                state.replace_message(message);
                true
            })
            .await;
    }

    // ========================================================================
    // Children
    // ========================================================================

    /// Allocate a child worth `proportion` of this tracker.
    pub async fn new_sub_progress(&self, proportion: i32) -> ProgressTracker {
        self.new_sub_progress_with(SubProgressOptions::new(proportion)).await
    }

    /// Allocate a child with explicit options.
    pub async fn new_sub_progress_with(&self, options: SubProgressOptions) -> ProgressTracker {
        let id = ChildId::new();
        self.inner
            .state
            .lock()
            .await
            .children
            .insert(id, ChildEntry::new(options.proportion, options.propagation));

        trace!(
            "Allocated child {} ({}%) under {}",
            id,
            options.proportion,
            self.inner.code
        );

        ProgressTracker {
            inner: Arc::new(TrackerInner::new(
                self.inner.code.clone(),
                self.inner.metadata.layer(options.metadata),
                Upstream::Parent {
                    parent: Arc::clone(&self.inner),
                    id,
                },
            )),
        }
    }

    // ========================================================================
    // Auto advance
    // ========================================================================

    /// Add `step` every `interval` until `max` is reached.
    ///
    /// A supplied message is applied and delivered before ticking starts.
    /// A previously running auto advance is stopped first.
    pub async fn auto_advance(&self, step: i32, interval: Duration, max: i32, message: Option<Message>) {
        if let Some(message) = message {
            self.inner
                .mutate(move |state| {
                    state.message = Some(message);
                    true
                })
                .await;
        }

        let mut slot = self.inner.auto.lock().await;
        if let Some(previous) = slot.take() {
            previous.stop(&self.inner).await;
        }

        let mut auto = AutoAdvance::new(step, interval, max);
        auto.start(Arc::downgrade(&self.inner));
        *slot = Some(auto);
        debug!(
            "Auto advance for {}: +{}% every {:?} up to {}%",
            self.inner.code, step, interval, max
        );
    }

    /// Stop a running auto advance, forcing the tracker to its ceiling.
    pub async fn stop_auto_advance(&self) {
        let previous = self.inner.auto.lock().await.take();
        if let Some(auto) = previous {
            auto.stop(&self.inner).await;
        }
    }

    /// Phase of the current auto advance, if one was started and not
    /// replaced or cancelled since.
    pub async fn auto_advance_phase(&self) -> Option<AdvancePhase> {
        self.inner.auto.lock().await.as_ref().map(AutoAdvance::phase)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current effective state.
    pub async fn snapshot(&self) -> ProgressSnapshot {
        let state = self.inner.state.lock().await;
        state
            .last_sent
            .clone()
            .unwrap_or_else(|| state.effective(None))
    }

    /// Current effective percent.
    pub async fn percent(&self) -> i32 {
        self.snapshot().await.percent
    }

    /// Current status.
    pub async fn status(&self) -> Status {
        self.snapshot().await.status
    }

    /// Current effective message.
    pub async fn message(&self) -> Option<Message> {
        self.snapshot().await.message
    }

    /// Sum of proportions absorbed from finished children.
    ///
    /// Absorbed proportions are part of the tracker's own percent; this is
    /// a running total and is not reset by later writes.
    pub async fn base_percent(&self) -> i32 {
        self.inner.state.lock().await.base_percent
    }

    /// Number of children that have not finished yet.
    pub async fn live_children(&self) -> usize {
        self.inner.state.lock().await.children.len()
    }
}

fn empty_text() -> Message {
    Message::Text(String::new())
}

// ============================================================================
// Internals
// ============================================================================

pub(crate) struct TrackerInner {
    code: String,
    metadata: Metadata,
    state: Mutex<TrackerState>,
    auto: Mutex<Option<AutoAdvance>>,
    upstream: Upstream,
}

enum Upstream {
    /// Root: deliver to a sink, newest sequence only.
    Sink {
        sink: Arc<dyn ProgressSink>,
        forwarded: Mutex<u64>,
    },
    /// Sub-tracker: fold into the parent's entry `id`.
    Parent { parent: Arc<TrackerInner>, id: ChildId },
}

/// A state change on its way upstream.
struct Emission {
    seq: u64,
    snapshot: ProgressSnapshot,
}

#[derive(Default)]
pub(crate) struct TrackerState {
    pub(crate) percent: i32,
    status: Status,
    message: Option<Message>,
    base_percent: i32,
    children: BTreeMap<ChildId, ChildEntry>,
    last_sent: Option<ProgressSnapshot>,
    seq: u64,
}

struct ChildEntry {
    proportion: i32,
    propagation: bool,
    percent: i32,
    status: Status,
    message: Option<Message>,
    seq: u64,
}

impl ChildEntry {
    fn new(proportion: i32, propagation: bool) -> Self {
        Self {
            proportion,
            propagation,
            percent: 0,
            status: Status::Active,
            message: None,
            seq: 0,
        }
    }

    fn is_done(&self) -> bool {
        self.percent >= 100
    }

    fn contribution(&self) -> i32 {
        if self.is_done() {
            self.proportion
        } else {
            self.proportion * self.percent / 100
        }
    }
}

impl TrackerState {
    fn replace_message(&mut self, message: Option<Message>) {
        if let Some(message) = message {
            self.message = Some(message);
        }
    }

    fn effective(&self, trigger_message: Option<&Message>) -> ProgressSnapshot {
        let live: i32 = self.children.values().map(ChildEntry::contribution).sum();
        ProgressSnapshot {
            percent: self.percent + live,
            status: self.status.clone(),
            message: trigger_message.cloned().or_else(|| self.message.clone()),
        }
    }

    /// Recompute the effective state; `Some` when it differs from the last
    /// forwarded one.
    fn refresh(&mut self, trigger_message: Option<&Message>) -> Option<Emission> {
        let snapshot = self.effective(trigger_message);
        if self.last_sent.as_ref() == Some(&snapshot) {
            return None;
        }
        self.seq += 1;
        self.last_sent = Some(snapshot.clone());
        Some(Emission {
            seq: self.seq,
            snapshot,
        })
    }
}

impl TrackerInner {
    fn new(code: String, metadata: Metadata, upstream: Upstream) -> Self {
        Self {
            code,
            metadata,
            state: Mutex::new(TrackerState::default()),
            auto: Mutex::new(None),
            upstream,
        }
    }

    pub(crate) fn code(&self) -> &str {
        &self.code
    }

    /// Apply `f` under the lock and forward the new effective state.
    ///
    /// `f` returns `false` to abandon the update without recomputing.
    pub(crate) async fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut TrackerState) -> bool + Send,
    {
        let emission = {
            let mut state = self.state.lock().await;
            if !f(&mut state) {
                return;
            }
            state.refresh(None)
        };
        if let Some(emission) = emission {
            self.forward(emission).await;
        }
    }

    /// One auto-advance tick.
    pub(crate) async fn advance(&self, step: i32, max: i32, stopped: &AtomicBool) -> Tick {
        let mut tick = Tick::Cancelled;
        self.mutate(|state| {
            if stopped.load(Ordering::Acquire) {
                return false;
            }
            if state.percent >= max {
                tick = Tick::Reached;
                return false;
            }
            state.percent = (state.percent + step).min(max);
            tick = if state.percent >= max {
                Tick::Reached
            } else {
                Tick::Advanced
            };
            true
        })
        .await;
        tick
    }

    async fn forward(&self, emission: Emission) {
        match &self.upstream {
            Upstream::Sink { sink, forwarded } => {
                // Held across delivery so the sink sees sequence order; sinks
                // hand slow I/O off instead of awaiting it here.
                let mut last = forwarded.lock().await;
                if emission.seq <= *last {
                    trace!("Dropping overtaken progress #{} for {}", emission.seq, self.code);
                    return;
                }
                *last = emission.seq;
                sink.deliver(ProgressPayload::new(self.code.clone(), emission.snapshot))
                    .await;
            }
            Upstream::Parent { parent, id } => parent.child_changed(*id, emission).await,
        }
    }

    /// Fold one child's new state into this tracker.
    fn child_changed(&self, id: ChildId, emission: Emission) -> BoxFuture<'_> {
        Box::pin(async move {
            let next = {
                let mut state = self.state.lock().await;
                let Some(entry) = state.children.get_mut(&id) else {
                    trace!("Ignoring update from retired child {} of {}", id, self.code);
                    return;
                };
                if emission.seq <= entry.seq {
                    return;
                }

                let snapshot = emission.snapshot;
                entry.seq = emission.seq;
                entry.percent = snapshot.percent;
                entry.status = snapshot.status.clone();
                if snapshot.message.is_some() {
                    entry.message = snapshot.message.clone();
                }
                let done = entry.is_done();
                let propagate = entry.propagation && entry.status == Status::Exception;

                if done {
                    if let Some(retired) = state.children.remove(&id) {
                        state.percent += retired.proportion;
                        state.base_percent += retired.proportion;
                        debug!(
                            "Child {} of {} finished, absorbed {}%",
                            id, self.code, retired.proportion
                        );
                    }
                }

                if propagate && state.status != Status::Exception {
                    debug!("Child {} raised exception, propagating to {}", id, self.code);
                    state.status = Status::Exception;
                }

                state.refresh(snapshot.message.as_ref())
            };

            if let Some(emission) = next {
                self.forward(emission).await;
            }
        })
    }
}
