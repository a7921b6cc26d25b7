//! Estimated progress: periodically step a tracker towards a ceiling.

use crate::tracker::TrackerInner;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Lifecycle of an [`AutoAdvance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvancePhase {
    /// Created, not started
    Idle,
    /// Ticking
    Running,
    /// Cancelled before reaching the ceiling
    Stopped,
    /// Reached the ceiling on its own
    Completed,
}

impl AdvancePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AdvancePhase::Running,
            2 => AdvancePhase::Stopped,
            3 => AdvancePhase::Completed,
            _ => AdvancePhase::Idle,
        }
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    Advanced,
    Reached,
    Cancelled,
}

struct Control {
    phase: AtomicU8,
    stopped: AtomicBool,
    cancel: Notify,
}

impl Control {
    fn transition(&self, from: AdvancePhase, to: AdvancePhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Background ticker that adds `step` to a tracker every `interval` until
/// `max` is reached or it is stopped.
pub(crate) struct AutoAdvance {
    step: i32,
    max: i32,
    interval: Duration,
    control: Arc<Control>,
    handle: Option<JoinHandle<()>>,
}

impl AutoAdvance {
    pub(crate) fn new(step: i32, interval: Duration, max: i32) -> Self {
        Self {
            step,
            max,
            interval,
            control: Arc::new(Control {
                phase: AtomicU8::new(AdvancePhase::Idle as u8),
                stopped: AtomicBool::new(false),
                cancel: Notify::new(),
            }),
            handle: None,
        }
    }

    pub(crate) fn phase(&self) -> AdvancePhase {
        AdvancePhase::from_u8(self.control.phase.load(Ordering::Acquire))
    }

    /// Spawn the ticking task. The first tick fires one interval from now.
    pub(crate) fn start(&mut self, tracker: Weak<TrackerInner>) {
        if !self.control.transition(AdvancePhase::Idle, AdvancePhase::Running) {
            return;
        }

        let control = Arc::clone(&self.control);
        let (step, max, period) = (self.step, self.max, self.interval);

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = control.cancel.notified() => break,
                }

                let Some(tracker) = tracker.upgrade() else {
                    break;
                };
                match tracker.advance(step, max, &control.stopped).await {
                    Tick::Advanced => {}
                    Tick::Reached => {
                        control.transition(AdvancePhase::Running, AdvancePhase::Completed);
                        debug!("Auto advance for {} reached {}%", tracker.code(), max);
                        break;
                    }
                    Tick::Cancelled => break,
                }
            }
        }));
    }

    /// Cancel further ticks, then force the tracker to the ceiling if it
    /// has not reached it yet.
    pub(crate) async fn stop(mut self, tracker: &TrackerInner) {
        self.control.stopped.store(true, Ordering::Release);
        self.control.cancel.notify_one();
        if !self.control.transition(AdvancePhase::Running, AdvancePhase::Stopped) {
            self.control.transition(AdvancePhase::Idle, AdvancePhase::Stopped);
        }
        // Let the task wind down on its own so an in-flight tick finishes.
        self.handle.take();

        let max = self.max;
        tracker
            .mutate(move |state| {
                if state.percent < max {
                    state.percent = max;
                    true
                } else {
                    false
                }
            })
            .await;
        debug!("Auto advance for {} stopped", tracker.code());
    }
}

impl Drop for AutoAdvance {
    fn drop(&mut self) {
        self.control.stopped.store(true, Ordering::Release);
        self.control.cancel.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use crate::tracker::ProgressTracker;

    fn tracker_with_sink() -> (ProgressTracker, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let tracker = ProgressTracker::builder("estimate").with_sink(sink.clone()).build();
        (tracker, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_ceiling_then_stops() {
        let (tracker, sink) = tracker_with_sink();
        let mut auto = AutoAdvance::new(25, Duration::from_millis(50), 100);
        assert_eq!(auto.phase(), AdvancePhase::Idle);

        auto.start(Arc::downgrade(&tracker.inner));
        assert_eq!(auto.phase(), AdvancePhase::Running);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(auto.phase(), AdvancePhase::Completed);
        assert_eq!(sink.percents(), vec![25, 50, 75, 100]);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.percents().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_step_is_clamped() {
        let (tracker, sink) = tracker_with_sink();
        let mut auto = AutoAdvance::new(40, Duration::from_millis(10), 90);
        auto.start(Arc::downgrade(&tracker.inner));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.percents(), vec![40, 80, 90]);
        assert_eq!(auto.phase(), AdvancePhase::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_forces_ceiling_and_halts_ticks() {
        let (tracker, sink) = tracker_with_sink();
        let mut auto = AutoAdvance::new(10, Duration::from_millis(50), 100);
        auto.start(Arc::downgrade(&tracker.inner));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(sink.percents(), vec![10, 20]);

        let control = Arc::clone(&auto.control);
        auto.stop(&tracker.inner).await;
        assert_eq!(AdvancePhase::from_u8(control.phase.load(Ordering::Acquire)), AdvancePhase::Stopped);
        assert_eq!(sink.percents(), vec![10, 20, 100]);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.percents(), vec![10, 20, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_completion_keeps_phase_and_value() {
        let (tracker, sink) = tracker_with_sink();
        let mut auto = AutoAdvance::new(50, Duration::from_millis(10), 100);
        auto.start(Arc::downgrade(&tracker.inner));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let control = Arc::clone(&auto.control);
        auto.stop(&tracker.inner).await;

        assert_eq!(AdvancePhase::from_u8(control.phase.load(Ordering::Acquire)), AdvancePhase::Completed);
        assert_eq!(sink.percents(), vec![50, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_already_past_ceiling_completes_without_writing() {
        let (tracker, sink) = tracker_with_sink();
        tracker.set(95, pulse_core::Status::Active, None).await;

        let mut auto = AutoAdvance::new(10, Duration::from_millis(10), 80);
        auto.start(Arc::downgrade(&tracker.inner));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(auto.phase(), AdvancePhase::Completed);
        assert_eq!(sink.percents(), vec![95]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_tracker_ends_task() {
        let (tracker, _sink) = tracker_with_sink();
        let mut auto = AutoAdvance::new(10, Duration::from_millis(10), 100);
        auto.start(Arc::downgrade(&tracker.inner));
        drop(tracker);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let handle = auto.handle.take().unwrap();
        assert!(handle.is_finished());
    }
}
