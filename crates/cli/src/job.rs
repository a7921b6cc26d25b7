//! Simulated weighted job used by `pulse run`.
//!
//! ```text
//! job ─┬─ prepare   10%  estimated with auto advance
//!      ├─ process   70%  split evenly across workers
//!      └─ finalize  20%
//! ```

use pulse_core::{Message, Status};
use pulse_progress::{ProgressTracker, SubProgressOptions};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Shape of a simulated run.
#[derive(Debug, Clone)]
pub struct JobPlan {
    /// Parallel workers in the processing stage
    pub workers: usize,
    /// Items handled by each worker
    pub items: u32,
    /// Pause between two items
    pub tick: Duration,
    /// Worker that reports an exception halfway, if any
    pub failing_worker: Option<usize>,
}

impl Default for JobPlan {
    fn default() -> Self {
        Self {
            workers: 3,
            items: 10,
            tick: Duration::from_millis(20),
            failing_worker: None,
        }
    }
}

/// Drive `root` through the plan.
pub async fn run(root: &ProgressTracker, plan: &JobPlan) -> anyhow::Result<()> {
    root.active(0, Some("starting".into())).await;

    prepare(root, plan).await;
    process(root, plan).await?;

    let finalize = root.new_sub_progress(20).await;
    finalize.active(50, Some("writing report".into())).await;
    tokio::time::sleep(plan.tick).await;
    finalize.success(None).await;

    let message = if root.status().await == Status::Exception {
        "finished with errors"
    } else {
        "finished"
    };
    // Keeps an exception raised by a worker; an active job becomes success
    root.done(None, Some(message.into())).await;
    info!("Job {} ended at {}%", root.code(), root.percent().await);
    Ok(())
}

async fn prepare(root: &ProgressTracker, plan: &JobPlan) {
    let stage = root
        .new_sub_progress_with(SubProgressOptions::new(10).with_metadata("stage", "prepare"))
        .await;
    stage
        .auto_advance(20, plan.tick, 90, Some("scanning inputs".into()))
        .await;
    tokio::time::sleep(plan.tick * 3).await;
    stage.success(Some("inputs ready".into())).await;
}

async fn process(root: &ProgressTracker, plan: &JobPlan) -> anyhow::Result<()> {
    let stage = root
        .new_sub_progress_with(
            SubProgressOptions::new(70)
                .with_propagation()
                .with_metadata("stage", "process"),
        )
        .await;

    let workers = plan.workers.max(1);
    let share = 100 / workers as i32;
    let mut handles = Vec::with_capacity(workers);

    for index in 0..workers {
        // The last worker takes the rounding remainder
        let proportion = if index + 1 == workers {
            100 - share * (workers as i32 - 1)
        } else {
            share
        };
        let worker = stage
            .new_sub_progress_with(
                SubProgressOptions::new(proportion)
                    .with_propagation()
                    .with_metadata("worker", index.to_string()),
            )
            .await;
        let plan = plan.clone();
        handles.push(tokio::spawn(async move {
            work(index, &worker, &plan).await;
        }));
    }

    for handle in handles {
        handle.await?;
    }
    debug!("Processing stage done, {} live children", stage.live_children().await);
    Ok(())
}

async fn work(index: usize, worker: &ProgressTracker, plan: &JobPlan) {
    let items = plan.items.max(1);
    for item in 1..=items {
        tokio::time::sleep(plan.tick).await;
        let percent = (item * 100 / items) as i32;
        let message = Message::from(json!({ "worker": index, "item": item, "of": items }));

        if plan.failing_worker == Some(index) && item == items / 2 {
            worker
                .exception(percent, Some(format!("worker {} hit a bad record", index).into()))
                .await;
            continue;
        }
        if item == items {
            worker.success(Some(message)).await;
        } else {
            worker.set(percent, Status::Active, Some(message)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_progress::ProgressSubscriber;
    use pulse_core::ProgressPayload;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Collect {
        payloads: Mutex<Vec<ProgressPayload>>,
    }

    #[async_trait::async_trait]
    impl ProgressSubscriber for Collect {
        async fn progress_set(&self, payload: &ProgressPayload) {
            self.payloads.lock().unwrap().push(payload.clone());
        }
    }

    fn quick_plan() -> JobPlan {
        JobPlan {
            workers: 3,
            items: 4,
            tick: Duration::from_millis(5),
            failing_worker: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_reaches_hundred_and_succeeds() {
        let collect = Arc::new(Collect::default());
        let root = ProgressTracker::with_subscribers("demo", vec![collect.clone()]);

        run(&root, &quick_plan()).await.unwrap();

        assert_eq!(root.percent().await, 100);
        assert_eq!(root.status().await, Status::Success);
        assert_eq!(root.live_children().await, 0);

        let payloads = collect.payloads.lock().unwrap();
        let last = payloads.last().unwrap();
        assert_eq!(last.percent, 100);
        assert_eq!(last.message, Some(Message::from("finished")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_worker_marks_job_exception() {
        let root = ProgressTracker::logging("demo");
        let plan = JobPlan {
            failing_worker: Some(1),
            ..quick_plan()
        };

        run(&root, &plan).await.unwrap();

        assert_eq!(root.status().await, Status::Exception);
        assert_eq!(root.message().await, Some(Message::from("finished with errors")));
        assert_eq!(root.percent().await, 100);
    }
}
