//! Serial dispatch loop
//!
//! Single consumer of the ready queue. Each task gets a fresh worker
//! snapshot, one placement decision, and one transport call under timeout;
//! the commit happens only on transport acceptance. Failures are isolated
//! per task: `NoCapacity`, rejection, and timeout all re-queue with
//! exponential backoff until the retry cap converts them into a terminal
//! failure. Only a history-store fault stops the loop, and completions keep
//! flowing independently when it does.

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::error::SchedResult;
use crate::history::HistoryStore;
use crate::queue::{backoff_delay, QueuedTask, ReadyQueue};
use crate::scheduler::Scheduler;
use crate::task::{Assignment, TaskId, TaskStatus};
use crate::worker::{WorkerId, WorkerRegistry};

/// Transport verdict for a dispatch attempt
///
/// Timeouts are produced by the loop's own deadline around the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Worker accepted the task
    Accepted,
    /// Worker refused the task
    Rejected,
}

/// Hand-off to the worker runtime
#[async_trait]
pub trait DispatchTransport: Send + Sync {
    async fn dispatch(&self, task_id: &TaskId, worker_id: &WorkerId) -> DispatchOutcome;
}

/// The dispatch loop and its collaborators
pub struct DispatchLoop {
    rx: mpsc::UnboundedReceiver<QueuedTask>,
    queue: ReadyQueue,
    scheduler: Arc<dyn Scheduler>,
    registry: Arc<WorkerRegistry>,
    history: Arc<dyn HistoryStore>,
    transport: Arc<dyn DispatchTransport>,
    config: DispatchConfig,
}

impl DispatchLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rx: mpsc::UnboundedReceiver<QueuedTask>,
        queue: ReadyQueue,
        scheduler: Arc<dyn Scheduler>,
        registry: Arc<WorkerRegistry>,
        history: Arc<dyn HistoryStore>,
        transport: Arc<dyn DispatchTransport>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            rx,
            queue,
            scheduler,
            registry,
            history,
            transport,
            config,
        }
    }

    /// Consume the ready queue until it closes or the store fails
    pub async fn run(mut self) {
        info!("dispatch loop started");
        while let Some(queued) = self.rx.recv().await {
            if let Err(e) = self.dispatch_one(queued).await {
                // A storage fault means placements can no longer be
                // committed; refuse further dispatch rather than place
                // tasks without a record.
                error!(error = %e, "history store failure, refusing further dispatch");
                break;
            }
        }
        info!("dispatch loop stopped");
    }

    /// Place one task; `Err` only on storage faults
    async fn dispatch_one(&mut self, queued: QueuedTask) -> SchedResult<()> {
        let snapshot = self.registry.snapshot();

        let Some(worker_id) = self.scheduler.choose(&queued.task, &snapshot) else {
            counter!("risksched_requeues_total", "reason" => "no_capacity").increment(1);
            self.requeue_or_fail(queued, "no feasible worker")?;
            return Ok(());
        };

        let timeout = Duration::from_millis(self.config.transport_timeout_ms);
        let outcome = tokio::time::timeout(
            timeout,
            self.transport.dispatch(&queued.task.id, &worker_id),
        )
        .await;

        match outcome {
            Ok(DispatchOutcome::Accepted) => {
                let assignment = Assignment {
                    task_id: queued.task.id.clone(),
                    worker_id: worker_id.clone(),
                    assigned_at: Utc::now(),
                    // Load from the snapshot the decision actually used.
                    load_at_start: snapshot.load(&worker_id).unwrap_or(0.0),
                };
                self.history.record_assignment(assignment)?;
                self.history
                    .set_status(&queued.task.id, TaskStatus::Running, None)?;
                counter!("risksched_placements_total").increment(1);
                debug!(task = %queued.task.id, worker = %worker_id, "assignment committed");
            }
            Ok(DispatchOutcome::Rejected) => {
                warn!(task = %queued.task.id, worker = %worker_id, "worker rejected dispatch");
                counter!("risksched_requeues_total", "reason" => "rejected").increment(1);
                self.requeue_or_fail(queued, "worker rejected")?;
            }
            Err(_) => {
                warn!(task = %queued.task.id, worker = %worker_id, "dispatch timed out");
                counter!("risksched_requeues_total", "reason" => "timeout").increment(1);
                self.requeue_or_fail(queued, "dispatch timeout")?;
            }
        }
        Ok(())
    }

    /// Back off and retry, or mark the task failed once retries are spent
    fn requeue_or_fail(&self, mut queued: QueuedTask, reason: &str) -> SchedResult<()> {
        if queued.attempt >= self.config.max_retries {
            warn!(
                task = %queued.task.id,
                attempts = queued.attempt,
                reason,
                "retries exhausted, marking task failed"
            );
            counter!("risksched_tasks_failed_total").increment(1);
            return self.history.set_status(
                &queued.task.id,
                TaskStatus::Failed,
                Some(reason.to_string()),
            );
        }

        let delay = backoff_delay(&self.config, queued.attempt);
        queued.attempt += 1;
        debug!(task = %queued.task.id, attempt = queued.attempt, ?delay, reason, "re-queueing");
        self.queue.requeue_after(queued, delay);
        Ok(())
    }
}
