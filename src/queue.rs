//! Ready queue with backoff re-queues
//!
//! Multi-producer single-consumer FIFO between the ingress and the dispatch
//! loop. Re-queues are delayed sends: a spawned timer sleeps out the backoff
//! and pushes the envelope back, so the consumer never blocks on a retry.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::DispatchConfig;
use crate::error::{SchedResult, SchedulerError};
use crate::task::Task;

/// A task waiting for placement, with its retry count
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task: Task,
    /// Placement attempts already failed (0 on first entry)
    pub attempt: u32,
}

/// Producer handle to the ready queue
#[derive(Clone)]
pub struct ReadyQueue {
    tx: mpsc::UnboundedSender<QueuedTask>,
}

/// Create the queue; the receiver side belongs to the dispatch loop
pub fn ready_queue() -> (ReadyQueue, mpsc::UnboundedReceiver<QueuedTask>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReadyQueue { tx }, rx)
}

impl ReadyQueue {
    /// Enqueue a freshly admitted task
    pub fn push(&self, task: Task) -> SchedResult<()> {
        self.tx
            .send(QueuedTask { task, attempt: 0 })
            .map_err(|_| SchedulerError::QueueClosed)
    }

    /// Re-enqueue after `delay`, without blocking the caller
    pub fn requeue_after(&self, queued: QueuedTask, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(queued).is_err() {
                debug!("ready queue closed, dropping re-queued task");
            }
        });
    }
}

/// Exponential backoff with jitter for attempt `n` (0-based)
///
/// `base * 2^n`, capped, then jittered by the configured fraction.
pub fn backoff_delay(config: &DispatchConfig, attempt: u32) -> Duration {
    let exp = config
        .backoff_base_ms
        .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
        .min(config.backoff_cap_ms);
    let jitter = 1.0 + config.backoff_jitter * (fastrand::f64() * 2.0 - 1.0);
    Duration::from_millis((exp as f64 * jitter).max(0.0) as u64)
}
