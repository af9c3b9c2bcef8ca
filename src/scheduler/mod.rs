//! Worker selection behind a single narrow seam
//!
//! Placement strategies implement one capability: given a task and a worker
//! snapshot, pick a worker or report that none fits. The dispatch loop takes
//! the strategy by injection, so the risk-based scheduler and the
//! round-robin baseline swap freely.

mod risk_based;
mod round_robin;

pub use risk_based::RiskScheduler;
pub use round_robin::RoundRobinScheduler;

use crate::task::Task;
use crate::worker::{Worker, WorkerId, WorkerSnapshot};

/// Placement capability
pub trait Scheduler: Send + Sync {
    /// Choose a worker for the task, or `None` when no feasible worker
    /// exists. The caller re-queues on `None`; this is not an error.
    fn choose(&self, task: &Task, snapshot: &WorkerSnapshot) -> Option<WorkerId>;
}

/// Workers that can run the task at all: active, with capacity covering the
/// request in every dimension
pub(crate) fn feasible<'a>(
    task: &'a Task,
    snapshot: &'a WorkerSnapshot,
) -> impl Iterator<Item = &'a Worker> {
    snapshot
        .workers()
        .iter()
        .filter(|w| w.is_active && w.capacity.dominates(&task.resources))
}
