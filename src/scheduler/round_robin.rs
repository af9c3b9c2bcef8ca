//! Round-robin baseline placement

use parking_lot::Mutex;

use super::{feasible, Scheduler};
use crate::task::Task;
use crate::worker::{WorkerId, WorkerSnapshot};

/// Cycles feasible workers in id order, ignoring load and risk
///
/// Comparison baseline for the risk scheduler; same seam, no feedback.
#[derive(Default)]
pub struct RoundRobinScheduler {
    cursor: Mutex<usize>,
}

impl RoundRobinScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for RoundRobinScheduler {
    fn choose(&self, task: &Task, snapshot: &WorkerSnapshot) -> Option<WorkerId> {
        let candidates: Vec<&WorkerId> = feasible(task, snapshot).map(|w| &w.id).collect();
        if candidates.is_empty() {
            return None;
        }
        let mut cursor = self.cursor.lock();
        let id = candidates[*cursor % candidates.len()].clone();
        *cursor = cursor.wrapping_add(1);
        Some(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::task::{ResourceVec, TaskId, TaskType};
    use crate::worker::Worker;
    use chrono::Utc;

    fn task() -> Task {
        let arrival = Utc::now();
        Task {
            id: TaskId::new("t1"),
            task_type: TaskType::CpuLight,
            resources: ResourceVec::ZERO,
            arrival_time: arrival,
            sla_multiplier: 2.0,
            tau: 5.0,
            deadline: Task::deadline_for(arrival, 2.0, 5.0),
        }
    }

    #[test]
    fn test_alternates_between_workers() {
        let sched = RoundRobinScheduler::new();
        let snapshot = WorkerSnapshot::from_workers(vec![
            Worker::new(WorkerId::new("w1"), ResourceVec::new(8.0, 16.0, 100.0, 1.0)),
            Worker::new(WorkerId::new("w2"), ResourceVec::new(8.0, 16.0, 100.0, 1.0)),
        ]);

        let t = task();
        assert_eq!(sched.choose(&t, &snapshot), Some(WorkerId::new("w1")));
        assert_eq!(sched.choose(&t, &snapshot), Some(WorkerId::new("w2")));
        assert_eq!(sched.choose(&t, &snapshot), Some(WorkerId::new("w1")));
    }

    #[test]
    fn test_empty_fleet_returns_none() {
        let sched = RoundRobinScheduler::new();
        let snapshot = WorkerSnapshot::from_workers(vec![]);
        assert_eq!(sched.choose(&task(), &snapshot), None);
    }
}
