//! Ingress edges: task admission and completion telemetry
//!
//! Validation lives here so nothing invalid ever reaches the placement
//! path. Admission freezes `tau` and the SLA deadline; completion intake
//! folds observed runtimes back into the estimator and appends history.

use metrics::counter;
use tracing::{debug, warn};

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::{SchedResult, SchedulerError};
use crate::estimator::RuntimeEstimator;
use crate::history::HistoryStore;
use crate::queue::ReadyQueue;
use crate::task::{
    CompletionRecord, CompletionStatus, Task, TaskId, TaskStatus, TaskSubmission,
};

/// Bounds for the SLA slack multiplier
pub const SLA_MULTIPLIER_RANGE: (f64, f64) = (1.5, 2.5);

/// Boundary validation and admission
///
/// Rejects what the scheduler must never see: unknown types are already
/// unrepresentable past deserialization, so what remains is range checking
/// and id uniqueness. On acceptance the task is persisted and enqueued.
pub struct SubmissionGate {
    estimator: Arc<RuntimeEstimator>,
    history: Arc<dyn HistoryStore>,
    queue: ReadyQueue,
}

impl SubmissionGate {
    pub fn new(
        estimator: Arc<RuntimeEstimator>,
        history: Arc<dyn HistoryStore>,
        queue: ReadyQueue,
    ) -> Self {
        Self {
            estimator,
            history,
            queue,
        }
    }

    /// Validate, freeze `tau`/`deadline`, persist, enqueue
    pub fn submit(&self, submission: TaskSubmission) -> SchedResult<TaskId> {
        if submission.task_id.0.is_empty() {
            return Err(SchedulerError::InvalidSubmission(
                "empty task id".to_string(),
            ));
        }
        if !submission.resources.is_valid_request() {
            return Err(SchedulerError::InvalidSubmission(format!(
                "negative or non-finite resource request: {:?}",
                submission.resources
            )));
        }
        let (k_min, k_max) = SLA_MULTIPLIER_RANGE;
        if !submission.sla_multiplier.is_finite()
            || !(k_min..=k_max).contains(&submission.sla_multiplier)
        {
            return Err(SchedulerError::InvalidSubmission(format!(
                "sla_multiplier {} outside [{k_min}, {k_max}]",
                submission.sla_multiplier
            )));
        }

        let tau = self.estimator.get(submission.task_type);
        let task = Task {
            deadline: Task::deadline_for(submission.arrival_time, submission.sla_multiplier, tau),
            id: submission.task_id,
            task_type: submission.task_type,
            resources: submission.resources,
            arrival_time: submission.arrival_time,
            sla_multiplier: submission.sla_multiplier,
            tau,
        };

        self.history.insert_task(task.clone())?;
        let id = task.id.clone();
        self.queue.push(task)?;
        counter!("risksched_submissions_total").increment(1);
        debug!(task = %id, tau, "task admitted");
        Ok(id)
    }
}

/// Completion telemetry intake
///
/// Runs concurrently with dispatch; a `tau` update racing a placement that
/// read the old value is acceptable by design.
pub struct CompletionIngest {
    estimator: Arc<RuntimeEstimator>,
    history: Arc<dyn HistoryStore>,
}

impl CompletionIngest {
    pub fn new(estimator: Arc<RuntimeEstimator>, history: Arc<dyn HistoryStore>) -> Self {
        Self { estimator, history }
    }

    /// Ingest one completion report
    ///
    /// Unknown task ids are discarded with a warning and no state change.
    pub fn ingest(
        &self,
        task_id: TaskId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        status: CompletionStatus,
    ) -> SchedResult<()> {
        let Some(task) = self.history.task(&task_id) else {
            warn!(task = %task_id, "completion for unknown task discarded");
            counter!("risksched_completions_discarded_total").increment(1);
            return Ok(());
        };

        let completion = CompletionRecord {
            sla_success: completed_at <= task.deadline,
            task_id: task_id.clone(),
            started_at,
            completed_at,
            status,
        };
        let actual = completion.actual_runtime();

        // The estimator drops non-positive runtimes itself.
        self.estimator.update(task.task_type, actual);

        self.history.record_completion(completion)?;
        let final_status = match status {
            CompletionStatus::Completed => TaskStatus::Completed,
            CompletionStatus::Failed => TaskStatus::Failed,
        };
        self.history.set_status(&task_id, final_status, None)?;

        counter!("risksched_completions_total").increment(1);
        debug!(task = %task_id, actual, "completion ingested");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistory;
    use crate::queue::ready_queue;
    use crate::task::{ResourceVec, TaskType};

    fn gate() -> (
        Arc<RuntimeEstimator>,
        Arc<InMemoryHistory>,
        SubmissionGate,
        tokio::sync::mpsc::UnboundedReceiver<crate::queue::QueuedTask>,
    ) {
        let estimator = Arc::new(RuntimeEstimator::default());
        let history = Arc::new(InMemoryHistory::new());
        let (queue, rx) = ready_queue();
        let gate = SubmissionGate::new(estimator.clone(), history.clone(), queue);
        (estimator, history, gate, rx)
    }

    fn submission(id: &str, k: f64) -> TaskSubmission {
        TaskSubmission {
            task_id: TaskId::new(id),
            task_type: TaskType::CpuHeavy,
            resources: ResourceVec::new(2.0, 4.0, 0.0, 0.0),
            arrival_time: Utc::now(),
            sla_multiplier: k,
        }
    }

    #[tokio::test]
    async fn test_admission_freezes_tau_and_deadline() {
        let (estimator, history, gate, mut rx) = gate();
        estimator.set(TaskType::CpuHeavy, 12.0).unwrap();

        let sub = submission("t1", 2.0);
        let arrival = sub.arrival_time;
        gate.submit(sub).unwrap();

        let task = history.task(&TaskId::new("t1")).unwrap();
        assert_eq!(task.tau, 12.0);
        assert_eq!(task.deadline, Task::deadline_for(arrival, 2.0, 12.0));

        // A later estimator change must not move the stored deadline.
        estimator.set(TaskType::CpuHeavy, 50.0).unwrap();
        assert_eq!(history.task(&TaskId::new("t1")).unwrap().tau, 12.0);

        assert_eq!(rx.recv().await.unwrap().task.id, TaskId::new("t1"));
    }

    #[tokio::test]
    async fn test_boundary_rejections() {
        let (_, _, gate, _rx) = gate();

        assert!(gate.submit(submission("t1", 1.0)).is_err());
        assert!(gate.submit(submission("t1", 3.0)).is_err());
        assert!(gate.submit(submission("t1", f64::NAN)).is_err());
        assert!(gate.submit(submission("", 2.0)).is_err());

        let mut bad = submission("t1", 2.0);
        bad.resources = ResourceVec::new(-1.0, 0.0, 0.0, 0.0);
        assert!(gate.submit(bad).is_err());
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected() {
        let (_, _, gate, _rx) = gate();
        gate.submit(submission("t1", 2.0)).unwrap();
        assert!(matches!(
            gate.submit(submission("t1", 2.0)),
            Err(SchedulerError::DuplicateTask(_))
        ));
    }

    #[tokio::test]
    async fn test_completion_updates_estimator_and_history() {
        let (estimator, history, gate, _rx) = gate();
        estimator.set(TaskType::CpuHeavy, 10.0).unwrap();
        gate.submit(submission("t1", 2.0)).unwrap();

        let ingest = CompletionIngest::new(estimator.clone(), history.clone());
        let started = Utc::now();
        ingest
            .ingest(
                TaskId::new("t1"),
                started,
                started + chrono::Duration::seconds(20),
                CompletionStatus::Completed,
            )
            .unwrap();

        // EMA: 0.2 * 20 + 0.8 * 10
        assert_eq!(estimator.get(TaskType::CpuHeavy), 12.0);
        let record = history.record(&TaskId::new("t1")).unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.completion.unwrap().sla_success, true);
    }

    #[tokio::test]
    async fn test_sla_miss_detected() {
        let (estimator, history, gate, _rx) = gate();
        estimator.set(TaskType::CpuHeavy, 10.0).unwrap();
        gate.submit(submission("t1", 2.0)).unwrap();

        let task = history.task(&TaskId::new("t1")).unwrap();
        let ingest = CompletionIngest::new(estimator, history.clone());
        ingest
            .ingest(
                TaskId::new("t1"),
                task.arrival_time,
                task.deadline + chrono::Duration::seconds(1),
                CompletionStatus::Completed,
            )
            .unwrap();

        let record = history.record(&TaskId::new("t1")).unwrap();
        assert_eq!(record.completion.unwrap().sla_success, false);
    }

    #[tokio::test]
    async fn test_unknown_completion_discarded_without_error() {
        let (estimator, history, _, _rx) = gate();
        let ingest = CompletionIngest::new(estimator.clone(), history);
        let now = Utc::now();
        ingest
            .ingest(
                TaskId::new("ghost"),
                now,
                now + chrono::Duration::seconds(5),
                CompletionStatus::Completed,
            )
            .unwrap();
        // No estimate was touched.
        assert_eq!(estimator.get(TaskType::CpuHeavy), 15.0);
    }
}
