//! Task history: the scheduler's narrow view of the persistent store
//!
//! The real store lives outside the core; this module defines the interface
//! the scheduler writes through (tasks, assignments, completions) and an
//! in-memory implementation. Assignments and completions are append-only
//! from the scheduler's point of view, and a task gets at most one of each.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

use crate::error::{SchedResult, SchedulerError};
use crate::task::{Assignment, CompletionRecord, Task, TaskId, TaskStatus};

/// One task's full lifecycle as recorded by the scheduler
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task: Task,
    pub status: TaskStatus,
    /// Reason for a terminal failure on the dispatch path
    pub failure_reason: Option<String>,
    pub assignment: Option<Assignment>,
    pub completion: Option<CompletionRecord>,
}

/// Narrow persistence interface consumed by the scheduler core
pub trait HistoryStore: Send + Sync {
    /// Persist an admitted task in `Queued` state; duplicate ids are refused
    fn insert_task(&self, task: Task) -> SchedResult<()>;

    fn task(&self, id: &TaskId) -> Option<Task>;

    fn record(&self, id: &TaskId) -> Option<TaskRecord>;

    /// Update lifecycle state, with an optional failure reason
    fn set_status(&self, id: &TaskId, status: TaskStatus, reason: Option<String>)
        -> SchedResult<()>;

    /// Commit the placement; exactly one assignment may exist per task
    fn record_assignment(&self, assignment: Assignment) -> SchedResult<()>;

    fn assignment(&self, id: &TaskId) -> Option<Assignment>;

    /// Append completion telemetry; at most one completion per task
    fn record_completion(&self, completion: CompletionRecord) -> SchedResult<()>;

    /// Most recent completions, oldest first, up to `limit`
    fn recent_completions(&self, limit: usize) -> Vec<CompletionRecord>;
}

#[derive(Default)]
struct HistoryState {
    tasks: HashMap<TaskId, TaskRecord>,
    /// Completion order, for windowed reads
    completion_log: VecDeque<TaskId>,
}

/// In-memory history store
#[derive(Default)]
pub struct InMemoryHistory {
    state: RwLock<HistoryState>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistory {
    fn insert_task(&self, task: Task) -> SchedResult<()> {
        let mut state = self.state.write();
        if state.tasks.contains_key(&task.id) {
            return Err(SchedulerError::DuplicateTask(task.id));
        }
        state.tasks.insert(
            task.id.clone(),
            TaskRecord {
                task,
                status: TaskStatus::Queued,
                failure_reason: None,
                assignment: None,
                completion: None,
            },
        );
        Ok(())
    }

    fn task(&self, id: &TaskId) -> Option<Task> {
        self.state.read().tasks.get(id).map(|r| r.task.clone())
    }

    fn record(&self, id: &TaskId) -> Option<TaskRecord> {
        self.state.read().tasks.get(id).cloned()
    }

    fn set_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        reason: Option<String>,
    ) -> SchedResult<()> {
        let mut state = self.state.write();
        let record = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::TaskNotFound(id.clone()))?;
        record.status = status;
        if reason.is_some() {
            record.failure_reason = reason;
        }
        Ok(())
    }

    fn record_assignment(&self, assignment: Assignment) -> SchedResult<()> {
        let mut state = self.state.write();
        let record = state
            .tasks
            .get_mut(&assignment.task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(assignment.task_id.clone()))?;
        if record.assignment.is_some() {
            return Err(SchedulerError::Storage(format!(
                "task {} already assigned",
                assignment.task_id
            )));
        }
        record.assignment = Some(assignment);
        Ok(())
    }

    fn assignment(&self, id: &TaskId) -> Option<Assignment> {
        self.state.read().tasks.get(id).and_then(|r| r.assignment.clone())
    }

    fn record_completion(&self, completion: CompletionRecord) -> SchedResult<()> {
        let mut state = self.state.write();
        let record = state
            .tasks
            .get_mut(&completion.task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(completion.task_id.clone()))?;
        if record.completion.is_some() {
            return Err(SchedulerError::Storage(format!(
                "task {} already completed",
                completion.task_id
            )));
        }
        let id = completion.task_id.clone();
        record.completion = Some(completion);
        state.completion_log.push_back(id);
        Ok(())
    }

    fn recent_completions(&self, limit: usize) -> Vec<CompletionRecord> {
        let state = self.state.read();
        let skip = state.completion_log.len().saturating_sub(limit);
        state
            .completion_log
            .iter()
            .skip(skip)
            .filter_map(|id| state.tasks.get(id).and_then(|r| r.completion.clone()))
            .collect()
    }
}
