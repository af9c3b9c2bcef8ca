//! Error types for the scheduler core

use thiserror::Error;

use crate::task::TaskId;
use crate::worker::WorkerId;

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedulerError>;

/// Error types surfaced by the scheduler core
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Task type tag not in the closed enumeration
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    /// Submission rejected at the boundary
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    /// Task id already admitted
    #[error("Task {0} already exists")]
    DuplicateTask(TaskId),

    /// Task id not found in history
    #[error("Task {0} not found")]
    TaskNotFound(TaskId),

    /// Worker id not registered
    #[error("Worker {0} not found")]
    WorkerNotFound(WorkerId),

    /// Invalid parameter value (lambda, tau, ...)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Ready queue closed (dispatch loop gone)
    #[error("Ready queue closed")]
    QueueClosed,

    /// History store failure
    #[error("History store error: {0}")]
    Storage(String),
}
