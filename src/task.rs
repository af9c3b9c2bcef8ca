//! Task model and lifecycle records
//!
//! A task enters through the submission gate, which freezes its expected
//! runtime (`tau`) and SLA deadline at admission. Everything downstream
//! (placement, assignment, completion) treats those fields as immutable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SchedulerError;

/// Closed enumeration of workload classes
///
/// All runtime estimation, affinity, and default-resource logic is keyed on
/// this enum. Unknown tags are rejected at the boundary by `FromStr`/serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Short CPU-bound work
    CpuLight,
    /// Long CPU-bound work
    CpuHeavy,
    /// Memory-dominated work
    MemoryHeavy,
    /// GPU inference batches
    GpuInference,
    /// GPU training jobs
    GpuTraining,
    /// No dominant resource
    Mixed,
}

impl TaskType {
    /// All task types, in declaration order
    pub const ALL: [TaskType; 6] = [
        TaskType::CpuLight,
        TaskType::CpuHeavy,
        TaskType::MemoryHeavy,
        TaskType::GpuInference,
        TaskType::GpuTraining,
        TaskType::Mixed,
    ];

    /// Cold-start expected runtime in seconds
    pub fn default_runtime(self) -> f64 {
        match self {
            TaskType::CpuLight => 5.0,
            TaskType::CpuHeavy => 15.0,
            TaskType::MemoryHeavy => 20.0,
            TaskType::GpuInference => 10.0,
            TaskType::GpuTraining => 60.0,
            TaskType::Mixed => 10.0,
        }
    }

    /// Canonical tag string
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::CpuLight => "cpu-light",
            TaskType::CpuHeavy => "cpu-heavy",
            TaskType::MemoryHeavy => "memory-heavy",
            TaskType::GpuInference => "gpu-inference",
            TaskType::GpuTraining => "gpu-training",
            TaskType::Mixed => "mixed",
        }
    }
}

impl FromStr for TaskType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SchedulerError::UnknownTaskType(s.to_string()))
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique task fingerprint assigned by the ingress
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Wrap an ingress-provided fingerprint
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource vector over the four scheduled dimensions
///
/// The same shape serves as a task's request, a worker's capacity, and the
/// learned per-resource penalty weights.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceVec {
    pub cpu: f64,
    pub mem: f64,
    pub storage: f64,
    pub gpu: f64,
}

impl ResourceVec {
    /// All-zero vector
    pub const ZERO: ResourceVec = ResourceVec {
        cpu: 0.0,
        mem: 0.0,
        storage: 0.0,
        gpu: 0.0,
    };

    pub fn new(cpu: f64, mem: f64, storage: f64, gpu: f64) -> Self {
        Self {
            cpu,
            mem,
            storage,
            gpu,
        }
    }

    /// True if every component is finite and non-negative
    pub fn is_valid_request(&self) -> bool {
        [self.cpu, self.mem, self.storage, self.gpu]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }

    /// True if this capacity covers `req` in every dimension
    pub fn dominates(&self, req: &ResourceVec) -> bool {
        self.cpu >= req.cpu
            && self.mem >= req.mem
            && self.storage >= req.storage
            && self.gpu >= req.gpu
    }

    /// Per-dimension demand ratios `req_r / max(cap_r, epsilon)`
    ///
    /// `epsilon` guards capacity-zero dimensions the task did not request;
    /// requested-but-missing dimensions never get here because feasibility
    /// filtering removed the pair.
    pub fn ratios(&self, cap: &ResourceVec, epsilon: f64) -> ResourceVec {
        ResourceVec {
            cpu: self.cpu / cap.cpu.max(epsilon),
            mem: self.mem / cap.mem.max(epsilon),
            storage: self.storage / cap.storage.max(epsilon),
            gpu: self.gpu / cap.gpu.max(epsilon),
        }
    }

    /// Component-wise dot product
    pub fn dot(&self, other: &ResourceVec) -> f64 {
        self.cpu * other.cpu
            + self.mem * other.mem
            + self.storage * other.storage
            + self.gpu * other.gpu
    }

    /// Component-wise maximum against a floor value
    pub fn floor_at(&self, floor: f64) -> ResourceVec {
        ResourceVec {
            cpu: self.cpu.max(floor),
            mem: self.mem.max(floor),
            storage: self.storage.max(floor),
            gpu: self.gpu.max(floor),
        }
    }
}

/// Boundary record handed over by the ingress, before admission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// Unique task fingerprint
    pub task_id: TaskId,
    /// Workload class
    pub task_type: TaskType,
    /// Requested resources, all non-negative
    pub resources: ResourceVec,
    /// Submission timestamp
    pub arrival_time: DateTime<Utc>,
    /// SLA slack multiplier, in [1.5, 2.5]
    pub sla_multiplier: f64,
}

/// Admitted task as seen by the scheduler
///
/// `tau` and `deadline` are frozen at admission and never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub resources: ResourceVec,
    pub arrival_time: DateTime<Utc>,
    pub sla_multiplier: f64,
    /// Expected runtime in seconds at admission time
    pub tau: f64,
    /// `arrival_time + sla_multiplier * tau`
    pub deadline: DateTime<Utc>,
}

impl Task {
    /// Compute the SLA deadline for an admission
    ///
    /// Single definition shared by the submission gate and the tests, so the
    /// recorded deadline is reproducible from its inputs.
    pub fn deadline_for(arrival: DateTime<Utc>, sla_multiplier: f64, tau: f64) -> DateTime<Utc> {
        arrival + Duration::microseconds((sla_multiplier * tau * 1_000_000.0).round() as i64)
    }

    /// Slack between arrival and deadline, in seconds
    pub fn slack_secs(&self) -> f64 {
        duration_secs(self.deadline - self.arrival_time)
    }
}

/// Scheduler-side task lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the ready queue
    Queued,
    /// Placed on a worker and dispatched
    Running,
    /// Completion record ingested with status completed
    Completed,
    /// Terminal failure (worker-reported, or retries exhausted)
    Failed,
}

/// Placement commitment, created exactly once per task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: TaskId,
    pub worker_id: crate::worker::WorkerId,
    pub assigned_at: DateTime<Utc>,
    /// Worker load captured from the placement snapshot; consumed later by
    /// the learner's affinity regression
    pub load_at_start: f64,
}

/// Terminal outcome reported by the completion ingress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Completed,
    Failed,
}

/// Immutable completion telemetry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub task_id: TaskId,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: CompletionStatus,
    /// `completed_at <= deadline`
    pub sla_success: bool,
}

impl CompletionRecord {
    /// Observed runtime in seconds
    pub fn actual_runtime(&self) -> f64 {
        duration_secs(self.completed_at - self.started_at)
    }
}

/// Signed duration in fractional seconds
pub(crate) fn duration_secs(d: Duration) -> f64 {
    d.num_microseconds()
        .map_or_else(|| d.num_milliseconds() as f64 / 1_000.0, |us| us as f64 / 1_000_000.0)
}
