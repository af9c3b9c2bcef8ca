//! Worker registry and placement snapshots
//!
//! Worker records are owned by the registration side; the scheduler only
//! ever reads an immutable snapshot. Capacity is static per worker, load is
//! volatile telemetry clamped to [0, 1], and liveness is a flag flipped by
//! the registration protocol.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SchedResult, SchedulerError};
use crate::task::ResourceVec;

/// Worker identifier
///
/// Ordered lexicographically; placement tie-breaking relies on that order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    /// Static capacity over the four resource dimensions
    pub capacity: ResourceVec,
    /// Scalar utilization in [0, 1]
    pub load: f64,
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
}

impl Worker {
    /// Create an active worker with zero load
    pub fn new(id: WorkerId, capacity: ResourceVec) -> Self {
        Self {
            id,
            capacity,
            load: 0.0,
            is_active: true,
            last_seen: Utc::now(),
        }
    }
}

/// In-memory worker registry
///
/// Writers are the worker-registration protocol and the telemetry intake;
/// the dispatch path only calls `snapshot`.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: DashMap<WorkerId, Worker>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a worker record
    pub fn register(&self, mut worker: Worker) {
        worker.load = worker.load.clamp(0.0, 1.0);
        worker.last_seen = Utc::now();
        self.workers.insert(worker.id.clone(), worker);
    }

    /// Update a worker's load telemetry, clamped to [0, 1]
    pub fn set_load(&self, id: &WorkerId, load: f64) -> SchedResult<()> {
        let mut entry = self
            .workers
            .get_mut(id)
            .ok_or_else(|| SchedulerError::WorkerNotFound(id.clone()))?;
        entry.load = if load.is_finite() { load.clamp(0.0, 1.0) } else { 1.0 };
        entry.last_seen = Utc::now();
        Ok(())
    }

    /// Flip a worker's liveness flag
    pub fn set_active(&self, id: &WorkerId, active: bool) -> SchedResult<()> {
        let mut entry = self
            .workers
            .get_mut(id)
            .ok_or_else(|| SchedulerError::WorkerNotFound(id.clone()))?;
        entry.is_active = active;
        entry.last_seen = Utc::now();
        Ok(())
    }

    pub fn capacity(&self, id: &WorkerId) -> Option<ResourceVec> {
        self.workers.get(id).map(|w| w.capacity)
    }

    pub fn load(&self, id: &WorkerId) -> Option<f64> {
        self.workers.get(id).map(|w| w.load)
    }

    pub fn is_active(&self, id: &WorkerId) -> bool {
        self.workers.get(id).map(|w| w.is_active).unwrap_or(false)
    }

    /// Currently active workers, in id order
    pub fn active_workers(&self) -> Vec<Worker> {
        let mut active: Vec<Worker> = self
            .workers
            .iter()
            .filter(|e| e.value().is_active)
            .map(|e| e.value().clone())
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    /// Immutable view of the active fleet for one placement decision
    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            workers: self.active_workers(),
            taken_at: Utc::now(),
        }
    }
}

/// Read-only view of active workers at a point in time
///
/// May lag live telemetry by seconds; placement treats load as a hint.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    workers: Vec<Worker>,
    taken_at: DateTime<Utc>,
}

impl WorkerSnapshot {
    /// Build a snapshot directly from worker records (tests, simulations)
    pub fn from_workers(mut workers: Vec<Worker>) -> Self {
        workers.retain(|w| w.is_active);
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            workers,
            taken_at: Utc::now(),
        }
    }

    /// Active workers in id order
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn load(&self, id: &WorkerId) -> Option<f64> {
        self.workers.iter().find(|w| &w.id == id).map(|w| w.load)
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
