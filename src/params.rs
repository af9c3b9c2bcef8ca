//! Learned scheduler parameters with atomic hot-reload
//!
//! The learner publishes a full `(theta, affinity, penalty)` bundle as one
//! immutable snapshot behind an atomic pointer swap. The placement path
//! loads the pointer lock-free on every decision; a reader holding a
//! snapshot keeps it valid indefinitely while later readers see the new one.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::task::{ResourceVec, TaskType};
use crate::worker::WorkerId;

/// Immutable `(theta, affinity, penalty)` bundle
///
/// Missing affinity/penalty entries read as zero, so an empty set is the
/// valid cold-start state: scheduling degenerates to load-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Non-negative penalty weights on normalized resource demand
    #[serde(with = "theta_array")]
    pub theta: ResourceVec,
    /// Per-worker, per-task-type affinity; positive favors the worker
    pub affinity: HashMap<WorkerId, HashMap<TaskType, f64>>,
    /// Per-worker reliability penalty; higher means past failures
    pub penalty: HashMap<WorkerId, f64>,
}

impl ParameterSet {
    /// Affinity score for a `(worker, task type)` pair, zero when unknown
    pub fn affinity_for(&self, worker: &WorkerId, task_type: TaskType) -> f64 {
        self.affinity
            .get(worker)
            .and_then(|by_type| by_type.get(&task_type))
            .copied()
            .unwrap_or(0.0)
    }

    /// Reliability penalty for a worker, zero when unknown
    pub fn penalty_for(&self, worker: &WorkerId) -> f64 {
        self.penalty.get(worker).copied().unwrap_or(0.0)
    }
}

/// Serialize theta as the debug-JSON 4-array `[cpu, mem, storage, gpu]`
mod theta_array {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::task::ResourceVec;

    pub fn serialize<S: Serializer>(theta: &ResourceVec, ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_seq([theta.cpu, theta.mem, theta.storage, theta.gpu])
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<ResourceVec, D::Error> {
        let values = <[f64; 4]>::deserialize(de)?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(D::Error::custom("theta components must be finite"));
        }
        Ok(ResourceVec::new(values[0], values[1], values[2], values[3]))
    }
}

/// Copy-on-write parameter store
///
/// `current` is a single atomic pointer load; `install` swaps the pointer.
/// Any placement uses either the old snapshot entirely or the new one
/// entirely, never a mix.
pub struct ParameterStore {
    current: ArcSwap<ParameterSet>,
}

impl ParameterStore {
    /// Start from the cold-start set (zero theta, empty maps)
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(ParameterSet::default()),
        }
    }

    /// The active snapshot; valid for as long as the caller holds it
    pub fn current(&self) -> Arc<ParameterSet> {
        self.current.load_full()
    }

    /// Atomically publish a new snapshot
    ///
    /// Negative theta components violate the model and are floored at zero
    /// before publication.
    pub fn install(&self, mut set: ParameterSet) {
        if !set.theta.is_valid_request() {
            warn!(theta = ?set.theta, "flooring invalid theta components at zero");
            set.theta = set.theta.floor_at(0.0);
        }
        info!(
            theta = ?set.theta,
            affinity_workers = set.affinity.len(),
            penalized_workers = set.penalty.len(),
            "installing parameter snapshot"
        );
        self.current.store(Arc::new(set));
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}
