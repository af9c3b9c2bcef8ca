//! Online runtime estimation per task type
//!
//! Keeps an exponential moving average of observed runtimes for each
//! workload class. EMA adapts quickly to shifting workload mixes while a
//! small lambda keeps one outlier from destabilizing deadline predictions.
//! Nothing is persisted; the per-type defaults are usable cold.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::warn;

use crate::config::EstimatorConfig;
use crate::error::{SchedResult, SchedulerError};
use crate::task::TaskType;

struct EstimatorState {
    tau: HashMap<TaskType, f64>,
    lambda: f64,
}

/// Expected-runtime store, EMA-updated from completion telemetry
///
/// Many readers (every placement), single writer (completion ingest). Writes
/// are single-field updates under the write lock, O(1) per call.
pub struct RuntimeEstimator {
    inner: RwLock<EstimatorState>,
}

impl RuntimeEstimator {
    pub fn new(config: &EstimatorConfig) -> Self {
        Self {
            inner: RwLock::new(EstimatorState {
                tau: HashMap::new(),
                lambda: config.lambda.clamp(0.0, 1.0),
            }),
        }
    }

    /// Expected runtime in seconds for a task type
    ///
    /// Never fails: an unseen type reads its cold-start default.
    pub fn get(&self, task_type: TaskType) -> f64 {
        self.inner
            .read()
            .tau
            .get(&task_type)
            .copied()
            .unwrap_or_else(|| task_type.default_runtime())
    }

    /// Fold one observed runtime into the estimate
    ///
    /// `tau <- lambda * actual + (1 - lambda) * tau_old`. Non-positive or
    /// non-finite observations are dropped; the scheduler keeps running on
    /// bad telemetry.
    pub fn update(&self, task_type: TaskType, actual_secs: f64) {
        if !actual_secs.is_finite() || actual_secs <= 0.0 {
            warn!(%task_type, actual_secs, "discarding invalid runtime observation");
            return;
        }
        let mut state = self.inner.write();
        let lambda = state.lambda;
        let old = state
            .tau
            .get(&task_type)
            .copied()
            .unwrap_or_else(|| task_type.default_runtime());
        state
            .tau
            .insert(task_type, lambda * actual_secs + (1.0 - lambda) * old);
    }

    /// Overwrite an estimate (manual bootstrap, tests)
    pub fn set(&self, task_type: TaskType, tau: f64) -> SchedResult<()> {
        if !tau.is_finite() || tau <= 0.0 {
            return Err(SchedulerError::InvalidParameter(format!(
                "tau must be positive, got {tau}"
            )));
        }
        self.inner.write().tau.insert(task_type, tau);
        Ok(())
    }

    /// Change the EMA smoothing factor, in [0, 1]
    pub fn set_lambda(&self, lambda: f64) -> SchedResult<()> {
        if !lambda.is_finite() || !(0.0..=1.0).contains(&lambda) {
            return Err(SchedulerError::InvalidParameter(format!(
                "lambda must be in [0, 1], got {lambda}"
            )));
        }
        self.inner.write().lambda = lambda;
        Ok(())
    }

    /// Independent copy of all estimates, defaults filled in
    pub fn snapshot(&self) -> HashMap<TaskType, f64> {
        let state = self.inner.read();
        TaskType::ALL
            .iter()
            .map(|t| {
                (
                    *t,
                    state.tau.get(t).copied().unwrap_or_else(|| t.default_runtime()),
                )
            })
            .collect()
    }
}

impl Default for RuntimeEstimator {
    fn default() -> Self {
        Self::new(&EstimatorConfig::default())
    }
}
