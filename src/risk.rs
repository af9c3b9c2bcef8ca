//! Risk scoring for task placement
//!
//! The score combines predicted lateness against the SLA deadline with the
//! worker's current load, then adjusts for learned affinity and reliability:
//!
//! ```text
//! E_hat   = tau * (1 + theta . ratios(req, cap))
//! delta   = max(0, (E_hat - slack) / slack)        slack = deadline - arrival
//! R_base  = alpha * delta + beta * load
//! R_final = R_base - affinity[worker][type] + penalty[worker]
//! ```
//!
//! Affinity reduces risk, penalty increases it; the final score may be
//! negative. Lower is better.

use crate::config::RiskConfig;
use crate::params::ParameterSet;
use crate::task::{ResourceVec, Task};
use crate::worker::Worker;

/// Predicted execution time of a task on a worker, in seconds
///
/// Resource pressure inflates the base estimate: each requested dimension
/// contributes its demand ratio weighted by theta.
pub fn predicted_runtime(
    tau: f64,
    request: &ResourceVec,
    capacity: &ResourceVec,
    theta: &ResourceVec,
    epsilon: f64,
) -> f64 {
    tau * (1.0 + theta.dot(&request.ratios(capacity, epsilon)))
}

/// Normalized predicted lateness
///
/// Zero when the prediction fits inside the allotted slack, growing without
/// bound as the prediction exceeds the deadline.
pub fn lateness(predicted_secs: f64, slack_secs: f64, epsilon: f64) -> f64 {
    ((predicted_secs - slack_secs) / slack_secs.max(epsilon)).max(0.0)
}

/// Risk model: the scoring constants plus the formula
#[derive(Debug, Clone, Default)]
pub struct RiskModel {
    config: RiskConfig,
}

impl RiskModel {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Base risk before learned adjustments
    pub fn base_risk(&self, delta: f64, load: f64) -> f64 {
        self.config.alpha * delta + self.config.beta * load
    }

    /// Final risk of placing `task` on `worker` under `params`
    ///
    /// `tau` is the live expected runtime for the task's type; the task's
    /// frozen deadline supplies the slack.
    pub fn final_risk(&self, task: &Task, worker: &Worker, tau: f64, params: &ParameterSet) -> f64 {
        let predicted = predicted_runtime(
            tau,
            &task.resources,
            &worker.capacity,
            &params.theta,
            self.config.epsilon,
        );
        let delta = lateness(predicted, task.slack_secs(), self.config.epsilon);
        self.base_risk(delta, worker.load) - params.affinity_for(&worker.id, task.task_type)
            + params.penalty_for(&worker.id)
    }
}
