//! Risk-minimizing placement

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use super::{feasible, Scheduler};
use crate::estimator::RuntimeEstimator;
use crate::params::ParameterStore;
use crate::risk::RiskModel;
use crate::task::Task;
use crate::worker::{WorkerId, WorkerSnapshot};

/// Chooses the feasible worker with minimum final risk
///
/// Reads the live runtime estimate and one consistent parameter snapshot
/// per decision. Ties break by lowest load, then lexicographically smallest
/// worker id, so identical inputs always produce the same choice.
pub struct RiskScheduler {
    estimator: Arc<RuntimeEstimator>,
    params: Arc<ParameterStore>,
    model: RiskModel,
}

impl RiskScheduler {
    pub fn new(
        estimator: Arc<RuntimeEstimator>,
        params: Arc<ParameterStore>,
        model: RiskModel,
    ) -> Self {
        Self {
            estimator,
            params,
            model,
        }
    }
}

impl Scheduler for RiskScheduler {
    fn choose(&self, task: &Task, snapshot: &WorkerSnapshot) -> Option<WorkerId> {
        // One parameter snapshot for the whole decision.
        let params = self.params.current();
        let tau = self.estimator.get(task.task_type);

        let mut best: Option<(f64, f64, &WorkerId)> = None;
        for worker in feasible(task, snapshot) {
            let risk = self.model.final_risk(task, worker, tau, &params);
            let better = match &best {
                None => true,
                Some((best_risk, best_load, best_id)) => {
                    risk.total_cmp(best_risk)
                        .then_with(|| worker.load.total_cmp(best_load))
                        .then_with(|| worker.id.cmp(best_id))
                        == Ordering::Less
                }
            };
            if better {
                best = Some((risk, worker.load, &worker.id));
            }
        }

        match best {
            Some((risk, load, id)) => {
                debug!(task = %task.id, worker = %id, risk, load, "placement chosen");
                Some(id.clone())
            }
            None => {
                debug!(task = %task.id, "no feasible worker");
                None
            }
        }
    }
}
