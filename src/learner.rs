//! Offline parameter learning
//!
//! On a fixed cadence (and on demand) the learner joins recent completions
//! with their assignments and worker capacities, refits the three learned
//! bundles, and publishes them as one atomic snapshot:
//!
//! - theta: ridge-regularized least squares of the normalized runtime
//!   inflation `actual / tau(type) - 1` on the four demand ratios, floored
//!   at zero so pressure never discounts a prediction.
//! - affinity: per (worker, type) mean of `(tau - actual) / tau`, clipped;
//!   workers that consistently beat the estimate attract their workload.
//! - penalty: per worker, a blend of failure rate and SLA-miss rate.
//!
//! A run that errors or overruns its deadline leaves the prior snapshot
//! installed; the dispatch path never waits on the learner.

use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::LearnerConfig;
use crate::error::SchedResult;
use crate::estimator::RuntimeEstimator;
use crate::history::HistoryStore;
use crate::params::{ParameterSet, ParameterStore};
use crate::task::{CompletionStatus, ResourceVec, TaskType};
use crate::worker::{WorkerId, WorkerRegistry};

/// One completion joined with its assignment and worker capacity
#[derive(Debug, Clone)]
pub struct CompletionSample {
    pub task_type: TaskType,
    pub worker_id: WorkerId,
    /// Observed runtime in seconds
    pub actual_runtime: f64,
    /// Demand ratios of the request against the assigned worker's capacity
    pub ratios: ResourceVec,
    pub load_at_start: f64,
    pub sla_success: bool,
    pub failed: bool,
}

/// Batch learner feeding the parameter store
pub struct Learner {
    estimator: Arc<RuntimeEstimator>,
    params: Arc<ParameterStore>,
    history: Arc<dyn HistoryStore>,
    registry: Arc<WorkerRegistry>,
    config: LearnerConfig,
    /// Same division guard the risk model uses, so the fitted features
    /// match the features the scheduler scores with
    ratio_epsilon: f64,
}

impl Learner {
    pub fn new(
        estimator: Arc<RuntimeEstimator>,
        params: Arc<ParameterStore>,
        history: Arc<dyn HistoryStore>,
        registry: Arc<WorkerRegistry>,
        config: LearnerConfig,
        ratio_epsilon: f64,
    ) -> Self {
        Self {
            estimator,
            params,
            history,
            registry,
            config,
            ratio_epsilon,
        }
    }

    /// Join the recent completion window into learner samples
    ///
    /// Completions whose assignment or worker record is gone are skipped;
    /// non-positive runtimes carry no signal and are skipped too.
    pub fn collect_samples(&self) -> Vec<CompletionSample> {
        let completions = self.history.recent_completions(self.config.sample_window);
        let mut samples = Vec::with_capacity(completions.len());

        for completion in completions {
            let Some(task) = self.history.task(&completion.task_id) else {
                continue;
            };
            let Some(assignment) = self.history.assignment(&completion.task_id) else {
                continue;
            };
            let Some(capacity) = self.registry.capacity(&assignment.worker_id) else {
                continue;
            };
            let actual = completion.actual_runtime();
            if !actual.is_finite() || actual <= 0.0 {
                continue;
            }
            samples.push(CompletionSample {
                task_type: task.task_type,
                worker_id: assignment.worker_id,
                actual_runtime: actual,
                ratios: task.resources.ratios(&capacity, self.ratio_epsilon),
                load_at_start: assignment.load_at_start,
                sla_success: completion.sla_success,
                failed: completion.status == CompletionStatus::Failed,
            });
        }
        samples
    }

    /// One learning pass; returns whether a snapshot was published
    pub fn run_once(&self) -> SchedResult<bool> {
        self.run_bounded(None)
    }

    /// One learning pass with a cooperative cutoff
    ///
    /// The cutoff is re-checked before the install: a run that overran its
    /// deadline publishes nothing, so it can never clobber a snapshot that
    /// a later on-time run already installed.
    fn run_bounded(&self, cutoff: Option<Instant>) -> SchedResult<bool> {
        let samples = self.collect_samples();
        if samples.len() < self.config.min_samples {
            debug!(
                samples = samples.len(),
                min = self.config.min_samples,
                "not enough samples, keeping prior snapshot"
            );
            return Ok(false);
        }
        if self.past_cutoff(cutoff) {
            return Ok(false);
        }

        let tau = self.estimator.snapshot();
        let current = self.params.current();

        let theta = self
            .fit_theta(&samples, &tau)
            .unwrap_or_else(|| {
                debug!("theta system degenerate, keeping current theta");
                current.theta
            });
        let affinity = self.fit_affinity(&samples, &tau);
        let penalty = self.fit_penalty(&samples);

        // Final check before publication.
        if self.past_cutoff(cutoff) {
            return Ok(false);
        }
        self.params.install(ParameterSet {
            theta,
            affinity,
            penalty,
        });
        counter!("risksched_learner_publishes_total").increment(1);
        info!(samples = samples.len(), "learner published new parameters");
        Ok(true)
    }

    fn past_cutoff(&self, cutoff: Option<Instant>) -> bool {
        match cutoff {
            Some(cutoff) if Instant::now() >= cutoff => {
                warn!("learner run exceeded its deadline, prior snapshot retained");
                counter!("risksched_learner_failures_total").increment(1);
                true
            }
            _ => false,
        }
    }

    /// Ridge regression of runtime inflation on demand ratios
    ///
    /// Solves the 4x4 normal equations `(X'X + lambda I) theta = X'y`
    /// directly; `None` when the pivot collapses (all-zero features).
    fn fit_theta(
        &self,
        samples: &[CompletionSample],
        tau: &HashMap<TaskType, f64>,
    ) -> Option<ResourceVec> {
        let mut xtx = [[0.0f64; 4]; 4];
        let mut xty = [0.0f64; 4];

        for sample in samples {
            let tau_t = tau
                .get(&sample.task_type)
                .copied()
                .unwrap_or_else(|| sample.task_type.default_runtime());
            let y = sample.actual_runtime / tau_t - 1.0;
            let x = [
                sample.ratios.cpu,
                sample.ratios.mem,
                sample.ratios.storage,
                sample.ratios.gpu,
            ];
            for i in 0..4 {
                xty[i] += x[i] * y;
                for j in 0..4 {
                    xtx[i][j] += x[i] * x[j];
                }
            }
        }
        for (i, row) in xtx.iter_mut().enumerate() {
            row[i] += self.config.ridge_lambda;
        }

        let theta = solve4(xtx, xty)?;
        Some(ResourceVec::new(theta[0], theta[1], theta[2], theta[3]).floor_at(0.0))
    }

    /// Mean runtime residual per (worker, type) group with enough samples
    fn fit_affinity(
        &self,
        samples: &[CompletionSample],
        tau: &HashMap<TaskType, f64>,
    ) -> HashMap<WorkerId, HashMap<TaskType, f64>> {
        let mut groups: HashMap<(WorkerId, TaskType), Vec<f64>> = HashMap::new();
        for sample in samples {
            let tau_t = tau
                .get(&sample.task_type)
                .copied()
                .unwrap_or_else(|| sample.task_type.default_runtime());
            let residual = (tau_t - sample.actual_runtime) / tau_t;
            groups
                .entry((sample.worker_id.clone(), sample.task_type))
                .or_default()
                .push(residual);
        }

        let clip = self.config.affinity_clip;
        let mut affinity: HashMap<WorkerId, HashMap<TaskType, f64>> = HashMap::new();
        for ((worker, task_type), residuals) in groups {
            if residuals.len() < self.config.min_samples {
                continue;
            }
            let mean = residuals.iter().sum::<f64>() / residuals.len() as f64;
            affinity
                .entry(worker)
                .or_default()
                .insert(task_type, mean.clamp(-clip, clip));
        }
        affinity
    }

    /// Blend of failure rate and SLA-miss rate per worker
    fn fit_penalty(&self, samples: &[CompletionSample]) -> HashMap<WorkerId, f64> {
        struct Counts {
            total: usize,
            failed: usize,
            slow: usize,
        }
        let mut by_worker: HashMap<WorkerId, Counts> = HashMap::new();
        for sample in samples {
            let counts = by_worker.entry(sample.worker_id.clone()).or_insert(Counts {
                total: 0,
                failed: 0,
                slow: 0,
            });
            counts.total += 1;
            if sample.failed {
                counts.failed += 1;
            }
            if !sample.sla_success {
                counts.slow += 1;
            }
        }

        let gamma = self.config.gamma;
        by_worker
            .into_iter()
            .map(|(worker, c)| {
                let failure_rate = c.failed as f64 / c.total as f64;
                let slow_rate = c.slow as f64 / c.total as f64;
                (worker, gamma * failure_rate + (1.0 - gamma) * slow_rate)
            })
            .collect()
    }

    /// Cadenced loop; each run is bounded by the configured deadline
    ///
    /// The deadline is enforced inside the run itself (see `run_bounded`):
    /// aborting a blocking task from outside would leave it running to
    /// completion and installing a stale snapshot behind our back.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the first learning
        // pass happens one full interval after startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let learner = Arc::clone(&self);
            let cutoff = Instant::now() + Duration::from_secs(self.config.run_deadline_secs);
            let run = tokio::task::spawn_blocking(move || learner.run_bounded(Some(cutoff)));

            match run.await {
                Ok(Ok(published)) => {
                    debug!(published, "learner run finished");
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "learner run failed, prior snapshot retained");
                    counter!("risksched_learner_failures_total").increment(1);
                }
                Err(join_err) => {
                    warn!(error = %join_err, "learner task panicked, prior snapshot retained");
                    counter!("risksched_learner_failures_total").increment(1);
                }
            }
        }
    }
}

/// Gaussian elimination with partial pivoting for a 4x4 system
fn solve4(mut a: [[f64; 4]; 4], mut b: [f64; 4]) -> Option<[f64; 4]> {
    const TINY: f64 = 1e-12;

    for col in 0..4 {
        let pivot_row = (col..4).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot_row][col].abs() < TINY {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..4 {
            let factor = a[row][col] / a[col][col];
            for k in col..4 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; 4];
    for row in (0..4).rev() {
        let mut sum = b[row];
        for k in (row + 1)..4 {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}
