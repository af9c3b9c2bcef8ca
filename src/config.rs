//! Scheduler configuration
//!
//! Plain serde-deserializable sections with defaults holding the documented
//! constants. Everything tunable lives here: the risk constants, the EMA
//! smoothing factor, backoff and retry policy, and the learner cadence.

use serde::{Deserialize, Serialize};

/// Runtime-estimator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// EMA smoothing factor in [0, 1]
    pub lambda: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self { lambda: 0.2 }
    }
}

/// Constants of the risk function (not learned)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Weight on predicted lateness
    pub alpha: f64,
    /// Weight on current worker load
    pub beta: f64,
    /// Division guard for capacity-zero resource dimensions
    pub epsilon: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.5,
            epsilon: 1e-9,
        }
    }
}

/// Dispatch loop policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Transport call timeout in milliseconds
    pub transport_timeout_ms: u64,
    /// First re-queue delay in milliseconds
    pub backoff_base_ms: u64,
    /// Re-queue delay cap in milliseconds
    pub backoff_cap_ms: u64,
    /// Jitter fraction applied to each delay (0.2 = ±20%)
    pub backoff_jitter: f64,
    /// Re-queue attempts before a task is marked failed
    pub max_retries: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            transport_timeout_ms: 1_000,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 30_000,
            backoff_jitter: 0.2,
            max_retries: 5,
        }
    }
}

/// Offline learner cadence and fitting thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Seconds between scheduled runs
    pub interval_secs: u64,
    /// Deadline for one run; past it the run aborts and the prior snapshot
    /// stays installed
    pub run_deadline_secs: u64,
    /// Minimum joined samples for a run, and per-(worker, type) group for
    /// an affinity entry
    pub min_samples: usize,
    /// Ridge regularization strength for the theta fit
    pub ridge_lambda: f64,
    /// Blend between failure rate and slow rate in the penalty
    pub gamma: f64,
    /// Affinity residual means are clipped to ±this bound
    pub affinity_clip: f64,
    /// Most recent completions joined per run
    pub sample_window: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            run_deadline_secs: 60,
            min_samples: 5,
            ridge_lambda: 0.1,
            gamma: 0.5,
            affinity_clip: 10.0,
            sample_window: 512,
        }
    }
}

/// Aggregate configuration for the scheduler engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub estimator: EstimatorConfig,
    pub risk: RiskConfig,
    pub dispatch: DispatchConfig,
    pub learner: LearnerConfig,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = SchedulerConfig::default();
        assert_eq!(config.estimator.lambda, 0.2);
        assert_eq!(config.risk.alpha, 1.0);
        assert_eq!(config.risk.beta, 0.5);
        assert_eq!(config.dispatch.backoff_base_ms, 1_000);
        assert_eq!(config.dispatch.backoff_cap_ms, 30_000);
        assert_eq!(config.dispatch.max_retries, 5);
        assert_eq!(config.learner.gamma, 0.5);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"risk": {"alpha": 2.0, "beta": 0.1, "epsilon": 1e-9}}"#)
                .unwrap();
        assert_eq!(config.risk.alpha, 2.0);
        assert_eq!(config.estimator.lambda, 0.2);
    }
}
