//! Engine wiring
//!
//! Builds the shared stores, connects the ready queue to the dispatch loop,
//! and puts the learner on its cadence. The engine is the one place that
//! owns `Arc`s to everything; the components themselves only know their
//! direct collaborators.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::SchedulerConfig;
use crate::dispatch::{DispatchLoop, DispatchTransport};
use crate::error::SchedResult;
use crate::estimator::RuntimeEstimator;
use crate::history::{HistoryStore, InMemoryHistory};
use crate::ingest::{CompletionIngest, SubmissionGate};
use crate::learner::Learner;
use crate::params::ParameterStore;
use crate::queue::ready_queue;
use crate::risk::RiskModel;
use crate::scheduler::{RiskScheduler, Scheduler};
use crate::task::{CompletionStatus, TaskId, TaskSubmission};
use crate::worker::WorkerRegistry;

/// A running scheduler: stores, gate, loops
///
/// Must be started inside a tokio runtime; `start` spawns the dispatch loop
/// and the learner.
pub struct SchedulerEngine {
    estimator: Arc<RuntimeEstimator>,
    params: Arc<ParameterStore>,
    registry: Arc<WorkerRegistry>,
    history: Arc<dyn HistoryStore>,
    gate: SubmissionGate,
    completions: CompletionIngest,
    learner: Arc<Learner>,
    dispatch_handle: JoinHandle<()>,
    learner_handle: JoinHandle<()>,
}

impl SchedulerEngine {
    /// Start with the risk-based scheduler and an in-memory history store
    pub fn start(config: SchedulerConfig, transport: Arc<dyn DispatchTransport>) -> Self {
        let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistory::new());
        Self::start_with(config, transport, history, None)
    }

    /// Start with an injected history store and optional placement strategy
    ///
    /// `scheduler` defaults to the risk-based implementation; pass the
    /// round-robin baseline for comparison runs.
    pub fn start_with(
        config: SchedulerConfig,
        transport: Arc<dyn DispatchTransport>,
        history: Arc<dyn HistoryStore>,
        scheduler: Option<Arc<dyn Scheduler>>,
    ) -> Self {
        let estimator = Arc::new(RuntimeEstimator::new(&config.estimator));
        let params = Arc::new(ParameterStore::new());
        let registry = Arc::new(WorkerRegistry::new());
        let (queue, rx) = ready_queue();

        let scheduler = scheduler.unwrap_or_else(|| {
            Arc::new(RiskScheduler::new(
                estimator.clone(),
                params.clone(),
                RiskModel::new(config.risk.clone()),
            ))
        });

        let gate = SubmissionGate::new(estimator.clone(), history.clone(), queue.clone());
        let completions = CompletionIngest::new(estimator.clone(), history.clone());

        let dispatch = DispatchLoop::new(
            rx,
            queue,
            scheduler,
            registry.clone(),
            history.clone(),
            transport,
            config.dispatch.clone(),
        );
        let dispatch_handle = tokio::spawn(dispatch.run());

        let learner = Arc::new(Learner::new(
            estimator.clone(),
            params.clone(),
            history.clone(),
            registry.clone(),
            config.learner.clone(),
            config.risk.epsilon,
        ));
        let learner_handle = tokio::spawn(Arc::clone(&learner).run());

        info!("scheduler engine started");
        Self {
            estimator,
            params,
            registry,
            history,
            gate,
            completions,
            learner,
            dispatch_handle,
            learner_handle,
        }
    }

    /// Admit a task for placement
    pub fn submit(&self, submission: TaskSubmission) -> SchedResult<TaskId> {
        self.gate.submit(submission)
    }

    /// Ingest one completion report from the worker runtime
    pub fn complete(
        &self,
        task_id: TaskId,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        status: CompletionStatus,
    ) -> SchedResult<()> {
        self.completions.ingest(task_id, started_at, completed_at, status)
    }

    /// Run one learning pass immediately, outside the cadence
    pub fn trigger_learner(&self) -> SchedResult<bool> {
        self.learner.run_once()
    }

    /// Worker registration and telemetry surface
    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn estimator(&self) -> &Arc<RuntimeEstimator> {
        &self.estimator
    }

    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Stop both loops; queued tasks are dropped
    pub fn shutdown(&self) {
        self.dispatch_handle.abort();
        self.learner_handle.abort();
        info!("scheduler engine stopped");
    }
}

impl Drop for SchedulerEngine {
    fn drop(&mut self) {
        self.dispatch_handle.abort();
        self.learner_handle.abort();
    }
}
