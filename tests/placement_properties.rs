//! Placement properties of the risk scheduler
//!
//! Exercises the documented selection behavior against hand-built worker
//! snapshots: load steering, affinity and penalty effects, exact risk
//! arithmetic, determinism, and the optimality invariant that the chosen
//! worker's final risk is minimal among all feasible workers.

use std::sync::Arc;

use chrono::Utc;
use risksched::{
    ParameterSet, ParameterStore, ResourceVec, RiskModel, RiskScheduler, RoundRobinScheduler,
    RuntimeEstimator, Scheduler, Task, TaskId, TaskType, Worker, WorkerId, WorkerSnapshot,
};

fn rts() -> (Arc<RuntimeEstimator>, Arc<ParameterStore>, RiskScheduler) {
    let estimator = Arc::new(RuntimeEstimator::default());
    let params = Arc::new(ParameterStore::new());
    let scheduler = RiskScheduler::new(estimator.clone(), params.clone(), RiskModel::default());
    (estimator, params, scheduler)
}

fn task(task_type: TaskType, tau: f64, resources: ResourceVec) -> Task {
    let arrival = Utc::now();
    Task {
        id: TaskId::new("task"),
        task_type,
        resources,
        arrival_time: arrival,
        sla_multiplier: 2.0,
        tau,
        deadline: Task::deadline_for(arrival, 2.0, tau),
    }
}

fn worker(id: &str, load: f64, capacity: ResourceVec) -> Worker {
    let mut w = Worker::new(WorkerId::new(id), capacity);
    w.load = load;
    w
}

fn std_cap() -> ResourceVec {
    ResourceVec::new(8.0, 16.0, 100.0, 1.0)
}

#[test]
fn load_steering_prefers_idle_worker() {
    let (estimator, _, scheduler) = rts();
    estimator.set(TaskType::CpuLight, 5.0).unwrap();

    let snapshot = WorkerSnapshot::from_workers(vec![
        worker("w1", 0.95, std_cap()),
        worker("w2", 0.10, std_cap()),
    ]);
    let t = task(TaskType::CpuLight, 5.0, ResourceVec::new(1.0, 1.0, 0.0, 0.0));

    assert_eq!(scheduler.choose(&t, &snapshot), Some(WorkerId::new("w2")));
}

#[test]
fn affinity_outweighs_load_difference() {
    let (_, params, scheduler) = rts();
    let mut set = ParameterSet::default();
    set.affinity
        .entry(WorkerId::new("w2"))
        .or_default()
        .insert(TaskType::GpuTraining, 10.0);
    params.install(set);

    let snapshot = WorkerSnapshot::from_workers(vec![
        worker("w1", 0.10, std_cap()),
        worker("w2", 0.40, std_cap()),
    ]);
    let t = task(
        TaskType::GpuTraining,
        60.0,
        ResourceVec::new(1.0, 1.0, 0.0, 1.0),
    );

    assert_eq!(scheduler.choose(&t, &snapshot), Some(WorkerId::new("w2")));
}

#[test]
fn penalty_steers_away_from_unreliable_specs() {
    let (_, params, scheduler) = rts();
    let mut set = ParameterSet::default();
    set.penalty.insert(WorkerId::new("w1"), 15.0);
    params.install(set);

    // w1 has the better specs but a failure history; w2 is adequate.
    let snapshot = WorkerSnapshot::from_workers(vec![
        worker("w1", 0.30, ResourceVec::new(64.0, 256.0, 1_000.0, 8.0)),
        worker("w2", 0.30, std_cap()),
    ]);
    let t = task(TaskType::CpuHeavy, 15.0, ResourceVec::new(4.0, 8.0, 0.0, 0.0));

    assert_eq!(scheduler.choose(&t, &snapshot), Some(WorkerId::new("w2")));
}

#[test]
fn documented_risk_arithmetic_is_reproduced() {
    // tau=10, req=(4,8), cap=(8,16), theta=(1,1,0,0), load=0.5, k=2:
    // E_hat = 20, deadline slack = 20, delta = 0, R_final = 0.25.
    let t = task(TaskType::Mixed, 10.0, ResourceVec::new(4.0, 8.0, 0.0, 0.0));
    let w = worker("w1", 0.5, ResourceVec::new(8.0, 16.0, 0.0, 0.0));
    let params = ParameterSet {
        theta: ResourceVec::new(1.0, 1.0, 0.0, 0.0),
        ..ParameterSet::default()
    };

    let model = RiskModel::default();
    let risk = model.final_risk(&t, &w, 10.0, &params);
    assert!((risk - 0.25).abs() < 1e-12, "expected 0.25, got {risk}");
}

#[test]
fn chosen_worker_minimizes_final_risk() {
    let (estimator, params, scheduler) = rts();
    estimator.set(TaskType::Mixed, 10.0).unwrap();

    let mut set = ParameterSet {
        theta: ResourceVec::new(0.8, 0.3, 0.1, 0.0),
        ..ParameterSet::default()
    };
    set.affinity
        .entry(WorkerId::new("w2"))
        .or_default()
        .insert(TaskType::Mixed, 0.2);
    set.penalty.insert(WorkerId::new("w3"), 0.4);
    params.install(set.clone());

    let workers = vec![
        worker("w1", 0.55, ResourceVec::new(8.0, 16.0, 100.0, 1.0)),
        worker("w2", 0.70, ResourceVec::new(4.0, 8.0, 50.0, 1.0)),
        worker("w3", 0.05, ResourceVec::new(16.0, 32.0, 200.0, 2.0)),
        worker("w4", 0.35, ResourceVec::new(8.0, 32.0, 100.0, 1.0)),
    ];
    let snapshot = WorkerSnapshot::from_workers(workers.clone());
    let t = task(TaskType::Mixed, 10.0, ResourceVec::new(2.0, 4.0, 10.0, 0.0));

    let chosen = scheduler.choose(&t, &snapshot).unwrap();

    let model = RiskModel::default();
    let chosen_risk = workers
        .iter()
        .find(|w| w.id == chosen)
        .map(|w| model.final_risk(&t, w, 10.0, &set))
        .unwrap();
    for w in &workers {
        if w.capacity.dominates(&t.resources) {
            let risk = model.final_risk(&t, w, 10.0, &set);
            assert!(
                chosen_risk <= risk,
                "{} (risk {risk}) beats chosen {chosen} (risk {chosen_risk})",
                w.id
            );
        }
    }
}

#[test]
fn selection_is_deterministic() {
    let (_, _, scheduler) = rts();
    let snapshot = WorkerSnapshot::from_workers(vec![
        worker("delta", 0.31, std_cap()),
        worker("alpha", 0.62, std_cap()),
        worker("gamma", 0.31, std_cap()),
        worker("beta", 0.44, std_cap()),
    ]);
    let t = task(TaskType::CpuLight, 5.0, ResourceVec::new(1.0, 1.0, 0.0, 0.0));

    let first = scheduler.choose(&t, &snapshot);
    for _ in 0..20 {
        assert_eq!(scheduler.choose(&t, &snapshot), first);
    }
    // Equal lowest load on delta and gamma: the lexicographically smaller
    // id wins.
    assert_eq!(first, Some(WorkerId::new("delta")));
}

#[test]
fn infeasible_requests_leave_no_choice() {
    let (_, _, scheduler) = rts();
    let snapshot = WorkerSnapshot::from_workers(vec![worker("w1", 0.1, std_cap())]);

    // GPU demand exceeds every capacity.
    let t = task(
        TaskType::GpuTraining,
        60.0,
        ResourceVec::new(1.0, 1.0, 0.0, 4.0),
    );
    assert_eq!(scheduler.choose(&t, &snapshot), None);
}

#[test]
fn round_robin_alternates_where_risk_scheduler_steers() {
    let (_, _, rts) = rts();
    let rr = RoundRobinScheduler::new();

    let snapshot = WorkerSnapshot::from_workers(vec![
        worker("w1", 0.05, std_cap()),
        worker("w2", 0.95, std_cap()),
    ]);
    let t = task(TaskType::CpuLight, 5.0, ResourceVec::new(1.0, 1.0, 0.0, 0.0));

    // The baseline spreads two successive tasks across both workers; the
    // risk scheduler keeps both on the idle one.
    assert_eq!(rr.choose(&t, &snapshot), Some(WorkerId::new("w1")));
    assert_eq!(rr.choose(&t, &snapshot), Some(WorkerId::new("w2")));

    assert_eq!(rts.choose(&t, &snapshot), Some(WorkerId::new("w1")));
    assert_eq!(rts.choose(&t, &snapshot), Some(WorkerId::new("w1")));
}

#[test]
fn snapshot_swap_is_all_or_nothing() {
    let (_, params, scheduler) = rts();

    let snapshot = WorkerSnapshot::from_workers(vec![
        worker("w1", 0.10, std_cap()),
        worker("w2", 0.40, std_cap()),
    ]);
    let t = task(
        TaskType::GpuInference,
        10.0,
        ResourceVec::new(1.0, 1.0, 0.0, 1.0),
    );

    // Old parameters: load decides, w1 wins.
    assert_eq!(scheduler.choose(&t, &snapshot), Some(WorkerId::new("w1")));

    // Publish affinity that makes w2 strictly better.
    let mut set = ParameterSet::default();
    set.affinity
        .entry(WorkerId::new("w2"))
        .or_default()
        .insert(TaskType::GpuInference, 5.0);
    params.install(set);

    // Every later decision sees the complete new bundle.
    assert_eq!(scheduler.choose(&t, &snapshot), Some(WorkerId::new("w2")));
}
