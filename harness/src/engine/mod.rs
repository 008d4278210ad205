//! Workload scheduling and execution engine
//!
//! The engine decouples *when* an iteration is issued (the schedule) from
//! *how many* concurrent workers exist (the pool). A `RunContext` owns one
//! run's pool and metrics; there is no process-wide state, so multiple
//! isolated runs can execute concurrently in one process.

pub mod pool;
pub mod schedule;

mod dispatch;

use crate::check::CheckSet;
use crate::config::ScenarioConfig;
use crate::iteration::IterationBody;
use crate::metrics::RunMetrics;
use crate::report::RunSummary;
use dispatch::Dispatcher;
use pool::WorkerPool;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What to run: the user-supplied unit of work plus the predicates to
/// evaluate against every completed iteration.
#[derive(Clone)]
pub struct Scenario {
    body: Arc<dyn IterationBody>,
    checks: CheckSet,
}

impl Scenario {
    pub fn new(body: Arc<dyn IterationBody>, checks: CheckSet) -> Self {
        Self { body, checks }
    }
}

/// Shared state for one run: the worker pool and the metrics aggregate.
pub struct RunContext {
    config: ScenarioConfig,
    pool: Arc<WorkerPool>,
    metrics: Arc<RunMetrics>,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(config: ScenarioConfig) -> Self {
        let pool = Arc::new(WorkerPool::new(
            config.preallocated_workers(),
            config.max_workers(),
        ));
        Self {
            config,
            pool,
            metrics: Arc::new(RunMetrics::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the scheduling loop when cancelled. In-flight
    /// iterations are aborted if cancellation arrives during the drain.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Handle for mid-run snapshots while `run` is in progress.
    pub fn metrics(&self) -> Arc<RunMetrics> {
        self.metrics.clone()
    }

    /// Execute the scenario to completion and freeze the summary.
    ///
    /// Per-iteration failures (drops, timeouts, body errors) are recorded
    /// and never abort the run; only construction-time configuration errors
    /// are fatal, and those cannot reach this point.
    pub async fn run(self, scenario: Scenario) -> RunSummary {
        info!(
            executor = ?self.config.executor(),
            max_workers = self.config.max_workers(),
            "starting run"
        );
        let started = Instant::now();

        let dispatcher = Dispatcher::new(
            self.pool.clone(),
            self.metrics.clone(),
            scenario.body,
            scenario.checks,
            self.config.per_iteration_timeout(),
            self.cancel.clone(),
        );
        dispatcher.run(&self.config).await;

        let snapshot = self.metrics.snapshot();
        info!(
            scheduled = snapshot.scheduled,
            completed = snapshot.completed,
            dropped = snapshot.dropped,
            workers = self.pool.created(),
            "run complete"
        );
        RunSummary::new(snapshot, started.elapsed())
    }
}

/// One-shot convenience: build a context and run the scenario on it.
pub async fn run_scenario(config: ScenarioConfig, scenario: Scenario) -> RunSummary {
    RunContext::new(config).run(scenario).await
}
