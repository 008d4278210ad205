//! Dispatch loop: the run's single timing authority
//!
//! The dispatcher sleeps to each arrival instant (constant mode) or ticks
//! against the interpolated concurrency target (staged mode), acquires a
//! worker for each instant and spawns the iteration body on it. An instant
//! with no worker available is dropped and counted, never queued: queueing
//! would corrupt the arrival-rate guarantee. The loop itself never does
//! request I/O; all of that happens on worker tasks.

use crate::check::CheckSet;
use crate::config::{Executor, ScenarioConfig};
use crate::engine::pool::{Worker, WorkerPool};
use crate::engine::schedule::{ArrivalSchedule, RampSchedule};
use crate::iteration::{Iteration, IterationBody};
use crate::metrics::RunMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a spawned iteration task needs, shared once per run.
struct IterationEnv {
    pool: Arc<WorkerPool>,
    metrics: Arc<RunMetrics>,
    body: Arc<dyn IterationBody>,
    checks: CheckSet,
    per_iteration_timeout: Option<Duration>,
}

pub(crate) struct Dispatcher {
    env: Arc<IterationEnv>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(
        pool: Arc<WorkerPool>,
        metrics: Arc<RunMetrics>,
        body: Arc<dyn IterationBody>,
        checks: CheckSet,
        per_iteration_timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            env: Arc::new(IterationEnv {
                pool,
                metrics,
                body,
                checks,
                per_iteration_timeout,
            }),
            cancel,
        }
    }

    /// Drive the configured load profile to its end, then drain in-flight
    /// iterations. In-flight work crossing the run boundary is allowed to
    /// finish and is counted; nothing new starts past the boundary.
    pub(crate) async fn run(&self, config: &ScenarioConfig) {
        let start = Instant::now();
        let mut inflight = JoinSet::new();

        match config.executor() {
            Executor::ConstantArrivalRate {
                rate_per_second,
                duration,
                ..
            } => {
                let schedule = ArrivalSchedule::new(*rate_per_second, *duration);
                self.run_constant(&schedule, start, &mut inflight).await;
            }
            Executor::Staged {
                stages,
                interpolation,
                ..
            } => {
                let schedule = RampSchedule::new(stages.clone(), *interpolation);
                self.run_staged(&schedule, config.tick_interval(), start, &mut inflight)
                    .await;
            }
        }

        self.drain(inflight).await;
    }

    async fn run_constant(
        &self,
        schedule: &ArrivalSchedule,
        start: Instant,
        inflight: &mut JoinSet<()>,
    ) {
        let mut index = 0u64;
        while let Some(at) = schedule.arrival(index) {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(scheduled = index, "run cancelled");
                    return;
                }
                _ = sleep_until(start + at) => {}
            }

            self.dispatch_one(at, start.elapsed(), inflight);
            index += 1;

            // reap finished tasks so the set stays small on long runs
            while inflight.try_join_next().is_some() {}
        }
    }

    async fn run_staged(
        &self,
        schedule: &RampSchedule,
        tick_interval: Duration,
        start: Instant,
        inflight: &mut JoinSet<()>,
    ) {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_target = 0usize;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("run cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let elapsed = start.elapsed();
            let Some(target) = schedule.target_at(elapsed) else {
                break;
            };
            if target != last_target {
                debug!(?elapsed, target, "concurrency target moved");
                last_target = target;
            }

            // start the shortfall; excess active workers simply drain as
            // their iterations complete. A failed acquire means the target
            // exceeds the pool cap: record the drop and wait for the next
            // tick rather than hammering an exhausted pool.
            let active = self.env.pool.active();
            for _ in active..target {
                let now = start.elapsed();
                if !self.dispatch_one(now, now, inflight) {
                    break;
                }
            }

            while inflight.try_join_next().is_some() {}
        }
    }

    /// Consider one scheduled instant: acquire-or-drop, then hand the
    /// iteration to a worker task. Returns whether a worker picked it up.
    fn dispatch_one(
        &self,
        scheduled_at: Duration,
        started_at: Duration,
        inflight: &mut JoinSet<()>,
    ) -> bool {
        self.env.metrics.record_scheduled();
        match self.env.pool.acquire() {
            Some(worker) => {
                self.env.metrics.record_started();
                let env = self.env.clone();
                inflight.spawn(run_iteration(env, worker, scheduled_at, started_at));
                true
            }
            None => {
                self.env.metrics.record_dropped();
                false
            }
        }
    }

    async fn drain(&self, mut inflight: JoinSet<()>) {
        if inflight.is_empty() {
            return;
        }
        info!(
            in_flight = inflight.len(),
            "scheduling finished, draining in-flight iterations"
        );
        loop {
            tokio::select! {
                joined = inflight.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
                _ = self.cancel.cancelled() => {
                    // explicit cancellation cuts the drain short; aborted
                    // iterations are not recorded
                    warn!(
                        aborted = inflight.len(),
                        "cancelled during drain, aborting in-flight iterations"
                    );
                    inflight.shutdown().await;
                    break;
                }
            }
        }
    }
}

/// One iteration on one worker: run the body (under the per-iteration
/// timeout if configured), evaluate checks, release the worker, record.
async fn run_iteration(
    env: Arc<IterationEnv>,
    worker: Worker,
    scheduled_at: Duration,
    started_at: Duration,
) {
    let worker_id = worker.id();

    let outcome = match env.per_iteration_timeout {
        Some(limit) => timeout(limit, env.body.run(worker_id)).await.ok(),
        None => Some(env.body.run(worker_id).await),
    };

    let iteration = match outcome {
        Some(Ok(response)) => {
            let checks = env.checks.evaluate(Some(&response));
            Iteration::completed(scheduled_at, started_at, response, checks)
        }
        Some(Err(error)) => {
            debug!(worker = worker_id, %error, "iteration failed");
            let checks = env.checks.evaluate(None);
            Iteration::errored(scheduled_at, started_at, checks)
        }
        // deadline elapsed: the body future is dropped and the worker is
        // reclaimed; transport-level cancellation is the body's concern
        None => Iteration::timed_out(scheduled_at, started_at),
    };

    env.pool.release(worker);
    env.metrics.record_iteration(&iteration);
}
