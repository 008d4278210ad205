//! Run metrics aggregation
//!
//! `RunMetrics` is the shared sink completing workers record into. Counters
//! are atomic and latency/check tallies sit behind short-lived mutexes, so
//! concurrent `record` calls never lose updates and never block the
//! dispatcher's timing loop for long. `snapshot()` is callable at any time,
//! including mid-run.

use crate::check::CheckResult;
use crate::iteration::{Iteration, IterationOutcome};
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Latency samples with percentile estimation.
#[derive(Debug, Default)]
pub struct LatencyStats {
    samples: Vec<Duration>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    pub fn record(&mut self, latency: Duration) {
        self.samples.push(latency);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Calculate percentile (0-100)
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort();

        let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    pub fn p50(&self) -> Option<Duration> {
        self.percentile(50.0)
    }

    pub fn p90(&self) -> Option<Duration> {
        self.percentile(90.0)
    }

    pub fn p99(&self) -> Option<Duration> {
        self.percentile(99.0)
    }

    pub fn min(&self) -> Option<Duration> {
        self.samples.iter().min().copied()
    }

    pub fn max(&self) -> Option<Duration> {
        self.samples.iter().max().copied()
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<Duration>() / self.samples.len() as u32)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct CheckTally {
    passed: u64,
    total: u64,
}

/// Pass/total tally for one named check across the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passed: u64,
    pub total: u64,
}

impl CheckSummary {
    /// Pass rate as a fraction (0.0 to 1.0)
    pub fn pass_rate(&self) -> f64 {
        if self.total > 0 {
            self.passed as f64 / self.total as f64
        } else {
            0.0
        }
    }
}

/// Running aggregate for one run, safe for concurrent mutation.
#[derive(Debug, Default)]
pub struct RunMetrics {
    scheduled: AtomicU64,
    started: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    errored: AtomicU64,
    timed_out: AtomicU64,
    latencies: Mutex<LatencyStats>,
    checks: Mutex<HashMap<String, CheckTally>>,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// One instant was considered by the scheduler.
    pub fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        counter!("surge_iterations_scheduled_total").increment(1);
    }

    /// A worker picked the instant up.
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        counter!("surge_iterations_started_total").increment(1);
    }

    /// No worker was available; the instant is skipped, never queued.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
        counter!("surge_iterations_dropped_total").increment(1);
    }

    /// Record a finished execution attempt together with its check results.
    pub fn record_iteration(&self, iteration: &Iteration) {
        match iteration.outcome {
            IterationOutcome::Completed => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                counter!("surge_iterations_completed_total").increment(1);
            }
            IterationOutcome::Errored => {
                self.errored.fetch_add(1, Ordering::SeqCst);
                counter!("surge_iterations_errored_total").increment(1);
            }
            IterationOutcome::TimedOut => {
                self.timed_out.fetch_add(1, Ordering::SeqCst);
                counter!("surge_iterations_timed_out_total").increment(1);
            }
        }

        if let Some(response) = &iteration.response {
            histogram!("surge_iteration_latency_seconds").record(response.latency.as_secs_f64());
            let mut latencies = self.latencies.lock().unwrap();
            latencies.record(response.latency);
        }

        if !iteration.checks.is_empty() {
            self.record_checks(&iteration.checks);
        }
    }

    fn record_checks(&self, results: &[CheckResult]) {
        let mut checks = self.checks.lock().unwrap();
        for result in results {
            let tally = checks.entry(result.name.clone()).or_default();
            tally.total += 1;
            if result.passed {
                tally.passed += 1;
            }
        }
    }

    /// Consistent point-in-time copy of the aggregate.
    ///
    /// Outcome counters are read before `scheduled`, so a mid-run snapshot
    /// always satisfies `scheduled >= started + dropped` and successive
    /// snapshots never show a count decreasing.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let completed = self.completed.load(Ordering::SeqCst);
        let errored = self.errored.load(Ordering::SeqCst);
        let timed_out = self.timed_out.load(Ordering::SeqCst);
        let dropped = self.dropped.load(Ordering::SeqCst);
        let started = self.started.load(Ordering::SeqCst);
        let scheduled = self.scheduled.load(Ordering::SeqCst);

        let latencies = self.latencies.lock().unwrap();
        let latency = LatencySnapshot {
            samples: latencies.len() as u64,
            min: latencies.min(),
            max: latencies.max(),
            mean: latencies.mean(),
            p50: latencies.p50(),
            p90: latencies.p90(),
            p95: latencies.percentile(95.0),
            p99: latencies.p99(),
        };
        drop(latencies);

        let mut checks: Vec<CheckSummary> = self
            .checks
            .lock()
            .unwrap()
            .iter()
            .map(|(name, tally)| CheckSummary {
                name: name.clone(),
                passed: tally.passed,
                total: tally.total,
            })
            .collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));

        MetricsSnapshot {
            scheduled,
            started,
            dropped,
            completed,
            errored,
            timed_out,
            latency,
            checks,
        }
    }
}

/// Latency distribution at snapshot time.
#[derive(Debug, Clone, Default)]
pub struct LatencySnapshot {
    pub samples: u64,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    pub mean: Option<Duration>,
    pub p50: Option<Duration>,
    pub p90: Option<Duration>,
    pub p95: Option<Duration>,
    pub p99: Option<Duration>,
}

/// Frozen view of the run counters.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub scheduled: u64,
    pub started: u64,
    pub dropped: u64,
    pub completed: u64,
    pub errored: u64,
    pub timed_out: u64,
    pub latency: LatencySnapshot,
    pub checks: Vec<CheckSummary>,
}

impl MetricsSnapshot {
    pub fn check(&self, name: &str) -> Option<&CheckSummary> {
        self.checks.iter().find(|c| c.name == name)
    }
}
