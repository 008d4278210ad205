//! Run summary reporting
//!
//! Formatting stays a thin layer over `MetricsSnapshot`: a human-readable
//! table for the terminal and a single JSON value for CI parsing.

use crate::metrics::MetricsSnapshot;
use serde_json::{Value, json};
use std::time::Duration;

/// Frozen result of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub metrics: MetricsSnapshot,
    /// Wall-clock time from run start to the end of the drain.
    pub wall_time: Duration,
}

impl RunSummary {
    pub fn new(metrics: MetricsSnapshot, wall_time: Duration) -> Self {
        Self { metrics, wall_time }
    }

    /// Completed iterations per second of wall time.
    pub fn throughput(&self) -> f64 {
        if self.wall_time.as_secs_f64() > 0.0 {
            self.metrics.completed as f64 / self.wall_time.as_secs_f64()
        } else {
            0.0
        }
    }

    /// True when every check passed for every iteration it was evaluated on.
    pub fn all_checks_passed(&self) -> bool {
        self.metrics.checks.iter().all(|c| c.passed == c.total)
    }

    pub fn print_summary(&self) {
        let m = &self.metrics;
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!(" RUN COMPLETE ({:.1}s)", self.wall_time.as_secs_f64());
        println!("═══════════════════════════════════════════════════════════════");
        println!();
        println!(
            "   Iterations:  scheduled {} | started {} | dropped {}",
            m.scheduled, m.started, m.dropped
        );
        println!(
            "                completed {} | errored {} | timed out {}",
            m.completed, m.errored, m.timed_out
        );
        println!("   Throughput:  {:.1} iter/s", self.throughput());
        println!(
            "   Latency:     p50 {} | p90 {} | p95 {} | p99 {} | max {}",
            format_latency(m.latency.p50),
            format_latency(m.latency.p90),
            format_latency(m.latency.p95),
            format_latency(m.latency.p99),
            format_latency(m.latency.max),
        );

        if !m.checks.is_empty() {
            println!();
            println!(" ─── Checks ──────────────────────────────────────────────────");
            for check in &m.checks {
                println!(
                    "   {:40} {:>10}/{} ({:.1}%)",
                    check.name,
                    check.passed,
                    check.total,
                    check.pass_rate() * 100.0
                );
            }
        }

        println!();
        println!("═══════════════════════════════════════════════════════════════");
    }

    /// Single JSON value for CI parsing.
    pub fn to_json(&self) -> Value {
        let m = &self.metrics;
        json!({
            "wall_time_secs": self.wall_time.as_secs_f64(),
            "throughput": self.throughput(),
            "iterations": {
                "scheduled": m.scheduled,
                "started": m.started,
                "dropped": m.dropped,
                "completed": m.completed,
                "errored": m.errored,
                "timed_out": m.timed_out,
            },
            "latency_ms": {
                "p50": latency_ms(m.latency.p50),
                "p90": latency_ms(m.latency.p90),
                "p95": latency_ms(m.latency.p95),
                "p99": latency_ms(m.latency.p99),
                "mean": latency_ms(m.latency.mean),
                "max": latency_ms(m.latency.max),
            },
            "checks": m.checks.iter().map(|c| json!({
                "name": c.name,
                "passed": c.passed,
                "total": c.total,
                "pass_rate": c.pass_rate(),
            })).collect::<Vec<_>>(),
            "all_checks_passed": self.all_checks_passed(),
        })
    }
}

fn format_latency(latency: Option<Duration>) -> String {
    match latency {
        Some(d) => format!("{:.1}ms", d.as_secs_f64() * 1000.0),
        None => "n/a".to_string(),
    }
}

fn latency_ms(latency: Option<Duration>) -> Value {
    match latency {
        Some(d) => json!(d.as_secs_f64() * 1000.0),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CheckSummary, LatencySnapshot};

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            scheduled: 100,
            started: 98,
            dropped: 2,
            completed: 95,
            errored: 3,
            timed_out: 0,
            latency: LatencySnapshot {
                samples: 95,
                min: Some(Duration::from_millis(1)),
                max: Some(Duration::from_millis(40)),
                mean: Some(Duration::from_millis(5)),
                p50: Some(Duration::from_millis(4)),
                p90: Some(Duration::from_millis(12)),
                p95: Some(Duration::from_millis(20)),
                p99: Some(Duration::from_millis(35)),
            },
            checks: vec![
                CheckSummary {
                    name: "status is 202".into(),
                    passed: 95,
                    total: 98,
                },
                CheckSummary {
                    name: "backpressure active (503)".into(),
                    passed: 0,
                    total: 98,
                },
            ],
        }
    }

    #[test]
    fn test_throughput() {
        let summary = RunSummary::new(snapshot(), Duration::from_secs(10));
        assert!((summary.throughput() - 9.5).abs() < 1e-9);
    }

    #[test]
    fn test_all_checks_passed_detects_failures() {
        let summary = RunSummary::new(snapshot(), Duration::from_secs(10));
        assert!(!summary.all_checks_passed());

        let mut passing = snapshot();
        passing.checks = vec![CheckSummary {
            name: "status is 202".into(),
            passed: 98,
            total: 98,
        }];
        assert!(RunSummary::new(passing, Duration::from_secs(1)).all_checks_passed());
    }

    #[test]
    fn test_json_shape() {
        let summary = RunSummary::new(snapshot(), Duration::from_secs(10));
        let json = summary.to_json();
        assert_eq!(json["iterations"]["scheduled"], 100);
        assert_eq!(json["iterations"]["dropped"], 2);
        assert_eq!(json["checks"][0]["name"], "status is 202");
        assert_eq!(json["all_checks_passed"], false);
        assert!(json["latency_ms"]["p99"].is_number());
    }
}
