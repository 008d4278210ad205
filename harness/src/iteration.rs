//! Iteration body contract and per-iteration result types
//!
//! An iteration is one execution of the user-supplied unit of work: build a
//! request, send it, hand a response descriptor back to the engine. The
//! harness is transport-agnostic; whatever the body does behind this
//! interface is opaque to the scheduling core.

use crate::check::CheckResult;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;

/// Response descriptor produced by an iteration body.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP-style status code
    pub status: u16,
    /// Raw response body
    pub body: Bytes,
    /// Time from request issue to response completion
    pub latency: Duration,
}

impl Response {
    /// Response body as UTF-8 text, if it is valid UTF-8.
    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// One unit of load: build a request, send it, return the response.
///
/// A body is shared across workers and invoked concurrently, so expensive
/// state (an HTTP client, payload templates) should be captured once at
/// construction and reused. A transport failure is an `Err`, which the
/// engine records as an errored iteration without stopping the run.
#[async_trait]
pub trait IterationBody: Send + Sync {
    async fn run(&self, worker_id: usize) -> Result<Response>;
}

/// Plain async closures are accepted as iteration bodies.
#[async_trait]
impl<F, Fut> IterationBody for F
where
    F: Fn(usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send,
{
    async fn run(&self, worker_id: usize) -> Result<Response> {
        (self)(worker_id).await
    }
}

/// How one execution attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// The body returned a response; checks were evaluated against it.
    Completed,
    /// The body signaled a transport/application failure.
    Errored,
    /// The body exceeded the per-iteration timeout and was abandoned.
    TimedOut,
}

/// One completed execution attempt, consumed by the metrics aggregator.
#[derive(Debug)]
pub struct Iteration {
    /// Instant this iteration was scheduled, relative to run start.
    pub scheduled_at: Duration,
    /// Instant a worker actually picked it up (may lag under contention).
    pub started_at: Duration,
    pub outcome: IterationOutcome,
    pub response: Option<Response>,
    pub checks: Vec<CheckResult>,
}

impl Iteration {
    pub fn completed(
        scheduled_at: Duration,
        started_at: Duration,
        response: Response,
        checks: Vec<CheckResult>,
    ) -> Self {
        Self {
            scheduled_at,
            started_at,
            outcome: IterationOutcome::Completed,
            response: Some(response),
            checks,
        }
    }

    pub fn errored(scheduled_at: Duration, started_at: Duration, checks: Vec<CheckResult>) -> Self {
        Self {
            scheduled_at,
            started_at,
            outcome: IterationOutcome::Errored,
            response: None,
            checks,
        }
    }

    pub fn timed_out(scheduled_at: Duration, started_at: Duration) -> Self {
        Self {
            scheduled_at,
            started_at,
            outcome: IterationOutcome::TimedOut,
            response: None,
            checks: Vec::new(),
        }
    }
}
