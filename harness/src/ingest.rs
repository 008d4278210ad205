//! Event-ingestion iteration body
//!
//! Drives an idempotent-write ingestion endpoint: every iteration POSTs a
//! usage event with a fresh idempotency key and the standard check set
//! asserts the endpoint's 202/503 contract. The endpoint is expected to
//! answer `202 Accepted` on success and `503 Service Unavailable` when
//! applying backpressure, echoing acceptance in the body.

use crate::check::CheckSet;
use crate::config::{ConfigError, ScenarioConfig, Stage};
use crate::iteration::{IterationBody, Response};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Usage event accepted by the ingestion endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
    pub event_id: Uuid,
    pub customer_id: String,
    pub event_type: String,
    pub amount: i64,
    pub idempotency_key: String,
    pub timestamp: i64,
}

/// Iteration body that POSTs usage events to an ingestion endpoint.
///
/// The client is built once and shared across workers; each iteration only
/// allocates the payload.
pub struct IngestBody {
    client: reqwest::Client,
    url: String,
    customer_id: String,
    event_type: String,
}

impl IngestBody {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(200)
            .timeout(Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            customer_id: "cust_8821".to_string(),
            event_type: "api_call".to_string(),
        })
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = customer_id.into();
        self
    }

    fn next_event(&self) -> UsageEvent {
        let key: u32 = rand::rng().random_range(0..10_000_000);
        UsageEvent {
            event_id: Uuid::new_v4(),
            customer_id: self.customer_id.clone(),
            event_type: self.event_type.clone(),
            amount: 1,
            idempotency_key: format!("key-{key}"),
            // the endpoint stamps arrival time itself
            timestamp: 0,
        }
    }
}

#[async_trait]
impl IterationBody for IngestBody {
    async fn run(&self, _worker_id: usize) -> Result<Response> {
        let event = self.next_event();
        let start = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .json(&event)
            .send()
            .await
            .context("sending ingest request")?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .context("reading ingest response body")?;

        Ok(Response {
            status,
            body,
            latency: start.elapsed(),
        })
    }
}

/// The checks the ingestion scenarios assert: explicit success, explicit
/// backpressure, and the acceptance echo for idempotent writes.
pub fn standard_checks() -> CheckSet {
    CheckSet::new()
        .with("status is 202", |r| r.status == 202)
        .with("backpressure active (503)", |r| r.status == 503)
        .with("body has success message", |r| {
            r.body_text().is_some_and(|body| body.contains("accepted"))
        })
}

/// Canned scenario configurations for the ingestion target.
pub mod presets {
    use super::*;

    /// Sustained-throughput validation: 15k events/s for 3 minutes.
    pub fn speed() -> Result<ScenarioConfig, ConfigError> {
        ScenarioConfig::constant_arrival_rate(15_000.0, Duration::from_secs(180), 1000, 2000)
    }

    /// Overload validation: 20k events/s for 4 minutes with a deep pool, so
    /// backpressure shows up as 503 checks rather than dropped iterations.
    pub fn stress() -> Result<ScenarioConfig, ConfigError> {
        ScenarioConfig::constant_arrival_rate(20_000.0, Duration::from_secs(240), 2000, 10_000)
    }

    /// Ramp to 15k concurrent iterations and back down to idle.
    pub fn ramp() -> Result<ScenarioConfig, ConfigError> {
        ScenarioConfig::staged(
            vec![
                Stage::new(Duration::from_secs(30), 5000),
                Stage::new(Duration::from_secs(60), 10_000),
                Stage::new(Duration::from_secs(60), 15_000),
                Stage::new(Duration::from_secs(30), 0),
            ],
            15_000,
        )
    }
}
