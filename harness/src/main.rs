use std::env;
use std::sync::Arc;
use surge_harness::config::ScenarioConfig;
use surge_harness::engine::{RunContext, Scenario};
use surge_harness::ingest::{IngestBody, presets, standard_checks};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "surge=info,surge_harness=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load scenario from environment; SURGE_PRESET picks a canned profile
    let config = match env::var("SURGE_PRESET").ok().as_deref() {
        Some("speed") => presets::speed()?,
        Some("stress") => presets::stress()?,
        Some("ramp") => presets::ramp()?,
        Some(other) => anyhow::bail!("unknown SURGE_PRESET: {other}"),
        None => ScenarioConfig::from_env()?,
    };
    let target_url =
        env::var("SURGE_TARGET_URL").unwrap_or_else(|_| "http://127.0.0.1:3000/ingest".into());
    info!(
        target = %target_url,
        duration = ?config.total_duration(),
        max_workers = config.max_workers(),
        "loaded scenario"
    );

    let scenario = Scenario::new(Arc::new(IngestBody::new(&target_url)?), standard_checks());
    let context = RunContext::new(config);

    // Bind run cancellation to ctrl-c
    let cancel = context.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let summary = context.run(scenario).await;
    summary.print_summary();
    println!("JSON: {}", summary.to_json());

    if !summary.all_checks_passed() {
        warn!("one or more checks failed");
    }

    Ok(())
}
