use anyhow::Result;
use oxtel_agent::config::AgentConfig;
use oxtel_agent::delivery::Delivery;
use oxtel_agent::envelope::EnvelopeBuilder;
use oxtel_agent::pool::WorkerPool;
use oxtel_agent::scheduler::{Scheduler, SchedulerSettings};
use oxtel_agent::transport::HttpTransport;
use oxtel_collector::SampleSource;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("oxtel=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)?;
    tracing::info!(
        server = %config.updates_url(),
        signing = config.signing_key().is_some(),
        "oxtel-agent starting"
    );

    let transport = HttpTransport::new(config.updates_url(), config.request_timeout())?;
    let backoff = Delivery::<HttpTransport>::network_backoff(config.max_retries)
        .with_linear(config.retry_initial_delay(), config.retry_increment());
    let delivery = Delivery::new(transport, EnvelopeBuilder::new(config.signing_key()), backoff);
    let pool = WorkerPool::new(config.rate_limit, Arc::new(delivery));

    let scheduler = Scheduler::new(
        SampleSource::with_default_collectors(),
        pool,
        SchedulerSettings {
            poll_interval: config.poll_interval(),
            report_interval: config.report_interval(),
            batch_size: config.batch_size,
        },
    );

    let cancel = CancellationToken::new();
    let run = tokio::spawn(scheduler.run(cancel.clone()));

    signal::ctrl_c().await?;
    tracing::info!("Shutting down gracefully");
    cancel.cancel();
    run.await?;

    Ok(())
}
