//! teamspeak-exporter - TeamSpeak 3 ServerQuery to Prometheus bridge.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use teamspeak_exporter::config::{Args, Config};
use teamspeak_exporter::http;
use teamspeak_exporter::metrics::MetricsState;
use teamspeak_exporter::poller::{IntervalScheduler, Poller, TcpConnector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    let config = Config::from_env(&args).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;
    config.log_summary();

    let metrics = Arc::new(MetricsState::new()?);

    let listener = http::bind(config.metrics_port).await.map_err(|e| {
        error!(port = config.metrics_port, error = %e, "Failed to bind metrics endpoint");
        e
    })?;
    {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            http::run_http_server(listener, metrics).await;
        });
    }
    info!(port = config.metrics_port, "Started metrics endpoint");

    let connector = TcpConnector::new(
        config.teamspeak.host.clone(),
        config.teamspeak.port,
        config.query_timeout,
    );
    let mut poller = Poller::new(connector, &config.teamspeak, metrics);
    let mut scheduler = IntervalScheduler::new(config.interval);

    tokio::select! {
        _ = poller.run(&mut scheduler) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
