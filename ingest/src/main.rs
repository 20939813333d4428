//! delayline gateway: accepts messages and routes them to delay tiers or
//! pushers using the coordinator's registry.

use anyhow::{Context, Result};
use clap::Parser;
use delayline_client::RestClient;
use delayline_gateway::{Gateway, GatewayContext};
use delayline_ingest::{describe_metrics, start_rest_server, AppState, Cli, IngestConfig, LogTransport};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = IngestConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_cli(&cli);
    config.validate().context("Invalid configuration")?;

    init_logging(&config.log_level);

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    describe_metrics();

    info!(
        http_addr = %config.http_addr,
        coordinator = %config.coordinator.endpoint,
        gateway_id = %config.gateway.gateway_id,
        "Starting delayline gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = RestClient::new(config.client_config()).context("Failed to build registry client")?;
    let context = GatewayContext::new(
        config.gateway.clone(),
        Arc::new(registry),
        Arc::new(LogTransport::new()),
    );
    let gateway = Arc::new(Gateway::new(context).context("Failed to create gateway")?);

    let token = CancellationToken::new();
    let handles = gateway
        .start(token.clone())
        .await
        .context("Failed to start gateway")?;

    let state = AppState::new(gateway).with_metrics(metrics);
    let served = start_rest_server(config.http_addr, state, config.request_timeout, shutdown_signal()).await;

    token.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Gateway task ended abnormally: {}", e);
        }
    }

    served.context("Intake server failed")?;
    info!("Gateway shut down");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
