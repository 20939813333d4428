//! delayline coordinator: serves the cluster registry over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use delayline_cluster::ClusterRegistry;
use delayline_server::config::{BackendKind, Cli, ServerConfig};
use delayline_server::{describe_metrics, health, start_rest_server, AppState};
use delayline_storage::{KeySpace, KvBackend, MemoryBackend, RegistryStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_cli(&cli);
    config.validate().context("Invalid configuration")?;

    init_logging(&config.log_level);
    health::mark_started();

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    describe_metrics();

    info!(
        http_addr = %config.http_addr,
        backend = config.backend.as_str(),
        key_prefix = %config.key_prefix,
        "Starting delayline coordinator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let backend = create_backend(&config).await?;
    let store = RegistryStore::new(
        backend,
        KeySpace::new(&config.key_prefix),
        config.etcd.op_timeout,
    );
    let registry = ClusterRegistry::new(store);

    registry
        .set_cluster_config(&config.cluster_config())
        .await
        .context("Failed to publish cluster configuration")?;
    registry
        .set_coordinator_config(&config.coordinator_config())
        .await
        .context("Failed to publish coordinator configuration")?;

    let state = AppState::new(registry).with_metrics(metrics);
    start_rest_server(config.http_addr, state, config.request_timeout, shutdown_signal())
        .await
        .context("REST server failed")?;

    info!("Coordinator shut down");
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

async fn create_backend(config: &ServerConfig) -> Result<Arc<dyn KvBackend>> {
    match config.backend {
        BackendKind::Memory => {
            info!("Using in-memory registry backend; state is lost on restart");
            Ok(Arc::new(MemoryBackend::new()))
        }
        BackendKind::Etcd => connect_etcd(config).await,
    }
}

#[cfg(feature = "etcd")]
async fn connect_etcd(config: &ServerConfig) -> Result<Arc<dyn KvBackend>> {
    use delayline_storage::{EtcdBackend, EtcdConfig};

    let backend = EtcdBackend::connect(&EtcdConfig {
        endpoints: config.etcd.endpoints.clone(),
        dial_timeout: config.etcd.dial_timeout,
    })
    .await
    .context("Failed to connect to etcd")?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "etcd"))]
async fn connect_etcd(_config: &ServerConfig) -> Result<Arc<dyn KvBackend>> {
    anyhow::bail!("etcd backend requested but this binary was built without the `etcd` feature")
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
