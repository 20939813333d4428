use clap::Parser;
use delayline_client::ClientConfig;
use delayline_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How this process reaches the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            endpoint: client.endpoint,
            timeout_seconds: client.timeout_seconds,
            max_retries: client.max_retries,
            retry_delay_ms: client.retry_delay_ms,
        }
    }
}

/// Ingestion process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub http_addr: SocketAddr,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub log_level: String,
    pub coordinator: CoordinatorSettings,
    pub gateway: GatewayConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            request_timeout: Duration::from_secs(10),
            log_level: "info".to_string(),
            coordinator: CoordinatorSettings::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Command line flags. Anything set here wins over file and environment.
#[derive(Debug, Default, Parser)]
#[command(name = "delayline-gateway", version, about = "delayline ingestion gateway")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub http_addr: Option<SocketAddr>,

    /// Coordinator base URL, e.g. http://coordinator:8080
    #[arg(long)]
    pub coordinator: Option<String>,

    #[arg(long)]
    pub gateway_id: Option<String>,

    /// Address advertised to the registry
    #[arg(long)]
    pub advertise_address: Option<String>,

    #[arg(long)]
    pub log_level: Option<String>,
}

impl IngestConfig {
    /// Defaults, then the optional file, then `DELAYLINE_GATEWAY__*`
    /// environment variables (`DELAYLINE_GATEWAY__GATEWAY__REFRESH_PERIOD=30s`).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(
                config::Environment::with_prefix("DELAYLINE_GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(addr) = cli.http_addr {
            self.http_addr = addr;
        }
        if let Some(endpoint) = &cli.coordinator {
            self.coordinator.endpoint = endpoint.clone();
        }
        if let Some(id) = &cli.gateway_id {
            self.gateway.gateway_id = id.clone();
        }
        if let Some(address) = &cli.advertise_address {
            self.gateway.address = address.clone();
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }
        self.client_config().validate()?;
        self.gateway.validate()?;
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.coordinator.endpoint.clone(),
            timeout_seconds: self.coordinator.timeout_seconds,
            max_retries: self.coordinator.max_retries,
            retry_delay_ms: self.coordinator.retry_delay_ms,
            user_agent: format!("delayline-gateway/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
