use clap::Parser;
use delayline_cluster::{ClusterConfig, CoordinatorConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Registry backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Etcd,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Etcd => "etcd",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtcdSettings {
    pub endpoints: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub op_timeout: Duration,
}

impl Default for EtcdSettings {
    fn default() -> Self {
        Self {
            endpoints: vec!["localhost:2379".to_string()],
            dial_timeout: Duration::from_secs(5),
            op_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub transport_address: String,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            transport_address: "nats://localhost:4222".to_string(),
        }
    }
}

/// Coordinator process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub log_level: String,
    pub backend: BackendKind,
    pub key_prefix: String,
    pub etcd: EtcdSettings,
    pub cluster: ClusterSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout: Duration::from_secs(10),
            log_level: "info".to_string(),
            backend: BackendKind::Memory,
            key_prefix: delayline_storage::DEFAULT_KEY_PREFIX.to_string(),
            etcd: EtcdSettings::default(),
            cluster: ClusterSettings::default(),
        }
    }
}

/// Command line flags. Anything set here wins over file and environment.
#[derive(Debug, Default, Parser)]
#[command(name = "delayline-coordinator", version, about = "delayline cluster coordinator")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub http_addr: Option<SocketAddr>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Comma separated etcd endpoints
    #[arg(long, value_delimiter = ',')]
    pub etcd_endpoints: Option<Vec<String>>,

    #[arg(long)]
    pub key_prefix: Option<String>,

    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long)]
    pub transport_address: Option<String>,
}

impl ServerConfig {
    /// Defaults, then the optional file, then `DELAYLINE__*` environment
    /// variables (`DELAYLINE__ETCD__OP_TIMEOUT=3s`).
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(
                config::Environment::with_prefix("DELAYLINE")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("etcd.endpoints")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(addr) = cli.http_addr {
            self.http_addr = addr;
        }
        if let Some(backend) = cli.backend {
            self.backend = backend;
        }
        if let Some(endpoints) = &cli.etcd_endpoints {
            self.etcd.endpoints = endpoints.clone();
        }
        if let Some(prefix) = &cli.key_prefix {
            self.key_prefix = prefix.clone();
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        if let Some(address) = &cli.transport_address {
            self.cluster.transport_address = address.clone();
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }
        if self.etcd.op_timeout.is_zero() {
            anyhow::bail!("etcd.op_timeout must be greater than 0");
        }
        if self.backend == BackendKind::Etcd && self.etcd.endpoints.is_empty() {
            anyhow::bail!("etcd backend selected but no etcd.endpoints configured");
        }
        Ok(())
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            transport_address: self.cluster.transport_address.clone(),
        }
    }

    /// The part of this configuration published to the registry
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let backend_endpoints = match self.backend {
            BackendKind::Memory => Vec::new(),
            BackendKind::Etcd => self.etcd.endpoints.clone(),
        };

        CoordinatorConfig {
            http_addr: self.http_addr.to_string(),
            request_timeout: self.request_timeout,
            backend: self.backend.as_str().to_string(),
            backend_endpoints,
            op_timeout: self.etcd.op_timeout,
            log_level: self.log_level.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.key_prefix, "/delayline");
        assert_eq!(config.etcd.op_timeout, Duration::from_secs(5));
        assert_eq!(config.cluster.transport_address, "nats://localhost:4222");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"backend":"etcd","etcd":{"endpoints":["etcd-0:2379"],"op_timeout":"2s"}}"#,
        )
        .unwrap();
        assert_eq!(config.backend, BackendKind::Etcd);
        assert_eq!(config.etcd.op_timeout, Duration::from_secs(2));
        assert_eq!(config.etcd.dial_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ServerConfig::default();
        let cli = Cli::parse_from([
            "delayline-coordinator",
            "--backend",
            "etcd",
            "--etcd-endpoints",
            "a:2379,b:2379",
            "--transport-address",
            "nats://bus:4222",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.backend, BackendKind::Etcd);
        assert_eq!(config.etcd.endpoints, vec!["a:2379", "b:2379"]);
        assert_eq!(config.cluster_config().transport_address, "nats://bus:4222");
        assert_eq!(config.coordinator_config().backend_endpoints.len(), 2);
    }

    #[test]
    fn test_validation() {
        let config = ServerConfig {
            backend: BackendKind::Etcd,
            etcd: EtcdSettings {
                endpoints: vec![],
                ..EtcdSettings::default()
            },
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
