//! SDK for the delayline coordinator's registry API.
//!
//! [`RestClient`] speaks the HTTP surface and also implements the gateway's
//! `RegistrySource`, so an ingestion node can run against a remote
//! coordinator.

pub mod config;
pub mod rest_client;

use delayline_cluster::api::RegisterStorageRequest;
use delayline_cluster::*;
use delayline_common::Result;
use std::time::Duration;

pub use config::*;
pub use rest_client::*;

/// Client interface for the cluster registry
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    /// Register a coordinator node; the id is assigned server-side
    async fn create_node(&self, address: &str) -> Result<ClusterNode>;

    async fn get_node(&self, id: &NodeId) -> Result<ClusterNode>;

    async fn list_nodes(&self) -> Result<Vec<ClusterNode>>;

    async fn node_heartbeat(&self, id: &NodeId) -> Result<()>;

    async fn delete_node(&self, id: &NodeId) -> Result<()>;

    async fn register_gateway(&self, id: &str, address: &str) -> Result<GatewayInfo>;

    async fn get_gateway(&self, id: &str) -> Result<GatewayInfo>;

    async fn list_gateways(&self) -> Result<Vec<GatewayInfo>>;

    async fn gateway_heartbeat(&self, id: &str) -> Result<()>;

    async fn unregister_gateway(&self, id: &str) -> Result<()>;

    /// Register a storage tier. Delays travel as human strings.
    async fn register_storage(&self, request: &RegisterStorageRequest) -> Result<StorageInfo>;

    async fn get_storage(&self, id: &str) -> Result<StorageInfo>;

    async fn list_storages(&self) -> Result<Vec<StorageInfo>>;

    async fn storage_heartbeat(&self, id: &str) -> Result<()>;

    async fn unregister_storage(&self, id: &str) -> Result<()>;

    async fn register_pusher(&self, id: &str, kind: &str, address: &str) -> Result<PusherInfo>;

    async fn get_pusher(&self, id: &str) -> Result<PusherInfo>;

    async fn list_pushers(&self) -> Result<Vec<PusherInfo>>;

    async fn pusher_heartbeat(&self, id: &str) -> Result<()>;

    async fn unregister_pusher(&self, id: &str) -> Result<()>;

    async fn create_routing_rule(&self, rule: &RoutingRule) -> Result<RoutingRule>;

    async fn get_routing_rule(&self, id: &str) -> Result<RoutingRule>;

    async fn list_routing_rules(&self) -> Result<Vec<RoutingRule>>;

    /// Overwrite an existing rule; `NotFound` if it was never created
    async fn update_routing_rule(&self, rule: &RoutingRule) -> Result<RoutingRule>;

    async fn delete_routing_rule(&self, id: &str) -> Result<()>;

    async fn cluster_config(&self) -> Result<ClusterConfig>;

    async fn coordinator_config(&self) -> Result<CoordinatorConfig>;

    /// Alive / stale classification of every registered record
    async fn liveness(&self, timeout: Duration) -> Result<LivenessReport>;
}

/// Convenience client builder
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn timeout(mut self, timeout_seconds: u64) -> Self {
        self.config.timeout_seconds = timeout_seconds;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.config.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<RestClient> {
        RestClient::new(self.config)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
