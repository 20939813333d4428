use async_trait::async_trait;
use delayline_cluster::{ClusterRegistry, PusherInfo, RoutingRule, StorageInfo};
use delayline_common::Result;

/// Where an ingestion node reads routing data from and reports liveness to.
///
/// Implemented in-process by [`ClusterRegistry`] and over HTTP by the SDK
/// client.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn list_storages(&self) -> Result<Vec<StorageInfo>>;

    async fn list_pushers(&self) -> Result<Vec<PusherInfo>>;

    async fn list_routing_rules(&self) -> Result<Vec<RoutingRule>>;

    async fn register_gateway(&self, id: &str, address: &str) -> Result<()>;

    async fn heartbeat_gateway(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl RegistrySource for ClusterRegistry {
    async fn list_storages(&self) -> Result<Vec<StorageInfo>> {
        ClusterRegistry::list_storages(self).await
    }

    async fn list_pushers(&self) -> Result<Vec<PusherInfo>> {
        ClusterRegistry::list_pushers(self).await
    }

    async fn list_routing_rules(&self) -> Result<Vec<RoutingRule>> {
        ClusterRegistry::list_routing_rules(self).await
    }

    async fn register_gateway(&self, id: &str, address: &str) -> Result<()> {
        ClusterRegistry::register_gateway(self, id, address)
            .await
            .map(|_| ())
    }

    async fn heartbeat_gateway(&self, id: &str) -> Result<()> {
        self.update_gateway_heartbeat(id).await.map(|_| ())
    }
}
