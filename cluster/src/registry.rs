use crate::health::{LivenessChecker, LivenessReport};
use crate::node::{ClusterNode, Heartbeat};
use crate::types::*;
use chrono::Utc;
use delayline_common::Result;
use delayline_storage::{Family, RegistryStore, Singleton};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Cluster membership and routing configuration.
///
/// Entity-level API over the [`RegistryStore`]. Errors from the store are
/// passed through unchanged.
#[derive(Clone)]
pub struct ClusterRegistry {
    store: RegistryStore,
}

impl ClusterRegistry {
    pub fn new(store: RegistryStore) -> Self {
        Self { store }
    }

    /// Registry over a fresh in-memory backend
    pub fn in_memory() -> Self {
        Self::new(RegistryStore::in_memory())
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Read-modify-write heartbeat. Last writer wins.
    async fn heartbeat<T>(&self, family: Family, id: &str) -> Result<T>
    where
        T: Heartbeat + Serialize + DeserializeOwned,
    {
        let mut record: T = self.store.get(family, id).await?;
        record.touch(Utc::now());
        self.store.put(family, id, &record).await?;

        debug!("Heartbeat: {}={}", family.entity(), id);
        Ok(record)
    }

    // === Coordinator nodes ===

    #[instrument(skip(self))]
    pub async fn create_node(&self, address: &str) -> Result<ClusterNode> {
        require("address", address)?;

        let node = ClusterNode::new(NodeId::new(), address);
        self.store
            .create(Family::Nodes, &node.id.to_string(), &node)
            .await?;

        info!("Registered coordinator node: node_id={}, address={}", node.id, node.address);
        Ok(node)
    }

    pub async fn get_node(&self, node_id: &NodeId) -> Result<ClusterNode> {
        self.store.get(Family::Nodes, &node_id.to_string()).await
    }

    pub async fn list_nodes(&self) -> Result<Vec<ClusterNode>> {
        self.store.list(Family::Nodes).await
    }

    pub async fn update_node_heartbeat(&self, node_id: &NodeId) -> Result<ClusterNode> {
        self.heartbeat(Family::Nodes, &node_id.to_string()).await
    }

    #[instrument(skip(self))]
    pub async fn delete_node(&self, node_id: &NodeId) -> Result<()> {
        self.store.delete(Family::Nodes, &node_id.to_string()).await?;
        info!("Removed coordinator node: node_id={}", node_id);
        Ok(())
    }

    // === Gateways ===

    #[instrument(skip(self))]
    pub async fn register_gateway(&self, id: &str, address: &str) -> Result<GatewayInfo> {
        require("id", id)?;
        require("address", address)?;

        let gateway = GatewayInfo::new(id, address);
        self.store.create(Family::Gateways, id, &gateway).await?;

        info!("Registered gateway: id={}, address={}", id, address);
        Ok(gateway)
    }

    pub async fn get_gateway(&self, id: &str) -> Result<GatewayInfo> {
        self.store.get(Family::Gateways, id).await
    }

    pub async fn list_gateways(&self) -> Result<Vec<GatewayInfo>> {
        self.store.list(Family::Gateways).await
    }

    pub async fn update_gateway_heartbeat(&self, id: &str) -> Result<GatewayInfo> {
        self.heartbeat(Family::Gateways, id).await
    }

    #[instrument(skip(self))]
    pub async fn unregister_gateway(&self, id: &str) -> Result<()> {
        self.store.delete(Family::Gateways, id).await?;
        info!("Unregistered gateway: id={}", id);
        Ok(())
    }

    // === Storages ===

    #[instrument(skip(self))]
    pub async fn register_storage(
        &self,
        id: &str,
        address: &str,
        min_delay: Duration,
        max_delay: Duration,
    ) -> Result<StorageInfo> {
        require("id", id)?;
        require("address", address)?;

        let storage = StorageInfo::new(id, address, min_delay, max_delay);
        self.store.create(Family::Storages, id, &storage).await?;

        info!(
            "Registered storage: id={}, address={}, min_delay={:?}, max_delay={:?}",
            id, address, min_delay, max_delay
        );
        Ok(storage)
    }

    pub async fn get_storage(&self, id: &str) -> Result<StorageInfo> {
        self.store.get(Family::Storages, id).await
    }

    pub async fn list_storages(&self) -> Result<Vec<StorageInfo>> {
        self.store.list(Family::Storages).await
    }

    pub async fn update_storage_heartbeat(&self, id: &str) -> Result<StorageInfo> {
        self.heartbeat(Family::Storages, id).await
    }

    #[instrument(skip(self))]
    pub async fn unregister_storage(&self, id: &str) -> Result<()> {
        self.store.delete(Family::Storages, id).await?;
        info!("Unregistered storage: id={}", id);
        Ok(())
    }

    // === Pushers ===

    #[instrument(skip(self))]
    pub async fn register_pusher(&self, id: &str, kind: &str, address: &str) -> Result<PusherInfo> {
        require("id", id)?;
        require("address", address)?;

        let pusher = PusherInfo::new(id, kind, address);
        self.store.create(Family::Pushers, id, &pusher).await?;

        info!("Registered pusher: id={}, kind={}, address={}", id, kind, address);
        Ok(pusher)
    }

    pub async fn get_pusher(&self, id: &str) -> Result<PusherInfo> {
        self.store.get(Family::Pushers, id).await
    }

    pub async fn list_pushers(&self) -> Result<Vec<PusherInfo>> {
        self.store.list(Family::Pushers).await
    }

    pub async fn update_pusher_heartbeat(&self, id: &str) -> Result<PusherInfo> {
        self.heartbeat(Family::Pushers, id).await
    }

    #[instrument(skip(self))]
    pub async fn unregister_pusher(&self, id: &str) -> Result<()> {
        self.store.delete(Family::Pushers, id).await?;
        info!("Unregistered pusher: id={}", id);
        Ok(())
    }

    // === Routing rules ===

    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn create_routing_rule(&self, rule: &RoutingRule) -> Result<()> {
        rule.validate()?;
        self.store.create(Family::RoutingRules, &rule.id, rule).await?;

        info!(
            "Created routing rule: id={}, pattern={}, match_type={}, pusher_id={}",
            rule.id, rule.pattern, rule.match_type, rule.pusher_id
        );
        Ok(())
    }

    pub async fn get_routing_rule(&self, id: &str) -> Result<RoutingRule> {
        self.store.get(Family::RoutingRules, id).await
    }

    pub async fn list_routing_rules(&self) -> Result<Vec<RoutingRule>> {
        self.store.list(Family::RoutingRules).await
    }

    /// Replace an existing rule; `NotFound` if it was never created
    #[instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update_routing_rule(&self, rule: &RoutingRule) -> Result<()> {
        rule.validate()?;
        self.store
            .update_existing(Family::RoutingRules, &rule.id, rule)
            .await?;

        info!("Updated routing rule: id={}, enabled={}", rule.id, rule.enabled);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_routing_rule(&self, id: &str) -> Result<()> {
        self.store.delete(Family::RoutingRules, id).await?;
        info!("Deleted routing rule: id={}", id);
        Ok(())
    }

    // === Configuration singletons ===

    /// Stored cluster config, or the zero value on first run
    pub async fn get_cluster_config(&self) -> Result<ClusterConfig> {
        self.store.get_or_default(Singleton::ClusterConfig).await
    }

    pub async fn set_cluster_config(&self, config: &ClusterConfig) -> Result<()> {
        self.store.put_singleton(Singleton::ClusterConfig, config).await
    }

    pub async fn get_coordinator_config(&self) -> Result<CoordinatorConfig> {
        self.store.get_or_default(Singleton::CoordinatorConfig).await
    }

    pub async fn set_coordinator_config(&self, config: &CoordinatorConfig) -> Result<()> {
        self.store
            .put_singleton(Singleton::CoordinatorConfig, config)
            .await
    }

    // === Liveness ===

    pub async fn liveness_report(&self, timeout: Duration) -> Result<LivenessReport> {
        let (nodes, gateways, storages, pushers) = tokio::try_join!(
            self.list_nodes(),
            self.list_gateways(),
            self.list_storages(),
            self.list_pushers(),
        )?;

        let checker = LivenessChecker::new(timeout);
        let now = Utc::now();

        Ok(LivenessReport {
            checked_at: now,
            timeout,
            nodes: checker.classify(&nodes, now),
            gateways: checker.classify(&gateways, now),
            storages: checker.classify(&storages, now),
            pushers: checker.classify(&pushers, now),
        })
    }
}
