pub mod backend;
pub mod keyspace;
pub mod memory;

#[cfg(feature = "etcd")]
pub mod etcd;

pub use backend::*;
pub use keyspace::*;
pub use memory::*;

#[cfg(feature = "etcd")]
pub use etcd::{EtcdBackend, EtcdConfig};

use delayline_common::{BrokerError, Result};
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Typed registry storage over a [`KvBackend`].
///
/// Every backend call is bounded by `op_timeout`; an elapsed call surfaces as
/// `Unavailable`, which callers can tell apart from `NotFound`/`AlreadyExists`.
#[derive(Clone)]
pub struct RegistryStore {
    backend: Arc<dyn KvBackend>,
    keys: KeySpace,
    op_timeout: Duration,
}

impl RegistryStore {
    pub fn new(backend: Arc<dyn KvBackend>, keys: KeySpace, op_timeout: Duration) -> Self {
        tracing::info!(
            "RegistryStore initialized: backend={}, root={}, op_timeout={:?}",
            backend.name(),
            keys.root(),
            op_timeout
        );

        Self {
            backend,
            keys,
            op_timeout,
        }
    }

    /// In-memory store with the default key layout
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBackend::new()),
            KeySpace::default(),
            DEFAULT_OP_TIMEOUT,
        )
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn bounded<T, F>(&self, op: &str, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Registry {} on '{}' timed out after {:?}", op, key, self.op_timeout);
                Err(BrokerError::unavailable(format!(
                    "{} '{}' timed out after {:?}",
                    op, key, self.op_timeout
                )))
            }
        }
    }

    /// Exclusive create. The first writer wins; later callers get
    /// `AlreadyExists` and the stored value is left untouched.
    pub async fn create<T: Serialize>(&self, family: Family, id: &str, value: &T) -> Result<()> {
        let key = self.keys.key(family, id);
        let bytes = serde_json::to_vec(value)?;

        let inserted = self
            .bounded("create", &key, self.backend.insert_if_absent(&key, bytes))
            .await?;
        if !inserted {
            return Err(BrokerError::already_exists(family.entity(), id));
        }

        tracing::debug!("Created {} '{}'", family.entity(), id);
        Ok(())
    }

    /// Point read. `NotFound` when absent; a record that fails to decode is a
    /// `Serialization` error, which the HTTP layer reports as a 500.
    pub async fn get<T: DeserializeOwned>(&self, family: Family, id: &str) -> Result<T> {
        let key = self.keys.key(family, id);
        let bytes = self
            .bounded("get", &key, self.backend.get(&key))
            .await?
            .ok_or_else(|| BrokerError::not_found(family.entity(), id))?;

        serde_json::from_slice(&bytes).map_err(|e| BrokerError::Serialization {
            message: format!("corrupt {} '{}': {}", family.entity(), id, e),
        })
    }

    /// All records of a family in key order. Records that fail to decode are
    /// logged, counted and skipped.
    pub async fn list<T: DeserializeOwned>(&self, family: Family) -> Result<Vec<T>> {
        let prefix = self.keys.prefix(family);
        let entries = self
            .bounded("list", &prefix, self.backend.list_prefix(&prefix))
            .await?;

        let mut records = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            match serde_json::from_slice(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping unparseable registry entry '{}': {}", key, e);
                    counter!("registry.list.skipped", "prefix" => family.segment()).increment(1);
                }
            }
        }

        Ok(records)
    }

    /// Unconditional overwrite
    pub async fn put<T: Serialize>(&self, family: Family, id: &str, value: &T) -> Result<()> {
        let key = self.keys.key(family, id);
        let bytes = serde_json::to_vec(value)?;
        self.bounded("put", &key, self.backend.put(&key, bytes)).await
    }

    /// Overwrite a record that must already exist
    pub async fn update_existing<T: Serialize>(
        &self,
        family: Family,
        id: &str,
        value: &T,
    ) -> Result<()> {
        let key = self.keys.key(family, id);
        let existing = self.bounded("get", &key, self.backend.get(&key)).await?;
        if existing.is_none() {
            return Err(BrokerError::not_found(family.entity(), id));
        }

        let bytes = serde_json::to_vec(value)?;
        self.bounded("put", &key, self.backend.put(&key, bytes)).await
    }

    pub async fn delete(&self, family: Family, id: &str) -> Result<()> {
        let key = self.keys.key(family, id);
        let deleted = self.bounded("delete", &key, self.backend.delete(&key)).await?;
        if deleted == 0 {
            return Err(BrokerError::not_found(family.entity(), id));
        }

        tracing::debug!("Deleted {} '{}'", family.entity(), id);
        Ok(())
    }

    /// Read a configuration singleton, falling back to `T::default()` when
    /// nothing has been stored yet.
    pub async fn get_or_default<T>(&self, singleton: Singleton) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let key = self.keys.singleton(singleton);
        match self.bounded("get", &key, self.backend.get(&key)).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| BrokerError::Serialization {
                message: format!("corrupt {}: {}", singleton.segment(), e),
            }),
            None => Ok(T::default()),
        }
    }

    pub async fn put_singleton<T: Serialize>(&self, singleton: Singleton, value: &T) -> Result<()> {
        let key = self.keys.singleton(singleton);
        let bytes = serde_json::to_vec(value)?;
        self.bounded("put", &key, self.backend.put(&key, bytes)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    struct Record {
        id: String,
        weight: u32,
    }

    fn record(id: &str, weight: u32) -> Record {
        Record {
            id: id.to_string(),
            weight,
        }
    }

    fn store_with(backend: Arc<MemoryBackend>) -> RegistryStore {
        RegistryStore::new(backend, KeySpace::default(), DEFAULT_OP_TIMEOUT)
    }

    #[tokio::test]
    async fn test_create_first_writer_wins() {
        let store = RegistryStore::in_memory();
        store.create(Family::Storages, "fast", &record("fast", 1)).await.unwrap();

        let err = store
            .create(Family::Storages, "fast", &record("fast", 2))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());

        let stored: Record = store.get(Family::Storages, "fast").await.unwrap();
        assert_eq!(stored.weight, 1);
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = RegistryStore::in_memory();
        let err = store.get::<Record>(Family::Pushers, "missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.delete(Family::Pushers, "missing").await.unwrap_err().is_not_found());
        assert!(store
            .update_existing(Family::Pushers, "missing", &record("missing", 0))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_list_skips_corrupt_records() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());

        store.create(Family::RoutingRules, "a", &record("a", 1)).await.unwrap();
        store.create(Family::RoutingRules, "c", &record("c", 3)).await.unwrap();
        backend
            .put("/delayline/routing-rules/b", b"{not json".to_vec())
            .await
            .unwrap();

        let listed: Vec<Record> = store.list(Family::RoutingRules).await.unwrap();
        assert_eq!(listed, vec![record("a", 1), record("c", 3)]);

        // A point read of the poisoned record is a hard failure
        let err = store.get::<Record>(Family::RoutingRules, "b").await.unwrap_err();
        assert!(matches!(err, BrokerError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_families_are_isolated() {
        let store = RegistryStore::in_memory();
        store.create(Family::Storages, "x", &record("x", 1)).await.unwrap();
        store.create(Family::Pushers, "x", &record("x", 2)).await.unwrap();

        let storages: Vec<Record> = store.list(Family::Storages).await.unwrap();
        assert_eq!(storages, vec![record("x", 1)]);
    }

    #[tokio::test]
    async fn test_recreate_after_delete() {
        let store = RegistryStore::in_memory();
        store.create(Family::Gateways, "g1", &record("g1", 1)).await.unwrap();
        store.delete(Family::Gateways, "g1").await.unwrap();
        store.create(Family::Gateways, "g1", &record("g1", 2)).await.unwrap();

        let stored: Record = store.get(Family::Gateways, "g1").await.unwrap();
        assert_eq!(stored.weight, 2);
    }

    #[tokio::test]
    async fn test_singleton_defaults() {
        let store = RegistryStore::in_memory();
        let config: Record = store.get_or_default(Singleton::ClusterConfig).await.unwrap();
        assert_eq!(config, Record::default());

        store
            .put_singleton(Singleton::ClusterConfig, &record("cluster", 7))
            .await
            .unwrap();
        let config: Record = store.get_or_default(Singleton::ClusterConfig).await.unwrap();
        assert_eq!(config.weight, 7);
    }

    #[tokio::test]
    async fn test_backend_outage_is_unavailable() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_with(backend.clone());
        backend.set_offline(true);

        let err = store.list::<Record>(Family::Storages).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }

    struct StalledBackend;

    #[async_trait]
    impl KvBackend for StalledBackend {
        async fn insert_if_absent(&self, _key: &str, _value: Vec<u8>) -> Result<bool> {
            std::future::pending().await
        }
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            std::future::pending().await
        }
        async fn list_prefix(&self, _prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
            std::future::pending().await
        }
        async fn put(&self, _key: &str, _value: Vec<u8>) -> Result<()> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> Result<u64> {
            std::future::pending().await
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let store = RegistryStore::new(
            Arc::new(StalledBackend),
            KeySpace::default(),
            Duration::from_millis(20),
        );

        let err = store.get::<Record>(Family::Nodes, "n1").await.unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable { .. }));
    }
}
