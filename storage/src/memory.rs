use crate::backend::KvBackend;
use async_trait::async_trait;
use delayline_common::{BrokerError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process backend. Every operation takes the map lock, so it is
/// linearizable within one process. Used by tests and single-node setups.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage: every call fails with `Unavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BrokerError::unavailable("memory backend is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn insert_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        self.check_online()?;
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value);
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_online()?;
        Ok(self.entries.read().get(key).cloned())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        self.check_online()?;
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.check_online()?;
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        self.check_online()?;
        Ok(self.entries.write().remove(key).map_or(0, |_| 1))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_if_absent_is_exclusive() {
        let backend = MemoryBackend::new();
        assert!(backend.insert_if_absent("/a", b"1".to_vec()).await.unwrap());
        assert!(!backend.insert_if_absent("/a", b"2".to_vec()).await.unwrap());
        assert_eq!(backend.get("/a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_list_prefix_is_ordered_and_bounded() {
        let backend = MemoryBackend::new();
        backend.put("/x/storages/b", b"b".to_vec()).await.unwrap();
        backend.put("/x/storages/a", b"a".to_vec()).await.unwrap();
        backend.put("/x/pushers/a", b"p".to_vec()).await.unwrap();
        backend.put("/x/storagesz", b"z".to_vec()).await.unwrap();

        let listed = backend.list_prefix("/x/storages/").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["/x/storages/a", "/x/storages/b"]);
    }

    #[tokio::test]
    async fn test_delete_counts() {
        let backend = MemoryBackend::new();
        backend.put("/a", vec![]).await.unwrap();
        assert_eq!(backend.delete("/a").await.unwrap(), 1);
        assert_eq!(backend.delete("/a").await.unwrap(), 0);
    }

    #[test]
    fn test_offline() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        let err = tokio_test::block_on(backend.get("/a")).unwrap_err();
        assert!(err.is_retryable());

        backend.set_offline(false);
        assert!(tokio_test::block_on(backend.get("/a")).unwrap().is_none());
    }
}
