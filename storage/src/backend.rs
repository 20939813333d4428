use async_trait::async_trait;
use delayline_common::Result;

/// Linearizable key-value backend behind the registry.
///
/// Implementations report transport failures as `BrokerError::Unavailable`.
/// Absence is never an error at this level.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Atomically write `value` only if `key` does not exist yet.
    /// Returns `false` when the key was already present.
    async fn insert_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// All entries under `prefix`, in key order
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Returns the number of deleted keys (0 or 1)
    async fn delete(&self, key: &str) -> Result<u64>;

    fn name(&self) -> &'static str;
}
