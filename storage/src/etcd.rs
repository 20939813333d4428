use crate::backend::KvBackend;
use async_trait::async_trait;
use delayline_common::{BrokerError, Result};
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, GetOptions, KvClient, Txn, TxnOp,
};
use std::time::Duration;
use tracing::info;

/// etcd connection settings
#[derive(Debug, Clone)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
    pub dial_timeout: Duration,
}

/// etcd v3 backend. Create-if-absent is a single transaction guarded by
/// `version(key) == 0`, which makes it exclusive cluster-wide.
#[derive(Clone)]
pub struct EtcdBackend {
    kv: KvClient,
}

impl EtcdBackend {
    pub async fn connect(config: &EtcdConfig) -> Result<Self> {
        let options = ConnectOptions::new().with_connect_timeout(config.dial_timeout);
        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(|e| BrokerError::unavailable(format!("failed to connect to etcd: {}", e)))?;

        info!("Connected to etcd: endpoints={:?}", config.endpoints);

        Ok(Self {
            kv: client.kv_client(),
        })
    }
}

fn unavailable(op: &str, err: etcd_client::Error) -> BrokerError {
    BrokerError::unavailable(format!("etcd {} failed: {}", op, err))
}

#[async_trait]
impl KvBackend for EtcdBackend {
    async fn insert_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        let txn = Txn::new()
            .when(vec![Compare::version(key, CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(key, value, None)]);

        let resp = self
            .kv
            .clone()
            .txn(txn)
            .await
            .map_err(|e| unavailable("txn", e))?;

        Ok(resp.succeeded())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .kv
            .clone()
            .get(key, None)
            .await
            .map_err(|e| unavailable("get", e))?;

        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let resp = self
            .kv
            .clone()
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| unavailable("range", e))?;

        Ok(resp
            .kvs()
            .iter()
            .map(|kv| {
                (
                    String::from_utf8_lossy(kv.key()).into_owned(),
                    kv.value().to_vec(),
                )
            })
            .collect())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.kv
            .clone()
            .put(key, value, None)
            .await
            .map_err(|e| unavailable("put", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        let resp = self
            .kv
            .clone()
            .delete(key, None)
            .await
            .map_err(|e| unavailable("delete", e))?;
        Ok(resp.deleted().max(0) as u64)
    }

    fn name(&self) -> &'static str {
        "etcd"
    }
}
