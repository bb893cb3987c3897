// etcd v3 键值存储

use etcd_client::{Client, Compare, CompareOp, ConnectOptions, GetOptions, Txn, TxnOp};

use super::{Connect, KvPair, KvStore, StoreError, dir_prefix, fold_children};
use crate::config::Config;

/// etcd 后端。客户端句柄可廉价克隆，每次调用使用一个副本
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    pub async fn connect_endpoints(
        endpoints: &[String],
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self, StoreError> {
        let options = match (user, password) {
            (Some(user), Some(password)) => Some(ConnectOptions::new().with_user(user, password)),
            _ => None,
        };

        let client = Client::connect(endpoints, options).await?;
        Ok(Self { client })
    }

    fn to_pair(kv: &etcd_client::KeyValue) -> KvPair {
        KvPair {
            key: String::from_utf8_lossy(kv.key()).into_owned(),
            value: kv.value().to_vec(),
            version: kv.mod_revision() as u64,
            dir: false,
        }
    }
}

#[tonic::async_trait]
impl KvStore for EtcdStore {
    async fn list(&self, dir: &str) -> Result<Vec<KvPair>, StoreError> {
        let prefix = dir_prefix(dir);
        let mut client = self.client.clone();
        let response = client
            .get(prefix.as_str(), Some(GetOptions::new().with_prefix()))
            .await?;

        tracing::debug!(prefix = %prefix, count = response.kvs().len(), "Listed etcd keys");
        Ok(fold_children(&prefix, response.kvs().iter().map(Self::to_pair)))
    }

    async fn get(&self, key: &str) -> Result<KvPair, StoreError> {
        let mut client = self.client.clone();
        let response = client.get(key, None).await?;

        response
            .kvs()
            .first()
            .map(Self::to_pair)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client.put(key, value.to_vec(), None).await?;
        Ok(())
    }

    async fn atomic_put(
        &self,
        key: &str,
        value: &[u8],
        previous: &KvPair,
    ) -> Result<(), StoreError> {
        let txn = Txn::new()
            .when([Compare::mod_revision(
                key,
                CompareOp::Equal,
                previous.version as i64,
            )])
            .and_then([TxnOp::put(key, value.to_vec(), None)]);

        let mut client = self.client.clone();
        let response = client.txn(txn).await?;
        if !response.succeeded() {
            return Err(StoreError::Conflict(key.to_string()));
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl Connect for EtcdStore {
    async fn connect(config: &Config) -> Result<Self, StoreError> {
        let endpoints = config.endpoints();
        if endpoints.is_empty() {
            return Err(StoreError::Backend("no etcd endpoint configured".to_string()));
        }

        Self::connect_endpoints(
            &endpoints,
            config.user.as_deref(),
            config.password.as_deref(),
        )
        .await
    }
}
