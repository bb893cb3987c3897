// ZooKeeper 键值存储
//
// 与 etcd、Consul 不同，ZooKeeper 的命名空间是真实的节点树，目录通过 `get_children` 列举

use zookeeper_client as zk;

use super::{Connect, KvPair, KvStore, StoreError, dir_prefix};
use crate::config::Config;

#[derive(Clone)]
pub struct ZookeeperStore {
    client: zk::Client,
}

impl ZookeeperStore {
    pub async fn connect_cluster(cluster: &str) -> Result<Self, StoreError> {
        let client = zk::Client::connect(cluster).await?;
        Ok(Self { client })
    }

    // ZooKeeper 路径不允许以 '/' 结尾（根节点除外）
    fn node_path(key: &str) -> String {
        let trimmed = key.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }

    // 子节点的键沿用调用方传入目录的写法，节点路径只用于访问服务端
    fn child_key(dir: &str, child: &str) -> String {
        format!("{}{child}", dir_prefix(dir))
    }

    // 逐级创建持久节点，已存在的节点忽略
    async fn create_with_parents(&self, path: &str, value: &[u8]) -> Result<(), StoreError> {
        let options = zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all());

        let mut parent = String::new();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if let Some((_, ancestors)) = segments.split_last() {
            for segment in ancestors {
                parent.push('/');
                parent.push_str(segment);
                match self.client.create(&parent, &[], &options).await {
                    Ok(_) | Err(zk::Error::NodeExists) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.client.create(path, value, &options).await?;
        Ok(())
    }
}

#[tonic::async_trait]
impl KvStore for ZookeeperStore {
    async fn list(&self, dir: &str) -> Result<Vec<KvPair>, StoreError> {
        let path = Self::node_path(dir);
        let (children, _) = self.client.get_children(&path).await?;

        let mut pairs = Vec::with_capacity(children.len());
        for child in children {
            let key = Self::child_key(dir, &child);
            match self.client.get_data(&Self::node_path(&key)).await {
                Ok((value, stat)) => pairs.push(KvPair {
                    key,
                    value,
                    version: stat.version as u64,
                    dir: stat.num_children > 0,
                }),
                // 列举与读取之间节点被删除
                Err(zk::Error::NoNode) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(pairs)
    }

    async fn get(&self, key: &str) -> Result<KvPair, StoreError> {
        let path = Self::node_path(key);
        match self.client.get_data(&path).await {
            Ok((value, stat)) => Ok(KvPair {
                key: key.to_string(),
                value,
                version: stat.version as u64,
                dir: stat.num_children > 0,
            }),
            Err(zk::Error::NoNode) => Err(StoreError::KeyNotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = Self::node_path(key);
        match self.client.set_data(&path, value, None).await {
            Ok(_) => Ok(()),
            Err(zk::Error::NoNode) => self.create_with_parents(&path, value).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn atomic_put(
        &self,
        key: &str,
        value: &[u8],
        previous: &KvPair,
    ) -> Result<(), StoreError> {
        let path = Self::node_path(key);
        match self
            .client
            .set_data(&path, value, Some(previous.version as i32))
            .await
        {
            Ok(_) => Ok(()),
            Err(zk::Error::BadVersion) | Err(zk::Error::NoNode) => {
                Err(StoreError::Conflict(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[tonic::async_trait]
impl Connect for ZookeeperStore {
    async fn connect(config: &Config) -> Result<Self, StoreError> {
        // ZooKeeper 原生支持逗号分隔的集群地址
        let cluster = config.endpoints().join(",");
        if cluster.is_empty() {
            return Err(StoreError::Backend("no ZooKeeper endpoint configured".to_string()));
        }
        if config.user.is_some() {
            tracing::warn!("ZooKeeper digest authentication is not supported, ignoring credentials");
        }

        Self::connect_cluster(&cluster).await
    }
}
