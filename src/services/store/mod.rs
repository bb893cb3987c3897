// 键值存储后端
//
// 所有注册中心后端都通过同一套最小接口驱动：
// - `list`：目录的直接子节点
// - `get` / `put`：单键读取与无条件写入
// - `atomic_put`：以先前读取到的版本号为条件的写入

pub mod consul;
pub mod error;
pub mod etcd;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod zookeeper;

use std::collections::BTreeMap;

use crate::config::Config;

pub use consul::ConsulStore;
pub use error::StoreError;
pub use etcd::EtcdStore;
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryStore;
pub use zookeeper::ZookeeperStore;

/// 存储中的一个键值对
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
    /// 后端原生版本号（etcd mod_revision / Consul ModifyIndex / ZooKeeper version）
    pub version: u64,
    /// 是否存在下级节点。扁平键空间中合成的目录项值为空
    pub dir: bool,
}

#[tonic::async_trait]
pub trait KvStore: Send + Sync {
    /// 列出目录的直接子节点，带有下级键的子节点标记为 `dir`
    async fn list(&self, dir: &str) -> Result<Vec<KvPair>, StoreError>;

    async fn get(&self, key: &str) -> Result<KvPair, StoreError>;

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// 仅当键的版本仍为 `previous.version` 时写入，否则返回 `StoreError::Conflict`
    async fn atomic_put(
        &self,
        key: &str,
        value: &[u8],
        previous: &KvPair,
    ) -> Result<(), StoreError>;
}

/// 根据进程配置建立后端连接
#[tonic::async_trait]
pub trait Connect: KvStore + Sized + 'static {
    async fn connect(config: &Config) -> Result<Self, StoreError>;
}

// 目录键统一以 '/' 结尾
pub(crate) fn dir_prefix(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}

// 将扁平键空间（etcd、Consul）折叠为目录的直接子节点
pub(crate) fn fold_children<I>(dir: &str, entries: I) -> Vec<KvPair>
where
    I: IntoIterator<Item = KvPair>,
{
    let prefix = dir_prefix(dir);
    let mut children: BTreeMap<String, KvPair> = BTreeMap::new();

    for entry in entries {
        let Some(rest) = entry.key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        match rest.split_once('/') {
            None => {
                // 同名目录项已存在时保留目录标记
                let dir = children.get(&entry.key).is_some_and(|child| child.dir);
                children.insert(entry.key.clone(), KvPair { dir, ..entry });
            }
            Some((segment, _)) => {
                let key = format!("{prefix}{segment}");
                children
                    .entry(key.clone())
                    .and_modify(|child| child.dir = true)
                    .or_insert_with(|| KvPair {
                        key,
                        value: Vec::new(),
                        version: 0,
                        dir: true,
                    });
            }
        }
    }

    children.into_values().collect()
}
