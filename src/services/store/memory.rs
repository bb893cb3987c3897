use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};

use super::{Connect, KvPair, KvStore, StoreError, dir_prefix, fold_children};
use crate::config::Config;

// 值与版本号
#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    version: u64,
}

/// 基于 DashMap 的内存键值存储，按 etcd 的扁平键空间语义工作。
/// 仅在测试或启用 `testing` feature 时编译
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    // 被注入列举失败的目录
    failing_dirs: Arc<DashSet<String>>,
    revision: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入初始数据，不计入写入次数
    pub fn seed(&self, key: &str, value: &str) {
        let version = self.next_revision();
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.as_bytes().to_vec(),
                version,
            },
        );
    }

    /// 之后对该目录的 `list` 调用都会失败
    pub fn fail_list(&self, dir: &str) {
        self.failing_dirs.insert(dir_prefix(dir));
    }

    /// 通过 `put`/`atomic_put` 成功写入的次数
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.entries
            .get(key)
            .map(|entry| String::from_utf8_lossy(&entry.value).into_owned())
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[tonic::async_trait]
impl KvStore for MemoryStore {
    async fn list(&self, dir: &str) -> Result<Vec<KvPair>, StoreError> {
        if self.failing_dirs.contains(&dir_prefix(dir)) {
            return Err(StoreError::Backend(format!("injected list failure for {dir}")));
        }

        let entries: Vec<KvPair> = self
            .entries
            .iter()
            .map(|entry| KvPair {
                key: entry.key().clone(),
                value: entry.value().value.clone(),
                version: entry.value().version,
                dir: false,
            })
            .collect();

        Ok(fold_children(dir, entries))
    }

    async fn get(&self, key: &str) -> Result<KvPair, StoreError> {
        self.entries
            .get(key)
            .map(|entry| KvPair {
                key: key.to_string(),
                value: entry.value.clone(),
                version: entry.version,
                dir: false,
            })
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let version = self.next_revision();
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                version,
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn atomic_put(
        &self,
        key: &str,
        value: &[u8],
        previous: &KvPair,
    ) -> Result<(), StoreError> {
        // 持有分片写锁完成比较和写入
        let mut entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| StoreError::Conflict(key.to_string()))?;
        if entry.version != previous.version {
            return Err(StoreError::Conflict(key.to_string()));
        }

        entry.value = value.to_vec();
        entry.version = self.next_revision();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tonic::async_trait]
impl Connect for MemoryStore {
    async fn connect(_config: &Config) -> Result<Self, StoreError> {
        Ok(Self::new())
    }
}
