/// 键值存储错误类型
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error("Key was modified concurrently: {0}")]
    Conflict(String),
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),
    #[error("ZooKeeper error: {0}")]
    Zookeeper(#[from] zookeeper_client::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Consul error: {0}")]
    Consul(String),
    #[error("Backend error: {0}")]
    Backend(String),
}
