use super::Registry;
use super::kv_registry::KvRegistry;
use crate::config::{Config, RegistryType};
use crate::services::store::{ConsulStore, EtcdStore, ZookeeperStore};

pub type EtcdRegistry = KvRegistry<EtcdStore>;
pub type ConsulRegistry = KvRegistry<ConsulStore>;
pub type ZookeeperRegistry = KvRegistry<ZookeeperStore>;

/// 根据配置中的类型标签选择后端，返回尚未连接的注册中心
pub fn create_registry(config: &Config) -> Box<dyn Registry> {
    tracing::debug!(registry_type = %config.registry_type, "Selecting registry backend");

    match config.registry_type {
        RegistryType::Zookeeper => Box::new(ZookeeperRegistry::new(config.clone())),
        RegistryType::Etcd => Box::new(EtcdRegistry::new(config.clone())),
        RegistryType::Consul => Box::new(ConsulRegistry::new(config.clone())),
    }
}
