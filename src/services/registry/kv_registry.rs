use std::collections::HashMap;

use super::Registry;
use super::error::RegistryError;
use super::metadata::{Metadata, MetadataError};
use super::types::{Service, ServiceState, service_id};
use crate::config::Config;
use crate::services::store::{Connect, KvPair, KvStore};

/// 基于键值存储的注册中心适配器。
///
/// 键布局为 `{base_path}{service_name}/{address}`，值为 URL query string，
/// 其中 `state` 与 `group` 字段被识别，其余字段原样保留。
pub struct KvRegistry<S> {
    config: Config,
    store: Option<S>,
}

impl<S: KvStore> KvRegistry<S> {
    /// 创建未连接的适配器，需要调用 `init_registry` 后才能使用
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
        }
    }

    /// 使用已建立的存储连接创建适配器
    pub fn with_store(config: Config, store: S) -> Self {
        Self {
            config,
            store: Some(store),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.config.service_base_url
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_some()
    }

    pub fn instance_key(&self, name: &str, address: &str) -> String {
        format!("{}{}/{}", self.base_path(), name.trim_matches('/'), address)
    }

    fn store(&self) -> Result<&S, RegistryError> {
        self.store.as_ref().ok_or(RegistryError::NotInitialized)
    }

    // 从实例键和值中还原服务记录
    fn parse_instance(&self, node: &KvPair) -> Option<Service> {
        let key = node.key.as_str();
        let Some(relative) = key.strip_prefix(self.base_path()) else {
            tracing::warn!(key = %key, base_path = %self.base_path(), "Instance key outside base path, skipping");
            return None;
        };
        let (name, address) = relative.rsplit_once('/')?;
        if name.is_empty() || address.is_empty() {
            return None;
        }

        let raw = String::from_utf8_lossy(&node.value).into_owned();
        let (state, group) = match Metadata::decode(&raw) {
            Ok(metadata) => (metadata.state(), metadata.group()),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to parse service metadata");
                (ServiceState::Unavailable, String::new())
            }
        };

        Some(Service {
            id: service_id(name, address),
            name: name.to_string(),
            address: address.to_string(),
            metadata: raw,
            state,
            group,
        })
    }

    // 读取-修改-写回，写回时校验版本
    async fn set_state(
        &self,
        name: &str,
        address: &str,
        state: ServiceState,
    ) -> Result<(), RegistryError> {
        let store = self.store()?;
        let key = self.instance_key(name, address);
        let current = store.get(&key).await?;

        let raw = std::str::from_utf8(&current.value).map_err(|_| MetadataError::InvalidUtf8 {
            component: String::from_utf8_lossy(&current.value).into_owned(),
        })?;
        let mut metadata = Metadata::decode(raw).inspect_err(|e| {
            tracing::warn!(key = %key, error = %e, "Refusing to update unparseable metadata");
        })?;

        metadata.set(Metadata::STATE, state.as_str());
        store
            .atomic_put(&current.key, metadata.encode().as_bytes(), &current)
            .await
            .inspect_err(|e| {
                tracing::warn!(key = %key, error = %e, "Failed to write service state");
            })?;

        tracing::info!(
            service_name = %name,
            address = %address,
            state = %state,
            "Updated service state"
        );
        Ok(())
    }
}

#[tonic::async_trait]
impl<S: Connect> Registry for KvRegistry<S> {
    async fn init_registry(&mut self) -> Result<(), RegistryError> {
        match S::connect(&self.config).await {
            Ok(store) => {
                tracing::info!(
                    registry_type = %self.config.registry_type,
                    registry_url = %self.config.registry_url,
                    "Connected to registry backend"
                );
                self.store = Some(store);
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    registry_type = %self.config.registry_type,
                    registry_url = %self.config.registry_url,
                    error = %e,
                    "Cannot create registry store"
                );
                Err(e.into())
            }
        }
    }

    async fn fetch_services(&self) -> Vec<Service> {
        let store = match self.store() {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot fetch services");
                return Vec::new();
            }
        };

        let mut services: HashMap<String, Service> = HashMap::new();

        let service_dirs = match store.list(self.base_path()).await {
            Ok(dirs) => dirs,
            Err(e) => {
                tracing::error!(base_path = %self.base_path(), error = %e, "Failed to list services");
                return Vec::new();
            }
        };

        for dir in service_dirs {
            if !dir.dir {
                continue;
            }

            // 服务名可以包含 '/'，逐级下探直到实例节点
            let mut pending = vec![dir.key];
            while let Some(dir_key) = pending.pop() {
                // 单个目录列举失败不影响其它服务
                let nodes = match store.list(&dir_key).await {
                    Ok(nodes) => nodes,
                    Err(e) => {
                        tracing::warn!(key = %dir_key, error = %e, "Failed to list service instances, skipping");
                        continue;
                    }
                };

                for node in nodes {
                    if node.dir {
                        pending.push(node.key);
                        continue;
                    }

                    if let Some(service) = self.parse_instance(&node) {
                        tracing::debug!(
                            service_id = %service.id,
                            service_name = %service.name,
                            address = %service.address,
                            state = %service.state,
                            "Fetched service instance"
                        );
                        services.insert(service.id.clone(), service);
                    }
                }
            }
        }

        services.into_values().collect()
    }

    async fn deactivate_service(&self, name: &str, address: &str) -> Result<(), RegistryError> {
        self.set_state(name, address, ServiceState::Inactive).await
    }

    async fn activate_service(&self, name: &str, address: &str) -> Result<(), RegistryError> {
        self.set_state(name, address, ServiceState::Active).await
    }

    async fn update_metadata(
        &self,
        name: &str,
        address: &str,
        metadata: &str,
    ) -> Result<(), RegistryError> {
        let store = self.store()?;
        let key = self.instance_key(name, address);
        store.put(&key, metadata.as_bytes()).await?;

        tracing::info!(service_name = %name, address = %address, "Updated service metadata");
        Ok(())
    }
}
