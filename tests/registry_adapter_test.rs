use std::collections::HashSet;
use std::sync::Arc;

use registry_adapter::config::Config;
use registry_adapter::registry::{
    ListServicesRequest, ServiceKey, UpdateMetadataRequest, registry_admin_server::RegistryAdmin,
};
use registry_adapter::services::registry::{
    KvRegistry, Registry, RegistryAdminService, RegistryError, ServiceState, create_registry,
    service_id,
};
use registry_adapter::services::store::{Connect, KvPair, KvStore, MemoryStore, StoreError};
use tonic::{Code, Request};

fn test_config(tokens: &[&str]) -> Config {
    let tokens: Vec<String> = tokens.iter().map(|t| format!("\"{t}\"")).collect();
    Config::parse_json(&format!(
        r#"{{
            "registry_type": "etcd",
            "registry_url": "127.0.0.1:2379",
            "service_base_url": "/rpcx_test",
            "security": {{ "tokens": [{}] }}
        }}"#,
        tokens.join(",")
    ))
    .expect("Failed to parse test config")
}

// 2 个服务 × 2 个地址
fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed("/rpcx_test/Arith/tcp@10.0.0.1:8972", "state=active&group=g1");
    store.seed("/rpcx_test/Arith/tcp@10.0.0.2:8972", "group=g1&tps=100");
    store.seed("/rpcx_test/Echo/tcp@10.0.0.1:8973", "state=inactive");
    store.seed("/rpcx_test/Echo/tcp@10.0.0.2:8973", "");
    store
}

fn registry_with(store: MemoryStore) -> KvRegistry<MemoryStore> {
    KvRegistry::with_store(test_config(&[]), store)
}

#[tokio::test]
async fn test_fetch_services_enumerates_all_instances() {
    let registry = registry_with(seeded_store());

    let services = registry.fetch_services().await;
    assert_eq!(services.len(), 4);

    let ids: HashSet<&str> = services.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids.len(), 4);

    // 结果顺序不固定，按 (name, address) 查找
    let pairs: HashSet<(&str, &str)> = services
        .iter()
        .map(|s| (s.name.as_str(), s.address.as_str()))
        .collect();
    assert!(pairs.contains(&("Arith", "tcp@10.0.0.1:8972")));
    assert!(pairs.contains(&("Arith", "tcp@10.0.0.2:8972")));
    assert!(pairs.contains(&("Echo", "tcp@10.0.0.1:8973")));
    assert!(pairs.contains(&("Echo", "tcp@10.0.0.2:8973")));

    for service in &services {
        assert_eq!(service.id, service_id(&service.name, &service.address));
    }

    let arith = services
        .iter()
        .find(|s| s.address == "tcp@10.0.0.2:8972")
        .unwrap();
    assert_eq!(arith.state, ServiceState::Active);
    assert_eq!(arith.group, "g1");
    assert_eq!(arith.metadata, "group=g1&tps=100");

    let echo = services
        .iter()
        .find(|s| s.address == "tcp@10.0.0.1:8973")
        .unwrap();
    assert_eq!(echo.state, ServiceState::Inactive);
    assert_eq!(echo.group, "");
}

#[tokio::test]
async fn test_fetch_is_stable_across_calls() {
    let registry = registry_with(seeded_store());

    let first: HashSet<String> = registry.fetch_services().await.into_iter().map(|s| s.id).collect();
    let second: HashSet<String> = registry.fetch_services().await.into_iter().map(|s| s.id).collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_fetch_services_with_nested_name() {
    let store = MemoryStore::new();
    store.seed("/rpcx_test/math/Arith/10.0.0.1:80", "state=inactive");
    let registry = registry_with(store);

    let services = registry.fetch_services().await;
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].name, "math/Arith");
    assert_eq!(services[0].address, "10.0.0.1:80");
    assert_eq!(services[0].state, ServiceState::Inactive);
    assert_eq!(services[0].id, service_id("math/Arith", "10.0.0.1:80"));
}

#[tokio::test]
async fn test_deactivate_then_activate() {
    let store = seeded_store();
    let registry = registry_with(store.clone());

    registry
        .deactivate_service("Arith", "tcp@10.0.0.1:8972")
        .await
        .expect("Failed to deactivate");

    let services = registry.fetch_services().await;
    let service = services
        .iter()
        .find(|s| s.name == "Arith" && s.address == "tcp@10.0.0.1:8972")
        .unwrap();
    assert_eq!(service.state, ServiceState::Inactive);
    assert_eq!(service.group, "g1");

    registry
        .activate_service("Arith", "tcp@10.0.0.1:8972")
        .await
        .expect("Failed to activate");

    let services = registry.fetch_services().await;
    let service = services
        .iter()
        .find(|s| s.name == "Arith" && s.address == "tcp@10.0.0.1:8972")
        .unwrap();
    assert_eq!(service.state, ServiceState::Active);
    assert_eq!(store.write_count(), 2);
}

#[tokio::test]
async fn test_state_edit_preserves_extra_fields() {
    let store = seeded_store();
    let registry = registry_with(store.clone());

    registry
        .deactivate_service("Arith", "tcp@10.0.0.2:8972")
        .await
        .unwrap();

    assert_eq!(
        store.value("/rpcx_test/Arith/tcp@10.0.0.2:8972").unwrap(),
        "group=g1&state=inactive&tps=100"
    );
}

#[tokio::test]
async fn test_decode_failure_does_not_write() {
    let store = seeded_store();
    store.seed("/rpcx_test/Broken/10.0.0.9:80", "state=%zz&group=g1");
    let registry = registry_with(store.clone());

    let result = registry.deactivate_service("Broken", "10.0.0.9:80").await;
    assert!(matches!(result, Err(RegistryError::Decode(_))));

    let result = registry.activate_service("Broken", "10.0.0.9:80").await;
    assert!(matches!(result, Err(RegistryError::Decode(_))));

    assert_eq!(store.write_count(), 0);
    assert_eq!(
        store.value("/rpcx_test/Broken/10.0.0.9:80").unwrap(),
        "state=%zz&group=g1"
    );

    // 枚举时无法解析的实例仍然返回，状态为 n/a
    let services = registry.fetch_services().await;
    let broken = services.iter().find(|s| s.name == "Broken").unwrap();
    assert_eq!(broken.state, ServiceState::Unavailable);
}

#[tokio::test]
async fn test_activate_missing_instance() {
    let registry = registry_with(seeded_store());

    let result = registry.activate_service("Arith", "tcp@10.9.9.9:1").await;
    assert!(matches!(result, Err(RegistryError::KeyNotFound(_))));
}

#[tokio::test]
async fn test_partial_enumeration_failure_is_skipped() {
    let store = seeded_store();
    store.fail_list("/rpcx_test/Echo");
    let registry = registry_with(store);

    let services = registry.fetch_services().await;
    assert_eq!(services.len(), 2);
    assert!(services.iter().all(|s| s.name == "Arith"));
}

#[tokio::test]
async fn test_base_path_failure_returns_empty() {
    let store = seeded_store();
    store.fail_list("/rpcx_test/");
    let registry = registry_with(store);

    assert!(registry.fetch_services().await.is_empty());
}

#[tokio::test]
async fn test_update_metadata_overwrites_verbatim() {
    let store = seeded_store();
    let registry = registry_with(store.clone());

    registry
        .update_metadata("Echo", "tcp@10.0.0.2:8973", "state=inactive&weight=5")
        .await
        .unwrap();
    assert_eq!(
        store.value("/rpcx_test/Echo/tcp@10.0.0.2:8973").unwrap(),
        "state=inactive&weight=5"
    );

    // 覆盖不存在的实例会创建该键
    registry
        .update_metadata("NewService", "10.0.0.7:80", "group=g2")
        .await
        .unwrap();
    let services = registry.fetch_services().await;
    let created = services.iter().find(|s| s.name == "NewService").unwrap();
    assert_eq!(created.group, "g2");
    assert_eq!(services.len(), 5);
}

// 在读取之后、写回之前模拟另一个写入者
struct RacingStore {
    inner: MemoryStore,
}

#[tonic::async_trait]
impl KvStore for RacingStore {
    async fn list(&self, dir: &str) -> Result<Vec<KvPair>, StoreError> {
        self.inner.list(dir).await
    }

    async fn get(&self, key: &str) -> Result<KvPair, StoreError> {
        let pair = self.inner.get(key).await?;
        self.inner.put(key, b"state=active&writer=other").await?;
        Ok(pair)
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.inner.put(key, value).await
    }

    async fn atomic_put(
        &self,
        key: &str,
        value: &[u8],
        previous: &KvPair,
    ) -> Result<(), StoreError> {
        self.inner.atomic_put(key, value, previous).await
    }
}

#[tonic::async_trait]
impl Connect for RacingStore {
    async fn connect(_config: &Config) -> Result<Self, StoreError> {
        Err(StoreError::Backend("racing store is built directly".to_string()))
    }
}

#[tokio::test]
async fn test_concurrent_write_is_reported_as_conflict() {
    let inner = seeded_store();
    let registry = KvRegistry::with_store(
        test_config(&[]),
        RacingStore {
            inner: inner.clone(),
        },
    );

    let result = registry.activate_service("Arith", "tcp@10.0.0.1:8972").await;
    assert!(matches!(result, Err(RegistryError::Conflict(_))));
    assert_eq!(
        inner.value("/rpcx_test/Arith/tcp@10.0.0.1:8972").unwrap(),
        "state=active&writer=other"
    );
}

#[tokio::test]
async fn test_uninitialized_registry() {
    let registry = create_registry(&test_config(&[]));

    assert!(registry.fetch_services().await.is_empty());
    let result = registry.deactivate_service("Arith", "tcp@10.0.0.1:8972").await;
    assert!(matches!(result, Err(RegistryError::NotInitialized)));
    let result = registry.update_metadata("Arith", "tcp@10.0.0.1:8972", "").await;
    assert!(matches!(result, Err(RegistryError::NotInitialized)));
}

#[tokio::test]
async fn test_init_registry_connects_store() {
    let mut registry: KvRegistry<MemoryStore> = KvRegistry::new(test_config(&[]));
    assert!(!registry.is_initialized());

    registry.init_registry().await.expect("Failed to init registry");
    assert!(registry.is_initialized());
    assert!(registry.fetch_services().await.is_empty());
}

#[tokio::test]
async fn test_admin_service_round_trip() {
    let store = seeded_store();
    let registry: Arc<dyn Registry> = Arc::new(registry_with(store.clone()));
    let admin = RegistryAdminService::new(registry, test_config(&["secret"]));

    let response = admin
        .list_services(Request::new(ListServicesRequest {
            api_key: "secret".to_string(),
        }))
        .await
        .expect("Failed to list services")
        .into_inner();
    assert_eq!(response.services.len(), 4);
    assert!(
        response
            .services
            .iter()
            .any(|s| s.name == "Echo" && s.state == "inactive")
    );

    let response = admin
        .deactivate_service(Request::new(ServiceKey {
            api_key: "secret".to_string(),
            name: "Echo".to_string(),
            address: "tcp@10.0.0.2:8973".to_string(),
        }))
        .await
        .expect("Failed to deactivate")
        .into_inner();
    assert!(response.success);
    assert_eq!(
        store.value("/rpcx_test/Echo/tcp@10.0.0.2:8973").unwrap(),
        "state=inactive"
    );

    admin
        .update_metadata(Request::new(UpdateMetadataRequest {
            api_key: "secret".to_string(),
            name: "Echo".to_string(),
            address: "tcp@10.0.0.2:8973".to_string(),
            metadata: "group=g3".to_string(),
        }))
        .await
        .expect("Failed to update metadata");
    assert_eq!(
        store.value("/rpcx_test/Echo/tcp@10.0.0.2:8973").unwrap(),
        "group=g3"
    );
}

#[tokio::test]
async fn test_admin_service_errors() {
    let registry: Arc<dyn Registry> = Arc::new(registry_with(seeded_store()));
    let admin = RegistryAdminService::new(registry, test_config(&["secret"]));

    let status = admin
        .list_services(Request::new(ListServicesRequest {
            api_key: "wrong".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let status = admin
        .activate_service(Request::new(ServiceKey {
            api_key: "secret".to_string(),
            name: "Missing".to_string(),
            address: "10.0.0.1:1".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn test_init_failure_is_returned() {
    let mut registry: KvRegistry<RacingStore> = KvRegistry::new(test_config(&[]));

    let result = registry.init_registry().await;
    assert!(matches!(result, Err(RegistryError::Store(_))));
    assert!(!registry.is_initialized());

    let result = registry.activate_service("Arith", "tcp@10.0.0.1:8972").await;
    assert!(matches!(result, Err(RegistryError::NotInitialized)));
}
