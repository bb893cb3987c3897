// 注册中心模块
//
// - `types`：服务记录、状态与 ID 生成
// - `metadata`：存储值的 query string 编解码
// - `kv_registry`：所有后端共用的键值适配器
// - `factory`：按配置选择后端
// - `grpc_impl`：管理端 gRPC 服务

pub mod error;
pub mod factory;
pub mod grpc_impl;
pub mod kv_registry;
pub mod metadata;
pub mod types;

pub use error::RegistryError;
pub use factory::{ConsulRegistry, EtcdRegistry, ZookeeperRegistry, create_registry};
pub use grpc_impl::RegistryAdminService;
pub use kv_registry::KvRegistry;
pub use metadata::{Metadata, MetadataError};
pub use types::{Service, ServiceState, service_id};

/// 所有注册中心后端需要实现的能力
#[tonic::async_trait]
pub trait Registry: Send + Sync {
    /// 建立到后端的连接。失败时适配器仍可使用，但后续操作返回 `NotInitialized`
    async fn init_registry(&mut self) -> Result<(), RegistryError>;

    /// 列出基础路径下的所有服务实例，单个服务的列举失败会被跳过
    async fn fetch_services(&self) -> Vec<Service>;

    async fn deactivate_service(&self, name: &str, address: &str) -> Result<(), RegistryError>;

    async fn activate_service(&self, name: &str, address: &str) -> Result<(), RegistryError>;

    /// 原样覆盖实例存储的元数据
    async fn update_metadata(
        &self,
        name: &str,
        address: &str,
        metadata: &str,
    ) -> Result<(), RegistryError>;
}
