pub mod registry;
pub mod store;

pub use registry::{
    KvRegistry, Metadata, Registry, RegistryAdminService, RegistryError, Service, ServiceState,
    create_registry,
};
pub use store::{KvPair, KvStore, StoreError};
