use tonic::Status;

use super::metadata::MetadataError;
use crate::services::store::StoreError;

/// 注册中心操作错误类型
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry not initialized")]
    NotInitialized,
    #[error("Service instance not found: {0}")]
    KeyNotFound(String),
    #[error("Service instance modified concurrently: {0}")]
    Conflict(String),
    #[error("Metadata decode error: {0}")]
    Decode(#[from] MetadataError),
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::KeyNotFound(key) => Self::KeyNotFound(key),
            StoreError::Conflict(key) => Self::Conflict(key),
            other => Self::Store(other),
        }
    }
}

impl From<RegistryError> for Status {
    fn from(err: RegistryError) -> Self {
        match &err {
            RegistryError::NotInitialized => Status::unavailable(err.to_string()),
            RegistryError::KeyNotFound(_) => Status::not_found(err.to_string()),
            RegistryError::Conflict(_) => Status::aborted(err.to_string()),
            RegistryError::Decode(_) => Status::invalid_argument(err.to_string()),
            RegistryError::Store(_) => Status::internal(err.to_string()),
        }
    }
}
