use std::sync::Arc;

use tonic::{Request, Response, Status};

use super::Registry;
use super::types::Service;
use crate::config::Config;
use crate::registry::{
    ListServicesRequest, ListServicesResponse, OperationResponse, ServiceKey, ServiceRecord,
    UpdateMetadataRequest, registry_admin_server::RegistryAdmin,
};

// 注册中心管理服务，操作委托给启动时选定的后端
pub struct RegistryAdminService {
    pub registry: Arc<dyn Registry>,
    pub config: Config,
}

impl RegistryAdminService {
    pub fn new(registry: Arc<dyn Registry>, config: Config) -> Self {
        Self { registry, config }
    }

    fn authorize(&self, api_key: &str) -> Result<(), Status> {
        if self.config.validate_token(api_key) {
            Ok(())
        } else {
            Err(Status::unauthenticated("Invalid token"))
        }
    }
}

impl From<Service> for ServiceRecord {
    fn from(service: Service) -> Self {
        Self {
            id: service.id,
            name: service.name,
            address: service.address,
            metadata: service.metadata,
            state: service.state.as_str().to_string(),
            group: service.group,
        }
    }
}

fn success(message: &str) -> Response<OperationResponse> {
    Response::new(OperationResponse {
        success: true,
        message: message.to_string(),
    })
}

// 为结构体实现 gRPC 服务 trait
#[tonic::async_trait]
impl RegistryAdmin for RegistryAdminService {
    async fn list_services(
        &self,
        request: Request<ListServicesRequest>,
    ) -> Result<Response<ListServicesResponse>, Status> {
        let req = request.into_inner();
        self.authorize(&req.api_key)?;

        let services: Vec<ServiceRecord> = self
            .registry
            .fetch_services()
            .await
            .into_iter()
            .map(ServiceRecord::from)
            .collect();

        tracing::debug!(count = services.len(), "Listing services");
        Ok(Response::new(ListServicesResponse { services }))
    }

    async fn activate_service(
        &self,
        request: Request<ServiceKey>,
    ) -> Result<Response<OperationResponse>, Status> {
        let req = request.into_inner();
        self.authorize(&req.api_key)?;

        self.registry
            .activate_service(&req.name, &req.address)
            .await?;
        Ok(success("Service activated"))
    }

    async fn deactivate_service(
        &self,
        request: Request<ServiceKey>,
    ) -> Result<Response<OperationResponse>, Status> {
        let req = request.into_inner();
        self.authorize(&req.api_key)?;

        self.registry
            .deactivate_service(&req.name, &req.address)
            .await?;
        Ok(success("Service deactivated"))
    }

    async fn update_metadata(
        &self,
        request: Request<UpdateMetadataRequest>,
    ) -> Result<Response<OperationResponse>, Status> {
        let req = request.into_inner();
        self.authorize(&req.api_key)?;

        self.registry
            .update_metadata(&req.name, &req.address, &req.metadata)
            .await?;
        Ok(success("Metadata updated"))
    }
}
