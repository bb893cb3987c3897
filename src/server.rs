use std::sync::Arc;

use crate::config::Config;
use crate::registry::registry_admin_server::RegistryAdminServer;
use crate::services::registry::{Registry, RegistryAdminService};
use tonic::transport::Server;

pub async fn start(
    config: Config,
    registry: Arc<dyn Registry>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.listen_addr.parse()?;

    // 创建管理服务实例
    let admin_service = RegistryAdminService::new(registry, config);

    tracing::info!(%addr, "Registry admin server listening");

    Server::builder()
        .add_service(RegistryAdminServer::new(admin_service))
        .serve(addr)
        .await?;

    Ok(())
}
