use std::sync::Arc;

use registry_adapter::config::Config;
use registry_adapter::server;
use registry_adapter::services::registry::create_registry;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

// 使用 RUST_LOG 过滤日志，默认 info
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // 配置错误在任何注册中心操作之前终止进程
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            std::process::exit(e.exit_code());
        }
    };
    tracing::info!(
        registry_type = %config.registry_type,
        service_base_url = %config.service_base_url,
        "Succeeded to read the config"
    );

    let mut registry = create_registry(&config);
    if let Err(e) = registry.init_registry().await {
        tracing::error!(error = %e, "Registry backend unavailable, exiting");
        std::process::exit(3);
    }

    if let Err(e) = server::start(config, Arc::from(registry)).await {
        tracing::error!(error = %e, "Registry admin server failed");
        std::process::exit(4);
    }

    Ok(())
}
