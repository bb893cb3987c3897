use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "./config.json";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:50051";

/// 配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File error: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid environment override: {0}")]
    Env(#[from] envy::Error),

    #[error("unsupported registry: {0}")]
    UnsupportedRegistry(String),
}

impl ConfigError {
    /// 启动失败时的进程退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::UnsupportedRegistry(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryType {
    Zookeeper,
    Etcd,
    Consul,
}

impl FromStr for RegistryType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zookeeper" => Ok(RegistryType::Zookeeper),
            "etcd" => Ok(RegistryType::Etcd),
            "consul" => Ok(RegistryType::Consul),
            other => Err(ConfigError::UnsupportedRegistry(other.to_string())),
        }
    }
}

impl fmt::Display for RegistryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryType::Zookeeper => write!(f, "zookeeper"),
            RegistryType::Etcd => write!(f, "etcd"),
            RegistryType::Consul => write!(f, "consul"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub tokens: Vec<String>,
}

// 配置文件的原始结构，registry_type 在校验阶段才解析
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    registry_type: String,
    #[serde(default)]
    registry_url: String,
    #[serde(default)]
    service_base_url: String,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    listen_addr: Option<String>,
    #[serde(default)]
    security: SecurityConfig,
}

/// 环境变量覆盖项，对应 `REGISTRY_URL`、`REGISTRY_SERVICE_BASE_URL` 等
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvOverrides {
    pub url: Option<String>,
    pub service_base_url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub listen_addr: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed("REGISTRY_").from_env::<EnvOverrides>()?)
    }
}

/// 进程配置，启动时加载一次，之后只读
#[derive(Debug, Clone)]
pub struct Config {
    pub registry_type: RegistryType,
    pub registry_url: String,
    /// 始终以 '/' 结尾
    pub service_base_url: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub listen_addr: String,
    pub security: SecurityConfig,
}

impl Config {
    /// 加载 `.env`，读取 `REGISTRY_CONFIG` 指定的配置文件（默认 `./config.json`）并应用环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }

        let path = std::env::var("REGISTRY_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let overrides = EnvOverrides::from_env()?;
        Self::from_file_with_overrides(path, &overrides)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_overrides(path, &EnvOverrides::default())
    }

    /// `.toml` 扩展名按 TOML 解析，其余按 JSON 解析
    pub fn from_file_with_overrides(
        path: impl AsRef<Path>,
        overrides: &EnvOverrides,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let raw: RawConfig = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        Self::from_raw(raw, overrides)
    }

    pub fn parse_json(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(content)?;
        Self::from_raw(raw, &EnvOverrides::default())
    }

    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        Self::from_raw(raw, &EnvOverrides::default())
    }

    fn from_raw(raw: RawConfig, overrides: &EnvOverrides) -> Result<Self, ConfigError> {
        let registry_type = raw.registry_type.parse::<RegistryType>()?;

        let mut service_base_url = overrides
            .service_base_url
            .clone()
            .unwrap_or(raw.service_base_url);
        if !service_base_url.ends_with('/') {
            service_base_url.push('/');
        }

        Ok(Config {
            registry_type,
            registry_url: overrides.url.clone().unwrap_or(raw.registry_url),
            service_base_url,
            host: raw.host,
            port: raw.port,
            user: overrides.user.clone().or(raw.user),
            password: overrides.password.clone().or(raw.password),
            listen_addr: overrides
                .listen_addr
                .clone()
                .or(raw.listen_addr)
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            security: raw.security,
        })
    }

    /// 后端地址列表：`registry_url` 按逗号拆分，为空时退回到 `host:port`
    pub fn endpoints(&self) -> Vec<String> {
        let endpoints: Vec<String> = self
            .registry_url
            .split(',')
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .map(str::to_string)
            .collect();
        if !endpoints.is_empty() {
            return endpoints;
        }

        match (&self.host, self.port) {
            (Some(host), Some(port)) => vec![format!("{host}:{port}")],
            (Some(host), None) => vec![host.clone()],
            _ => Vec::new(),
        }
    }

    /// 未配置 token 时不做校验
    pub fn validate_token(&self, token: &str) -> bool {
        self.security.tokens.is_empty() || self.security.tokens.iter().any(|t| t == token)
    }
}
