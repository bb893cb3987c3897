// 基于 HTTP API 的 Consul KV 存储

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{Connect, KvPair, KvStore, StoreError, dir_prefix, fold_children};
use crate::config::Config;

// /v1/kv 返回的条目
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulKvEntry {
    key: String,
    value: Option<String>,
    modify_index: u64,
}

/// Consul KV 后端
#[derive(Debug, Clone)]
pub struct ConsulStore {
    http_client: HttpClient,
    base_url: String,
    user: Option<String>,
    password: Option<String>,
}

impl ConsulStore {
    pub fn new(endpoint: &str, user: Option<String>, password: Option<String>) -> Self {
        // 确保地址带有协议
        let base_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", endpoint.trim_end_matches('/'))
        };

        Self {
            http_client: HttpClient::new(),
            base_url,
            user,
            password,
        }
    }

    // Consul 的键没有前导 '/'
    fn kv_url(&self, key: &str) -> String {
        format!("{}/v1/kv/{}", self.base_url, key.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.user {
            Some(user) => request.basic_auth(user, self.password.as_ref()),
            None => request,
        }
    }

    // 按调用方的写法还原键的前导 '/'
    fn to_pair(requested: &str, entry: ConsulKvEntry) -> Result<KvPair, StoreError> {
        let value = match entry.value {
            Some(encoded) => STANDARD.decode(encoded).map_err(|e| {
                StoreError::Consul(format!("invalid base64 value for {}: {e}", entry.key))
            })?,
            None => Vec::new(),
        };
        let key = if requested.starts_with('/') {
            format!("/{}", entry.key)
        } else {
            entry.key
        };

        Ok(KvPair {
            key,
            value,
            version: entry.modify_index,
            dir: false,
        })
    }

    async fn read_entries(
        &self,
        request: RequestBuilder,
        requested: &str,
    ) -> Result<Option<Vec<KvPair>>, StoreError> {
        let response = self.authorize(request).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Consul(format!(
                "unexpected status {} reading {requested}",
                response.status()
            )));
        }

        let entries: Vec<ConsulKvEntry> = response.json().await?;
        let pairs = entries
            .into_iter()
            .map(|entry| Self::to_pair(requested, entry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(pairs))
    }

    // PUT 的响应体为 true/false
    async fn write(&self, request: RequestBuilder, key: &str) -> Result<bool, StoreError> {
        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Consul(format!(
                "unexpected status {} writing {key}",
                response.status()
            )));
        }

        let body = response.text().await?;
        Ok(body.trim() == "true")
    }
}

#[tonic::async_trait]
impl KvStore for ConsulStore {
    async fn list(&self, dir: &str) -> Result<Vec<KvPair>, StoreError> {
        let prefix = dir_prefix(dir);
        let request = self
            .http_client
            .get(self.kv_url(&prefix))
            .query(&[("recurse", "true")]);

        // 目录不存在时 Consul 返回 404
        let entries = self.read_entries(request, &prefix).await?.unwrap_or_default();
        Ok(fold_children(&prefix, entries))
    }

    async fn get(&self, key: &str) -> Result<KvPair, StoreError> {
        let request = self.http_client.get(self.kv_url(key));

        self.read_entries(request, key)
            .await?
            .and_then(|entries| entries.into_iter().next())
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let request = self.http_client.put(self.kv_url(key)).body(value.to_vec());

        if self.write(request, key).await? {
            Ok(())
        } else {
            Err(StoreError::Consul(format!("write rejected for {key}")))
        }
    }

    async fn atomic_put(
        &self,
        key: &str,
        value: &[u8],
        previous: &KvPair,
    ) -> Result<(), StoreError> {
        let request = self
            .http_client
            .put(self.kv_url(key))
            .query(&[("cas", previous.version.to_string())])
            .body(value.to_vec());

        if self.write(request, key).await? {
            Ok(())
        } else {
            Err(StoreError::Conflict(key.to_string()))
        }
    }
}

#[tonic::async_trait]
impl Connect for ConsulStore {
    async fn connect(config: &Config) -> Result<Self, StoreError> {
        let endpoint = config
            .endpoints()
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("no Consul endpoint configured".to_string()))?;
        let store = Self::new(&endpoint, config.user.clone(), config.password.clone());

        // 通过查询 leader 验证连通性
        let response = store
            .authorize(
                store
                    .http_client
                    .get(format!("{}/v1/status/leader", store.base_url)),
            )
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StoreError::Consul(format!(
                "agent at {} answered {}",
                store.base_url,
                response.status()
            )));
        }

        Ok(store)
    }
}
