use std::borrow::Cow;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

// 服务实例状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Active,
    Inactive,
    /// 元数据无法解析或状态值未知
    Unavailable,
}

impl ServiceState {
    pub fn parse(value: &str) -> Self {
        match value {
            "active" => Self::Active,
            "inactive" => Self::Inactive,
            _ => Self::Unavailable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Unavailable => "n/a",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// 服务实例记录，每次拉取时重新构建
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub address: String,
    /// 存储中的原始值
    pub metadata: String,
    pub state: ServiceState,
    pub group: String,
}

/// 由 `(name, address)` 推导出的实例 ID：`base64(name@address)`。
///
/// 名称或地址中的 `%` 与 `@` 会先做百分号转义，保证不同的组合不会得到相同的 ID。
pub fn service_id(name: &str, address: &str) -> String {
    let raw = format!("{}@{}", escape_id_part(name), escape_id_part(address));
    STANDARD.encode(raw)
}

fn escape_id_part(part: &str) -> Cow<'_, str> {
    if part.contains(['%', '@']) {
        Cow::Owned(part.replace('%', "%25").replace('@', "%40"))
    } else {
        Cow::Borrowed(part)
    }
}
