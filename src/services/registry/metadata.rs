use std::collections::BTreeMap;

use thiserror::Error;

use super::types::ServiceState;

/// 元数据解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("invalid semicolon separator in query: {pair}")]
    Semicolon { pair: String },

    #[error("invalid URL escape: {escape}")]
    InvalidEscape { escape: String },

    #[error("invalid UTF-8 in query component: {component}")]
    InvalidUtf8 { component: String },
}

/// 以 URL query string 编码存储的实例元数据。
///
/// 同一个键可以出现多次，`get` 取第一个值，`set` 替换全部值；
/// 编码时按键排序，未识别的字段原样保留。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    values: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub const STATE: &'static str = "state";
    pub const GROUP: &'static str = "group";

    pub fn new() -> Self {
        Self::default()
    }

    /// 严格解析：分号分隔符、非法的 `%` 转义以及非 UTF-8 内容都会报错
    pub fn decode(raw: &str) -> Result<Self, MetadataError> {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for pair in raw.split('&') {
            if pair.contains(';') {
                return Err(MetadataError::Semicolon {
                    pair: pair.to_string(),
                });
            }
            if pair.is_empty() {
                continue;
            }

            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = unescape(key)?;
            let value = unescape(value)?;
            values.entry(key).or_default().push(value);
        }

        Ok(Self { values })
    }

    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        for (key, values) in &self.values {
            for value in values {
                if !encoded.is_empty() {
                    encoded.push('&');
                }
                encoded.push_str(&escape(key));
                encoded.push('=');
                encoded.push_str(&escape(value));
            }
        }
        encoded
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), vec![value.to_string()]);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 缺失或为空的 `state` 视为 active
    pub fn state(&self) -> ServiceState {
        match self.get(Self::STATE) {
            None | Some("") => ServiceState::Active,
            Some(state) => ServiceState::parse(state),
        }
    }

    pub fn group(&self) -> String {
        self.get(Self::GROUP).unwrap_or_default().to_string()
    }
}

// 空格写作 '+'，与解码规则对称
fn escape(component: &str) -> String {
    urlencoding::encode(component).replace("%20", "+")
}

fn unescape(component: &str) -> Result<String, MetadataError> {
    for (index, _) in component.match_indices('%') {
        let valid = component
            .get(index + 1..index + 3)
            .is_some_and(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()));
        if !valid {
            return Err(MetadataError::InvalidEscape {
                escape: component[index..].chars().take(3).collect(),
            });
        }
    }

    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| MetadataError::InvalidUtf8 {
            component: component.to_string(),
        })
}
