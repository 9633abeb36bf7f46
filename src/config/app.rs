//! 结构化应用配置（JSON），支持点路径查询
//!
//! 与扁平的 `.env` 命名空间分开：`server.port`、`cache.state_ttl` 这类嵌套键放在这里。

use serde_json::Value;
use std::path::Path;

use super::store::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    root: Value,
}

impl AppConfig {
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let root = serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self { root })
    }

    /// 点路径查询：`cache.state_ttl`
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.root, |node, segment| match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// 标量值按字符串读出（数字、布尔也转成字符串）
    pub fn get_str(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            _ => None,
        }
    }
}
