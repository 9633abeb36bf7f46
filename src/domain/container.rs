//! 容器相关领域模型
//!
//! `Identifier` / `ContainerName` 是进入命令行构造的唯一入口：
//! 只有通过白名单校验 (`^[a-zA-Z0-9_-]+$`) 的字符串才能被包装。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 标识符校验失败
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier '{0}': only letters, digits, '-' and '_' are allowed")]
pub struct InvalidIdentifier(pub String);

/// 经过白名单校验的外部标识符（服务名、项目名）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// 校验并包装标识符
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        if is_allowed(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidIdentifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 容器名：前缀 + 规范名（如 `stackvo-redis`）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContainerName(String);

impl ContainerName {
    /// 按命名约定构造容器名
    ///
    /// 已经带前缀的名字原样使用（`stackvo-mysql` 与 `mysql` 指向同一个容器）
    pub fn for_entity(prefix: &str, id: &Identifier) -> Result<Self, InvalidIdentifier> {
        let full = if id.as_str().starts_with(prefix) {
            id.as_str().to_string()
        } else {
            format!("{}{}", prefix, id.as_str())
        };
        Self::parse(&full)
    }

    /// 校验完整容器名（来自 `docker ps` 输出等）
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        if is_allowed(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidIdentifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 去掉前缀后的短名（compose 服务名）
    pub fn short_name<'a>(&'a self, prefix: &str) -> &'a str {
        self.0.strip_prefix(prefix).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_allowed(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// 容器运行状态（由容器运行时观测，不做假设）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeState {
    NotCreated,
    Stopped,
    Running,
}

impl RuntimeState {
    pub fn exists(&self) -> bool {
        !matches!(self, RuntimeState::NotCreated)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RuntimeState::Running)
    }
}

/// 端口绑定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    /// 容器内端口（去掉 `/tcp` 后缀）
    pub docker_port: String,
    #[serde(rename = "hostAddress")]
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
    pub exposed: bool,
}

/// 端口映射：`80/tcp` -> 绑定信息
pub type PortMap = BTreeMap<String, PortBinding>;

/// 容器网络信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub ip_address: Option<String>,
    #[serde(rename = "networkName")]
    pub network: Option<String>,
    pub gateway: Option<String>,
}

/// `docker ps` 中的一条容器记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub name: String,
    pub state: String,
    pub image: String,
    pub created_at: String,
}

/// 单个容器的资源占用采样
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub name: String,
    pub cpu_percent: f64,
    pub memory_used_bytes: f64,
    pub memory_percent: f64,
    pub net_input_bytes: f64,
    pub net_output_bytes: f64,
}

/// `docker system df` 汇总（镜像、容器、卷、构建缓存之和）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub size_bytes: f64,
    pub reclaimable_bytes: f64,
}

/// 可对容器执行的生命周期动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
}

impl ContainerAction {
    /// docker 子命令
    pub fn verb(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
        }
    }
}

/// 变更类命令的结果：是否成功 + 原始输出（用于诊断）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub ok: bool,
    pub output: String,
}

impl CommandOutcome {
    /// 运行时报告容器不存在
    pub fn is_missing_container(&self) -> bool {
        !self.ok && self.output.contains("No such container")
    }
}
