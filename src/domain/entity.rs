//! 实体视图模型（Service / Tool / Project）
//!
//! 每次聚合调用都重新构造，不做持久化

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::container::{NetworkInfo, PortMap, RuntimeState};

/// 实体族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Service,
    Tool,
    Project,
}

impl Family {
    /// 配置键前缀（`SERVICE_REDIS_ENABLE` 中的 `SERVICE`）
    pub fn config_prefix(&self) -> Option<&'static str> {
        match self {
            Family::Service => Some("SERVICE"),
            Family::Tool => Some("TOOLS"),
            Family::Project => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Family::Service => "service",
            Family::Tool => "tool",
            Family::Project => "project",
        }
    }
}

/// 日志位置（容器内路径 + 宿主机相对路径）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLocation {
    pub container_path: String,
    pub host_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// 日志集合：`service` / `web_access` / `web_error` / `php_error` -> 位置
pub type LogSet = BTreeMap<String, LogLocation>;

/// Service / Tool / Project 的公共形状
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedEntity {
    pub name: String,
    pub container_name: String,
    pub enabled: bool,
    pub version: Option<String>,
    pub url: Option<String>,
    pub domain: Option<String>,
    pub dns_resolved: bool,
    pub runtime_state: RuntimeState,
    pub running: bool,
    pub ports: PortMap,
    pub network: Option<NetworkInfo>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, String>,
    pub logs: Option<LogSet>,
}

/// 项目运行时语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageKind {
    Php,
    Nodejs,
    Python,
    Ruby,
    Golang,
}

impl LanguageKind {
    pub const ALL: [LanguageKind; 5] = [
        LanguageKind::Php,
        LanguageKind::Nodejs,
        LanguageKind::Python,
        LanguageKind::Ruby,
        LanguageKind::Golang,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            LanguageKind::Php => "php",
            LanguageKind::Nodejs => "nodejs",
            LanguageKind::Python => "python",
            LanguageKind::Ruby => "ruby",
            LanguageKind::Golang => "golang",
        }
    }
}

/// 项目运行时配置块（五选一）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeLanguage {
    pub kind: LanguageKind,
    pub version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

/// `.stackvo/` 下的自定义配置检测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationOverrides {
    /// `custom` / `default`
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub has_custom: bool,
    pub files: Vec<String>,
}

impl ConfigurationOverrides {
    pub fn from_files(files: Vec<String>) -> Self {
        let has_custom = !files.is_empty();
        Self {
            kind: if has_custom { "custom" } else { "default" },
            has_custom,
            files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectUrls {
    pub http: String,
    pub https: String,
    pub primary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPath {
    pub container_path: String,
    pub host_path: String,
}

/// 完整的项目视图
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    #[serde(flatten)]
    pub entity: NamedEntity,
    pub document_root: Option<String>,
    pub webserver: Option<String>,
    pub runtime_language: RuntimeLanguage,
    pub ssl_enabled: bool,
    pub urls: Option<ProjectUrls>,
    pub configuration_overrides: ConfigurationOverrides,
    pub project_path: ProjectPath,
    pub error: Option<String>,
}

/// 清单缺失或损坏的项目：只保留目录名和错误信息
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedProject {
    pub name: String,
    pub domain: Option<String>,
    pub webserver: Option<String>,
    pub document_root: Option<String>,
    pub runtime_language: Option<RuntimeLanguage>,
    pub runtime_state: Option<RuntimeState>,
    pub running: bool,
    pub error: String,
}

impl DegradedProject {
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: None,
            webserver: None,
            document_root: None,
            runtime_language: None,
            runtime_state: None,
            running: false,
            error: error.into(),
        }
    }
}

/// 项目列表中的一项
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProjectEntry {
    Ready(Box<ProjectView>),
    Degraded(DegradedProject),
}

/// 排序契约：运行中优先 -> 已启用优先 -> 名称升序（按字节序）
pub trait Ranked {
    fn is_running(&self) -> bool;
    fn is_enabled(&self) -> bool;
    fn rank_name(&self) -> &str;
}

impl Ranked for NamedEntity {
    fn is_running(&self) -> bool {
        self.running
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn rank_name(&self) -> &str {
        &self.name
    }
}

impl Ranked for ProjectEntry {
    fn is_running(&self) -> bool {
        match self {
            ProjectEntry::Ready(p) => p.entity.running,
            ProjectEntry::Degraded(_) => false,
        }
    }

    fn is_enabled(&self) -> bool {
        match self {
            ProjectEntry::Ready(p) => p.entity.enabled,
            ProjectEntry::Degraded(_) => false,
        }
    }

    fn rank_name(&self) -> &str {
        match self {
            ProjectEntry::Ready(p) => &p.entity.name,
            ProjectEntry::Degraded(d) => &d.name,
        }
    }
}

pub fn compare_ranked<T: Ranked>(a: &T, b: &T) -> Ordering {
    b.is_running()
        .cmp(&a.is_running())
        .then_with(|| b.is_enabled().cmp(&a.is_enabled()))
        .then_with(|| a.rank_name().cmp(b.rank_name()))
}

pub fn sort_ranked<T: Ranked>(items: &mut [T]) {
    items.sort_by(compare_ranked);
}
