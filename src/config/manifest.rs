//! 项目清单（`stackvo.json`）
//!
//! 运行时配置块是五选一的：`php` / `nodejs` / `python` / `ruby` / `golang`，
//! 解析后统一转换成 [`RuntimeLanguage`]。

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::{LanguageKind, RuntimeLanguage};

pub const MANIFEST_FILE: &str = "stackvo.json";

/// 清单加载失败（对应项目降级显示）
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Configuration file not found")]
    Missing { path: PathBuf },

    #[error("Configuration file is not readable: {0}")]
    Unreadable(String),

    #[error("Configuration file is invalid: {0}")]
    Invalid(String),

    #[error("Configuration must declare exactly one runtime block, found {0}")]
    RuntimeCount(usize),

    #[error("Project name '{0}' must match [a-zA-Z0-9_-]+")]
    InvalidName(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeBlock {
    version: String,
    #[serde(default)]
    extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawManifest {
    name: Option<String>,
    domain: Option<String>,
    webserver: Option<String>,
    document_root: Option<String>,
    php: Option<RuntimeBlock>,
    nodejs: Option<RuntimeBlock>,
    python: Option<RuntimeBlock>,
    ruby: Option<RuntimeBlock>,
    golang: Option<RuntimeBlock>,
}

/// 解析后的项目清单
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectManifest {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub webserver: Option<String>,
    pub document_root: Option<String>,
    pub runtime: RuntimeLanguage,
}

impl ProjectManifest {
    pub fn parse(raw: &str) -> Result<Self, ManifestError> {
        let manifest: RawManifest =
            serde_json::from_str(raw).map_err(|e| ManifestError::Invalid(e.to_string()))?;

        let blocks = [
            (LanguageKind::Php, manifest.php),
            (LanguageKind::Nodejs, manifest.nodejs),
            (LanguageKind::Python, manifest.python),
            (LanguageKind::Ruby, manifest.ruby),
            (LanguageKind::Golang, manifest.golang),
        ];
        let mut declared: Vec<RuntimeLanguage> = blocks
            .into_iter()
            .filter_map(|(kind, block)| {
                block.map(|b| RuntimeLanguage {
                    kind,
                    version: b.version,
                    extensions: b.extensions,
                })
            })
            .collect();

        if declared.len() != 1 {
            return Err(ManifestError::RuntimeCount(declared.len()));
        }
        let runtime = declared.remove(0);

        Ok(Self {
            name: manifest.name.filter(|n| !n.trim().is_empty()),
            domain: manifest.domain.filter(|d| !d.trim().is_empty()),
            webserver: manifest.webserver,
            document_root: manifest.document_root,
            runtime,
        })
    }

    /// 读取 `<project_dir>/stackvo.json`
    pub async fn load(project_dir: &Path) -> Result<Self, ManifestError> {
        let path = project_dir.join(MANIFEST_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::Missing { path })
            }
            Err(e) => return Err(ManifestError::Unreadable(e.to_string())),
        };
        Self::parse(&raw)
    }

    /// Web 服务器类型，缺省 nginx
    pub fn webserver_or_default(&self) -> &str {
        self.webserver.as_deref().unwrap_or("nginx")
    }
}
