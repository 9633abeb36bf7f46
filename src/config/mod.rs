//! 配置模块
//!
//! `.env` 扁平配置、结构化应用配置、项目清单与运行参数

pub mod app;
pub mod env;
pub mod manifest;
pub mod store;

pub use app::AppConfig;
pub use env::{CacheSettings, EnvConfig, RuntimeSettings};
pub use manifest::{ManifestError, ProjectManifest};
pub use store::{ConfigError, ConfigStore, EnvWriter, SupportedLanguages};
