//! 运行参数加载
//!
//! 每个设置按顺序解析：进程环境变量 -> `STACKVO_CONFIG_FILE` 指向的 JSON（点路径）-> 内置默认值

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use super::app::AppConfig;

/// 内置默认值
pub mod constants {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_BASE_DIR: &str = "/app";
    pub const CONTAINER_PREFIX: &str = "stackvo-";
    pub const PROJECTS_DIR: &str = "projects";
    pub const LOGS_DIR: &str = "logs";
    pub const GENERATED_DIR: &str = "generated";
    pub const COMPOSE_FILE: &str = "generated/docker-compose.projects.yml";
    pub const COMPOSE_PROJECT: &str = "stackvo";
    pub const DOCKER_BIN: &str = "docker";
    pub const STATE_TTL_SECS: u64 = 5;
    pub const INSPECT_TTL_SECS: u64 = 10;
    pub const INSPECT_TIMEOUT_SECS: u64 = 15;
    pub const BUILD_TIMEOUT_SECS: u64 = 300;
    pub const EXCLUDED_CONTAINERS: &str = "stackvo-ui,stackvo-traefik";
    pub const DEFAULT_TLD_SUFFIX: &str = "stackvo.loc";
}

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 服务监听端口
    pub port: u16,
    /// 安装根目录（`.env`、`projects/`、`generated/` 都相对它）
    pub base_dir: PathBuf,
    /// 扁平配置文件
    pub env_file: PathBuf,
    pub container_prefix: String,
    pub projects_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub compose_file: PathBuf,
    pub compose_project: String,
    pub runtime: RuntimeSettings,
    pub cache: CacheSettings,
}

/// 容器运行时调用参数
#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub docker_bin: String,
    pub inspect_timeout: Duration,
    pub build_timeout: Duration,
    /// 系统级 stop/restart 不触碰的基础设施容器
    pub excluded_containers: Vec<String>,
}

/// 缓存参数
#[derive(Clone, Debug)]
pub struct CacheSettings {
    pub enabled: bool,
    pub state_ttl: Duration,
    pub inspect_ttl: Duration,
}

impl EnvConfig {
    /// 从环境变量（及可选 JSON 配置文件）加载
    pub fn load() -> Self {
        let app = match env::var("STACKVO_CONFIG_FILE") {
            Ok(path) if !path.is_empty() => match AppConfig::load(Path::new(&path)) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring application config file: {}", e);
                    AppConfig::default()
                }
            },
            _ => AppConfig::default(),
        };
        Self::resolve(&Source::Process(&app))
    }

    fn resolve(source: &Source<'_>) -> Self {
        use constants::*;

        let base_dir = source
            .get("STACKVO_BASE_DIR", "paths.base_dir")
            .map(PathBuf::from)
            .unwrap_or_else(default_base_dir);
        let under_base = |key: &str, path: &str, default: &str| -> PathBuf {
            let value = source.get(key, path).unwrap_or_else(|| default.to_string());
            let p = PathBuf::from(value);
            if p.is_absolute() {
                p
            } else {
                base_dir.join(p)
            }
        };

        let env_file = under_base("STACKVO_ENV_FILE", "paths.env_file", ".env");
        let projects_dir = under_base("PROJECTS_DIR", "paths.projects", PROJECTS_DIR);
        let logs_dir = under_base("LOGS_DIR", "paths.logs", LOGS_DIR);
        let generated_dir = under_base("GENERATED_DIR", "paths.generated", GENERATED_DIR);
        let compose_file = under_base("COMPOSE_FILE", "compose.file", COMPOSE_FILE);

        let runtime = RuntimeSettings {
            docker_bin: source
                .get("DOCKER_BIN", "runtime.docker_bin")
                .unwrap_or_else(|| DOCKER_BIN.to_string()),
            inspect_timeout: Duration::from_secs(source.parse_or(
                "INSPECT_TIMEOUT_SECS",
                "runtime.inspect_timeout_secs",
                INSPECT_TIMEOUT_SECS,
            )),
            build_timeout: Duration::from_secs(source.parse_or(
                "BUILD_TIMEOUT_SECS",
                "runtime.build_timeout_secs",
                BUILD_TIMEOUT_SECS,
            )),
            excluded_containers: source
                .get("EXCLUDED_CONTAINERS", "runtime.excluded_containers")
                .unwrap_or_else(|| EXCLUDED_CONTAINERS.to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let cache = CacheSettings {
            enabled: source
                .get("CACHE_ENABLE", "cache.enable")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            state_ttl: Duration::from_secs(source.parse_or(
                "CACHE_STATE_TTL",
                "cache.state_ttl",
                STATE_TTL_SECS,
            )),
            inspect_ttl: Duration::from_secs(source.parse_or(
                "CACHE_INSPECT_TTL",
                "cache.inspect_ttl",
                INSPECT_TTL_SECS,
            )),
        };

        Self {
            port: source.parse_or("PORT", "server.port", DEFAULT_PORT),
            container_prefix: source
                .get("CONTAINER_PREFIX", "runtime.container_prefix")
                .unwrap_or_else(|| CONTAINER_PREFIX.to_string()),
            compose_project: source
                .get("COMPOSE_PROJECT", "compose.project")
                .unwrap_or_else(|| COMPOSE_PROJECT.to_string()),
            base_dir,
            env_file,
            projects_dir,
            logs_dir,
            generated_dir,
            compose_file,
            runtime,
            cache,
        }
    }

    /// 以指定根目录构造（测试与嵌入使用），其余全部取默认值
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base = base_dir.into().to_string_lossy().to_string();
        Self::resolve(&Source::Fixed(vec![("STACKVO_BASE_DIR", base)]))
    }

    /// 构建就绪标志：`generated/projects/<name>/Dockerfile`
    pub fn dockerfile_dir(&self, project: &str) -> PathBuf {
        self.generated_dir.join("projects").join(project)
    }
}

fn default_base_dir() -> PathBuf {
    let app = PathBuf::from(constants::DEFAULT_BASE_DIR);
    if app.is_dir() {
        return app;
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

enum Source<'a> {
    Process(&'a AppConfig),
    Fixed(Vec<(&'static str, String)>),
}

impl Source<'_> {
    fn get(&self, key: &str, path: &str) -> Option<String> {
        match self {
            Source::Process(app) => env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| app.get_str(path)),
            Source::Fixed(values) => values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone()),
        }
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, path: &str, default: T) -> T {
        match self.get(key, path) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Invalid value '{}' for {}, using default", raw, key);
                default
            }),
            None => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_under_base_dir() {
        let config = EnvConfig::with_base_dir("/srv/stackvo");
        assert_eq!(config.port, 3000);
        assert_eq!(config.env_file, PathBuf::from("/srv/stackvo/.env"));
        assert_eq!(config.projects_dir, PathBuf::from("/srv/stackvo/projects"));
        assert_eq!(
            config.compose_file,
            PathBuf::from("/srv/stackvo/generated/docker-compose.projects.yml")
        );
        assert_eq!(config.container_prefix, "stackvo-");
        assert_eq!(config.runtime.excluded_containers, vec!["stackvo-ui", "stackvo-traefik"]);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.state_ttl, Duration::from_secs(5));
        assert_eq!(config.cache.inspect_ttl, Duration::from_secs(10));
        assert_eq!(
            config.dockerfile_dir("shop"),
            PathBuf::from("/srv/stackvo/generated/projects/shop")
        );
    }

    #[test]
    fn test_fixed_source_overrides() {
        let source = Source::Fixed(vec![
            ("STACKVO_BASE_DIR", "/opt/sv".to_string()),
            ("PORT", "8080".to_string()),
            ("CACHE_ENABLE", "false".to_string()),
            ("PROJECTS_DIR", "/data/projects".to_string()),
            ("BUILD_TIMEOUT_SECS", "nope".to_string()),
        ]);
        let config = EnvConfig::resolve(&source);
        assert_eq!(config.port, 8080);
        assert!(!config.cache.enabled);
        assert_eq!(config.projects_dir, PathBuf::from("/data/projects"));
        assert_eq!(config.runtime.build_timeout, Duration::from_secs(300));
    }
}
