//! 实体聚合
//!
//! 把 `.env` 声明、项目清单和容器运行时状态合并成 Service / Tool / Project 视图。
//! 单个实体的任何失败都只影响它自己：运行时查询失败降级为 `NotCreated`，
//! 清单损坏的项目以降级条目出现在列表中。

use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::env::constants::DEFAULT_TLD_SUFFIX;
use crate::config::store::config_segment;
use crate::config::{ConfigStore, EnvConfig, ManifestError, ProjectManifest};
use crate::domain::{
    sort_ranked, ConfigurationOverrides, ContainerName, DegradedProject, Family, Identifier,
    LogLocation, LogSet, NamedEntity, NetworkInfo, PortMap, ProjectEntry, ProjectPath,
    ProjectUrls, ProjectView, RuntimeState,
};
use crate::infra::DomainResolver;
use crate::state::cache::CachedGateway;

/// 项目代码在容器内的挂载点
const PROJECT_CONTAINER_PATH: &str = "/var/www/html";

/// 运行时观测结果
#[derive(Debug, Clone)]
struct Observed {
    state: RuntimeState,
    ports: PortMap,
    network: Option<NetworkInfo>,
}

impl Default for Observed {
    fn default() -> Self {
        Self {
            state: RuntimeState::NotCreated,
            ports: PortMap::new(),
            network: None,
        }
    }
}

/// 实体聚合器
pub struct EntityAggregator {
    config: Arc<EnvConfig>,
    probes: CachedGateway,
    resolver: Arc<dyn DomainResolver>,
}

impl EntityAggregator {
    pub fn new(
        config: Arc<EnvConfig>,
        probes: CachedGateway,
        resolver: Arc<dyn DomainResolver>,
    ) -> Self {
        Self {
            config,
            probes,
            resolver,
        }
    }

    pub async fn services(&self, store: &ConfigStore) -> Vec<NamedEntity> {
        self.family(store, Family::Service).await
    }

    pub async fn tools(&self, store: &ConfigStore) -> Vec<NamedEntity> {
        self.family(store, Family::Tool).await
    }

    async fn family(&self, store: &ConfigStore, family: Family) -> Vec<NamedEntity> {
        let Some(prefix) = family.config_prefix() else {
            return Vec::new();
        };
        let names = store.entity_names(prefix);
        debug!(family = family.name(), count = names.len(), "Aggregating entities");

        let mut entities = join_all(
            names
                .iter()
                .map(|name| self.named_entity(store, prefix, name, &names)),
        )
        .await;
        sort_ranked(&mut entities);
        entities
    }

    async fn named_entity(
        &self,
        store: &ConfigStore,
        prefix: &str,
        name: &str,
        siblings: &[String],
    ) -> NamedEntity {
        let key = |suffix: &str| format!("{}_{}_{}", prefix, config_segment(name), suffix);

        let enabled = store.flag(&key("ENABLE"));
        let version = store.non_empty(&key("VERSION")).map(str::to_string);
        let address = store
            .non_empty(&key("URL"))
            .map(|url| derive_address(store, url));
        let domain = address.as_ref().map(|(domain, _)| domain.clone());

        let container = self.container_for(name);
        let (observed, dns_resolved, logs) = tokio::join!(
            self.observe(container.as_ref()),
            self.resolve(domain.as_deref()),
            probe_entity_logs(&self.config.logs_dir, name),
        );

        NamedEntity {
            name: name.to_string(),
            container_name: container_label(&container, &self.config.container_prefix, name),
            enabled,
            version,
            url: address.map(|(_, url)| url),
            domain,
            dns_resolved,
            running: observed.state.is_running(),
            runtime_state: observed.state,
            ports: observed.ports,
            network: observed.network,
            credentials: store.credentials(prefix, name, siblings),
            logs: logs.map(|location| LogSet::from([("service".to_string(), location)])),
        }
    }

    /// 项目列表（项目根目录下的每个子目录）
    pub async fn projects(&self, store: &ConfigStore) -> Vec<ProjectEntry> {
        let dirs = match list_project_dirs(&self.config.projects_dir).await {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!(
                    path = %self.config.projects_dir.display(),
                    "Projects directory is not readable: {}", e
                );
                return Vec::new();
            }
        };

        let ssl_enabled = store.flag_or("SSL_ENABLE", true);
        let mut entries = join_all(
            dirs.iter()
                .map(|dir| self.project_entry(dir, ssl_enabled)),
        )
        .await;
        sort_ranked(&mut entries);
        entries
    }

    async fn project_entry(&self, dir: &str, ssl_enabled: bool) -> ProjectEntry {
        let project_dir = self.config.projects_dir.join(dir);
        let manifest = match ProjectManifest::load(&project_dir).await {
            Ok(m) => m,
            Err(e) => {
                warn!(project = dir, "Project manifest unusable: {}", e);
                return ProjectEntry::Degraded(DegradedProject::new(dir, e.to_string()));
            }
        };

        // 容器名沿用清单里的原始名字（`stackvo-my_shop`），与控制端点一致
        let name = manifest.name.clone().unwrap_or_else(|| dir.to_string());
        if Identifier::parse(&name).is_err() {
            let e = ManifestError::InvalidName(name);
            warn!(project = dir, "Project manifest unusable: {}", e);
            return ProjectEntry::Degraded(DegradedProject::new(dir, e.to_string()));
        }

        let webserver = manifest.webserver_or_default().to_string();
        let container = self.container_for(&name);
        let (observed, dns_resolved, logs, overrides) = tokio::join!(
            self.observe(container.as_ref()),
            self.resolve(manifest.domain.as_deref()),
            probe_project_logs(&self.config.logs_dir, &name, &webserver),
            probe_overrides(&project_dir, &webserver),
        );

        let urls = manifest.domain.as_ref().map(|domain| {
            let http = format!("http://{}", domain);
            let https = format!("https://{}", domain);
            let primary = if ssl_enabled { https.clone() } else { http.clone() };
            ProjectUrls {
                http,
                https,
                primary,
            }
        });

        let entity = NamedEntity {
            container_name: container_label(&container, &self.config.container_prefix, &name),
            name,
            enabled: true,
            version: Some(manifest.runtime.version.clone()),
            url: urls.as_ref().map(|u| u.primary.clone()),
            domain: manifest.domain.clone(),
            dns_resolved,
            running: observed.state.is_running(),
            runtime_state: observed.state,
            ports: observed.ports,
            network: observed.network,
            credentials: BTreeMap::new(),
            logs,
        };

        ProjectEntry::Ready(Box::new(ProjectView {
            entity,
            document_root: manifest.document_root,
            webserver: manifest.webserver,
            runtime_language: manifest.runtime,
            ssl_enabled,
            urls,
            configuration_overrides: overrides,
            project_path: ProjectPath {
                container_path: PROJECT_CONTAINER_PATH.to_string(),
                host_path: format!("projects/{}", dir),
            },
            error: None,
        }))
    }

    fn container_for(&self, name: &str) -> Option<ContainerName> {
        Identifier::parse(name)
            .and_then(|id| ContainerName::for_entity(&self.config.container_prefix, &id))
            .map_err(|e| warn!("Skipping runtime lookup: {}", e))
            .ok()
    }

    /// 查询容器状态；只有运行中的容器才继续查端口和网络
    async fn observe(&self, container: Option<&ContainerName>) -> Observed {
        let Some(container) = container else {
            return Observed::default();
        };

        let state = match self.probes.state(container).await {
            Ok(state) => state,
            Err(e) => {
                warn!(container = %container, "Runtime state unavailable, reporting NotCreated: {}", e);
                return Observed::default();
            }
        };
        if !state.is_running() {
            return Observed {
                state,
                ..Observed::default()
            };
        }

        let (ports, network) =
            tokio::join!(self.probes.ports(container), self.probes.network(container));
        Observed {
            state,
            ports: ports
                .map_err(|e| warn!(container = %container, "Port inspection failed: {}", e))
                .unwrap_or_default(),
            network: network
                .map_err(|e| warn!(container = %container, "Network inspection failed: {}", e))
                .ok(),
        }
    }

    async fn resolve(&self, domain: Option<&str>) -> bool {
        match domain {
            Some(domain) => self.resolver.resolves(domain).await,
            None => false,
        }
    }
}

fn container_label(container: &Option<ContainerName>, prefix: &str, name: &str) -> String {
    container
        .as_ref()
        .map(|c| c.as_str().to_string())
        .unwrap_or_else(|| format!("{}{}", prefix, name))
}

/// `URL` 值 -> (domain, url)：带 scheme 的原样使用，否则拼上顶级后缀
fn derive_address(store: &ConfigStore, url: &str) -> (String, String) {
    if let Some((_, rest)) = url.split_once("://") {
        let host = rest.split(['/', ':']).next().unwrap_or(rest);
        return (host.to_string(), url.to_string());
    }
    let suffix = store.get("DEFAULT_TLD_SUFFIX", DEFAULT_TLD_SUFFIX);
    let scheme = if store.flag_or("SSL_ENABLE", true) {
        "https"
    } else {
        "http"
    };
    let domain = format!("{}.{}", url, suffix);
    let full = format!("{}://{}", scheme, domain);
    (domain, full)
}

async fn list_project_dirs(root: &Path) -> std::io::Result<Vec<String>> {
    let mut reader = tokio::fs::read_dir(root).await?;
    let mut dirs = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name().to_string_lossy().to_string();
        if is_dir && !name.starts_with('.') {
            dirs.push(name);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// 容器内日志目录（约定 `/var/log/<name>`，少数镜像例外）
pub fn entity_log_base(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "activemq" => "/opt/apache-activemq/data".to_string(),
        "tomcat" => "/usr/local/tomcat/logs".to_string(),
        "postgres" | "postgresql" => "/var/lib/postgresql/data/log".to_string(),
        _ => format!("/var/log/{}", name),
    }
}

fn webserver_log_base(webserver: &str) -> &'static str {
    match webserver {
        "apache" => "/var/log/apache2",
        "caddy" => "/var/log/caddy",
        "ferron" => "/var/log/ferron",
        _ => "/var/log/nginx",
    }
}

fn webserver_override_files(webserver: &str) -> &'static [&'static str] {
    match webserver {
        "nginx" => &["nginx.conf", "default.conf"],
        "apache" => &["apache.conf", "httpd.conf"],
        "caddy" => &["Caddyfile"],
        "ferron" => &["ferron.yaml", "ferron.conf"],
        _ => &[],
    }
}

async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Service / Tool 日志：`logs/<name>/` 下第一个匹配的文件
async fn probe_entity_logs(logs_dir: &Path, name: &str) -> Option<LogLocation> {
    let host_dir = logs_dir.join(name);
    if !is_dir(&host_dir).await {
        return None;
    }
    let container_base = entity_log_base(name);

    let candidates = [
        format!("{}.log", name),
        "error.log".to_string(),
        "access.log".to_string(),
        "main.log".to_string(),
        "slow.log".to_string(),
    ];
    for file in &candidates {
        if let Some(size) = file_size(&host_dir.join(file)).await {
            return Some(LogLocation {
                container_path: format!("{}/{}", container_base, file),
                host_path: format!("logs/{}/{}", name, file),
                size: Some(format_bytes(size)),
            });
        }
    }

    Some(LogLocation {
        container_path: container_base,
        host_path: format!("logs/{}", name),
        size: None,
    })
}

/// 项目日志：`logs/projects/<name>/` 存在时给出 Web 访问/错误日志和 PHP 错误日志
async fn probe_project_logs(logs_dir: &Path, name: &str, webserver: &str) -> Option<LogSet> {
    let host_dir: PathBuf = logs_dir.join("projects").join(name);
    if !is_dir(&host_dir).await {
        return None;
    }
    let web_base = webserver_log_base(webserver);
    let php_base = format!("/var/log/{}", name);

    let layout = [
        ("web_access", web_base.to_string(), "access.log"),
        ("web_error", web_base.to_string(), "error.log"),
        ("php_error", php_base, "php-error.log"),
    ];

    let mut logs = LogSet::new();
    for (key, container_base, file) in layout {
        let size = file_size(&host_dir.join(file)).await.map(format_bytes);
        logs.insert(
            key.to_string(),
            LogLocation {
                container_path: format!("{}/{}", container_base, file),
                host_path: format!("logs/projects/{}/{}", name, file),
                size,
            },
        );
    }
    Some(logs)
}

/// `.stackvo/` 下识别到的自定义配置文件
async fn probe_overrides(project_dir: &Path, webserver: &str) -> ConfigurationOverrides {
    let dir = project_dir.join(".stackvo");
    if !is_dir(&dir).await {
        return ConfigurationOverrides::from_files(Vec::new());
    }

    let mut found = Vec::new();
    for file in webserver_override_files(webserver)
        .iter()
        .chain(["php.ini", "php-fpm.conf"].iter())
    {
        if tokio::fs::try_exists(dir.join(file)).await.unwrap_or(false) {
            found.push(file.to_string());
        }
    }
    ConfigurationOverrides::from_files(found)
}

/// 人类可读的文件大小（`1.5 KB`）
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size > 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{:.2}", size);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
