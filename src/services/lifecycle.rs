//! 生命周期控制
//!
//! 校验 -> 调用运行时（绕过缓存）-> 失效缓存。
//! 同一实体上的并发操作不做串行化；`.env` 改写经由 `EnvWriter` 逐个进行。

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::store::{config_segment, normalize_entity_name, EnvWriter};
use crate::config::{ConfigError, ConfigStore, EnvConfig, ProjectManifest};
use crate::domain::{
    ActionReport, CommandOutcome, ContainerAction, ContainerName, Family, Identifier,
    InvalidIdentifier, RuntimeState, SystemReport,
};
use crate::infra::{GatewayError, RuntimeGateway};
use crate::services::readiness::{wait_for_file, ReadinessPolicy, ReadinessTimeout};
use crate::state::cache::{Probe, TtlCache};

/// 控制操作错误
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    InvalidName(#[from] InvalidIdentifier),

    #[error("Invalid action '{0}'")]
    InvalidAction(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{family} '{name}' is not configured")]
    Undeclared { family: &'static str, name: String },

    #[error("Project '{0}' not found")]
    ProjectNotFound(String),

    #[error("Container {0} not found")]
    ContainerNotFound(String),

    #[error("{message}")]
    CommandFailed { message: String, output: String },

    #[error(transparent)]
    Runtime(#[from] GatewayError),

    #[error(transparent)]
    NotReady(#[from] ReadinessTimeout),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// 系统级动作（`up` / `down` 是 start / stop 的别名）
pub fn parse_system_action(raw: &str) -> Result<ContainerAction, ControlError> {
    match raw.trim().to_lowercase().as_str() {
        "start" | "up" => Ok(ContainerAction::Start),
        "stop" | "down" => Ok(ContainerAction::Stop),
        "restart" => Ok(ContainerAction::Restart),
        other => Err(ControlError::InvalidAction(other.to_string())),
    }
}

fn past_tense(action: ContainerAction) -> &'static str {
    match action {
        ContainerAction::Start => "started",
        ContainerAction::Stop => "stopped",
        ContainerAction::Restart => "restarted",
    }
}

/// 生命周期控制器
pub struct LifecycleController {
    config: Arc<EnvConfig>,
    gateway: Arc<dyn RuntimeGateway>,
    cache: Arc<TtlCache<Probe>>,
    env_writer: EnvWriter,
    readiness: ReadinessPolicy,
}

impl LifecycleController {
    pub fn new(
        config: Arc<EnvConfig>,
        gateway: Arc<dyn RuntimeGateway>,
        cache: Arc<TtlCache<Probe>>,
    ) -> Self {
        Self {
            env_writer: EnvWriter::new(config.env_file.clone()),
            config,
            gateway,
            cache,
            readiness: ReadinessPolicy::default(),
        }
    }

    pub fn with_readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    fn container_for(&self, raw_name: &str) -> Result<ContainerName, ControlError> {
        let id = Identifier::parse(raw_name)?;
        Ok(ContainerName::for_entity(&self.config.container_prefix, &id)?)
    }

    /// start / stop / restart 单个容器
    pub async fn container_action(
        &self,
        raw_name: &str,
        action: ContainerAction,
    ) -> Result<ActionReport, ControlError> {
        let container = self.container_for(raw_name)?;
        info!(container = %container, action = action.verb(), "Container action requested");

        let outcome = self
            .gateway
            .apply(action, std::slice::from_ref(&container))
            .await?;
        let outcome = self.check_outcome(&container, action.verb(), outcome)?;
        self.cache.invalidate_target(container.as_str()).await;

        Ok(ActionReport {
            message: format!("Container {} {}", container, past_tense(action)),
            target: container.to_string(),
            action: action.verb().to_string(),
            output: Some(outcome.output).filter(|o| !o.is_empty()),
            running: Some(action != ContainerAction::Stop),
        })
    }

    pub async fn start(&self, raw_name: &str) -> Result<ActionReport, ControlError> {
        self.container_action(raw_name, ContainerAction::Start).await
    }

    pub async fn stop(&self, raw_name: &str) -> Result<ActionReport, ControlError> {
        self.container_action(raw_name, ContainerAction::Stop).await
    }

    pub async fn restart(&self, raw_name: &str) -> Result<ActionReport, ControlError> {
        self.container_action(raw_name, ContainerAction::Restart).await
    }

    /// 单个服务的控制动作：`start` / `stop` / `restart` / `build`
    pub async fn service_action(
        &self,
        raw_name: &str,
        raw_action: &str,
    ) -> Result<ActionReport, ControlError> {
        match raw_action {
            "start" => self.start(raw_name).await,
            "stop" => self.stop(raw_name).await,
            "restart" => self.restart(raw_name).await,
            "build" => self.build(raw_name).await,
            other => Err(ControlError::InvalidAction(other.to_string())),
        }
    }

    /// 构建项目容器：等生成器写出 Dockerfile，再执行 compose build
    pub async fn build(&self, raw_name: &str) -> Result<ActionReport, ControlError> {
        let id = Identifier::parse(raw_name)?;
        let project_dir = self.project_dir(&id).await?;
        debug!(project = %id, dir = %project_dir.display(), "Resolved project directory");

        let dockerfile_dir = self.config.dockerfile_dir(id.as_str());
        wait_for_file(&dockerfile_dir.join("Dockerfile"), self.readiness).await?;

        let container = ContainerName::for_entity(&self.config.container_prefix, &id)?;
        info!(project = %id, "Building project");
        let outcome = self
            .gateway
            .build(&id, &dockerfile_dir, &self.config.compose_file)
            .await?;
        self.cache.invalidate_target(container.as_str()).await;
        let outcome = self.check_outcome(&container, "build", outcome)?;

        Ok(ActionReport {
            message: format!("Project {} built and started", id),
            target: container.to_string(),
            action: "build".to_string(),
            output: Some(outcome.output).filter(|o| !o.is_empty()),
            running: Some(true),
        })
    }

    /// 项目目录：先按目录名找，再按清单中的 `name` 找
    async fn project_dir(&self, id: &Identifier) -> Result<PathBuf, ControlError> {
        let direct = self.config.projects_dir.join(id.as_str());
        if is_dir(&direct).await {
            return Ok(direct);
        }

        if let Ok(mut reader) = tokio::fs::read_dir(&self.config.projects_dir).await {
            while let Ok(Some(entry)) = reader.next_entry().await {
                let path = entry.path();
                if !is_dir(&path).await {
                    continue;
                }
                let declared = ProjectManifest::load(&path)
                    .await
                    .ok()
                    .and_then(|m| m.name);
                if declared.as_deref() == Some(id.as_str()) {
                    return Ok(path);
                }
            }
        }
        Err(ControlError::ProjectNotFound(id.to_string()))
    }

    /// 改写 `<FAMILY>_<NAME>_ENABLE`，随后启动（已存在的容器）或停止（运行中的容器）
    pub async fn set_enabled(
        &self,
        family: Family,
        raw_name: &str,
        enabled: bool,
    ) -> Result<ActionReport, ControlError> {
        Identifier::parse(raw_name)?;
        let prefix = family.config_prefix().ok_or_else(|| {
            ControlError::InvalidRequest(format!("{}s cannot be enabled or disabled", family.name()))
        })?;
        let name = normalize_entity_name(raw_name)
            .ok_or_else(|| InvalidIdentifier(raw_name.to_string()))?;

        let store = ConfigStore::load(&self.config.env_file).await?;
        if !store.entity_names(prefix).contains(&name) {
            return Err(ControlError::Undeclared {
                family: family.name(),
                name,
            });
        }

        // 运行时不可用时直接失败，不改写配置
        let container = self.container_for(&name)?;
        let state = self.gateway.state(&container).await?;

        let key = format!("{}_{}_ENABLE", prefix, config_segment(&name));
        self.env_writer
            .write_flag(&key, if enabled { "true" } else { "false" })
            .await?;
        info!(key = %key, enabled = enabled, "Updated enable flag");

        let running = match (enabled, state) {
            (true, RuntimeState::NotCreated) => {
                info!(container = %container, "Container not created yet, flag updated only");
                false
            }
            (true, _) => {
                let outcome = self.gateway.start(&container).await?;
                self.check_outcome(&container, "start", outcome)?;
                true
            }
            (false, RuntimeState::Running) => {
                let outcome = self.gateway.stop(&container).await?;
                self.check_outcome(&container, "stop", outcome)?;
                false
            }
            (false, _) => false,
        };
        self.cache.invalidate_target(container.as_str()).await;

        let verb = if enabled { "enabled" } else { "disabled" };
        Ok(ActionReport {
            message: format!("{} {} {}", family.name(), name, verb),
            target: container.to_string(),
            action: if enabled { "enable" } else { "disable" }.to_string(),
            output: None,
            running: Some(running),
        })
    }

    /// 系统级批量操作；stop / restart 不动基础设施容器
    pub async fn system(&self, action: ContainerAction) -> Result<SystemReport, ControlError> {
        let prefix = &self.config.container_prefix;
        let excluded = &self.config.runtime.excluded_containers;
        let spare_infrastructure = action != ContainerAction::Start;

        let targets: Vec<ContainerName> = self
            .gateway
            .list_all(prefix)
            .await?
            .into_iter()
            .filter(|c| !(spare_infrastructure && excluded.contains(&c.name)))
            .filter_map(|c| ContainerName::parse(&c.name).ok())
            .collect();

        info!(action = action.verb(), containers = targets.len(), "System action requested");
        let outcome = self.gateway.apply(action, &targets).await?;
        self.cache.invalidate_all().await;

        if !outcome.ok {
            warn!(action = action.verb(), "System action failed");
            return Err(ControlError::CommandFailed {
                message: format!("Failed to {} containers", action.verb()),
                output: outcome.output,
            });
        }

        Ok(SystemReport {
            message: format!("All containers {}", past_tense(action)),
            action: action.verb().to_string(),
            affected_containers: targets.len(),
            containers: targets.iter().map(|c| c.to_string()).collect(),
            note: spare_infrastructure
                .then(|| format!("{} kept running", excluded.join(", "))),
        })
    }

    fn check_outcome(
        &self,
        container: &ContainerName,
        verb: &str,
        outcome: CommandOutcome,
    ) -> Result<CommandOutcome, ControlError> {
        if outcome.ok {
            return Ok(outcome);
        }
        if outcome.is_missing_container() {
            return Err(ControlError::ContainerNotFound(container.to_string()));
        }
        warn!(container = %container, verb = verb, output = %outcome.output, "Runtime command failed");
        Err(ControlError::CommandFailed {
            message: format!("Failed to {} {}", verb, container),
            output: outcome.output,
        })
    }
}

async fn is_dir(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
