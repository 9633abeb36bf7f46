//! 应用状态

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::{ConfigError, ConfigStore, EnvConfig};
use crate::infra::{DockerCli, DomainResolver, RuntimeGateway, SystemResolver};
use crate::services::aggregator::EntityAggregator;
use crate::services::lifecycle::LifecycleController;

use super::cache::{CachedGateway, Clock, Probe, SystemClock, TtlCache};

/// 应用状态
pub struct AppState {
    // ========== 核心配置 ==========
    /// 运行参数
    pub config: Arc<EnvConfig>,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,

    // ========== 运行时 ==========
    /// 容器运行时网关（写操作直接使用）
    pub gateway: Arc<dyn RuntimeGateway>,
    /// 查询结果缓存
    pub cache: Arc<TtlCache<Probe>>,

    // ========== 服务 ==========
    pub aggregator: EntityAggregator,
    pub controller: LifecycleController,
}

impl AppState {
    /// 创建新的应用状态（docker CLI + 系统 DNS + 系统时钟）
    pub fn new(config: EnvConfig) -> Self {
        let gateway = Arc::new(DockerCli::new(&config.runtime, config.compose_project.clone()));

        tracing::info!(
            port = config.port,
            base_dir = %config.base_dir.display(),
            env_file = %config.env_file.display(),
            projects_dir = %config.projects_dir.display(),
            docker = %config.runtime.docker_bin,
            cache_enabled = config.cache.enabled,
            "Loaded configuration"
        );

        Self::with_parts(
            config,
            gateway,
            Arc::new(SystemResolver::default()),
            Arc::new(SystemClock),
        )
    }

    /// 以指定的运行时、解析器和时钟组装
    pub fn with_parts(
        config: EnvConfig,
        gateway: Arc<dyn RuntimeGateway>,
        resolver: Arc<dyn DomainResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        let cache = Arc::new(TtlCache::new(clock));
        let probes = CachedGateway::new(gateway.clone(), cache.clone(), &config.cache);

        Self {
            aggregator: EntityAggregator::new(config.clone(), probes, resolver),
            controller: LifecycleController::new(config.clone(), gateway.clone(), cache.clone()),
            started_at: Utc::now(),
            gateway,
            cache,
            config,
        }
    }

    /// 读取当前的 `.env`（每个请求周期读一次）
    pub async fn load_store(&self) -> Result<ConfigStore, ConfigError> {
        ConfigStore::load(&self.config.env_file).await
    }
}
