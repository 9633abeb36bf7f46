//! 容器运行时网关（docker CLI）
//!
//! 只接受已校验的 [`ContainerName`] / [`Identifier`]，命令以 argv 形式构造。
//! 查询类操作遇到"容器不存在"不报错：`state` 返回 `NotCreated`。

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::RuntimeSettings;
use crate::domain::{
    CommandOutcome, ContainerAction, ContainerName, ContainerStats, ContainerSummary, DiskUsage,
    Identifier, InvalidIdentifier, NetworkInfo, PortBinding, PortMap, RuntimeState,
};
use crate::infra::command::{CommandError, CommandOutput, CommandRunner};

/// 网关错误
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("container runtime did not answer within {0}s")]
    Timeout(u64),

    #[error("failed to launch container runtime: {0}")]
    Spawn(String),

    #[error("container runtime command failed: {output}")]
    CommandFailed { output: String },

    #[error("unexpected container runtime output: {output}")]
    Malformed { output: String },

    #[error(transparent)]
    InvalidTarget(#[from] InvalidIdentifier),
}

impl From<CommandError> for GatewayError {
    fn from(e: CommandError) -> Self {
        match e {
            CommandError::Timeout(t) => GatewayError::Timeout(t.as_secs()),
            CommandError::SpawnFailed(e) => GatewayError::Spawn(e.to_string()),
        }
    }
}

/// 容器运行时抽象
#[async_trait]
pub trait RuntimeGateway: Send + Sync {
    /// 容器状态；容器不存在时返回 `NotCreated`
    async fn state(&self, name: &ContainerName) -> Result<RuntimeState, GatewayError>;

    /// 只有 `NotCreated` 才算不存在；查询失败原样返回
    async fn exists(&self, name: &ContainerName) -> Result<bool, GatewayError> {
        Ok(self.state(name).await?.exists())
    }

    async fn is_running(&self, name: &ContainerName) -> Result<bool, GatewayError> {
        Ok(self.state(name).await?.is_running())
    }

    async fn inspect_ports(&self, name: &ContainerName) -> Result<PortMap, GatewayError>;

    async fn inspect_network(&self, name: &ContainerName) -> Result<NetworkInfo, GatewayError>;

    /// 对一批容器执行同一个动作（单次命令）
    async fn apply(
        &self,
        action: ContainerAction,
        names: &[ContainerName],
    ) -> Result<CommandOutcome, GatewayError>;

    async fn start(&self, name: &ContainerName) -> Result<CommandOutcome, GatewayError> {
        self.apply(ContainerAction::Start, std::slice::from_ref(name)).await
    }

    async fn stop(&self, name: &ContainerName) -> Result<CommandOutcome, GatewayError> {
        self.apply(ContainerAction::Stop, std::slice::from_ref(name)).await
    }

    async fn restart(&self, name: &ContainerName) -> Result<CommandOutcome, GatewayError> {
        self.apply(ContainerAction::Restart, std::slice::from_ref(name)).await
    }

    /// compose `up -d --build <project>`
    async fn build(
        &self,
        project: &Identifier,
        dockerfile_dir: &Path,
        compose_file: &Path,
    ) -> Result<CommandOutcome, GatewayError>;

    /// 名称前缀匹配的所有容器（含已停止的）
    async fn list_all(&self, prefix: &str) -> Result<Vec<ContainerSummary>, GatewayError>;

    /// 一次性资源采样
    async fn stats(&self) -> Result<Vec<ContainerStats>, GatewayError>;

    /// 运行时占用的磁盘空间
    async fn disk_usage(&self) -> Result<DiskUsage, GatewayError>;
}

/// 基于 docker CLI 的实现
pub struct DockerCli {
    docker_bin: String,
    compose_project: String,
    inspect_timeout: Duration,
    build_timeout: Duration,
    compose: OnceCell<(String, Vec<String>)>,
}

impl DockerCli {
    pub fn new(settings: &RuntimeSettings, compose_project: impl Into<String>) -> Self {
        Self {
            docker_bin: settings.docker_bin.clone(),
            compose_project: compose_project.into(),
            inspect_timeout: settings.inspect_timeout,
            build_timeout: settings.build_timeout,
            compose: OnceCell::new(),
        }
    }

    async fn docker(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput, GatewayError> {
        let output = CommandRunner::run(&self.docker_bin, args, None, timeout).await?;
        debug!(args = ?args, success = output.success, code = ?output.code, "docker finished");
        Ok(output)
    }

    async fn inspect(&self, name: &ContainerName, format: &str) -> Result<String, GatewayError> {
        let output = self
            .docker(&["inspect", "-f", format, name.as_str()], self.inspect_timeout)
            .await?;
        if output.success {
            Ok(output.stdout.trim().to_string())
        } else {
            Err(GatewayError::CommandFailed {
                output: output.combined(),
            })
        }
    }

    /// `docker-compose` 在 PATH 中时优先使用，否则 `docker compose`
    async fn compose_command(&self) -> &(String, Vec<String>) {
        self.compose
            .get_or_init(|| async {
                if CommandRunner::is_available("docker-compose").await {
                    ("docker-compose".to_string(), vec![])
                } else {
                    (self.docker_bin.clone(), vec!["compose".to_string()])
                }
            })
            .await
    }
}

#[async_trait]
impl RuntimeGateway for DockerCli {
    async fn state(&self, name: &ContainerName) -> Result<RuntimeState, GatewayError> {
        let output = self
            .docker(
                &["inspect", "-f", "{{.State.Running}}", name.as_str()],
                self.inspect_timeout,
            )
            .await?;

        if !output.success {
            let text = output.combined();
            if is_not_found(&text) {
                return Ok(RuntimeState::NotCreated);
            }
            return Err(GatewayError::CommandFailed { output: text });
        }
        parse_running_flag(&output.stdout)
    }

    async fn inspect_ports(&self, name: &ContainerName) -> Result<PortMap, GatewayError> {
        let raw = self.inspect(name, "{{json .NetworkSettings.Ports}}").await?;
        parse_ports(&raw)
    }

    async fn inspect_network(&self, name: &ContainerName) -> Result<NetworkInfo, GatewayError> {
        let raw = self.inspect(name, "{{json .NetworkSettings.Networks}}").await?;
        parse_networks(&raw)
    }

    async fn apply(
        &self,
        action: ContainerAction,
        names: &[ContainerName],
    ) -> Result<CommandOutcome, GatewayError> {
        if names.is_empty() {
            return Ok(CommandOutcome {
                ok: true,
                output: String::new(),
            });
        }

        let mut args = vec![action.verb()];
        args.extend(names.iter().map(ContainerName::as_str));

        let output = self.docker(&args, self.inspect_timeout).await?;
        if output.success {
            info!(action = action.verb(), containers = names.len(), "Container action succeeded");
        } else {
            warn!(action = action.verb(), output = %output.combined(), "Container action failed");
        }
        Ok(CommandOutcome {
            ok: output.success,
            output: output.combined(),
        })
    }

    async fn build(
        &self,
        project: &Identifier,
        dockerfile_dir: &Path,
        compose_file: &Path,
    ) -> Result<CommandOutcome, GatewayError> {
        if !dockerfile_dir.join("Dockerfile").is_file() {
            return Ok(CommandOutcome {
                ok: false,
                output: format!("Dockerfile not found in {}", dockerfile_dir.display()),
            });
        }

        let compose_file = compose_file.to_string_lossy().to_string();
        let (program, prefix) = self.compose_command().await;
        let mut args: Vec<&str> = prefix.iter().map(String::as_str).collect();
        args.extend([
            "-p",
            self.compose_project.as_str(),
            "-f",
            compose_file.as_str(),
            "up",
            "-d",
            "--build",
            project.as_str(),
        ]);

        info!(project = %project, compose = %compose_file, "Building project container");
        let output = CommandRunner::run(program, &args, None, self.build_timeout).await?;
        if !output.success {
            warn!(project = %project, output = %output.combined(), "Project build failed");
        }
        Ok(CommandOutcome {
            ok: output.success,
            output: output.combined(),
        })
    }

    async fn list_all(&self, prefix: &str) -> Result<Vec<ContainerSummary>, GatewayError> {
        ContainerName::parse(prefix)?;
        let filter = format!("name={}", prefix);
        let output = self
            .docker(
                &[
                    "ps",
                    "-a",
                    "--filter",
                    &filter,
                    "--format",
                    "{{.Names}}|{{.State}}|{{.Image}}|{{.CreatedAt}}",
                ],
                self.inspect_timeout,
            )
            .await?;
        if !output.success {
            return Err(GatewayError::CommandFailed {
                output: output.combined(),
            });
        }
        Ok(parse_ps_lines(&output.stdout, prefix))
    }

    async fn stats(&self) -> Result<Vec<ContainerStats>, GatewayError> {
        let output = self
            .docker(
                &["stats", "--no-stream", "--format", "{{json .}}"],
                self.inspect_timeout,
            )
            .await?;
        if !output.success {
            return Err(GatewayError::CommandFailed {
                output: output.combined(),
            });
        }
        Ok(parse_stats_lines(&output.stdout))
    }

    async fn disk_usage(&self) -> Result<DiskUsage, GatewayError> {
        let output = self
            .docker(&["system", "df", "--format", "{{json .}}"], self.inspect_timeout)
            .await?;
        if !output.success {
            return Err(GatewayError::CommandFailed {
                output: output.combined(),
            });
        }
        Ok(parse_df_lines(&output.stdout))
    }
}

fn is_not_found(output: &str) -> bool {
    output.contains("No such object") || output.contains("No such container")
}

fn parse_running_flag(stdout: &str) -> Result<RuntimeState, GatewayError> {
    match stdout.trim() {
        "true" => Ok(RuntimeState::Running),
        "false" => Ok(RuntimeState::Stopped),
        other => Err(GatewayError::Malformed {
            output: other.to_string(),
        }),
    }
}

#[derive(Deserialize)]
struct RawHostBinding {
    #[serde(rename = "HostIp", default)]
    host_ip: Option<String>,
    #[serde(rename = "HostPort", default)]
    host_port: Option<String>,
}

/// 解析 `{{json .NetworkSettings.Ports}}`
fn parse_ports(raw: &str) -> Result<PortMap, GatewayError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(PortMap::new());
    }
    let parsed: BTreeMap<String, Option<Vec<RawHostBinding>>> =
        serde_json::from_str(trimmed).map_err(|_| GatewayError::Malformed {
            output: trimmed.to_string(),
        })?;

    Ok(parsed
        .into_iter()
        .map(|(spec, bindings)| {
            let docker_port = spec.split('/').next().unwrap_or(&spec).to_string();
            let binding = match bindings.and_then(|b| b.into_iter().next()) {
                Some(b) => PortBinding {
                    docker_port,
                    host_ip: b.host_ip.filter(|ip| !ip.is_empty()),
                    host_port: b.host_port.filter(|p| !p.is_empty()),
                    exposed: true,
                },
                None => PortBinding {
                    docker_port,
                    host_ip: None,
                    host_port: None,
                    exposed: false,
                },
            };
            (spec, binding)
        })
        .collect())
}

#[derive(Deserialize)]
struct RawNetwork {
    #[serde(rename = "IPAddress", default)]
    ip_address: Option<String>,
    #[serde(rename = "Gateway", default)]
    gateway: Option<String>,
}

/// 解析 `{{json .NetworkSettings.Networks}}`，取第一个网络
fn parse_networks(raw: &str) -> Result<NetworkInfo, GatewayError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(NetworkInfo::default());
    }
    let parsed: BTreeMap<String, RawNetwork> =
        serde_json::from_str(trimmed).map_err(|_| GatewayError::Malformed {
            output: trimmed.to_string(),
        })?;

    Ok(parsed
        .into_iter()
        .next()
        .map(|(network, data)| NetworkInfo {
            ip_address: data.ip_address.filter(|s| !s.is_empty()),
            network: Some(network),
            gateway: data.gateway.filter(|s| !s.is_empty()),
        })
        .unwrap_or_default())
}

/// 解析 `docker ps --format '{{.Names}}|{{.State}}|{{.Image}}|{{.CreatedAt}}'`
fn parse_ps_lines(stdout: &str, prefix: &str) -> Vec<ContainerSummary> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(4, '|');
            let name = parts.next()?.trim();
            let state = parts.next()?.trim();
            let image = parts.next().unwrap_or_default().trim();
            let created_at = parts.next().unwrap_or_default().trim();
            // `--filter name=` 是子串匹配，这里收紧为前缀匹配
            if name.is_empty() || !name.starts_with(prefix) {
                return None;
            }
            Some(ContainerSummary {
                name: name.to_string(),
                state: state.to_string(),
                image: image.to_string(),
                created_at: created_at.to_string(),
            })
        })
        .collect()
}

#[derive(Deserialize)]
struct RawStats {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "CPUPerc", default)]
    cpu_perc: String,
    #[serde(rename = "MemUsage", default)]
    mem_usage: String,
    #[serde(rename = "MemPerc", default)]
    mem_perc: String,
    #[serde(rename = "NetIO", default)]
    net_io: String,
}

/// 解析 `docker stats --no-stream --format '{{json .}}'`，无法解析的行跳过
fn parse_stats_lines(stdout: &str) -> Vec<ContainerStats> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<RawStats>(line.trim()).ok())
        .map(|raw| {
            let (net_in, net_out) = split_pair(&raw.net_io);
            let (mem_used, _) = split_pair(&raw.mem_usage);
            ContainerStats {
                name: raw.name,
                cpu_percent: parse_percent(&raw.cpu_perc),
                memory_used_bytes: parse_size(mem_used),
                memory_percent: parse_percent(&raw.mem_perc),
                net_input_bytes: parse_size(net_in),
                net_output_bytes: parse_size(net_out),
            }
        })
        .collect()
}

#[derive(Deserialize)]
struct RawDiskUsage {
    #[serde(rename = "Size", default)]
    size: String,
    #[serde(rename = "Reclaimable", default)]
    reclaimable: String,
}

/// 解析 `docker system df --format '{{json .}}'`（每类资源一行）
fn parse_df_lines(stdout: &str) -> DiskUsage {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<RawDiskUsage>(line.trim()).ok())
        .fold(DiskUsage::default(), |acc, raw| {
            // "1.2GB (50%)" 只取大小部分
            let reclaimable = raw.reclaimable.split('(').next().unwrap_or_default();
            DiskUsage {
                size_bytes: acc.size_bytes + parse_size(&raw.size),
                reclaimable_bytes: acc.reclaimable_bytes + parse_size(reclaimable),
            }
        })
}

fn split_pair(raw: &str) -> (&str, &str) {
    raw.split_once(" / ").unwrap_or((raw, "0B"))
}

fn parse_percent(raw: &str) -> f64 {
    raw.trim().trim_end_matches('%').parse().unwrap_or(0.0)
}

/// 解析 docker 输出中的大小（`123.4MiB`、`1.2kB`、`0B`）为字节数
pub fn parse_size(raw: &str) -> f64 {
    const UNITS: &[(&str, f64)] = &[
        ("TIB", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("GIB", 1024.0 * 1024.0 * 1024.0),
        ("MIB", 1024.0 * 1024.0),
        ("KIB", 1024.0),
        ("TB", 1e12),
        ("GB", 1e9),
        ("MB", 1e6),
        ("KB", 1e3),
        ("B", 1.0),
    ];

    let value = raw.trim();
    let upper = value.to_ascii_uppercase();
    for (unit, multiplier) in UNITS {
        if let Some(number) = upper.strip_suffix(unit) {
            return number.trim().parse::<f64>().unwrap_or(0.0) * multiplier;
        }
    }
    value.parse().unwrap_or(0.0)
}
