//! 测试替身：可编排的运行时网关与域名解析器

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use crate::domain::{
    CommandOutcome, ContainerAction, ContainerName, ContainerStats, ContainerSummary, DiskUsage,
    Identifier, NetworkInfo, PortBinding, PortMap, RuntimeState,
};
use crate::infra::{DomainResolver, GatewayError, RuntimeGateway};

#[derive(Default)]
struct FakeState {
    containers: BTreeMap<String, RuntimeState>,
    ports: HashMap<String, PortMap>,
    networks: HashMap<String, NetworkInfo>,
    failing: HashSet<String>,
    calls: HashMap<&'static str, usize>,
    actions: Vec<(ContainerAction, Vec<String>)>,
    builds: Vec<String>,
    stats: Vec<ContainerStats>,
    disk: DiskUsage,
}

/// 内存中的容器运行时
#[derive(Default)]
pub struct FakeGateway {
    inner: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap();
        f(&mut guard)
    }

    pub fn set_state(&self, name: &str, state: RuntimeState) {
        self.with(|s| {
            s.containers.insert(name.to_string(), state);
        });
    }

    pub fn set_port(&self, name: &str, spec: &str, host_port: &str) {
        self.with(|s| {
            let docker_port = spec.split('/').next().unwrap_or(spec).to_string();
            s.ports.entry(name.to_string()).or_default().insert(
                spec.to_string(),
                PortBinding {
                    docker_port,
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(host_port.to_string()),
                    exposed: true,
                },
            );
        });
    }

    pub fn set_network(&self, name: &str, ip: &str) {
        self.with(|s| {
            s.networks.insert(
                name.to_string(),
                NetworkInfo {
                    ip_address: Some(ip.to_string()),
                    network: Some("stackvo-net".to_string()),
                    gateway: Some("172.30.0.1".to_string()),
                },
            );
        });
    }

    /// 让某个容器的所有查询都失败
    pub fn fail(&self, name: &str) {
        self.with(|s| {
            s.failing.insert(name.to_string());
        });
    }

    pub fn set_stats(&self, stats: Vec<ContainerStats>) {
        self.with(|s| s.stats = stats);
    }

    pub fn set_disk(&self, disk: DiskUsage) {
        self.with(|s| s.disk = disk);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.with(|s| s.calls.get(op).copied().unwrap_or(0))
    }

    pub fn total_calls(&self) -> usize {
        self.with(|s| s.calls.values().sum())
    }

    pub fn actions(&self) -> Vec<(ContainerAction, Vec<String>)> {
        self.with(|s| s.actions.clone())
    }

    pub fn builds(&self) -> Vec<String> {
        self.with(|s| s.builds.clone())
    }

    pub fn state_of(&self, name: &str) -> RuntimeState {
        self.with(|s| s.containers.get(name).copied().unwrap_or(RuntimeState::NotCreated))
    }

    fn record(&self, op: &'static str) {
        self.with(|s| *s.calls.entry(op).or_default() += 1);
    }

    fn check(&self, name: &ContainerName) -> Result<(), GatewayError> {
        if self.with(|s| s.failing.contains(name.as_str())) {
            return Err(GatewayError::CommandFailed {
                output: "Cannot connect to the Docker daemon".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RuntimeGateway for FakeGateway {
    async fn state(&self, name: &ContainerName) -> Result<RuntimeState, GatewayError> {
        self.record("state");
        self.check(name)?;
        Ok(self.state_of(name.as_str()))
    }

    async fn inspect_ports(&self, name: &ContainerName) -> Result<PortMap, GatewayError> {
        self.record("ports");
        self.check(name)?;
        Ok(self.with(|s| s.ports.get(name.as_str()).cloned().unwrap_or_default()))
    }

    async fn inspect_network(&self, name: &ContainerName) -> Result<NetworkInfo, GatewayError> {
        self.record("network");
        self.check(name)?;
        Ok(self.with(|s| s.networks.get(name.as_str()).cloned().unwrap_or_default()))
    }

    async fn apply(
        &self,
        action: ContainerAction,
        names: &[ContainerName],
    ) -> Result<CommandOutcome, GatewayError> {
        self.record(action.verb());
        self.with(|s| {
            s.actions.push((
                action,
                names.iter().map(|n| n.as_str().to_string()).collect(),
            ));
            let mut output = Vec::new();
            let mut ok = true;
            for name in names {
                match s.containers.get_mut(name.as_str()) {
                    Some(state) => {
                        *state = match action {
                            ContainerAction::Stop => RuntimeState::Stopped,
                            ContainerAction::Start | ContainerAction::Restart => {
                                RuntimeState::Running
                            }
                        };
                        output.push(name.as_str().to_string());
                    }
                    None => {
                        ok = false;
                        output.push(format!(
                            "Error response from daemon: No such container: {}",
                            name
                        ));
                    }
                }
            }
            Ok(CommandOutcome {
                ok,
                output: output.join("\n"),
            })
        })
    }

    async fn build(
        &self,
        project: &Identifier,
        _dockerfile_dir: &Path,
        _compose_file: &Path,
    ) -> Result<CommandOutcome, GatewayError> {
        self.record("build");
        self.with(|s| {
            s.builds.push(project.as_str().to_string());
            s.containers
                .insert(format!("stackvo-{}", project), RuntimeState::Running);
        });
        Ok(CommandOutcome {
            ok: true,
            output: format!("Container stackvo-{} Started", project),
        })
    }

    async fn list_all(&self, prefix: &str) -> Result<Vec<ContainerSummary>, GatewayError> {
        self.record("list");
        Ok(self.with(|s| {
            s.containers
                .iter()
                .filter(|(name, _)| name.starts_with(prefix))
                .map(|(name, state)| ContainerSummary {
                    name: name.clone(),
                    state: if state.is_running() { "running" } else { "exited" }.to_string(),
                    image: "fake:latest".to_string(),
                    created_at: "2024-01-01 00:00:00 +0000 UTC".to_string(),
                })
                .collect()
        }))
    }

    async fn stats(&self) -> Result<Vec<ContainerStats>, GatewayError> {
        self.record("stats");
        Ok(self.with(|s| s.stats.clone()))
    }

    async fn disk_usage(&self) -> Result<DiskUsage, GatewayError> {
        self.record("df");
        Ok(self.with(|s| s.disk))
    }
}

/// 固定结果的域名解析器
#[derive(Default)]
pub struct StubResolver {
    known: HashSet<String>,
}

impl StubResolver {
    pub fn with(domains: &[&str]) -> Self {
        Self {
            known: domains.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[async_trait]
impl DomainResolver for StubResolver {
    async fn resolves(&self, domain: &str) -> bool {
        self.known.contains(domain)
    }
}
