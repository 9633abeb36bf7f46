//! 容器资源占用采样与汇总

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use sysinfo::{Disks, MemoryRefreshKind, RefreshKind, System};
use tracing::warn;

use crate::domain::{ContainerStats, DiskUsage};
use crate::infra::{GatewayError, RuntimeGateway};

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * MIB;

/// 汇总指标
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsAggregate {
    pub container_count: usize,
    pub cpu_total: f64,
    pub cpu_average: f64,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub memory_percent: f64,
    pub network_input_mb: f64,
    pub network_output_mb: f64,
}

/// 磁盘占用（GiB）：运行时占用相对宿主机根分区
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSummary {
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub percent: f64,
    pub docker_used_gb: f64,
    pub docker_reclaimable_gb: f64,
}

/// 一次采样结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub containers: Vec<ContainerStats>,
    pub aggregate: StatsAggregate,
    pub disk: DiskSummary,
}

/// 宿主机总内存（MiB）
pub fn host_memory_mb() -> f64 {
    let mut sys = System::new_with_specifics(
        RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
    );
    sys.refresh_memory();
    sys.total_memory() as f64 / MIB
}

/// 宿主机根分区容量（GiB）；找不到 `/` 时取最大的磁盘
pub fn host_disk_gb() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let root = disks
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.iter().max_by_key(|d| d.total_space()));
    root.map(|d| d.total_space() as f64 / GIB).unwrap_or(0.0)
}

/// 采样所有受管容器（名称含 `<prefix>` 或 `<compose_project>_`）
pub async fn collect(
    gateway: &dyn RuntimeGateway,
    prefix: &str,
    compose_project: &str,
) -> Result<StatsSnapshot, GatewayError> {
    let project_marker = format!("{}_", compose_project);
    let (stats, usage) = tokio::join!(gateway.stats(), gateway.disk_usage());
    let containers: Vec<ContainerStats> = stats?
        .into_iter()
        .filter(|s| s.name.contains(prefix) || s.name.contains(&project_marker))
        .collect();
    let usage = usage.unwrap_or_else(|e| {
        warn!("Docker disk usage unavailable: {}", e);
        DiskUsage::default()
    });

    let (memory_total_mb, disk_total_gb) =
        tokio::task::spawn_blocking(|| (host_memory_mb(), host_disk_gb()))
            .await
            .unwrap_or((0.0, 0.0));

    Ok(StatsSnapshot {
        timestamp: Utc::now(),
        aggregate: aggregate(&containers, memory_total_mb),
        disk: disk_summary(usage, disk_total_gb),
        containers,
    })
}

pub fn disk_summary(usage: DiskUsage, host_total_gb: f64) -> DiskSummary {
    let total_gb = round2(host_total_gb);
    let docker_used_gb = round2(usage.size_bytes / GIB);
    DiskSummary {
        total_gb,
        used_gb: docker_used_gb,
        available_gb: round2(total_gb - docker_used_gb),
        percent: if total_gb > 0.0 {
            round2(docker_used_gb / total_gb * 100.0)
        } else {
            0.0
        },
        docker_used_gb,
        docker_reclaimable_gb: round2(usage.reclaimable_bytes / GIB),
    }
}

pub fn aggregate(containers: &[ContainerStats], memory_total_mb: f64) -> StatsAggregate {
    let count = containers.len();
    let cpu_total: f64 = containers.iter().map(|c| c.cpu_percent).sum();
    let memory_used_mb = containers.iter().map(|c| c.memory_used_bytes).sum::<f64>() / MIB;
    let net_in: f64 = containers.iter().map(|c| c.net_input_bytes).sum();
    let net_out: f64 = containers.iter().map(|c| c.net_output_bytes).sum();

    StatsAggregate {
        container_count: count,
        cpu_total: round2(cpu_total),
        cpu_average: if count > 0 {
            round2(cpu_total / count as f64)
        } else {
            0.0
        },
        memory_used_mb: round2(memory_used_mb),
        memory_total_mb: round2(memory_total_mb),
        memory_percent: if memory_total_mb > 0.0 {
            round2(memory_used_mb / memory_total_mb * 100.0)
        } else {
            0.0
        },
        network_input_mb: round2(net_in / MIB),
        network_output_mb: round2(net_out / MIB),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;

    fn sample(name: &str, cpu: f64, mem_mb: f64) -> ContainerStats {
        ContainerStats {
            name: name.to_string(),
            cpu_percent: cpu,
            memory_used_bytes: mem_mb * MIB,
            memory_percent: 0.0,
            net_input_bytes: MIB,
            net_output_bytes: 2.0 * MIB,
        }
    }

    #[test]
    fn test_aggregate() {
        let stats = vec![sample("stackvo-a", 1.5, 256.0), sample("stackvo-b", 2.25, 768.0)];
        let agg = aggregate(&stats, 4096.0);
        assert_eq!(agg.container_count, 2);
        assert_eq!(agg.cpu_total, 3.75);
        assert_eq!(agg.cpu_average, 1.88);
        assert_eq!(agg.memory_used_mb, 1024.0);
        assert_eq!(agg.memory_percent, 25.0);
        assert_eq!(agg.network_input_mb, 2.0);
        assert_eq!(agg.network_output_mb, 4.0);
    }

    #[test]
    fn test_aggregate_empty() {
        let agg = aggregate(&[], 0.0);
        assert_eq!(agg.cpu_average, 0.0);
        assert_eq!(agg.memory_percent, 0.0);
    }

    #[test]
    fn test_disk_summary() {
        let usage = DiskUsage {
            size_bytes: 25.0 * GIB,
            reclaimable_bytes: 5.5 * GIB,
        };
        let disk = disk_summary(usage, 100.0);
        assert_eq!(disk.total_gb, 100.0);
        assert_eq!(disk.used_gb, 25.0);
        assert_eq!(disk.available_gb, 75.0);
        assert_eq!(disk.percent, 25.0);
        assert_eq!(disk.docker_reclaimable_gb, 5.5);

        let unknown_host = disk_summary(usage, 0.0);
        assert_eq!(unknown_host.percent, 0.0);
    }

    #[tokio::test]
    async fn test_collect_filters_unmanaged_containers() {
        let gateway = FakeGateway::new();
        gateway.set_stats(vec![
            sample("stackvo-redis", 1.0, 10.0),
            sample("stackvo_shop_1", 1.0, 10.0),
            sample("postgres-other", 50.0, 900.0),
        ]);

        gateway.set_disk(DiskUsage {
            size_bytes: 2.0 * GIB,
            reclaimable_bytes: GIB,
        });

        let snapshot = collect(&gateway, "stackvo-", "stackvo").await.unwrap();
        assert_eq!(snapshot.containers.len(), 2);
        assert_eq!(snapshot.aggregate.cpu_total, 2.0);
        assert_eq!(snapshot.disk.docker_used_gb, 2.0);
        assert_eq!(snapshot.disk.docker_reclaimable_gb, 1.0);
        assert_eq!(gateway.calls("df"), 1);
    }
}
