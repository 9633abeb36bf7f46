//! 构建前的就绪等待
//!
//! 生成器写出 Dockerfile 之前不能开始构建，这里用有上限的指数退避轮询。

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 轮询策略
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub initial: Duration,
    pub max_interval: Duration,
    pub budget: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max_interval: Duration::from_secs(1),
            budget: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Dockerfile not ready yet. Please try again in a few seconds.")]
pub struct ReadinessTimeout {
    pub path: PathBuf,
    pub waited: Duration,
}

/// 等待文件出现；已存在时立即返回
pub async fn wait_for_file(path: &Path, policy: ReadinessPolicy) -> Result<(), ReadinessTimeout> {
    let started = Instant::now();
    let deadline = started + policy.budget;
    let mut interval = policy.initial;

    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), waited_ms = started.elapsed().as_millis() as u64, "Readiness descriptor present");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(path = %path.display(), "Readiness descriptor never appeared");
            return Err(ReadinessTimeout {
                path: path.to_path_buf(),
                waited: now - started,
            });
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
        interval = (interval * 2).min(policy.max_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_present_file_proceeds_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Dockerfile");
        std::fs::write(&path, "FROM php:8.3-fpm").unwrap();

        let started = std::time::Instant::now();
        wait_for_file(&path, ReadinessPolicy::default()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_file_appearing_later_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Dockerfile");
        let writer_path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            tokio::fs::write(writer_path, "FROM node:20").await.unwrap();
        });

        wait_for_file(&path, ReadinessPolicy::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_times_out_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Dockerfile");
        let policy = ReadinessPolicy {
            initial: Duration::from_millis(20),
            max_interval: Duration::from_millis(50),
            budget: Duration::from_millis(200),
        };

        let started = std::time::Instant::now();
        let err = wait_for_file(&path, policy).await.unwrap_err();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(1));
        assert_eq!(err.path, path);
        assert!(err.to_string().contains("try again"));
    }
}
