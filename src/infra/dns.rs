//! 域名解析检查（本地 hosts / DNS 是否已配置项目域名）

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait DomainResolver: Send + Sync {
    /// 解析到一个与域名字面值不同的地址时返回 true
    async fn resolves(&self, domain: &str) -> bool;
}

/// 系统解析器（`getaddrinfo`）
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl DomainResolver for SystemResolver {
    async fn resolves(&self, domain: &str) -> bool {
        let domain = domain.trim();
        if domain.is_empty() {
            return false;
        }

        let lookup = tokio::net::lookup_host((domain, 80));
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(mut addrs)) => addrs.any(|addr| addr.ip().to_string() != domain),
            Ok(Err(e)) => {
                debug!(domain = domain, "Domain does not resolve: {}", e);
                false
            }
            Err(_) => {
                debug!(domain = domain, "Domain resolution timed out");
                false
            }
        }
    }
}
