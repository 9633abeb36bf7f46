//! 运行时查询结果的短期缓存
//!
//! 只是用来削峰：并发的状态请求在 TTL 内复用同一次 `docker inspect` 结果。
//! 不做 single-flight，同时发生的 miss 会各自查询。错误结果不缓存。
//! TTL 从查询发起时算起；查询期间发生过失效的结果不写回。

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::CacheSettings;
use crate::domain::{ContainerName, NetworkInfo, PortMap, RuntimeState};
use crate::infra::{GatewayError, RuntimeGateway};

/// 时间源
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 手动推进的时钟（测试用）
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.origin + offset
    }
}

/// 缓存键：(操作, 目标容器)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub op: &'static str,
    pub target: String,
}

impl CacheKey {
    pub fn new(op: &'static str, target: impl Into<String>) -> Self {
        Self {
            op,
            target: target.into(),
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// 带 TTL 的缓存
pub struct TtlCache<V> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
    enabled: AtomicBool,
    /// 每次失效加一
    generation: AtomicU64,
}

impl<V: Clone + Send + Sync> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            enabled: AtomicBool::new(true),
            generation: AtomicU64::new(0),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// 读取未过期的值
    pub async fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    pub async fn set(&self, key: CacheKey, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.insert(key, value, expires_at, None).await;
    }

    /// `seen`：查询发起时的失效代数，期间有过失效则丢弃
    async fn insert(&self, key: CacheKey, value: V, expires_at: Instant, seen: Option<u64>) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.write().await;
        if seen.is_some_and(|g| g != self.generation.load(Ordering::SeqCst)) {
            debug!(target = %key.target, op = key.op, "Dropping result computed before invalidation");
            return;
        }
        // 顺便清理已过期的条目
        let now = self.clock.now();
        entries.retain(|_, entry| now < entry.expires_at);
        entries.insert(key, CacheEntry { value, expires_at });
    }

    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        let dropped = entries.len();
        entries.clear();
        debug!(dropped = dropped, "Cache cleared");
    }

    /// 删除某个容器的所有缓存条目
    pub async fn invalidate_target(&self, target: &str) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.retain(|key, _| key.target != target);
        debug!(target = target, "Cache invalidated for target");
    }

    /// get-or-compute；计算失败时不写入缓存
    pub async fn remember<F, Fut, E>(&self, key: CacheKey, ttl: Duration, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key).await {
            return Ok(hit);
        }
        let started = self.clock.now();
        let generation = self.generation.load(Ordering::SeqCst);
        let value = compute().await?;
        self.insert(key, value.clone(), started + ttl, Some(generation)).await;
        Ok(value)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// 缓存的探测结果
#[derive(Debug, Clone)]
pub enum Probe {
    State(RuntimeState),
    Ports(PortMap),
    Network(NetworkInfo),
}

/// 只读查询走缓存的运行时网关视图
///
/// 写操作（start/stop/build）直接调用底层网关，再由调用方失效缓存。
#[derive(Clone)]
pub struct CachedGateway {
    gateway: Arc<dyn RuntimeGateway>,
    cache: Arc<TtlCache<Probe>>,
    state_ttl: Duration,
    inspect_ttl: Duration,
}

impl CachedGateway {
    pub fn new(
        gateway: Arc<dyn RuntimeGateway>,
        cache: Arc<TtlCache<Probe>>,
        settings: &CacheSettings,
    ) -> Self {
        cache.set_enabled(settings.enabled);
        Self {
            gateway,
            cache,
            state_ttl: settings.state_ttl,
            inspect_ttl: settings.inspect_ttl,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn RuntimeGateway> {
        &self.gateway
    }

    pub fn cache(&self) -> &Arc<TtlCache<Probe>> {
        &self.cache
    }

    pub async fn state(&self, name: &ContainerName) -> Result<RuntimeState, GatewayError> {
        let key = CacheKey::new("state", name.as_str());
        let probe = self
            .cache
            .remember(key, self.state_ttl, || async {
                self.gateway.state(name).await.map(Probe::State)
            })
            .await?;
        match probe {
            Probe::State(state) => Ok(state),
            _ => Err(unexpected_probe(name)),
        }
    }

    pub async fn ports(&self, name: &ContainerName) -> Result<PortMap, GatewayError> {
        let key = CacheKey::new("ports", name.as_str());
        let probe = self
            .cache
            .remember(key, self.inspect_ttl, || async {
                self.gateway.inspect_ports(name).await.map(Probe::Ports)
            })
            .await?;
        match probe {
            Probe::Ports(ports) => Ok(ports),
            _ => Err(unexpected_probe(name)),
        }
    }

    pub async fn network(&self, name: &ContainerName) -> Result<NetworkInfo, GatewayError> {
        let key = CacheKey::new("network", name.as_str());
        let probe = self
            .cache
            .remember(key, self.inspect_ttl, || async {
                self.gateway.inspect_network(name).await.map(Probe::Network)
            })
            .await?;
        match probe {
            Probe::Network(network) => Ok(network),
            _ => Err(unexpected_probe(name)),
        }
    }
}

fn unexpected_probe(name: &ContainerName) -> GatewayError {
    GatewayError::Malformed {
        output: format!("cache entry kind mismatch for {}", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;

    fn cache_with_clock() -> (Arc<ManualClock>, TtlCache<u32>) {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::new(clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn test_entry_expires_at_ttl() {
        let (clock, cache) = cache_with_clock();
        let key = CacheKey::new("state", "stackvo-redis");
        cache.set(key.clone(), 1, Duration::from_secs(5)).await;

        clock.advance(Duration::from_millis(4999));
        assert_eq!(cache.get(&key).await, Some(1));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_invalidate_target_and_all() {
        let (_clock, cache) = cache_with_clock();
        let ttl = Duration::from_secs(10);
        cache.set(CacheKey::new("state", "a"), 1, ttl).await;
        cache.set(CacheKey::new("ports", "a"), 2, ttl).await;
        cache.set(CacheKey::new("state", "b"), 3, ttl).await;

        cache.invalidate_target("a").await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&CacheKey::new("state", "b")).await, Some(3));

        cache.invalidate_all().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_remember_does_not_cache_errors() {
        let (_clock, cache) = cache_with_clock();
        let key = CacheKey::new("state", "x");

        let failed: Result<u32, &str> = cache
            .remember(key.clone(), Duration::from_secs(5), || async { Err("boom") })
            .await;
        assert!(failed.is_err());
        assert_eq!(cache.get(&key).await, None);

        let ok: Result<u32, &str> = cache
            .remember(key.clone(), Duration::from_secs(5), || async { Ok(7) })
            .await;
        assert_eq!(ok, Ok(7));

        let hit: Result<u32, &str> = cache
            .remember(key, Duration::from_secs(5), || async { Ok(99) })
            .await;
        assert_eq!(hit, Ok(7));
    }

    #[tokio::test]
    async fn test_ttl_counts_from_query_start() {
        let (clock, cache) = cache_with_clock();
        let key = CacheKey::new("state", "stackvo-redis");

        let slow_clock = clock.clone();
        let value: Result<u32, &str> = cache
            .remember(key.clone(), Duration::from_secs(5), || async move {
                slow_clock.advance(Duration::from_secs(3));
                Ok(1)
            })
            .await;
        assert_eq!(value, Ok(1));

        clock.advance(Duration::from_millis(1999));
        assert_eq!(cache.get(&key).await, Some(1));
        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_result_from_before_invalidation_is_not_stored() {
        let (_clock, cache) = cache_with_clock();
        let cache = Arc::new(cache);
        let key = CacheKey::new("state", "stackvo-redis");

        let mutator = cache.clone();
        let stale: Result<u32, &str> = cache
            .remember(key.clone(), Duration::from_secs(5), || async move {
                // 查询进行中，另一请求完成了 stop 并失效缓存
                mutator.invalidate_target("stackvo-redis").await;
                Ok(1)
            })
            .await;
        assert_eq!(stale, Ok(1));
        assert_eq!(cache.get(&key).await, None);

        let fresh: Result<u32, &str> = cache
            .remember(key.clone(), Duration::from_secs(5), || async { Ok(2) })
            .await;
        assert_eq!(fresh, Ok(2));
        assert_eq!(cache.get(&key).await, Some(2));
    }

    #[tokio::test]
    async fn test_disabled_cache_always_misses() {
        let (_clock, cache) = cache_with_clock();
        cache.set_enabled(false);
        let key = CacheKey::new("state", "x");
        cache.set(key.clone(), 1, Duration::from_secs(5)).await;
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_cached_gateway_bounds_queries() {
        let clock = Arc::new(ManualClock::new());
        let fake = Arc::new(FakeGateway::new());
        fake.set_state("stackvo-redis", RuntimeState::Running);
        let settings = CacheSettings {
            enabled: true,
            state_ttl: Duration::from_secs(5),
            inspect_ttl: Duration::from_secs(10),
        };
        let cached = CachedGateway::new(fake.clone(), Arc::new(TtlCache::new(clock.clone())), &settings);
        let name = ContainerName::parse("stackvo-redis").unwrap();

        for _ in 0..3 {
            assert_eq!(cached.state(&name).await.unwrap(), RuntimeState::Running);
        }
        assert_eq!(fake.calls("state"), 1);

        fake.set_state("stackvo-redis", RuntimeState::Stopped);
        clock.advance(Duration::from_secs(5));
        assert_eq!(cached.state(&name).await.unwrap(), RuntimeState::Stopped);
        assert_eq!(fake.calls("state"), 2);
    }
}
