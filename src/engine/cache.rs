use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use super::resolver::Resolution;

/// 失效确认。只能由缓存的 `invalidate` 产生，写操作的返回值必须携带它。
#[must_use = "a write is only complete once its cache invalidation is acknowledged"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationAck {
    hostname: String,
    dropped: usize,
}

impl InvalidationAck {
    pub fn new(hostname: impl Into<String>, dropped: usize) -> Self {
        Self {
            hostname: hostname.into(),
            dropped,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// 本次失效移除的缓存条目数
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// 回填凭证：读取存储之前领取，回填时用来判断期间是否发生过失效
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

/// 解析结果的读穿缓存
#[async_trait]
pub trait ResolutionCache: Send + Sync {
    async fn lookup(&self, key: &str) -> Option<Resolution>;

    async fn begin_fill(&self) -> FillTicket;

    /// 回填一条结果。领取 ticket 之后若有任何失效发生，放弃回填并返回 false。
    async fn store(&self, key: &str, value: Resolution, ttl: Duration, ticket: FillTicket) -> bool;

    /// 移除 `hostname` 自身的条目以及解析链经过它的所有条目
    async fn invalidate(&self, hostname: &str) -> InvalidationAck;

    async fn clear(&self) -> usize;
}

struct CacheEntry {
    value: Resolution,
    expires_at: Instant,
}

struct Inner {
    entries: LruCache<String, CacheEntry>,
    /// 主机名 -> 解析链经过它的缓存 key
    dependents: HashMap<String, HashSet<String>>,
    generation: u64,
}

impl Inner {
    fn unlink(&mut self, key: &str, entry: &CacheEntry) {
        for dep in entry.value.dependencies() {
            if let Some(keys) = self.dependents.get_mut(dep) {
                keys.remove(key);
                if keys.is_empty() {
                    self.dependents.remove(dep);
                }
            }
        }
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.pop(key) else {
            return false;
        };
        self.unlink(key, &entry);
        true
    }
}

/// 进程内缓存实现，容量有上限，超出时淘汰最久未使用的条目
pub struct MemoryCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(ttl_secs: u64, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                dependents: HashMap::new(),
                generation: 0,
            }),
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}

#[async_trait]
impl ResolutionCache for MemoryCache {
    async fn lookup(&self, key: &str) -> Option<Resolution> {
        let mut inner = self.inner.lock().await;
        // get 会把命中的条目提到最新
        let fresh = inner
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > Instant::now()).then(|| entry.value.clone()));
        match fresh {
            Some(Some(hit)) => {
                debug!(hostname = key, "resolution cache hit");
                Some(hit)
            }
            Some(None) => {
                inner.remove_entry(key);
                None
            }
            None => None,
        }
    }

    async fn begin_fill(&self) -> FillTicket {
        FillTicket(self.inner.lock().await.generation)
    }

    async fn store(&self, key: &str, value: Resolution, ttl: Duration, ticket: FillTicket) -> bool {
        let ttl = ttl.min(self.ttl);
        if ttl.is_zero() || self.max_entries == 0 {
            return false;
        }
        let mut inner = self.inner.lock().await;
        if inner.generation != ticket.0 {
            debug!(hostname = key, "resolution fill skipped, invalidated while resolving");
            return false;
        }

        inner.remove_entry(key);
        for dep in value.dependencies() {
            inner
                .dependents
                .entry(dep.to_string())
                .or_default()
                .insert(key.to_string());
        }
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        if let Some((evicted_key, evicted)) = inner.entries.push(key.to_string(), entry) {
            debug!(hostname = %evicted_key, "resolution cache full, evicted");
            inner.unlink(&evicted_key, &evicted);
        }
        true
    }

    async fn invalidate(&self, hostname: &str) -> InvalidationAck {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;

        let mut keys = inner.dependents.remove(hostname).unwrap_or_default();
        keys.insert(hostname.to_string());
        let dropped = keys.iter().filter(|key| inner.remove_entry(key)).count();
        if dropped > 0 {
            debug!(hostname = hostname, dropped = dropped, "resolution cache invalidated");
        }
        InvalidationAck::new(hostname, dropped)
    }

    async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.generation += 1;
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.dependents.clear();
        dropped
    }
}
