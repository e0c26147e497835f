//! 记录服务：把校验、环检测、存储提交和缓存失效串成完整的读写流程
//!
//! 写流程在独立任务里执行，调用方的 future 被取消也不会打断
//! "加锁 → 校验 → 环检测 → 提交 → 失效" 这一段。

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cache::{InvalidationAck, ResolutionCache};
use super::clock::Clock;
use super::cycle::would_cycle;
use super::liveness::{is_live, live_only, remaining};
use super::reaper::TtlReaper;
use super::resolver::{self, Resolution};
use super::validator::{self, Placement};
use crate::common::error::{RecordError, Result};
use crate::record::{parse_hostname, DeleteMatch, NewRecord, Record, RecordId, RecordType, DEFAULT_TTL_SECS};
use crate::store::{LockScope, RecordStore};

/// 引擎参数
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_cname_depth: usize,
    pub default_ttl_secs: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_cname_depth: 10,
            default_ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

/// 已提交且已完成缓存失效的写操作结果
#[must_use]
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub ack: InvalidationAck,
}

impl<T> Committed<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// 按值删除的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// 整条记录被删除
    RecordDeleted { id: RecordId, value: String },
    /// 只移除了多值记录中的一个地址，返回剩余的记录
    ValueRemoved { value: String, remaining: Record },
}

/// 解析结果以及是否来自缓存
#[derive(Debug, Clone)]
pub struct Resolved {
    pub resolution: Resolution,
    pub cached: bool,
}

struct Inner {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn ResolutionCache>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

#[derive(Clone)]
pub struct RecordService {
    inner: Arc<Inner>,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn ResolutionCache>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                cache,
                clock,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// 与服务共用存储、缓存和时钟的回收器
    pub fn reaper(&self) -> TtlReaper {
        TtlReaper::new(
            self.inner.store.clone(),
            self.inner.cache.clone(),
            self.inner.clock.clone(),
        )
    }

    /// 新增记录。同类型地址记录存活时并入已有记录。
    pub async fn create_record(&self, record: NewRecord) -> Result<Committed<Record>> {
        let record = record.validated()?;
        self.critical_section(move |inner| async move { inner.create(record).await })
            .await
    }

    /// 解析主机名，先查缓存，未命中时走存储并回填
    pub async fn resolve(&self, hostname: &str) -> Result<Resolved> {
        let inner = &self.inner;
        let hostname = parse_hostname(hostname)?;
        let now = inner.clock.now();

        if let Some(hit) = inner.cache.lookup(&hostname).await {
            if hit.expires_at > now {
                return Ok(Resolved {
                    resolution: hit,
                    cached: true,
                });
            }
        }

        let ticket = inner.cache.begin_fill().await;
        let resolution =
            resolver::resolve(&hostname, &*inner.store, now, inner.settings.max_cname_depth).await?;

        let ttl = remaining(resolution.expires_at, now);
        inner
            .cache
            .store(&hostname, resolution.clone(), ttl, ticket)
            .await;

        Ok(Resolved {
            resolution,
            cached: false,
        })
    }

    /// 主机名下全部存活记录，没有时返回 `RecordNotFound`
    pub async fn list_records(&self, hostname: &str) -> Result<Vec<Record>> {
        let hostname = parse_hostname(hostname)?;
        let records = self.inner.store.records_for(&hostname).await?;
        let live = live_only(records, self.inner.clock.now());
        if live.is_empty() {
            return Err(RecordError::RecordNotFound(hostname));
        }
        Ok(live)
    }

    /// 按类型和值删除。多值地址记录只移除命中的那个地址。
    pub async fn delete_record(
        &self,
        hostname: &str,
        record_type: RecordType,
        value: &str,
    ) -> Result<Committed<DeleteOutcome>> {
        let hostname = parse_hostname(hostname)?;
        let value = value.to_string();
        self.critical_section(move |inner| async move {
            inner.delete(hostname, record_type, value).await
        })
        .await
    }

    /// 全量记录，包括已过期但尚未回收的
    pub async fn export(&self) -> Result<Vec<Record>> {
        Ok(self.inner.store.all().await?)
    }

    pub async fn flush_cache(&self) -> usize {
        let dropped = self.inner.cache.clear().await;
        info!(dropped = dropped, "resolution cache flushed");
        dropped
    }

    async fn critical_section<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Arc<Inner>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(f(self.inner.clone()))
            .await
            .map_err(|e| RecordError::Other(anyhow::anyhow!("write task aborted: {}", e)))?
    }
}

impl Inner {
    async fn create(&self, record: NewRecord) -> Result<Committed<Record>> {
        let hostname = record.hostname.clone();
        let cname_target = record.value.cname_target().map(str::to_string);
        let scope = if cname_target.is_some() {
            LockScope::Topology(hostname.clone())
        } else {
            LockScope::Host(hostname.clone())
        };

        let _lock = self.store.lock(scope).await?;
        let now = self.clock.now();
        let existing = self.store.records_for(&hostname).await?;

        let placement = validator::check(&existing, &record, now).inspect_err(|e| {
            debug!(hostname = %hostname, error = %e, "record rejected");
        })?;

        if let Some(target) = &cname_target {
            if would_cycle(&hostname, target, &*self.store, now, self.settings.max_cname_depth).await? {
                warn!(hostname = %hostname, target = %target, "CNAME loop rejected");
                return Err(RecordError::CnameCycle {
                    origin: hostname,
                    target: target.clone(),
                });
            }
        }

        let stored = match placement {
            Placement::Insert => self.store.insert(record).await?,
            Placement::Merge(id) => self.store.extend_values(id, &record.value).await?,
        };
        let ack = self.cache.invalidate(&hostname).await;

        // 顺手清掉同主机名下已过期的记录
        for expired in existing.iter().filter(|r| !is_live(r, now)) {
            if let Err(e) = self.store.delete(expired.id).await {
                debug!(hostname = %hostname, id = %expired.id, error = %e, "expired record cleanup skipped");
            }
        }

        info!(
            hostname = %hostname,
            record_type = %stored.record_type(),
            id = %stored.id,
            merged = matches!(placement, Placement::Merge(_)),
            "record added"
        );
        Ok(Committed { value: stored, ack })
    }

    async fn delete(
        &self,
        hostname: String,
        record_type: RecordType,
        value: String,
    ) -> Result<Committed<DeleteOutcome>> {
        let _lock = self.store.lock(LockScope::Host(hostname.clone())).await?;
        let now = self.clock.now();
        let candidates: Vec<Record> = live_only(self.store.records_for(&hostname).await?, now)
            .into_iter()
            .filter(|r| r.record_type() == record_type)
            .collect();

        if candidates.is_empty() {
            return Err(RecordError::RecordNotFound(hostname));
        }

        for record in &candidates {
            let outcome = match record.value.match_delete(&value) {
                DeleteMatch::Miss => continue,
                DeleteMatch::Whole => {
                    self.store.delete(record.id).await?;
                    DeleteOutcome::RecordDeleted {
                        id: record.id,
                        value: value.clone(),
                    }
                }
                DeleteMatch::Address(ip) => {
                    let remaining = self.store.remove_value(record.id, ip).await?;
                    DeleteOutcome::ValueRemoved {
                        value: ip.to_string(),
                        remaining,
                    }
                }
            };
            let ack = self.cache.invalidate(&hostname).await;
            info!(hostname = %hostname, record_type = %record_type, value = %value, "record value deleted");
            return Ok(Committed {
                value: outcome,
                ack,
            });
        }

        Err(RecordError::ValueNotFound {
            hostname,
            record_type,
            value,
        })
    }
}
