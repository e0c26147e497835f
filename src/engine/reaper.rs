//! 过期记录回收
//!
//! 回收只是清理存储，不是过期的唯一保证：解析和校验都会自行过滤过期记录，
//! 回收延迟只会让存储变大，不会影响结果。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::ResolutionCache;
use super::clock::Clock;
use super::liveness::is_live;
use crate::common::error::Result;
use crate::record::RecordId;
use crate::store::{LockScope, RecordStore, StoreError};

/// 一轮回收的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub purged: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct TtlReaper {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn ResolutionCache>,
    clock: Arc<dyn Clock>,
}

impl TtlReaper {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn ResolutionCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, cache, clock }
    }

    /// 扫描一轮。单个主机名失败只计数，留给下一轮。
    pub async fn run_once(&self) -> Result<SweepReport> {
        let records = self.store.all().await?;
        let now = self.clock.now();
        let mut report = SweepReport {
            scanned: records.len(),
            ..Default::default()
        };

        let mut expired: BTreeMap<String, Vec<RecordId>> = BTreeMap::new();
        for record in records.iter().filter(|r| !is_live(r, now)) {
            expired.entry(record.hostname.clone()).or_default().push(record.id);
        }

        for (hostname, ids) in expired {
            match self.purge_host(&hostname, &ids).await {
                Ok(purged) => report.purged += purged,
                Err(e) => {
                    warn!(hostname = %hostname, error = %e, "expired record purge failed, retrying next sweep");
                    report.failed += ids.len();
                }
            }
        }

        if report.purged > 0 || report.failed > 0 {
            info!(
                scanned = report.scanned,
                purged = report.purged,
                failed = report.failed,
                "TTL sweep finished"
            );
        } else {
            debug!(scanned = report.scanned, "TTL sweep found nothing to purge");
        }
        Ok(report)
    }

    async fn purge_host(&self, hostname: &str, ids: &[RecordId]) -> Result<usize> {
        let _lock = self.store.lock(LockScope::Host(hostname.to_string())).await?;

        // 加锁后重新读取：扫描期间记录可能已被删除或替换
        let now = self.clock.now();
        let current = self.store.records_for(hostname).await?;
        let mut purged = 0;
        for record in current
            .iter()
            .filter(|r| ids.contains(&r.id) && !is_live(r, now))
        {
            match self.store.delete(record.id).await {
                Ok(()) => purged += 1,
                Err(StoreError::Missing(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if purged > 0 {
            let ack = self.cache.invalidate(hostname).await;
            debug!(hostname = %hostname, purged = purged, dropped = ack.dropped(), "expired records purged");
        }
        Ok(purged)
    }

    /// 按固定间隔回收，直到 `cancel` 触发
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // 跳过首次立即触发

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("TTL reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!(error = %e, "TTL sweep failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cache::MemoryCache;
    use crate::engine::clock::ManualClock;
    use crate::engine::service::{EngineSettings, RecordService};
    use crate::record::{NewRecord, RecordValue};
    use crate::store::MemoryStore;
    use chrono::Duration as ChronoDuration;

    fn setup() -> (RecordService, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch_secs(5_000));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let cache = Arc::new(MemoryCache::new(600, 128));
        let service = RecordService::new(store.clone(), cache, clock.clone(), EngineSettings::default());
        (service, store, clock)
    }

    fn txt(host: &str, ttl: u32) -> NewRecord {
        NewRecord::new(host, RecordValue::Txt(vec!["v".into()]), ttl)
    }

    #[tokio::test]
    async fn purges_only_expired() {
        let (service, store, clock) = setup();
        let _ = service.create_record(txt("short.example", 60)).await.unwrap();
        let _ = service.create_record(txt("long.example", 600)).await.unwrap();

        let reaper = service.reaper();
        assert_eq!(
            reaper.run_once().await.unwrap(),
            SweepReport {
                scanned: 2,
                purged: 0,
                failed: 0
            }
        );

        clock.advance(ChronoDuration::seconds(60));
        let report = reaper.run_once().await.unwrap();
        assert_eq!(report.purged, 1);
        assert!(store.records_for("short.example").await.unwrap().is_empty());
        assert_eq!(store.records_for("long.example").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_invalidates_cached_resolution() {
        let (service, _store, clock) = setup();
        let _ = service
            .create_record(NewRecord::new(
                "a.example",
                RecordValue::A(vec!["1.1.1.1".parse().unwrap()]),
                60,
            ))
            .await
            .unwrap();
        let _ = service
            .create_record(NewRecord::new("b.example", RecordValue::Cname("a.example".into()), 600))
            .await
            .unwrap();
        assert!(service.resolve("b.example").await.is_ok());

        clock.advance(ChronoDuration::seconds(61));
        assert_eq!(service.reaper().run_once().await.unwrap().purged, 1);
        assert!(service.resolve("b.example").await.is_err());
    }

    #[tokio::test]
    async fn spawned_reaper_stops_on_cancel() {
        let (service, store, clock) = setup();
        let _ = service.create_record(txt("gone.example", 60)).await.unwrap();
        clock.advance(ChronoDuration::seconds(120));

        let cancel = CancellationToken::new();
        let handle = service
            .reaper()
            .spawn(Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.len().await, 0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
