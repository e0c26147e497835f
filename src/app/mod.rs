use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api;
use crate::config::{ApiConfig, Config, ReaperConfig};
use crate::engine::{Clock, MemoryCache, RecordService, SystemClock};
use crate::store::{MemoryStore, RecordStore, RetryingStore};

pub struct App {
    service: RecordService,
    api: ApiConfig,
    reaper: ReaperConfig,
    cancel: CancellationToken,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let memory = match &config.store.snapshot_path {
            Some(path) => MemoryStore::open(path, clock.clone())
                .with_context(|| format!("failed to open record snapshot {}", path.display()))?,
            None => {
                info!("no snapshot_path configured, records are kept in memory only");
                MemoryStore::new(clock.clone())
            }
        };
        let store: Arc<dyn RecordStore> =
            Arc::new(RetryingStore::new(memory, config.store.retry_policy()));
        let cache = Arc::new(MemoryCache::new(
            config.cache.ttl_secs,
            config.cache.max_entries,
        ));
        let service = RecordService::new(store, cache, clock, config.engine.settings());

        Ok(Self {
            service,
            api: config.api,
            reaper: config.reaper,
            cancel: CancellationToken::new(),
        })
    }

    pub fn service(&self) -> &RecordService {
        &self.service
    }

    /// 运行直到收到 Ctrl-C
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
    }

    /// 启动 API 和回收任务，`shutdown` 完成后依次停止
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let (addr, api_handle) =
            api::start(&self.api, self.service.clone(), self.cancel.clone()).await?;

        let reaper_handle = if self.reaper.enabled {
            info!(interval_secs = self.reaper.interval_secs, "TTL reaper started");
            Some(
                self.service
                    .reaper()
                    .spawn(self.reaper.interval(), self.cancel.clone()),
            )
        } else {
            info!("TTL reaper disabled");
            None
        };

        info!(addr = %addr, "recordbook started");
        shutdown.await;

        info!("recordbook shutting down");
        self.cancel.cancel();
        if let Err(e) = api_handle.await {
            warn!(error = %e, "API task ended abnormally");
        }
        if let Some(handle) = reaper_handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "TTL reaper task ended abnormally");
            }
        }
        info!("recordbook stopped");
        Ok(())
    }
}
