use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::engine::EngineSettings;
use crate::record::{DEFAULT_TTL_SECS, MIN_TTL_SECS};
use crate::store::RetryPolicy;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_cname_depth == 0 {
            anyhow::bail!("engine.max_cname_depth must be at least 1");
        }
        if self.engine.default_ttl_secs < MIN_TTL_SECS {
            anyhow::bail!(
                "engine.default_ttl_secs must be >= {}, got {}",
                MIN_TTL_SECS,
                self.engine.default_ttl_secs
            );
        }
        if self.reaper.enabled && self.reaper.interval_secs == 0 {
            anyhow::bail!("reaper.interval_secs must be positive when the reaper is enabled");
        }
        if let Some(secret) = &self.api.secret {
            if secret.trim().is_empty() {
                anyhow::bail!("api.secret must not be blank, remove it to disable auth");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// 设置后所有 /api 请求都要带 `Authorization: Bearer <secret>`
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            secret: None,
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8053
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_cname_depth: usize,
    pub default_ttl_secs: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cname_depth: 10,
            default_ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            max_cname_depth: self.max_cname_depth,
            default_ttl_secs: self.default_ttl_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 缓存条目寿命上限，实际还会被记录剩余寿命截断
    pub ttl_secs: u64,
    /// 0 表示关闭缓存
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON 快照文件；不设置时记录只保存在内存
    pub snapshot_path: Option<PathBuf>,
    pub retry_base_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            retry_base_delay_ms: 20,
        }
    }
}

impl StoreConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryPolicy::default()
        }
    }
}
