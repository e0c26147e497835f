pub mod memory;
pub mod retry;

use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::common::error::RecordError;
use crate::record::{NewRecord, Record, RecordId, RecordValue};

pub use memory::MemoryStore;
pub use retry::{RetryPolicy, RetryingStore};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// 并发写冲突，可以重试
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("record {0} does not exist")]
    Missing(RecordId),

    #[error("invalid mutation: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<StoreError> for RecordError {
    fn from(e: StoreError) -> Self {
        RecordError::Store(e.to_string())
    }
}

/// 复合操作（读-校验-写）需要持有的锁范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockScope {
    /// 只锁一个主机名
    Host(String),
    /// 先锁全局 CNAME 拓扑，再锁主机名；写 CNAME 时使用
    Topology(String),
}

impl LockScope {
    pub fn hostname(&self) -> &str {
        match self {
            LockScope::Host(h) | LockScope::Topology(h) => h,
        }
    }
}

/// 锁守卫，drop 即释放
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct StoreLock {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl StoreLock {
    pub fn new(guards: Vec<OwnedMutexGuard<()>>) -> Self {
        Self { _guards: guards }
    }
}

/// 权威记录存储。
///
/// 单条读写是原子的；跨多步的操作由调用方先 `lock` 再执行。
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 主机名下的全部记录（含已过期），按插入顺序
    async fn records_for(&self, hostname: &str) -> StoreResult<Vec<Record>>;

    /// 写入新记录，分配 id 与 created_at
    async fn insert(&self, record: NewRecord) -> StoreResult<Record>;

    /// 向已有 A/AAAA 记录追加地址，created_at 与 ttl 不变
    async fn extend_values(&self, id: RecordId, extra: &RecordValue) -> StoreResult<Record>;

    async fn delete(&self, id: RecordId) -> StoreResult<()>;

    /// 从多值 A/AAAA 记录中移除一个地址
    async fn remove_value(&self, id: RecordId, address: IpAddr) -> StoreResult<Record>;

    async fn all(&self) -> StoreResult<Vec<Record>>;

    async fn lock(&self, scope: LockScope) -> StoreResult<StoreLock>;
}
