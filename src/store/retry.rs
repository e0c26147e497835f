//! 存储适配层的重试
//!
//! 可重试的存储错误（并发写冲突）在这里重试一次，之后原样上抛，由引擎映射为通用存储失败。
//! 引擎本身不做重试。

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{LockScope, RecordStore, StoreLock, StoreResult};
use crate::record::{NewRecord, Record, RecordId, RecordValue};

/// Exponential backoff retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(exp_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// Run a store operation, retrying only failures the store marks as retryable.
pub async fn retry_store_op<F, Fut, T>(policy: &RetryPolicy, op: &'static str, mut f: F) -> StoreResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = StoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        match f(attempt).await {
            Ok(val) => {
                if attempt > 0 {
                    debug!(op = op, attempt = attempt, "store retry succeeded");
                }
                return Ok(val);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                debug!(
                    op = op,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying store operation after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(op = op, attempts = attempt + 1, error = %e, "store operation failed after retry");
                }
                return Err(e);
            }
        }
    }
}

/// 给任意存储加上一次重试的包装
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RecordStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for RetryingStore<S> {
    async fn records_for(&self, hostname: &str) -> StoreResult<Vec<Record>> {
        retry_store_op(&self.policy, "records_for", |_| self.inner.records_for(hostname)).await
    }

    async fn insert(&self, record: NewRecord) -> StoreResult<Record> {
        retry_store_op(&self.policy, "insert", |_| self.inner.insert(record.clone())).await
    }

    async fn extend_values(&self, id: RecordId, extra: &RecordValue) -> StoreResult<Record> {
        retry_store_op(&self.policy, "extend_values", |_| self.inner.extend_values(id, extra)).await
    }

    async fn delete(&self, id: RecordId) -> StoreResult<()> {
        retry_store_op(&self.policy, "delete", |_| self.inner.delete(id)).await
    }

    async fn remove_value(&self, id: RecordId, address: IpAddr) -> StoreResult<Record> {
        retry_store_op(&self.policy, "remove_value", |_| self.inner.remove_value(id, address)).await
    }

    async fn all(&self) -> StoreResult<Vec<Record>> {
        retry_store_op(&self.policy, "all", |_| self.inner.all()).await
    }

    async fn lock(&self, scope: LockScope) -> StoreResult<StoreLock> {
        retry_store_op(&self.policy, "lock", |_| self.inner.lock(scope.clone())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::ManualClock;
    use crate::store::{MemoryStore, StoreError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// 前 n 次 insert 返回写冲突
    struct FlakyStore {
        inner: MemoryStore,
        conflicts_left: AtomicU32,
        inserts: AtomicU32,
    }

    impl FlakyStore {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: MemoryStore::new(Arc::new(ManualClock::at_epoch_secs(0))),
                conflicts_left: AtomicU32::new(conflicts),
                inserts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RecordStore for FlakyStore {
        async fn records_for(&self, hostname: &str) -> StoreResult<Vec<Record>> {
            self.inner.records_for(hostname).await
        }
        async fn insert(&self, record: NewRecord) -> StoreResult<Record> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Conflict("serialization failure".into()));
            }
            self.inner.insert(record).await
        }
        async fn extend_values(&self, id: RecordId, extra: &RecordValue) -> StoreResult<Record> {
            self.inner.extend_values(id, extra).await
        }
        async fn delete(&self, id: RecordId) -> StoreResult<()> {
            self.inner.delete(id).await
        }
        async fn remove_value(&self, id: RecordId, address: IpAddr) -> StoreResult<Record> {
            self.inner.remove_value(id, address).await
        }
        async fn all(&self) -> StoreResult<Vec<Record>> {
            self.inner.all().await
        }
        async fn lock(&self, scope: LockScope) -> StoreResult<StoreLock> {
            self.inner.lock(scope).await
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn txt(host: &str) -> NewRecord {
        NewRecord::new(host, RecordValue::Txt(vec!["hello".into()]), 60)
    }

    #[test]
    fn retry_policy_exponential_delay() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        // capped at max_delay
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn single_conflict_is_absorbed() {
        let store = RetryingStore::new(FlakyStore::new(1), fast_policy());
        store.insert(txt("a.example")).await.unwrap();
        assert_eq!(store.inner().inserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_exactly_once() {
        let store = RetryingStore::new(FlakyStore::new(5), fast_policy());
        let err = store.insert(txt("a.example")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.inner().inserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let store = RetryingStore::new(FlakyStore::new(0), fast_policy());
        let err = store.delete(RecordId(42)).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing(RecordId(42))));
    }
}
