//! 进程内记录存储
//!
//! 可选地把全量记录写入一个 JSON 快照文件（先写临时文件再重命名），启动时从快照恢复。
//! 快照加载不经过冲突校验和环检测，所以解析器必须能容忍任意存储状态。

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::{LockScope, RecordStore, StoreError, StoreLock, StoreResult};
use crate::engine::clock::Clock;
use crate::record::{NewRecord, Record, RecordId, RecordValue};

/// 超过这个数量时清理没人持有的主机名锁
const HOST_LOCK_PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Default)]
struct State {
    next_id: u64,
    records: BTreeMap<RecordId, Record>,
    by_host: HashMap<String, Vec<RecordId>>,
}

impl State {
    fn from_records(records: Vec<Record>, next_id: u64) -> Self {
        let mut state = State {
            next_id,
            ..Default::default()
        };
        for record in records {
            state.next_id = state.next_id.max(record.id.0 + 1);
            state
                .by_host
                .entry(record.hostname.clone())
                .or_default()
                .push(record.id);
            state.records.insert(record.id, record);
        }
        state
    }

    fn get_mut(&mut self, id: RecordId) -> StoreResult<&mut Record> {
        self.records.get_mut(&id).ok_or(StoreError::Missing(id))
    }

    fn remove(&mut self, id: RecordId) -> StoreResult<Record> {
        let record = self.records.remove(&id).ok_or(StoreError::Missing(id))?;
        if let Some(ids) = self.by_host.get_mut(&record.hostname) {
            ids.retain(|x| *x != id);
            if ids.is_empty() {
                self.by_host.remove(&record.hostname);
            }
        }
        Ok(record)
    }
}

/// 快照文件格式
#[derive(Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    records: Vec<Record>,
}

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
    host_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    topology: Arc<Mutex<()>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_state(clock, State::default(), None)
    }

    /// 打开带快照的存储，文件不存在时从空状态开始
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let path = path.into();
        let state = match Self::load_snapshot(&path)? {
            Some(snapshot) => {
                info!(
                    path = %path.display(),
                    records = snapshot.records.len(),
                    "record snapshot loaded"
                );
                State::from_records(snapshot.records, snapshot.next_id)
            }
            None => State::default(),
        };
        Ok(Self::with_state(clock, state, Some(path)))
    }

    /// 直接灌入记录，不做任何校验（恢复、回放、测试用）
    pub fn from_records(records: Vec<Record>, clock: Arc<dyn Clock>) -> Self {
        Self::with_state(clock, State::from_records(records, 0), None)
    }

    fn with_state(clock: Arc<dyn Clock>, state: State, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            clock,
            state: RwLock::new(state),
            host_locks: std::sync::Mutex::new(HashMap::new()),
            topology: Arc::new(Mutex::new(())),
            snapshot_path,
        }
    }

    fn load_snapshot(path: &Path) -> StoreResult<Option<Snapshot>> {
        match std::fs::read_to_string(path) {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_snapshot(path: &Path, state: &State) -> StoreResult<()> {
        let snapshot = Snapshot {
            next_id: state.next_id,
            records: state.records.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        // 原子写入：先写临时文件再重命名
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, path)?;

        debug!(bytes = json.len(), records = snapshot.records.len(), "record snapshot saved");
        Ok(())
    }

    /// 在写锁内执行一次变更。开启快照时先在副本上变更并落盘成功后再替换，
    /// 失败时内存状态保持不变。
    async fn mutate<T>(&self, f: impl FnOnce(&mut State) -> StoreResult<T>) -> StoreResult<T> {
        let mut state = self.state.write().await;
        match &self.snapshot_path {
            Some(path) => {
                let mut next = state.clone();
                let out = f(&mut next)?;
                Self::save_snapshot(path, &next)?;
                *state = next;
                Ok(out)
            }
            None => f(&mut *state),
        }
    }

    fn host_lock(&self, hostname: &str) -> Arc<Mutex<()>> {
        let mut locks = self.host_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.len() > HOST_LOCK_PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(hostname.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn records_for(&self, hostname: &str) -> StoreResult<Vec<Record>> {
        let state = self.state.read().await;
        Ok(state
            .by_host
            .get(hostname)
            .map(|ids| ids.iter().filter_map(|id| state.records.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn insert(&self, record: NewRecord) -> StoreResult<Record> {
        let created_at = self.clock.now();
        self.mutate(|state| {
            let id = RecordId(state.next_id);
            state.next_id += 1;
            let stored = Record {
                id,
                hostname: record.hostname,
                value: record.value,
                ttl_seconds: record.ttl_seconds,
                created_at,
            };
            state
                .by_host
                .entry(stored.hostname.clone())
                .or_default()
                .push(id);
            state.records.insert(id, stored.clone());
            Ok(stored)
        })
        .await
    }

    async fn extend_values(&self, id: RecordId, extra: &RecordValue) -> StoreResult<Record> {
        self.mutate(|state| {
            let record = state.get_mut(id)?;
            record
                .value
                .extend_with(extra)
                .map_err(|e| StoreError::Invalid(e.to_string()))?;
            Ok(record.clone())
        })
        .await
    }

    async fn delete(&self, id: RecordId) -> StoreResult<()> {
        self.mutate(|state| state.remove(id).map(|_| ())).await
    }

    async fn remove_value(&self, id: RecordId, address: IpAddr) -> StoreResult<Record> {
        self.mutate(|state| {
            let record = state.get_mut(id)?;
            if record.value.addresses().len() <= 1 {
                return Err(StoreError::Invalid(format!(
                    "record {} would be left without addresses",
                    id
                )));
            }
            if !record.value.remove_address(address) {
                return Err(StoreError::Invalid(format!(
                    "record {} does not hold {}",
                    id, address
                )));
            }
            Ok(record.clone())
        })
        .await
    }

    async fn all(&self) -> StoreResult<Vec<Record>> {
        Ok(self.state.read().await.records.values().cloned().collect())
    }

    async fn lock(&self, scope: LockScope) -> StoreResult<StoreLock> {
        let mut guards = Vec::with_capacity(2);
        if let LockScope::Topology(_) = &scope {
            guards.push(self.topology.clone().lock_owned().await);
        }
        guards.push(self.host_lock(scope.hostname()).lock_owned().await);
        Ok(StoreLock::new(guards))
    }
}
