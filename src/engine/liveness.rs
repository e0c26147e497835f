//! 记录存活判定
//!
//! 全部组件（解析、冲突校验、环检测、缓存 TTL、清理任务）都只通过这里判断过期，
//! 不允许各自重新计算。

use chrono::{DateTime, Duration, Utc};

use crate::record::Record;

/// 记录失效的时间点：created_at + ttl_seconds，溢出时视为永不过期
pub fn expires_at(record: &Record) -> DateTime<Utc> {
    record
        .created_at
        .checked_add_signed(Duration::seconds(i64::from(record.ttl_seconds)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now < created_at + ttl`，边界时刻视为已过期
pub fn is_live(record: &Record, now: DateTime<Utc>) -> bool {
    now < expires_at(record)
}

/// 距 `expires_at` 的剩余时长，已过期为零
pub fn remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    expires_at
        .signed_duration_since(now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

pub fn live_only(records: Vec<Record>, now: DateTime<Utc>) -> Vec<Record> {
    records.into_iter().filter(|r| is_live(r, now)).collect()
}
