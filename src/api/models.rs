use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::liveness::expires_at;
use crate::engine::{DeleteOutcome, ResolvedVia, Resolved};
use crate::record::{NewRecord, Record, RecordId, RecordValue};

/// GET /version 响应
#[derive(Serialize)]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
}

/// POST /api/dns 请求体；`ttl_seconds` 缺省时使用配置的默认值
#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub hostname: String,
    #[serde(flatten)]
    pub value: RecordValue,
    pub ttl_seconds: Option<u32>,
}

impl CreateRecordRequest {
    pub fn into_new_record(self, default_ttl_secs: u32) -> NewRecord {
        NewRecord::new(
            self.hostname,
            self.value,
            self.ttl_seconds.unwrap_or(default_ttl_secs),
        )
    }
}

/// 单条记录的对外视图
#[derive(Debug, Serialize)]
pub struct RecordView {
    pub id: RecordId,
    #[serde(flatten)]
    pub value: RecordValue,
    pub ttl_seconds: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Record> for RecordView {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            value: record.value.clone(),
            ttl_seconds: record.ttl_seconds,
            created_at: record.created_at,
            expires_at: expires_at(record),
        }
    }
}

/// POST /api/dns 响应
#[derive(Serialize)]
pub struct CreateRecordResponse {
    pub message: String,
    pub hostname: String,
    pub record: RecordView,
}

/// GET /api/dns/{hostname}/records 响应
#[derive(Serialize)]
pub struct ListRecordsResponse {
    pub hostname: String,
    pub records: Vec<RecordView>,
}

/// GET /api/dns/{hostname} 响应
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub hostname: String,
    pub resolved_ips: Vec<IpAddr>,
    pub record_type: ResolvedVia,
    pub points_to: String,
    pub hop_chain: Vec<String>,
    pub cached: bool,
}

impl From<Resolved> for ResolveResponse {
    fn from(resolved: Resolved) -> Self {
        let r = resolved.resolution;
        Self {
            hostname: r.hostname,
            resolved_ips: r.addresses,
            record_type: r.record_type,
            points_to: r.points_to,
            hop_chain: r.hop_chain,
            cached: resolved.cached,
        }
    }
}

/// DELETE /api/dns/{hostname} 查询参数
#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
}

/// DELETE /api/dns/{hostname} 响应
#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<RecordView>,
}

impl DeleteResponse {
    pub fn new(hostname: String, outcome: &DeleteOutcome) -> Self {
        match outcome {
            DeleteOutcome::RecordDeleted { value, .. } => Self {
                message: format!("Record deleted for {} with value {}", hostname, value),
                hostname,
                remaining: None,
            },
            DeleteOutcome::ValueRemoved { value, remaining } => Self {
                message: format!("Value {} removed from record", value),
                hostname,
                remaining: Some(RecordView::from(remaining)),
            },
        }
    }
}

/// POST /api/dns/admin/cache/flush 响应
#[derive(Serialize)]
pub struct FlushResponse {
    pub dropped: usize,
}

/// 错误响应体
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
