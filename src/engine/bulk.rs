//! 批量导入
//!
//! 每一项单独走正常的写入路径（校验、环检测、提交、失效），
//! 某一项失败只记录错误，不影响其余项。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::service::RecordService;
use crate::common::error::{RecordError, Result};
use crate::record::{NewRecord, RecordType, RecordValue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportAction {
    #[default]
    Create,
    Delete,
}

#[derive(Debug, Deserialize)]
struct ActionProbe {
    #[serde(default)]
    action: ImportAction,
}

#[derive(Debug, Deserialize)]
struct CreateItem {
    hostname: String,
    #[serde(flatten)]
    value: RecordValue,
    ttl_seconds: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct DeleteItem {
    hostname: String,
    #[serde(rename = "type")]
    record_type: RecordType,
    value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportError {
    /// 从 1 开始的条目序号
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub records_imported: usize,
    pub records_deleted: usize,
    pub records_skipped: usize,
    pub errors: Vec<ImportError>,
}

/// 解析导入文件内容，必须是 JSON 数组
pub fn parse_items(body: &str) -> Result<Vec<Value>> {
    let parsed: Value = serde_json::from_str(body.trim())
        .map_err(|e| RecordError::InvalidRecord(format!("invalid JSON format: {}", e)))?;
    match parsed {
        Value::Array(items) => Ok(items),
        _ => Err(RecordError::InvalidRecord(
            "import body must be a JSON array of records".into(),
        )),
    }
}

pub async fn import(service: &RecordService, items: Vec<Value>) -> ImportSummary {
    let mut summary = ImportSummary::default();

    for (i, item) in items.into_iter().enumerate() {
        let index = i + 1;
        match apply(service, item).await {
            Ok(ImportAction::Create) => summary.records_imported += 1,
            Ok(ImportAction::Delete) => summary.records_deleted += 1,
            Err(e) => {
                debug!(index = index, error = %e, "import item skipped");
                summary.records_skipped += 1;
                summary.errors.push(ImportError {
                    index,
                    error: e.public_message(),
                });
            }
        }
    }

    info!(
        imported = summary.records_imported,
        deleted = summary.records_deleted,
        skipped = summary.records_skipped,
        "bulk import completed"
    );
    summary
}

async fn apply(service: &RecordService, item: Value) -> Result<ImportAction> {
    let probe: ActionProbe = serde_json::from_value(item.clone()).map_err(invalid_item)?;
    match probe.action {
        ImportAction::Create => {
            let item: CreateItem = serde_json::from_value(item).map_err(invalid_item)?;
            let ttl = item
                .ttl_seconds
                .unwrap_or(service.settings().default_ttl_secs);
            let _ = service
                .create_record(NewRecord::new(item.hostname, item.value, ttl))
                .await?;
        }
        ImportAction::Delete => {
            let item: DeleteItem = serde_json::from_value(item).map_err(invalid_item)?;
            let value = delete_value(&item.value)?;
            let _ = service
                .delete_record(&item.hostname, item.record_type, &value)
                .await?;
        }
    }
    Ok(probe.action)
}

/// 删除项的值可以是字符串、单元素数组或 MX 的 `{priority, host}` 对象
fn delete_value(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) if items.len() == 1 => delete_value(&items[0]),
        Value::Object(map) => match (map.get("priority"), map.get("host")) {
            (Some(Value::Number(p)), Some(Value::String(h))) => Ok(format!("{} {}", p, h)),
            _ => Err(RecordError::InvalidRecord("unsupported delete value".into())),
        },
        _ => Err(RecordError::InvalidRecord("unsupported delete value".into())),
    }
}

fn invalid_item(e: serde_json::Error) -> RecordError {
    RecordError::InvalidRecord(format!("invalid item: {}", e))
}
