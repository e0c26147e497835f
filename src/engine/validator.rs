//! 写入前的类型互斥与重复值校验
//!
//! 一个主机名只能持有一种类型的记录：
//!
//! | 已有 \ 新增 | A | AAAA | CNAME | MX | TXT |
//! |---|---|---|---|---|---|
//! | A     | 合并 / 重复值 | 冲突 | 冲突 | 冲突 | 冲突 |
//! | AAAA  | 冲突 | 合并 / 重复值 | 冲突 | 冲突 | 冲突 |
//! | CNAME | 冲突 | 冲突 | 冲突 | 冲突 | 冲突 |
//! | MX    | 冲突 | 冲突 | 冲突 | 相同则重复值，否则冲突 | 冲突 |
//! | TXT   | 冲突 | 冲突 | 冲突 | 冲突 | 相同则重复值，否则冲突 |
//!
//! 只有存活的记录参与判断。

use chrono::{DateTime, Utc};

use super::liveness::is_live;
use crate::common::error::{RecordError, Result};
use crate::record::{NewRecord, Record, RecordId, RecordType};

/// 校验通过后新记录的落点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Insert,
    /// 地址并入这条已有的同类型记录
    Merge(RecordId),
}

pub fn check(existing: &[Record], candidate: &NewRecord, now: DateTime<Utc>) -> Result<Placement> {
    let candidate_type = candidate.record_type();
    let mut placement = Placement::Insert;

    for record in existing.iter().filter(|r| is_live(r, now)) {
        let existing_type = record.record_type();
        let same_type = existing_type == candidate_type;

        if same_type && candidate_type != RecordType::CNAME {
            if let Some(value) = candidate.value.first_overlap(&record.value) {
                return Err(RecordError::DuplicateValue {
                    hostname: candidate.hostname.clone(),
                    record_type: candidate_type,
                    value,
                });
            }
            if candidate_type.is_address() {
                if placement == Placement::Insert {
                    placement = Placement::Merge(record.id);
                }
                continue;
            }
        }

        return Err(RecordError::TypeClash {
            hostname: candidate.hostname.clone(),
            existing: existing_type,
            candidate: candidate_type,
        });
    }

    Ok(placement)
}
