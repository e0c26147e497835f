use std::collections::HashSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::liveness::{expires_at, live_only};
use crate::common::error::{RecordError, Result};
use crate::record::normalize;
use crate::store::RecordStore;

/// 解析终点的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedVia {
    #[serde(rename = "A/AAAA")]
    Direct,
    #[serde(rename = "CNAME")]
    Cname,
}

/// 一次解析的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// 原始查询主机名（已规范化）
    pub hostname: String,
    #[serde(rename = "resolvedIps")]
    pub addresses: Vec<IpAddr>,
    pub record_type: ResolvedVia,
    /// 链条终点；无 CNAME 时就是查询主机名本身
    pub points_to: String,
    pub hop_chain: Vec<String>,
    /// 链上用到的记录里最早的失效时间
    pub expires_at: DateTime<Utc>,
}

impl Resolution {
    /// 结果依赖的全部主机名：查询名加上每一跳
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.hostname.as_str()).chain(self.hop_chain.iter().map(String::as_str))
    }
}

/// 沿 CNAME 链解析到终点的 A/AAAA 地址集合。
///
/// 每一跳只看存活记录。走回已访问节点时按未找到处理，保证任何存储状态下都能终止；
/// 跟随的 CNAME 超过 `max_depth` 返回 `ChainTooDeep`。
pub async fn resolve(
    query: &str,
    store: &dyn RecordStore,
    now: DateTime<Utc>,
    max_depth: usize,
) -> Result<Resolution> {
    let hostname = normalize(query);
    let mut current = hostname.clone();
    let mut visited = HashSet::new();
    let mut hop_chain: Vec<String> = Vec::new();
    let mut earliest_expiry: Option<DateTime<Utc>> = None;

    loop {
        if !visited.insert(current.clone()) {
            warn!(hostname = %hostname, node = %current, "CNAME loop found in store during resolution");
            return Err(RecordError::RecordNotFound(hostname));
        }

        let live = live_only(store.records_for(&current).await?, now);

        let mut addresses: Vec<IpAddr> = Vec::new();
        for record in live.iter().filter(|r| r.record_type().is_address()) {
            earliest_expiry = earliest(earliest_expiry, expires_at(record));
            for ip in record.value.addresses() {
                if !addresses.contains(&ip) {
                    addresses.push(ip);
                }
            }
        }

        if !addresses.is_empty() {
            let via = if hop_chain.is_empty() {
                ResolvedVia::Direct
            } else {
                ResolvedVia::Cname
            };
            debug!(hostname = %hostname, hops = hop_chain.len(), count = addresses.len(), "resolved");
            return Ok(Resolution {
                points_to: hop_chain.last().cloned().unwrap_or_else(|| hostname.clone()),
                hostname,
                addresses,
                record_type: via,
                hop_chain,
                expires_at: earliest_expiry.unwrap_or(now),
            });
        }

        let Some((cname, target)) = live
            .iter()
            .find_map(|r| r.value.cname_target().map(|t| (r, normalize(t))))
        else {
            return Err(RecordError::RecordNotFound(hostname));
        };
        if hop_chain.len() >= max_depth {
            return Err(RecordError::ChainTooDeep { hostname, max_depth });
        }
        earliest_expiry = earliest(earliest_expiry, expires_at(cname));
        hop_chain.push(target.clone());
        current = target;
    }
}

fn earliest(current: Option<DateTime<Utc>>, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(current.map_or(at, |e| e.min(at)))
}
