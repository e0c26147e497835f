use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::liveness::is_live;
use crate::common::error::{RecordError, Result};
use crate::record::normalize;
use crate::store::RecordStore;

/// 主机名当前存活的 CNAME 目标（按不变量最多一条）
pub async fn live_cname_target(
    store: &dyn RecordStore,
    hostname: &str,
    now: DateTime<Utc>,
) -> Result<Option<String>> {
    let records = store.records_for(hostname).await?;
    Ok(records
        .iter()
        .filter(|r| is_live(r, now))
        .find_map(|r| r.value.cname_target().map(normalize)))
}

/// 判断加入 `origin -> target` 这条 CNAME 边后是否成环。
///
/// 从 target 出发沿存活的 CNAME 边迭代前进：回到 origin 即成环；
/// 遇到走过的节点说明存储里已有一个不经过 origin 的环，不算本次成环；
/// 链条结束则不成环。新边本身算一跳，再加上已经指向 origin 的最长别名链，
/// 总跳数超过 `max_depth` 返回 `ChainTooDeep`，与解析时的深度限制一致。
pub async fn would_cycle(
    origin: &str,
    target: &str,
    store: &dyn RecordStore,
    now: DateTime<Utc>,
    max_depth: usize,
) -> Result<bool> {
    let origin = normalize(origin);
    let mut current = normalize(target);
    let mut visited = HashSet::new();
    let mut hops = 1usize;

    loop {
        if current == origin {
            debug!(origin = %origin, target = %target, hops = hops, "CNAME walk returned to origin");
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            debug!(origin = %origin, node = %current, "pre-existing CNAME loop not through origin");
            return Ok(false);
        }
        let Some(next) = live_cname_target(store, &current, now).await? else {
            break;
        };
        hops += 1;
        if hops > max_depth {
            return Err(too_deep(origin, max_depth));
        }
        current = next;
    }

    let inbound = inbound_depth(&origin, store, now, max_depth - hops + 1).await?;
    if hops + inbound > max_depth {
        debug!(origin = %origin, inbound = inbound, outbound = hops, "aliases of origin push chain past limit");
        return Err(too_deep(origin, max_depth));
    }
    Ok(false)
}

/// 指向 `hostname` 的最长存活别名链长度，数到 `limit` 为止
async fn inbound_depth(
    hostname: &str,
    store: &dyn RecordStore,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<usize> {
    // target -> 指向它的主机名
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    for record in store.all().await? {
        if !is_live(&record, now) {
            continue;
        }
        if let Some(target) = record.value.cname_target() {
            aliases
                .entry(normalize(target))
                .or_default()
                .push(normalize(&record.hostname));
        }
    }

    let mut frontier: HashSet<String> = HashSet::from([hostname.to_string()]);
    let mut depth = 0;
    while depth < limit {
        let next: HashSet<String> = frontier
            .iter()
            .filter_map(|h| aliases.get(h))
            .flatten()
            .cloned()
            .collect();
        if next.is_empty() {
            break;
        }
        depth += 1;
        frontier = next;
    }
    Ok(depth)
}

fn too_deep(hostname: String, max_depth: usize) -> RecordError {
    RecordError::ChainTooDeep {
        hostname,
        max_depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::ManualClock;
    use crate::record::{Record, RecordId, RecordValue};
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(50_000, 0).unwrap()
    }

    fn cname(id: u64, from: &str, to: &str) -> Record {
        Record {
            id: RecordId(id),
            hostname: from.into(),
            value: RecordValue::Cname(to.into()),
            ttl_seconds: 600,
            created_at: now() - Duration::seconds(1),
        }
    }

    fn store(records: Vec<Record>) -> MemoryStore {
        MemoryStore::from_records(records, Arc::new(ManualClock::new(now())))
    }

    #[tokio::test]
    async fn detects_direct_back_edge() {
        let s = store(vec![cname(1, "x.example", "y.example")]);
        assert!(would_cycle("y.example", "x.example", &s, now(), 10).await.unwrap());
    }

    #[tokio::test]
    async fn detects_long_loop() {
        let s = store(vec![
            cname(1, "b.example", "c.example"),
            cname(2, "c.example", "d.example"),
            cname(3, "d.example", "a.example"),
        ]);
        assert!(would_cycle("A.EXAMPLE", "b.example", &s, now(), 10).await.unwrap());
        assert!(!would_cycle("z.example", "b.example", &s, now(), 10).await.unwrap());
    }

    #[tokio::test]
    async fn self_reference_is_a_cycle() {
        let s = store(vec![]);
        assert!(would_cycle("a.example", "a.example", &s, now(), 10).await.unwrap());
    }

    #[tokio::test]
    async fn existing_loop_elsewhere_terminates() {
        // p <-> q 已经成环（绕过校验写入），从 p 出发不应死循环也不应误报
        let s = store(vec![cname(1, "p.example", "q.example"), cname(2, "q.example", "p.example")]);
        assert!(!would_cycle("new.example", "p.example", &s, now(), 10).await.unwrap());
    }

    #[tokio::test]
    async fn expired_edges_do_not_count() {
        let mut stale = cname(1, "x.example", "y.example");
        stale.created_at = now() - Duration::seconds(601);
        let s = store(vec![stale]);
        assert!(!would_cycle("y.example", "x.example", &s, now(), 10).await.unwrap());
    }

    #[tokio::test]
    async fn depth_limit_is_its_own_error() {
        let chain: Vec<Record> = (0..5)
            .map(|i| cname(i, &format!("h{i}.example"), &format!("h{}.example", i + 1)))
            .collect();
        let s = store(chain);
        let err = would_cycle("new.example", "h0.example", &s, now(), 3).await.unwrap_err();
        assert!(matches!(err, RecordError::ChainTooDeep { max_depth: 3, .. }));
        // new -> h0 -> ... -> h5 共 6 跳
        assert!(would_cycle("new.example", "h0.example", &s, now(), 5).await.is_err());
        assert!(!would_cycle("new.example", "h0.example", &s, now(), 6).await.unwrap());
    }

    #[tokio::test]
    async fn existing_aliases_count_toward_depth() {
        // top -> m -> n 已存在，再加 n -> t 会得到 3 跳
        let s = store(vec![cname(1, "top.example", "m.example"), cname(2, "m.example", "n.example")]);
        let err = would_cycle("n.example", "t.example", &s, now(), 2).await.unwrap_err();
        assert!(matches!(err, RecordError::ChainTooDeep { max_depth: 2, .. }));
        assert!(!would_cycle("n.example", "t.example", &s, now(), 3).await.unwrap());
    }

    #[tokio::test]
    async fn expired_aliases_do_not_count_toward_depth() {
        let mut stale = cname(1, "top.example", "m.example");
        stale.created_at = now() - Duration::seconds(601);
        let s = store(vec![stale, cname(2, "m.example", "n.example")]);
        assert!(!would_cycle("n.example", "t.example", &s, now(), 2).await.unwrap());
    }
}
