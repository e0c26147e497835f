use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hostname::{normalize, parse_hostname, parse_target};
use crate::common::error::{RecordError, Result};

pub const MIN_TTL_SECS: u32 = 60;
pub const DEFAULT_TTL_SECS: u32 = 3600;

/// 支持的记录类型
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    MX,
    TXT,
}

impl RecordType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::MX => "MX",
            RecordType::TXT => "TXT",
        }
    }

    pub const fn is_address(&self) -> bool {
        matches!(self, RecordType::A | RecordType::AAAA)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "MX" => Ok(RecordType::MX),
            "TXT" => Ok(RecordType::TXT),
            _ => Err(RecordError::InvalidRecord(format!("unknown record type '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxValue {
    pub priority: u16,
    pub host: String,
}

impl fmt::Display for MxValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.priority, self.host)
    }
}

/// 记录值，按类型区分。JSON 形态为 `{"type": "A", "value": [...]}`。
///
/// A/AAAA 是有序去重的地址集合，比较时按集合求交集；
/// CNAME/MX/TXT 按整体精确匹配。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum RecordValue {
    A(Vec<Ipv4Addr>),
    #[serde(rename = "AAAA")]
    Aaaa(Vec<Ipv6Addr>),
    #[serde(rename = "CNAME")]
    Cname(String),
    #[serde(rename = "MX")]
    Mx(MxValue),
    #[serde(rename = "TXT")]
    Txt(Vec<String>),
}

/// `match_delete` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteMatch {
    /// 整条记录删除
    Whole,
    /// 只从多值地址集合里移除这一个
    Address(IpAddr),
    Miss,
}

impl RecordValue {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordValue::A(_) => RecordType::A,
            RecordValue::Aaaa(_) => RecordType::AAAA,
            RecordValue::Cname(_) => RecordType::CNAME,
            RecordValue::Mx(_) => RecordType::MX,
            RecordValue::Txt(_) => RecordType::TXT,
        }
    }

    /// A/AAAA 的地址列表，其他类型为空
    pub fn addresses(&self) -> Vec<IpAddr> {
        match self {
            RecordValue::A(v4) => v4.iter().copied().map(IpAddr::V4).collect(),
            RecordValue::Aaaa(v6) => v6.iter().copied().map(IpAddr::V6).collect(),
            _ => Vec::new(),
        }
    }

    pub fn cname_target(&self) -> Option<&str> {
        match self {
            RecordValue::Cname(target) => Some(target.as_str()),
            _ => None,
        }
    }

    /// Normalize targets, dedupe address sets and reject empty payloads.
    pub fn validated(self) -> Result<Self> {
        match self {
            RecordValue::A(v4) => {
                let v4 = dedupe(v4);
                if v4.is_empty() {
                    return Err(RecordError::InvalidRecord("A record needs at least one address".into()));
                }
                Ok(RecordValue::A(v4))
            }
            RecordValue::Aaaa(v6) => {
                let v6 = dedupe(v6);
                if v6.is_empty() {
                    return Err(RecordError::InvalidRecord(
                        "AAAA record needs at least one address".into(),
                    ));
                }
                Ok(RecordValue::Aaaa(v6))
            }
            RecordValue::Cname(target) => Ok(RecordValue::Cname(parse_target("CNAME value", &target)?)),
            RecordValue::Mx(mx) => Ok(RecordValue::Mx(MxValue {
                priority: mx.priority,
                host: parse_target("MX host", &mx.host)?,
            })),
            RecordValue::Txt(strings) => {
                if strings.is_empty() {
                    return Err(RecordError::InvalidRecord("TXT list cannot be empty".into()));
                }
                if strings.iter().any(|s| s.trim().is_empty()) {
                    return Err(RecordError::InvalidRecord(
                        "each TXT entry must be a non-empty string".into(),
                    ));
                }
                Ok(RecordValue::Txt(strings))
            }
        }
    }

    /// 与已有值冲突的第一个值（A/AAAA 求交集，其余类型整体相等）
    pub fn first_overlap(&self, other: &RecordValue) -> Option<String> {
        match (self, other) {
            (RecordValue::A(a), RecordValue::A(b)) => {
                a.iter().find(|ip| b.contains(ip)).map(|ip| ip.to_string())
            }
            (RecordValue::Aaaa(a), RecordValue::Aaaa(b)) => {
                a.iter().find(|ip| b.contains(ip)).map(|ip| ip.to_string())
            }
            (a, b) if a == b => Some(a.to_string()),
            _ => None,
        }
    }

    /// 把同类型地址追加到集合末尾，已存在的跳过
    pub fn extend_with(&mut self, extra: &RecordValue) -> Result<()> {
        match (self, extra) {
            (RecordValue::A(a), RecordValue::A(b)) => extend_unique(a, b),
            (RecordValue::Aaaa(a), RecordValue::Aaaa(b)) => extend_unique(a, b),
            (current, extra) => {
                return Err(RecordError::InvalidRecord(format!(
                    "cannot merge {} values into a {} record",
                    extra.record_type(),
                    current.record_type()
                )))
            }
        }
        Ok(())
    }

    /// 从地址集合中移除一个地址，返回是否移除成功
    pub fn remove_address(&mut self, address: IpAddr) -> bool {
        match (self, address) {
            (RecordValue::A(v4), IpAddr::V4(ip)) => remove_item(v4, &ip),
            (RecordValue::Aaaa(v6), IpAddr::V6(ip)) => remove_item(v6, &ip),
            _ => false,
        }
    }

    /// 判断删除请求中的字符串值命中了这条记录的哪一部分。
    ///
    /// MX 接受 `"<priority> <host>"` 或单独的 `<host>`；TXT 命中任一字符串即整条删除。
    pub fn match_delete(&self, value: &str) -> DeleteMatch {
        let value = value.trim().trim_matches('"');
        match self {
            RecordValue::A(_) | RecordValue::Aaaa(_) => {
                let Ok(ip) = value.parse::<IpAddr>() else {
                    return DeleteMatch::Miss;
                };
                let addrs = self.addresses();
                if !addrs.contains(&ip) {
                    DeleteMatch::Miss
                } else if addrs.len() == 1 {
                    DeleteMatch::Whole
                } else {
                    DeleteMatch::Address(ip)
                }
            }
            RecordValue::Cname(target) => hit(normalize(value) == *target),
            RecordValue::Mx(mx) => {
                let parts: Vec<&str> = value.split_whitespace().collect();
                match parts.as_slice() {
                    [host] => hit(normalize(host) == mx.host),
                    [priority, host] => hit(
                        priority.parse::<u16>().ok() == Some(mx.priority) && normalize(host) == mx.host,
                    ),
                    _ => DeleteMatch::Miss,
                }
            }
            RecordValue::Txt(strings) => hit(strings.iter().any(|s| s == value)),
        }
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::A(_) | RecordValue::Aaaa(_) => {
                let joined: Vec<String> = self.addresses().iter().map(|ip| ip.to_string()).collect();
                f.write_str(&joined.join(","))
            }
            RecordValue::Cname(target) => f.write_str(target),
            RecordValue::Mx(mx) => write!(f, "{}", mx),
            RecordValue::Txt(strings) => f.write_str(&strings.join(" ")),
        }
    }
}

fn hit(matched: bool) -> DeleteMatch {
    if matched {
        DeleteMatch::Whole
    } else {
        DeleteMatch::Miss
    }
}

fn dedupe<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn extend_unique<T: PartialEq + Copy>(into: &mut Vec<T>, extra: &[T]) {
    for item in extra {
        if !into.contains(item) {
            into.push(*item);
        }
    }
}

fn remove_item<T: PartialEq>(items: &mut Vec<T>, item: &T) -> bool {
    match items.iter().position(|x| x == item) {
        Some(pos) => {
            items.remove(pos);
            true
        }
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 存储中的一条记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub hostname: String,
    #[serde(flatten)]
    pub value: RecordValue,
    pub ttl_seconds: u32,
    pub created_at: DateTime<Utc>,
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        self.value.record_type()
    }
}

/// 待写入的记录，id 和 created_at 由存储分配
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    pub hostname: String,
    #[serde(flatten)]
    pub value: RecordValue,
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u32,
}

fn default_ttl() -> u32 {
    DEFAULT_TTL_SECS
}

impl NewRecord {
    pub fn new(hostname: impl Into<String>, value: RecordValue, ttl_seconds: u32) -> Self {
        Self {
            hostname: hostname.into(),
            value,
            ttl_seconds,
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.value.record_type()
    }

    /// Schema-level checks applied before the engine sees the record.
    pub fn validated(self) -> Result<Self> {
        let hostname = parse_hostname(&self.hostname)?;
        if self.ttl_seconds < MIN_TTL_SECS {
            return Err(RecordError::InvalidRecord(format!(
                "ttl_seconds must be >= {}, got {}",
                MIN_TTL_SECS, self.ttl_seconds
            )));
        }
        Ok(Self {
            hostname,
            value: self.value.validated()?,
            ttl_seconds: self.ttl_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_json_shape() {
        let rec: NewRecord = serde_json::from_str(
            r#"{"hostname":"A.Example","type":"A","value":["1.1.1.1","1.1.1.1","2.2.2.2"]}"#,
        )
        .unwrap();
        assert_eq!(rec.ttl_seconds, DEFAULT_TTL_SECS);
        let rec = rec.validated().unwrap();
        assert_eq!(rec.hostname, "a.example");
        assert_eq!(
            rec.value,
            RecordValue::A(vec!["1.1.1.1".parse().unwrap(), "2.2.2.2".parse().unwrap()])
        );

        let mx: NewRecord = serde_json::from_str(
            r#"{"hostname":"example.com","type":"MX","value":{"priority":10,"host":"Mail.Example.com"},"ttl_seconds":120}"#,
        )
        .unwrap();
        assert_eq!(mx.record_type(), RecordType::MX);
        let mx = mx.validated().unwrap();
        assert_eq!(
            mx.value,
            RecordValue::Mx(MxValue {
                priority: 10,
                host: "mail.example.com".into()
            })
        );
    }

    #[test]
    fn address_family_is_enforced_by_type() {
        let bad = serde_json::from_str::<NewRecord>(
            r#"{"hostname":"a.example","type":"A","value":["::1"]}"#,
        );
        assert!(bad.is_err());
        let ok = serde_json::from_str::<NewRecord>(
            r#"{"hostname":"a.example","type":"AAAA","value":["::1"]}"#,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn schema_rejections() {
        let short_ttl = NewRecord::new("a.example", RecordValue::Txt(vec!["x".into()]), 59);
        assert!(matches!(short_ttl.validated(), Err(RecordError::InvalidRecord(_))));

        let empty_txt = NewRecord::new("a.example", RecordValue::Txt(vec![]), 60);
        assert!(empty_txt.validated().is_err());

        let blank_txt = NewRecord::new("a.example", RecordValue::Txt(vec!["  ".into()]), 60);
        assert!(blank_txt.validated().is_err());

        let ip_cname = NewRecord::new("a.example", RecordValue::Cname("1.2.3.4".into()), 60);
        assert!(ip_cname.validated().is_err());

        let no_addrs = NewRecord::new("a.example", RecordValue::A(vec![]), 60);
        assert!(no_addrs.validated().is_err());
    }

    #[test]
    fn overlap_and_merge() {
        let mut a = RecordValue::A(vec!["1.1.1.1".parse().unwrap()]);
        let b = RecordValue::A(vec!["2.2.2.2".parse().unwrap(), "1.1.1.1".parse().unwrap()]);
        assert_eq!(a.first_overlap(&b).as_deref(), Some("1.1.1.1"));

        let c = RecordValue::A(vec!["3.3.3.3".parse().unwrap()]);
        assert_eq!(a.first_overlap(&c), None);
        a.extend_with(&c).unwrap();
        assert_eq!(a.to_string(), "1.1.1.1,3.3.3.3");

        let txt = RecordValue::Txt(vec!["v=spf1".into()]);
        assert!(a.extend_with(&txt).is_err());
        assert_eq!(txt.first_overlap(&txt.clone()).as_deref(), Some("v=spf1"));
    }

    #[test]
    fn delete_matching_per_type() {
        let a = RecordValue::A(vec!["1.1.1.1".parse().unwrap(), "2.2.2.2".parse().unwrap()]);
        assert_eq!(
            a.match_delete("2.2.2.2"),
            DeleteMatch::Address("2.2.2.2".parse().unwrap())
        );
        assert_eq!(a.match_delete("9.9.9.9"), DeleteMatch::Miss);
        assert_eq!(a.match_delete("not-an-ip"), DeleteMatch::Miss);

        let single = RecordValue::A(vec!["1.1.1.1".parse().unwrap()]);
        assert_eq!(single.match_delete("1.1.1.1"), DeleteMatch::Whole);

        let cname = RecordValue::Cname("a.example".into());
        assert_eq!(cname.match_delete("\"A.Example\""), DeleteMatch::Whole);

        let mx = RecordValue::Mx(MxValue {
            priority: 10,
            host: "mail.example".into(),
        });
        assert_eq!(mx.match_delete("10 mail.example"), DeleteMatch::Whole);
        assert_eq!(mx.match_delete("mail.example"), DeleteMatch::Whole);
        assert_eq!(mx.match_delete("20 mail.example"), DeleteMatch::Miss);

        let txt = RecordValue::Txt(vec!["a".into(), "b".into()]);
        assert_eq!(txt.match_delete("b"), DeleteMatch::Whole);
    }

    #[test]
    fn record_serializes_flat() {
        let rec = Record {
            id: RecordId(7),
            hostname: "b.example".into(),
            value: RecordValue::Cname("a.example".into()),
            ttl_seconds: 300,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "CNAME");
        assert_eq!(json["value"], "a.example");
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }
}
