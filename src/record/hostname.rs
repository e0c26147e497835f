use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

use crate::common::error::{RecordError, Result};

const MAX_HOSTNAME_LEN: usize = 253;

static LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("label regex"));

/// 小写化并去掉末尾的根点，不做合法性检查
pub fn normalize(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// 规范化并校验主机名：总长 ≤ 253，每个 label 1~63 个字母数字或连字符，首尾不能是连字符
pub fn parse_hostname(hostname: &str) -> Result<String> {
    let normalized = normalize(hostname);
    if normalized.is_empty() || normalized.len() > MAX_HOSTNAME_LEN {
        return Err(RecordError::InvalidHostname(hostname.to_string()));
    }
    if !normalized.split('.').all(|label| LABEL.is_match(label)) {
        return Err(RecordError::InvalidHostname(hostname.to_string()));
    }
    Ok(normalized)
}

/// CNAME 目标与 MX host 必须是主机名，不能是 IP 字面量
pub fn parse_target(field: &str, target: &str) -> Result<String> {
    if target.trim().parse::<IpAddr>().is_ok() {
        return Err(RecordError::InvalidRecord(format!(
            "{} must be a hostname, not an IP address",
            field
        )));
    }
    parse_hostname(target)
}
