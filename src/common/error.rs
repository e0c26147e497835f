use thiserror::Error;

use crate::record::RecordType;

pub type Result<T> = std::result::Result<T, RecordError>;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("invalid hostname: {0}")]
    InvalidHostname(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("value {value} already exists for {hostname} {record_type}")]
    DuplicateValue {
        hostname: String,
        record_type: RecordType,
        value: String,
    },

    #[error("{hostname} already holds a {existing} record, cannot add {candidate}")]
    TypeClash {
        hostname: String,
        existing: RecordType,
        candidate: RecordType,
    },

    #[error("CNAME {origin} -> {target} would create a loop")]
    CnameCycle { origin: String, target: String },

    #[error("CNAME chain from {hostname} exceeds max depth {max_depth}")]
    ChainTooDeep { hostname: String, max_depth: usize },

    #[error("record not found for {0}")]
    RecordNotFound(String),

    #[error("value {value} not found in any {record_type} record for {hostname}")]
    ValueNotFound {
        hostname: String,
        record_type: RecordType,
        value: String,
    },

    #[error("store failure: {0}")]
    Store(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RecordError {
    pub fn kind(&self) -> RecordErrorKind {
        match self {
            RecordError::InvalidHostname(_) => RecordErrorKind::InvalidHostname,
            RecordError::InvalidRecord(_) => RecordErrorKind::InvalidRecord,
            RecordError::DuplicateValue { .. } => RecordErrorKind::DuplicateValue,
            RecordError::TypeClash { .. } => RecordErrorKind::TypeClash,
            RecordError::CnameCycle { .. } => RecordErrorKind::CnameCycle,
            RecordError::ChainTooDeep { .. } => RecordErrorKind::ChainTooDeep,
            RecordError::RecordNotFound(_) => RecordErrorKind::RecordNotFound,
            RecordError::ValueNotFound { .. } => RecordErrorKind::ValueNotFound,
            RecordError::Store(_) | RecordError::Other(_) => RecordErrorKind::Store,
        }
    }

    /// Message safe to hand to API callers. Store internals stay in the logs.
    pub fn public_message(&self) -> String {
        match self.kind() {
            RecordErrorKind::Store => "internal store failure".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Lightweight error category for pattern matching without borrowing the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordErrorKind {
    InvalidHostname,
    InvalidRecord,
    DuplicateValue,
    TypeClash,
    CnameCycle,
    ChainTooDeep,
    RecordNotFound,
    ValueNotFound,
    Store,
}

impl RecordErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordErrorKind::InvalidHostname => "INVALID_HOSTNAME",
            RecordErrorKind::InvalidRecord => "INVALID_RECORD",
            RecordErrorKind::DuplicateValue => "DUPLICATE_VALUE",
            RecordErrorKind::TypeClash => "TYPE_CLASH",
            RecordErrorKind::CnameCycle => "CNAME_CYCLE",
            RecordErrorKind::ChainTooDeep => "CHAIN_TOO_DEEP",
            RecordErrorKind::RecordNotFound => "RECORD_NOT_FOUND",
            RecordErrorKind::ValueNotFound => "VALUE_NOT_FOUND",
            RecordErrorKind::Store => "STORE_FAILURE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_classify_errors() {
        let err = RecordError::CnameCycle {
            origin: "y.example".into(),
            target: "x.example".into(),
        };
        assert_eq!(err.kind(), RecordErrorKind::CnameCycle);
        assert_eq!(err.kind().as_str(), "CNAME_CYCLE");
        let err = RecordError::Other(anyhow::anyhow!("task aborted"));
        assert_eq!(err.kind(), RecordErrorKind::Store);
    }

    #[test]
    fn store_failures_hide_detail() {
        let err = RecordError::Store("snapshot rename failed: EACCES".into());
        assert_eq!(err.kind().as_str(), "STORE_FAILURE");
        assert_eq!(err.public_message(), "internal store failure");

        let err = RecordError::InvalidHostname("-bad".into());
        assert_eq!(err.public_message(), "invalid hostname: -bad");
    }
}
