pub mod hostname;
pub mod types;

pub use hostname::{normalize, parse_hostname};
pub use types::{
    DeleteMatch, MxValue, NewRecord, Record, RecordId, RecordType, RecordValue, DEFAULT_TTL_SECS,
    MIN_TTL_SECS,
};
