pub mod error;

pub use error::{RecordError, RecordErrorKind, Result};
