//! 解析与一致性引擎

pub mod bulk;
pub mod cache;
pub mod clock;
pub mod cycle;
pub mod liveness;
pub mod reaper;
pub mod resolver;
pub mod service;
pub mod validator;

pub use cache::{FillTicket, InvalidationAck, MemoryCache, ResolutionCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use reaper::{SweepReport, TtlReaper};
pub use resolver::{Resolution, ResolvedVia};
pub use service::{Committed, DeleteOutcome, EngineSettings, RecordService, Resolved};
