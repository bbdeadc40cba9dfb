pub mod clock;
pub mod config;
pub mod error;
pub mod fired;
pub mod reading;

pub use clock::{Clock, SystemClock, TokioClock};
pub use config::{DrainPolicy, EngineConfig, PoolConfig, SchedulerConfig};
pub use error::*;
pub use fired::{ActionRequest, FiredRuleRecord, RuleId};
pub use reading::{IngestRecord, LastArrivalFact, Reading, ReadingFact, SourceId};
