//! Async shell around the formula engine: the rate-limited scheduler, the
//! single-record pipeline, historical backfill, and the collaborator traits
//! that connect them to an upstream system.

pub mod backfill;
pub mod config;
pub mod error;
pub mod hashing;
pub mod memory;
pub mod pipeline;
pub mod scheduler;
pub mod upstream;

pub use backfill::{Backfill, BackfillRequest, BackfillResult, DayResult, day_windows, validate_range};
pub use config::{BackfillConfig, ConfigError, RuntimeConfig, SchedulerConfig};
pub use error::{BackfillError, UpstreamError};
pub use hashing::field_state_hash;
pub use memory::{MemoryUpstream, Operation, Snapshot};
pub use pipeline::{PassContext, RecordOutcome, RecordProcessor};
pub use scheduler::Scheduler;
pub use upstream::{
    DictionaryRepository, FieldPatch, FormulaRepository, PatchSink, RecordSource, ReportQuery,
    RunEntry, RunLedger, RunStatus, Upstream,
};
