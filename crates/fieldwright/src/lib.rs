//! Meta crate that re-exports the fieldwright building blocks. Depend on this
//! crate for the common entry points, or reach into the layer crates through
//! the module aliases when deeper integration is required.

pub use fieldwright_common as common;
pub use fieldwright_eval as eval;
pub use fieldwright_parse as parse;
pub use fieldwright_runtime as runtime;

pub use fieldwright_common::{
    Diagnostic, DictionaryMap, DictionaryRule, EnforcementMode, EvalError, EvalErrorKind,
    EvaluationResult, FieldUpdate, FormulaDefinition, RecordSnapshot, Severity, Value,
};
pub use fieldwright_eval::{
    EngineError, EvaluationInput, FormulaEngine, OvertimeConfig, OvertimeSummary, validate,
};
pub use fieldwright_parse::{ParseError, parse as parse_formula};
pub use fieldwright_runtime::{
    Backfill, BackfillRequest, BackfillResult, MemoryUpstream, RecordProcessor, RuntimeConfig,
    Scheduler, Upstream,
};
