pub mod builtins;
pub mod dictionary;
pub mod engine;
pub mod function;
pub mod function_registry;
pub mod interpreter;
pub mod overtime;
pub mod resolver;
pub mod scope;
pub mod traits;

pub use dictionary::{Enforcement, enforce};
pub use engine::{EngineError, EvaluationInput, FormulaEngine, plan, validate};
pub use interpreter::Interpreter;
pub use overtime::{OvertimeCalculator, OvertimeConfig, OvertimeFlag, OvertimeSummary};
pub use resolver::{DependencyCycle, FormulaNode, Resolver, resolve_order};
pub use scope::{FieldState, Scope};
pub use traits::{ArgumentHandle, EvaluationContext};

#[cfg(test)]
mod tests;
