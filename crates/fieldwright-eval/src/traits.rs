//! fieldwright-eval – core traits (object-safe)

use std::borrow::Cow;

use fieldwright_common::{EvalError, Value, coercion};
use fieldwright_parse::{ASTNode, ASTNodeType};

use crate::interpreter::Interpreter;
use crate::overtime::OvertimeSummary;

/* ───────────────────── EvaluationContext ───────────────────── */

/// Everything a formula can observe. Implementations are read-only views;
/// evaluation never mutates the context.
pub trait EvaluationContext {
    /// A bare identifier (`hours`, `billRate`, ...). Lookup is
    /// case-insensitive.
    fn variable(&self, name: &str) -> Option<Value>;

    /// Current value of a custom field, by display name or id.
    fn field(&self, key: &str) -> Option<Value>;

    fn overtime(&self) -> Option<&OvertimeSummary>;
}

/* ────────────────────── ArgumentHandle ───────────────────── */

pub type CowValue<'a> = Cow<'a, Value>;

/// A lazily evaluated call argument. Functions decide whether (and how
/// often) each argument is evaluated, which is what lets `IF`, `AND` and
/// `OR` short-circuit.
pub struct ArgumentHandle<'a, 'b> {
    node: &'a ASTNode,
    interp: &'a Interpreter<'b>,
}

impl<'a, 'b> ArgumentHandle<'a, 'b> {
    pub(crate) fn new(node: &'a ASTNode, interp: &'a Interpreter<'b>) -> Self {
        Self { node, interp }
    }

    pub fn value(&self) -> Result<CowValue<'_>, EvalError> {
        if let ASTNodeType::Literal(ref v) = self.node.node_type {
            return Ok(Cow::Borrowed(v));
        }
        self.interp.evaluate_ast(self.node).map(Cow::Owned)
    }

    pub fn number(&self) -> Result<f64, EvalError> {
        coercion::to_number(self.value()?.as_ref())
    }

    pub fn text(&self) -> Result<String, EvalError> {
        Ok(self.value()?.to_text())
    }

    pub fn truthy(&self) -> Result<bool, EvalError> {
        Ok(self.value()?.is_truthy())
    }

    pub fn ast(&self) -> &'a ASTNode {
        self.node
    }
}
