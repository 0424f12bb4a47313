//! Evaluation error representation shared by the parser, the interpreter and
//! the enforcement layer.
//!
//! - **`EvalErrorKind`**: the closed set of failure categories
//! - **`EvalError`**    : kind plus an optional human explanation
//!
//! Every kind has a stable machine-readable `code()` which is what ends up in
//! a [`Diagnostic`](crate::Diagnostic).

use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// All recognised failure categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalErrorKind {
    /// Malformed expression syntax.
    Parse,
    /// Disallowed function or unsafe regular expression.
    Security,
    /// A value could not be converted to the type an operator needs.
    Coercion,
    /// A NaN/Infinity result or an argument outside its domain.
    InvalidValue,
    /// Any other runtime failure (arity, unknown identifier, ...).
    Eval,
    /// The formula's target field does not exist on the record.
    MissingField,
    /// A dropdown dictionary policy was breached.
    Dropdown,
    /// A numeric dictionary policy was breached.
    Numeric,
    /// The formula reference graph is not acyclic.
    Cycle,
    /// The record changed between the evaluation read and the write.
    ConcurrentModification,
}

impl EvalErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse => "parse.error",
            Self::Security => "security.violation",
            Self::Coercion => "value.coercion",
            Self::InvalidValue => "value.invalid",
            Self::Eval => "eval.error",
            Self::MissingField => "field.missing",
            Self::Dropdown => "dictionary.dropdown",
            Self::Numeric => "dictionary.numeric",
            Self::Cycle => "dependency.cycle",
            Self::ConcurrentModification => "concurrent.modification",
        }
    }
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: Option<String>,
}

impl From<EvalErrorKind> for EvalError {
    fn from(kind: EvalErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl EvalError {
    pub fn new(kind: EvalErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn invalid_value<S: Into<String>>(msg: S) -> Self {
        Self::new(EvalErrorKind::InvalidValue).with_message(msg)
    }

    pub fn coercion<S: Into<String>>(msg: S) -> Self {
        Self::new(EvalErrorKind::Coercion).with_message(msg)
    }

    pub fn eval<S: Into<String>>(msg: S) -> Self {
        Self::new(EvalErrorKind::Eval).with_message(msg)
    }

    pub fn security<S: Into<String>>(msg: S) -> Self {
        Self::new(EvalErrorKind::Security).with_message(msg)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Message without the code prefix; falls back to the code itself.
    pub fn detail(&self) -> &str {
        self.message.as_deref().unwrap_or(self.kind.code())
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl Error for EvalError {}

impl From<EvalError> for String {
    fn from(error: EvalError) -> Self {
        format!("{error}")
    }
}
