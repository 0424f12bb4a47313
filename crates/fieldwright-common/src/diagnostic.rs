use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{EvalError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    Error,
}

/// User-visible report about one formula (or the whole pass when
/// `formula_id` is `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_key: Option<String>,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub attempted_auto_fix: bool,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            formula_id: None,
            field_key: None,
            severity,
            code: code.into(),
            message: message.into(),
            attempted_auto_fix: false,
        }
    }

    pub fn warn(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, code, message)
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn from_eval_error(err: &EvalError, severity: Severity) -> Self {
        Self::new(severity, err.code(), err.detail())
    }

    pub fn for_formula(mut self, formula_id: &str, field_key: &str) -> Self {
        self.formula_id = Some(formula_id.to_string());
        self.field_key = Some(field_key.to_string());
        self
    }

    pub fn with_auto_fix(mut self) -> Self {
        self.attempted_auto_fix = true;
        self
    }
}

/// One accepted field write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    pub field_id: String,
    pub field_key: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub before: Value,
    pub after: Value,
}

/// Outcome of one evaluation pass over a record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub updates: Vec<FieldUpdate>,
    pub diagnostics: Vec<Diagnostic>,
    /// Field key to before/after of every accepted update.
    pub changes: BTreeMap<String, FieldChange>,
    /// Flattened warn-severity messages for display.
    pub warnings: Vec<String>,
}

impl EvaluationResult {
    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Warn {
            self.warnings.push(diagnostic.message.clone());
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn push_update(&mut self, update: FieldUpdate, before: Value) {
        self.changes.insert(
            update.field_key.clone(),
            FieldChange {
                before,
                after: update.value.clone(),
            },
        );
        self.updates.push(update);
    }

    pub fn has_updates(&self) -> bool {
        !self.updates.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn diagnostics_with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }

    /// Drop every pending update, keeping the diagnostics.
    pub fn discard_updates(&mut self) {
        self.updates.clear();
        self.changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_flatten_warn_severity_only() {
        let mut result = EvaluationResult::default();
        result.push_diagnostic(Diagnostic::warn("dictionary.numeric", "out of range"));
        result.push_diagnostic(Diagnostic::error("parse.error", "bad syntax"));
        assert_eq!(result.warnings, vec!["out of range".to_string()]);
        assert!(result.has_errors());
    }
}
