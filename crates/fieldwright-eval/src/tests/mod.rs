#![cfg(test)]

mod engine;

use fieldwright_common::{EvalError, RecordSnapshot, Value};
use serde_json::json;

use crate::interpreter::Interpreter;
use crate::overtime::OvertimeSummary;
use crate::scope::{FieldState, Scope};

/// A nine-to-five record with `Shift`, `Rate` and `Notes` fields.
pub(crate) fn sample_record() -> RecordSnapshot {
    serde_json::from_value(json!({
        "id": "rec-1",
        "userId": "user-1",
        "timeInterval": {
            "start": "2024-03-04T09:00:00-05:00",
            "end": "2024-03-04T17:00:00-05:00"
        },
        "customFields": [
            {"fieldId": "cf-shift", "name": "Shift", "value": "day"},
            {"fieldId": "cf-rate", "name": "Rate", "value": 40},
            {"fieldId": "cf-notes", "name": "Notes", "value": null}
        ],
        "billRate": 75.0,
        "tags": ["onsite", "travel"],
        "project": "Bridge",
        "billable": true
    }))
    .expect("fixture record")
}

pub(crate) fn eval_with(
    record: &RecordSnapshot,
    overtime: Option<&OvertimeSummary>,
    formula: &str,
) -> Result<Value, EvalError> {
    let ast = fieldwright_parse::parse(formula).map_err(EvalError::from)?;
    let state = FieldState::from_record(record);
    let scope = Scope::new(record, &state).with_overtime(overtime);
    Interpreter::new(&scope).evaluate_ast(&ast)
}

pub(crate) fn eval(formula: &str) -> Result<Value, EvalError> {
    eval_with(&sample_record(), None, formula)
}

pub(crate) fn number(formula: &str) -> f64 {
    match eval(formula) {
        Ok(Value::Number(n)) => n,
        other => panic!("{formula}: expected a number, got {other:?}"),
    }
}
