use fieldwright_common::{RecordSnapshot, Value};

use crate::overtime::OvertimeSummary;
use crate::traits::EvaluationContext;

/// Custom-field values for one pass, in record order.
///
/// Starts as a copy of the record's live values. The engine writes each
/// accepted formula output here in execution order, so `CF(...)` in a later
/// formula sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldState {
    entries: Vec<FieldSlot>,
}

#[derive(Debug, Clone, PartialEq)]
struct FieldSlot {
    field_id: String,
    name: String,
    value: Value,
}

impl FieldState {
    pub fn from_record(record: &RecordSnapshot) -> Self {
        Self {
            entries: record
                .custom_fields
                .iter()
                .map(|f| FieldSlot {
                    field_id: f.field_id.clone(),
                    name: f.name.clone(),
                    value: f.value.clone(),
                })
                .collect(),
        }
    }

    fn slot(&self, key: &str) -> Option<&FieldSlot> {
        self.entries
            .iter()
            .find(|s| s.name == key)
            .or_else(|| self.entries.iter().find(|s| s.field_id == key))
    }

    /// By display name first, then by id.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.slot(key).map(|s| &s.value)
    }

    /// Field id for a display name or id.
    pub fn field_id(&self, key: &str) -> Option<&str> {
        self.slot(key).map(|s| s.field_id.as_str())
    }

    /// Overwrite the value of an existing field. Returns `false` if no field
    /// has this id.
    pub fn set(&mut self, field_id: &str, value: Value) -> bool {
        match self.entries.iter_mut().find(|s| s.field_id == field_id) {
            Some(slot) => {
                slot.value = value;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.entries
            .iter()
            .map(|s| (s.field_id.as_str(), s.name.as_str(), &s.value))
    }
}

/// The read-only view a formula evaluates against.
pub struct Scope<'a> {
    pub record: &'a RecordSnapshot,
    pub fields: &'a FieldState,
    pub overtime: Option<&'a OvertimeSummary>,
    /// Overrides the record's own rates when set.
    pub bill_rate: Option<f64>,
    pub cost_rate: Option<f64>,
}

fn opt_number(n: Option<f64>) -> Value {
    n.map(Value::Number).unwrap_or(Value::Null)
}

fn opt_text(s: Option<&String>) -> Value {
    s.cloned().map(Value::Text).unwrap_or(Value::Null)
}

impl<'a> Scope<'a> {
    pub fn new(record: &'a RecordSnapshot, fields: &'a FieldState) -> Self {
        Self {
            record,
            fields,
            overtime: None,
            bill_rate: None,
            cost_rate: None,
        }
    }

    pub fn with_overtime(mut self, summary: Option<&'a OvertimeSummary>) -> Self {
        self.overtime = summary;
        self
    }

    pub fn with_rates(mut self, bill_rate: Option<f64>, cost_rate: Option<f64>) -> Self {
        self.bill_rate = bill_rate;
        self.cost_rate = cost_rate;
        self
    }
}

impl EvaluationContext for Scope<'_> {
    fn variable(&self, name: &str) -> Option<Value> {
        let r = self.record;
        let v = match name.to_ascii_lowercase().as_str() {
            "id" => Value::Text(r.id.clone()),
            "user" | "userid" => Value::Text(r.user_id.clone()),
            "start" => r.start().map(Value::DateTime).unwrap_or(Value::Null),
            "end" => r.end().map(Value::DateTime).unwrap_or(Value::Null),
            "hours" | "duration" => Value::Number(r.duration_hours()),
            "billrate" => opt_number(self.bill_rate.or(r.bill_rate)),
            "costrate" => opt_number(self.cost_rate.or(r.cost_rate)),
            "tags" => Value::List(r.tags.iter().cloned().map(Value::Text).collect()),
            "project" => opt_text(r.project.as_ref()),
            "task" => opt_text(r.task.as_ref()),
            "description" => opt_text(r.description.as_ref()),
            "billable" => r.billable.map(Value::Boolean).unwrap_or(Value::Null),
            _ => return None,
        };
        Some(v)
    }

    fn field(&self, key: &str) -> Option<Value> {
        self.fields.get(key).cloned()
    }

    fn overtime(&self) -> Option<&OvertimeSummary> {
        self.overtime
    }
}
