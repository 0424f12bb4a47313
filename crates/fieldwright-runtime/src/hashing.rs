//! Fingerprint of a record's custom-field state, used to detect writes that
//! happened between our read and our patch.

use fieldwright_common::RecordSnapshot;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Hex SHA-256 over the canonical JSON of the custom fields, sorted by
/// field id. Display names are not part of the state.
pub fn field_state_hash(record: &RecordSnapshot) -> String {
    let mut fields: Vec<_> = record
        .custom_fields
        .iter()
        .map(|f| (f.field_id.as_str(), &f.value))
        .collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    let canonical: Vec<serde_json::Value> = fields
        .into_iter()
        .map(|(id, value)| json!({ "fieldId": id, "value": serde_json::Value::from(value.clone()) }))
        .collect();
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();

    hex::encode(Sha256::digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldwright_common::{CustomFieldValue, Value};

    fn record(fields: &[(&str, &str, Value)]) -> RecordSnapshot {
        RecordSnapshot {
            id: "r".into(),
            custom_fields: fields
                .iter()
                .map(|(id, name, value)| CustomFieldValue {
                    field_id: id.to_string(),
                    name: name.to_string(),
                    value: value.clone(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn order_and_names_do_not_matter() {
        let a = record(&[("b", "B", Value::Number(1.0)), ("a", "A", Value::from("x"))]);
        let b = record(&[("a", "Alpha", Value::from("x")), ("b", "Beta", Value::Number(1.0))]);
        assert_eq!(field_state_hash(&a), field_state_hash(&b));
        assert_eq!(field_state_hash(&a).len(), 64);
    }

    #[test]
    fn values_do() {
        let a = record(&[("a", "A", Value::Number(1.0))]);
        let b = record(&[("a", "A", Value::Number(2.0))]);
        assert_ne!(field_state_hash(&a), field_state_hash(&b));
    }
}
