use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// Report the breach, keep the computed value.
    Warn,
    /// Report the breach as an error and emit no update.
    Block,
    /// Replace the value with the nearest permitted one.
    Autofix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleKind {
    Dropdown {
        #[serde(default, rename = "allowedValues")]
        allowed_values: Vec<Value>,
    },
    Numeric {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
}

/// Governance policy applied to one field's computed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryRule {
    pub field_key: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    pub mode: EnforcementMode,
}

/// Rules keyed by the field key they govern.
pub type DictionaryMap = BTreeMap<String, DictionaryRule>;

impl DictionaryRule {
    pub fn dropdown<I, V>(field_key: impl Into<String>, allowed: I, mode: EnforcementMode) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            field_key: field_key.into(),
            kind: RuleKind::Dropdown {
                allowed_values: allowed.into_iter().map(Into::into).collect(),
            },
            mode,
        }
    }

    pub fn numeric(
        field_key: impl Into<String>,
        min: Option<f64>,
        max: Option<f64>,
        mode: EnforcementMode,
    ) -> Self {
        Self {
            field_key: field_key.into(),
            kind: RuleKind::Numeric { min, max },
            mode,
        }
    }
}
