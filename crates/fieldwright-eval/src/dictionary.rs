//! Dictionary enforcement: checks a computed value against the field's
//! governance rule and decides what (if anything) gets written.

use fieldwright_common::{
    Diagnostic, DictionaryRule, EnforcementMode, EvalErrorKind, RuleKind, Value, format_number,
};

/// Result of enforcing one rule on one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Enforcement {
    /// The value to write, or `None` when the rule blocks the write.
    pub value: Option<Value>,
    pub diagnostic: Option<Diagnostic>,
}

impl Enforcement {
    fn pass(value: Value) -> Self {
        Self {
            value: Some(value),
            diagnostic: None,
        }
    }
}

fn breach(
    kind: EvalErrorKind,
    mode: EnforcementMode,
    value: Value,
    fixed: Option<Value>,
    message: String,
) -> Enforcement {
    match mode {
        EnforcementMode::Block => Enforcement {
            value: None,
            diagnostic: Some(Diagnostic::error(kind.code(), message)),
        },
        EnforcementMode::Autofix => match fixed {
            Some(fixed) => Enforcement {
                value: Some(fixed),
                diagnostic: Some(Diagnostic::warn(kind.code(), message).with_auto_fix()),
            },
            // nothing to fix towards
            None => Enforcement {
                value: Some(value),
                diagnostic: Some(Diagnostic::warn(kind.code(), message)),
            },
        },
        // warn never mutates
        EnforcementMode::Warn => Enforcement {
            value: Some(value),
            diagnostic: Some(Diagnostic::warn(kind.code(), message)),
        },
    }
}

fn bound(b: Option<f64>) -> String {
    b.map(format_number).unwrap_or_else(|| "-".to_string())
}

/// Apply `rule` (if any) to a computed value.
pub fn enforce(rule: Option<&DictionaryRule>, value: Value) -> Enforcement {
    let Some(rule) = rule else {
        return Enforcement::pass(value);
    };

    match &rule.kind {
        RuleKind::Dropdown { allowed_values } => {
            if allowed_values.contains(&value) {
                return Enforcement::pass(value);
            }
            let message = format!(
                "{} is not an allowed value for '{}'",
                value_label(&value),
                rule.field_key
            );
            let fixed = allowed_values.first().cloned();
            breach(EvalErrorKind::Dropdown, rule.mode, value, fixed, message)
        }
        RuleKind::Numeric { min, max } => {
            let n = match &value {
                Value::Null => return Enforcement::pass(value),
                Value::Number(n) => *n,
                other => {
                    let message = format!(
                        "'{}' expects a number, got {}",
                        rule.field_key,
                        other.type_name()
                    );
                    return Enforcement {
                        diagnostic: Some(Diagnostic::warn(EvalErrorKind::Numeric.code(), message)),
                        value: Some(value),
                    };
                }
            };
            let mut clamped = n;
            if let Some(lo) = min {
                clamped = clamped.max(*lo);
            }
            if let Some(hi) = max {
                clamped = clamped.min(*hi);
            }
            if clamped == n {
                return Enforcement::pass(value);
            }
            let message = format!(
                "{} is outside [{}, {}] for '{}'",
                format_number(n),
                bound(*min),
                bound(*max),
                rule.field_key
            );
            breach(
                EvalErrorKind::Numeric,
                rule.mode,
                value,
                Some(Value::Number(clamped)),
                message,
            )
        }
    }
}

fn value_label(v: &Value) -> String {
    match v {
        Value::Text(s) => format!("'{s}'"),
        Value::Null => "null".to_string(),
        other => other.to_text(),
    }
}
