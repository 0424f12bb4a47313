use chrono::{DateTime, FixedOffset};

use crate::{EvalError, Value, time};

/// Reject NaN and infinities. Applied to every arithmetic result, final or
/// intermediate.
pub fn sanitize_numeric(n: f64) -> Result<f64, EvalError> {
    if n.is_finite() {
        Ok(n)
    } else {
        Err(EvalError::invalid_value(format!(
            "computation produced a non-finite number ({n})"
        )))
    }
}

/// Strict numeric coercion: finite numbers pass through, numeric text is
/// parsed as a decimal, everything else is refused.
pub fn to_number(v: &Value) -> Result<f64, EvalError> {
    match v {
        Value::Number(n) => sanitize_numeric(*n),
        Value::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(EvalError::coercion("cannot convert empty text to a number"));
            }
            match trimmed.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(n),
                Ok(_) => Err(EvalError::invalid_value(format!(
                    "'{s}' does not describe a finite number"
                ))),
                Err(_) => Err(EvalError::coercion(format!("cannot convert '{s}' to a number"))),
            }
        }
        other => Err(EvalError::coercion(format!(
            "cannot convert {} to a number",
            other.type_name()
        ))),
    }
}

/// Accepts a timestamp value, epoch milliseconds, or ISO-8601 text.
pub fn to_datetime(v: &Value) -> Result<DateTime<FixedOffset>, EvalError> {
    match v {
        Value::DateTime(dt) => Ok(*dt),
        Value::Number(ms) => time::from_epoch_millis(*ms)
            .ok_or_else(|| EvalError::invalid_value(format!("{ms} is not a valid epoch time"))),
        Value::Text(s) => time::parse_timestamp(s)
            .ok_or_else(|| EvalError::invalid_value(format!("'{s}' is not a valid date"))),
        other => Err(EvalError::invalid_value(format!(
            "expected a date, got {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EvalErrorKind;

    #[test]
    fn numbers_and_numeric_text() {
        assert_eq!(to_number(&Value::Number(2.5)).unwrap(), 2.5);
        assert_eq!(to_number(&Value::Text(" 7.25 ".into())).unwrap(), 7.25);
        assert_eq!(
            to_number(&Value::Text("abc".into())).unwrap_err().kind,
            EvalErrorKind::Coercion
        );
        assert_eq!(
            to_number(&Value::Boolean(true)).unwrap_err().kind,
            EvalErrorKind::Coercion
        );
        assert_eq!(to_number(&Value::Null).unwrap_err().kind, EvalErrorKind::Coercion);
    }

    #[test]
    fn non_finite_is_invalid() {
        assert_eq!(
            to_number(&Value::Number(f64::NAN)).unwrap_err().kind,
            EvalErrorKind::InvalidValue
        );
        assert_eq!(
            to_number(&Value::Text("inf".into())).unwrap_err().kind,
            EvalErrorKind::InvalidValue
        );
    }

    #[test]
    fn datetime_inputs() {
        assert!(to_datetime(&Value::Text("2024-01-01T10:00:00Z".into())).is_ok());
        assert!(to_datetime(&Value::Number(1_700_000_000_000.0)).is_ok());
        assert_eq!(
            to_datetime(&Value::Boolean(true)).unwrap_err().kind,
            EvalErrorKind::InvalidValue
        );
    }
}
