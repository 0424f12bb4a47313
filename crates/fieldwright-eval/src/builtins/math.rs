use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use fieldwright_common::{
    EvalError, Value,
    coercion::{sanitize_numeric, to_number},
};
use fieldwright_parse::Builtin;

pub const MAX_ROUND_DIGITS: f64 = 10.0;

/// Numbers from every argument; list arguments contribute their elements.
fn collect_numbers(args: &[ArgumentHandle]) -> Result<Vec<f64>, EvalError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg.value()?.as_ref() {
            Value::List(items) => {
                for item in items {
                    out.push(to_number(item)?);
                }
            }
            v => out.push(to_number(v)?),
        }
    }
    Ok(out)
}

/* ─────────────────────────── ROUND(x, d) ──────────────────────────── */

#[derive(Debug)]
pub struct RoundFn;

/// Rounds half away from zero to `d` decimal places (`0 ≤ d ≤ 10`,
/// default 0).
impl Function for RoundFn {
    fn builtin(&self) -> Builtin {
        Builtin::Round
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        let x = args[0].number()?;
        let digits = match args.get(1) {
            Some(d) => d.number()?,
            None => 0.0,
        };
        if !(0.0..=MAX_ROUND_DIGITS).contains(&digits) || digits.fract() != 0.0 {
            return Err(EvalError::invalid_value(format!(
                "ROUND digits must be an integer between 0 and {MAX_ROUND_DIGITS}, got {digits}"
            )));
        }
        Ok(Value::Number(sanitize_numeric(round_to(x, digits as i32))?))
    }
}

pub(crate) fn round_to(x: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let scaled = x * factor;
    if !scaled.is_finite() {
        // beyond f64 precision at this scale already
        return x;
    }
    scaled.round() / factor
}

/* ─────────────────────────── MIN(...) ──────────────────────────── */

#[derive(Debug)]
pub struct MinFn;

impl Function for MinFn {
    fn builtin(&self) -> Builtin {
        Builtin::Min
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        collect_numbers(args)?
            .into_iter()
            .reduce(f64::min)
            .map(Value::Number)
            .ok_or_else(|| EvalError::eval("MIN requires at least one value"))
    }
}

/* ─────────────────────────── MAX(...) ──────────────────────────── */

#[derive(Debug)]
pub struct MaxFn;

impl Function for MaxFn {
    fn builtin(&self) -> Builtin {
        Builtin::Max
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        collect_numbers(args)?
            .into_iter()
            .reduce(f64::max)
            .map(Value::Number)
            .ok_or_else(|| EvalError::eval("MAX requires at least one value"))
    }
}
