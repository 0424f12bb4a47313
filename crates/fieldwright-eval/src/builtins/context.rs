//! Builtins that read the evaluation context rather than their arguments:
//! custom-field state and the overtime summary.

use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use fieldwright_common::{EvalError, Value};
use fieldwright_parse::Builtin;

/* ─────────────────────────── CF(name) ──────────────────────────── */

#[derive(Debug)]
pub struct CfFn;

/// Current value of a custom field by display name or id. Within a pass
/// this already reflects formulas that ran earlier. Absent fields are null.
impl Function for CfFn {
    fn builtin(&self) -> Builtin {
        Builtin::Cf
    }
    fn min_args(&self) -> usize {
        1
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        let key = args[0].text()?;
        Ok(ctx.field(&key).unwrap_or(Value::Null))
    }
}

/* ─────────────────────────── OT(key?) ──────────────────────────── */

#[derive(Debug)]
pub struct OtFn;

impl Function for OtFn {
    fn builtin(&self) -> Builtin {
        Builtin::Ot
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        let Some(summary) = ctx.overtime() else {
            return Ok(Value::Null);
        };
        match args.first() {
            None => Ok(Value::Number(summary.multiplier)),
            Some(key) => Ok(summary.get(&key.text()?)),
        }
    }
}

/* ──────────────────── OTLABEL(reg?, ot?, dt?) ──────────────────── */

#[derive(Debug)]
pub struct OtLabelFn;

/// The overtime flag, optionally mapped onto caller-supplied labels in
/// `REG, OT, DT` order. A tier without a label keeps the flag text.
impl Function for OtLabelFn {
    fn builtin(&self) -> Builtin {
        Builtin::OtLabel
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        let Some(summary) = ctx.overtime() else {
            return Ok(Value::Null);
        };
        match args.get(summary.flag.tier()) {
            Some(label) => Ok(label.value()?.into_owned()),
            None => Ok(Value::Text(summary.flag.to_string())),
        }
    }
}
