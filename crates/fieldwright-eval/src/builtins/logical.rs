// Branching and boolean builtins. All of them take their arguments lazily
// and only evaluate what the result depends on.

use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use fieldwright_common::{EvalError, Value};
use fieldwright_parse::Builtin;

/* ─────────────────────────── IF(cond, a, b?) ──────────────────────────── */

#[derive(Debug)]
pub struct IfFn;

impl Function for IfFn {
    fn builtin(&self) -> Builtin {
        Builtin::If
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        if args[0].truthy()? {
            Ok(args[1].value()?.into_owned())
        } else {
            match args.get(2) {
                Some(otherwise) => Ok(otherwise.value()?.into_owned()),
                None => Ok(Value::Null),
            }
        }
    }
}

/* ─────────────────────────── AND(...) ──────────────────────────────── */

#[derive(Debug)]
pub struct AndFn;

impl Function for AndFn {
    fn builtin(&self) -> Builtin {
        Builtin::And
    }
    fn max_args(&self) -> Option<usize> {
        None
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        for h in args {
            if !h.truthy()? {
                return Ok(Value::Boolean(false));
            }
        }
        Ok(Value::Boolean(true))
    }
}

/* ─────────────────────────── OR(...) ───────────────────────────────── */

#[derive(Debug)]
pub struct OrFn;

impl Function for OrFn {
    fn builtin(&self) -> Builtin {
        Builtin::Or
    }
    fn max_args(&self) -> Option<usize> {
        None
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        for h in args {
            if h.truthy()? {
                return Ok(Value::Boolean(true));
            }
        }
        Ok(Value::Boolean(false))
    }
}

/* ─────────────────────────── NOT(x) ───────────────────────────────── */

#[derive(Debug)]
pub struct NotFn;

impl Function for NotFn {
    fn builtin(&self) -> Builtin {
        Builtin::Not
    }
    fn min_args(&self) -> usize {
        1
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        Ok(Value::Boolean(!args[0].truthy()?))
    }
}

/* ─────────────────────── IN(needle, ...haystack) ─────────────────────── */

#[derive(Debug)]
pub struct InFn;

/// Deep structural membership test. Each remaining argument is one
/// candidate; a list argument is compared as a whole.
impl Function for InFn {
    fn builtin(&self) -> Builtin {
        Builtin::In
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
        let needle = args[0].value()?;
        for candidate in &args[1..] {
            if candidate.value()?.as_ref() == needle.as_ref() {
                return Ok(Value::Boolean(true));
            }
        }
        Ok(Value::Boolean(false))
    }
}
