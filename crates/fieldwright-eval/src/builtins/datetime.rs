// Calendar builtins. Each reads the wall clock of the value's own offset:
// `2024-01-01T23:30:00-05:00` is hour 23 on January 1st. Epoch numbers
// are read at UTC.

use crate::function::Function;
use crate::traits::{ArgumentHandle, EvaluationContext};
use chrono::{DateTime, Datelike, FixedOffset, Timelike};
use fieldwright_common::{EvalError, Value, coercion::to_datetime};
use fieldwright_parse::Builtin;

fn datetime_arg(arg: &ArgumentHandle) -> Result<DateTime<FixedOffset>, EvalError> {
    to_datetime(arg.value()?.as_ref())
}

macro_rules! date_part_fn {
    ($ty:ident, $builtin:expr, |$dt:ident| $body:expr) => {
        #[derive(Debug)]
        pub struct $ty;

        impl Function for $ty {
            fn builtin(&self) -> Builtin {
                $builtin
            }
            fn min_args(&self) -> usize {
                1
            }

            fn eval<'a, 'b>(
                &self,
                args: &'a [ArgumentHandle<'a, 'b>],
                _ctx: &dyn EvaluationContext,
            ) -> Result<Value, EvalError> {
                let $dt = datetime_arg(&args[0])?;
                Ok($body)
            }
        }
    };
}

/* ─────────────────────────── DATE(v) ──────────────────────────── */
date_part_fn!(DateFn, Builtin::Date, |dt| Value::Text(
    dt.date_naive().format("%Y-%m-%d").to_string()
));

/* ─────────────────────────── HOUR(v) ──────────────────────────── */
date_part_fn!(HourFn, Builtin::Hour, |dt| Value::Number(dt.hour() as f64));

/* ───────────────────── WEEKDAY(v): Monday = 1 ───────────────────── */
date_part_fn!(WeekdayFn, Builtin::Weekday, |dt| Value::Number(
    dt.weekday().number_from_monday() as f64
));

/* ───────────────────── WEEKNUM(v): ISO-8601 week ───────────────────── */
date_part_fn!(WeekNumFn, Builtin::WeekNum, |dt| Value::Number(
    dt.iso_week().week() as f64
));
