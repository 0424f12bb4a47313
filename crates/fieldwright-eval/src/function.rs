//! The `Function` trait implemented by every builtin.

use fieldwright_common::{EvalError, Value};
use fieldwright_parse::Builtin;

use crate::traits::{ArgumentHandle, EvaluationContext};

/// Object-safe callable behind one [`Builtin`].
pub trait Function: Send + Sync + 'static {
    fn builtin(&self) -> Builtin;

    fn name(&self) -> &'static str {
        self.builtin().name()
    }
    fn min_args(&self) -> usize {
        0
    }
    /// `None` means variadic.
    fn max_args(&self) -> Option<usize> {
        Some(self.min_args())
    }
    fn variadic(&self) -> bool {
        self.max_args().is_none()
    }

    fn eval<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError>;

    /// Check arity, then evaluate.
    fn dispatch<'a, 'b>(
        &self,
        args: &'a [ArgumentHandle<'a, 'b>],
        ctx: &dyn EvaluationContext,
    ) -> Result<Value, EvalError> {
        let n = args.len();
        if n < self.min_args() {
            return Err(EvalError::eval(match self.min_args() {
                1 => format!("{} requires at least one argument", self.name()),
                m => format!("{} requires at least {m} arguments, got {n}", self.name()),
            }));
        }
        if let Some(max) = self.max_args() {
            if n > max {
                return Err(EvalError::eval(format!(
                    "{} accepts at most {max} arguments, got {n}",
                    self.name()
                )));
            }
        }
        self.eval(args, ctx)
    }
}
