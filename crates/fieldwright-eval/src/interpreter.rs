use std::cmp::Ordering;

use fieldwright_common::{
    EvalError, Value,
    coercion::{sanitize_numeric, to_number},
};
use fieldwright_parse::{ASTNode, ASTNodeType, Builtin};

use crate::function_registry;
use crate::traits::{ArgumentHandle, EvaluationContext};

/// Tree-walking evaluator over a parsed expression.
///
/// Evaluation is pure with respect to the context: the only outputs are the
/// returned value or error.
pub struct Interpreter<'a> {
    pub context: &'a dyn EvaluationContext,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a dyn EvaluationContext) -> Self {
        Self { context }
    }

    /* ===================  public  =================== */
    pub fn evaluate_ast(&self, node: &ASTNode) -> Result<Value, EvalError> {
        match &node.node_type {
            ASTNodeType::Literal(v) => Ok(v.clone()),
            ASTNodeType::Identifier(name) => self.eval_identifier(name),
            ASTNodeType::UnaryOp { op, expr } => self.eval_unary(op, expr),
            ASTNodeType::BinaryOp { op, left, right } => self.eval_binary(op, left, right),
            ASTNodeType::Call { builtin, args } => self.eval_function(*builtin, args),
            ASTNodeType::List(items) => items
                .iter()
                .map(|item| self.evaluate_ast(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
        }
    }

    fn eval_identifier(&self, name: &str) -> Result<Value, EvalError> {
        self.context
            .variable(name)
            .ok_or_else(|| EvalError::eval(format!("unknown identifier '{name}'")))
    }

    /* ===================  unary ops  =================== */
    fn eval_unary(&self, op: &str, expr: &ASTNode) -> Result<Value, EvalError> {
        let n = to_number(&self.evaluate_ast(expr)?)?;
        let out = match op {
            "+" => n,
            "-" => -n,
            "%" => n / 100.0,
            _ => return Err(EvalError::eval(format!("unsupported unary operator '{op}'"))),
        };
        Ok(Value::Number(sanitize_numeric(out)?))
    }

    /* ===================  binary ops  =================== */
    fn eval_binary(&self, op: &str, left: &ASTNode, right: &ASTNode) -> Result<Value, EvalError> {
        let l = self.evaluate_ast(left)?;
        let r = self.evaluate_ast(right)?;

        match op {
            "=" | "==" => Ok(Value::Boolean(l == r)),
            "<>" | "!=" => Ok(Value::Boolean(l != r)),
            "<" | ">" | "<=" | ">=" => self.compare(op, &l, &r),
            "&" => Ok(Value::Text(format!("{}{}", l.to_text(), r.to_text()))),
            "+" => self.numeric_binary(&l, &r, |a, b| a + b),
            "-" => self.numeric_binary(&l, &r, |a, b| a - b),
            "*" => self.numeric_binary(&l, &r, |a, b| a * b),
            "/" => self.numeric_binary(&l, &r, |a, b| a / b),
            "^" => self.numeric_binary(&l, &r, f64::powf),
            _ => Err(EvalError::eval(format!("unsupported operator '{op}'"))),
        }
    }

    /* ===================  function calls  =================== */
    fn eval_function(&self, builtin: Builtin, args: &[ASTNode]) -> Result<Value, EvalError> {
        let fun = function_registry::get(builtin)
            .ok_or_else(|| EvalError::eval(format!("{builtin} is not implemented")))?;
        let handles: Vec<ArgumentHandle> =
            args.iter().map(|n| ArgumentHandle::new(n, self)).collect();
        let out = fun.dispatch(&handles, self.context)?;
        out.ensure_finite()?;
        Ok(out)
    }

    /* ===================  helpers  =================== */
    fn numeric_binary<F>(&self, left: &Value, right: &Value, f: F) -> Result<Value, EvalError>
    where
        F: Fn(f64, f64) -> f64,
    {
        let a = to_number(left)?;
        let b = to_number(right)?;
        Ok(Value::Number(sanitize_numeric(f(a, b))?))
    }

    /* ---------- comparison ---------- */
    fn compare(&self, op: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
        let ord = match (left, right) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (a, b) => to_number(a)?.partial_cmp(&to_number(b)?),
        };
        let Some(ord) = ord else {
            return Err(EvalError::invalid_value("comparison with a non-finite number"));
        };
        let res = match op {
            "<" => ord == Ordering::Less,
            ">" => ord == Ordering::Greater,
            "<=" => ord != Ordering::Greater,
            ">=" => ord != Ordering::Less,
            _ => return Err(EvalError::eval(format!("unsupported comparison '{op}'"))),
        };
        Ok(Value::Boolean(res))
    }
}
