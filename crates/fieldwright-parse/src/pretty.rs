//! Canonical rendering of a parsed expression.
//!
//! Builtin names are upper-cased, strings use double quotes, operators are
//! single-spaced, and parentheses appear only where precedence needs them.

use crate::parser::{ASTNode, ASTNodeType, parse, ParseError};
use fieldwright_common::{Value, format_number};

fn binary_precedence(op: &str) -> u8 {
    match op {
        "^" => 5,
        "*" | "/" => 4,
        "+" | "-" => 3,
        "&" => 2,
        _ => 1,
    }
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(true) => "TRUE".to_string(),
        Value::Boolean(false) => "FALSE".to_string(),
        Value::Number(n) => format_number(*n),
        Value::Text(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        other => format!("\"{}\"", other.to_text().replace('"', "\"\"")),
    }
}

fn render(node: &ASTNode, out: &mut String) {
    match &node.node_type {
        ASTNodeType::Literal(v) => out.push_str(&render_literal(v)),
        ASTNodeType::Identifier(name) => out.push_str(name),
        ASTNodeType::UnaryOp { op, expr } if op == "%" => {
            render_tight(expr, out);
            out.push('%');
        }
        ASTNodeType::UnaryOp { op, expr } => {
            out.push_str(op);
            render_tight(expr, out);
        }
        ASTNodeType::BinaryOp { op, left, right } => {
            let prec = binary_precedence(op);
            render_operand(left, prec, false, out);
            out.push(' ');
            out.push_str(op);
            out.push(' ');
            render_operand(right, prec, true, out);
        }
        ASTNodeType::Call { builtin, args } => {
            out.push_str(builtin.name());
            out.push('(');
            render_list(args, out);
            out.push(')');
        }
        ASTNodeType::List(items) => {
            out.push('{');
            render_list(items, out);
            out.push('}');
        }
    }
}

fn render_list(items: &[ASTNode], out: &mut String) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        render(item, out);
    }
}

/// Operand of a unary operator: anything compound gets parentheses.
fn render_tight(node: &ASTNode, out: &mut String) {
    if matches!(node.node_type, ASTNodeType::BinaryOp { .. }) {
        out.push('(');
        render(node, out);
        out.push(')');
    } else {
        render(node, out);
    }
}

fn render_operand(node: &ASTNode, parent: u8, right: bool, out: &mut String) {
    let needs_parens = match &node.node_type {
        ASTNodeType::BinaryOp { op, .. } => {
            let child = binary_precedence(op);
            child < parent || (right && child == parent)
        }
        _ => false,
    };
    if needs_parens {
        out.push('(');
        render(node, out);
        out.push(')');
    } else {
        render(node, out);
    }
}

/// Render an AST back into canonical expression text.
pub fn pretty_print(ast: &ASTNode) -> String {
    let mut out = String::new();
    render(ast, &mut out);
    out
}

/// Parse then re-render.
pub fn canonical_formula(formula: &str) -> Result<String, ParseError> {
    parse(formula).map(|ast| pretty_print(&ast))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_spacing_and_case() {
        assert_eq!(
            canonical_formula("=round( hours*2,1 )").unwrap(),
            "ROUND(hours * 2, 1)"
        );
        assert_eq!(canonical_formula("cf('Shift')&\"x\"").unwrap(), "CF(\"Shift\") & \"x\"");
    }

    #[test]
    fn keeps_needed_parentheses_only() {
        assert_eq!(canonical_formula("(1+2)*3").unwrap(), "(1 + 2) * 3");
        assert_eq!(canonical_formula("1+(2*3)").unwrap(), "1 + 2 * 3");
        assert_eq!(canonical_formula("1-(2-3)").unwrap(), "1 - (2 - 3)");
        assert_eq!(canonical_formula("-(1+2)").unwrap(), "-(1 + 2)");
    }

    #[test]
    fn canonical_form_is_stable() {
        let once = canonical_formula("IF(a>=1,{1,'b'},NULL)").unwrap();
        assert_eq!(canonical_formula(&once).unwrap(), once);
    }
}
