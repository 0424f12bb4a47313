use crate::builtin::Builtin;
use crate::tokenizer::{
    Associativity, Token, TokenSubType, TokenType, Tokenizer, TokenizerError, is_identifier,
};
use fieldwright_common::{EvalError, EvalErrorKind, Value};

use std::fmt::{self, Display};

/// Why an expression could not be turned into an AST.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error: {message}")]
    Syntax {
        message: String,
        position: Option<usize>,
    },
    /// A call to something outside the function whitelist.
    #[error("function '{name}' is not allowed")]
    DisallowedFunction { name: String, position: usize },
}

impl ParseError {
    fn syntax(message: impl Into<String>, position: Option<usize>) -> Self {
        ParseError::Syntax {
            message: message.into(),
            position,
        }
    }

    pub fn kind(&self) -> EvalErrorKind {
        match self {
            ParseError::Syntax { .. } => EvalErrorKind::Parse,
            ParseError::DisallowedFunction { .. } => EvalErrorKind::Security,
        }
    }

    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::Syntax { position, .. } => *position,
            ParseError::DisallowedFunction { position, .. } => Some(*position),
        }
    }
}

impl From<TokenizerError> for ParseError {
    fn from(err: TokenizerError) -> Self {
        ParseError::syntax(err.message, Some(err.pos))
    }
}

impl From<ParseError> for EvalError {
    fn from(err: ParseError) -> Self {
        EvalError::new(err.kind()).with_message(err.to_string())
    }
}

/// The type of an AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum ASTNodeType {
    Literal(Value),
    /// A bare name resolved against the evaluation scope.
    Identifier(String),
    UnaryOp {
        op: String,
        expr: Box<ASTNode>,
    },
    BinaryOp {
        op: String,
        left: Box<ASTNode>,
        right: Box<ASTNode>,
    },
    Call {
        builtin: Builtin,
        args: Vec<ASTNode>,
    },
    List(Vec<ASTNode>),
}

impl Display for ASTNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ASTNodeType::Literal(value) => write!(f, "Literal({value:?})"),
            ASTNodeType::Identifier(name) => write!(f, "Identifier({name})"),
            ASTNodeType::UnaryOp { op, expr } => write!(f, "UnaryOp({op}, {expr})"),
            ASTNodeType::BinaryOp { op, left, right } => {
                write!(f, "BinaryOp({op}, {left}, {right})")
            }
            ASTNodeType::Call { builtin, args } => {
                write!(f, "Call({builtin}")?;
                for arg in args {
                    write!(f, ", {arg}")?;
                }
                write!(f, ")")
            }
            ASTNodeType::List(items) => {
                write!(f, "List(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// An AST node represents a parsed formula element
#[derive(Debug, Clone, PartialEq)]
pub struct ASTNode {
    pub node_type: ASTNodeType,
    pub source_token: Option<Token>,
}

impl ASTNode {
    pub fn new(node_type: ASTNodeType, source_token: Option<Token>) -> Self {
        ASTNode {
            node_type,
            source_token,
        }
    }

    /// Field keys named by `CF("...")` calls with a literal argument.
    ///
    /// Calls with a computed argument cannot be resolved statically and are
    /// not reported.
    pub fn field_references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_field_references(&mut refs);
        refs
    }

    fn collect_field_references<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match &self.node_type {
            ASTNodeType::Call {
                builtin: Builtin::Cf,
                args,
            } => {
                if let Some(ASTNode {
                    node_type: ASTNodeType::Literal(Value::Text(key)),
                    ..
                }) = args.first()
                {
                    if !refs.contains(&key.as_str()) {
                        refs.push(key.as_str());
                    }
                }
                for arg in args {
                    arg.collect_field_references(refs);
                }
            }
            ASTNodeType::Call { args, .. } | ASTNodeType::List(args) => {
                for arg in args {
                    arg.collect_field_references(refs);
                }
            }
            ASTNodeType::UnaryOp { expr, .. } => expr.collect_field_references(refs),
            ASTNodeType::BinaryOp { left, right, .. } => {
                left.collect_field_references(refs);
                right.collect_field_references(refs);
            }
            ASTNodeType::Literal(_) | ASTNodeType::Identifier(_) => {}
        }
    }

    /// Every builtin invoked anywhere in the tree, in first-use order.
    pub fn builtins(&self) -> Vec<Builtin> {
        let mut out = Vec::new();
        self.visit(&mut |node| {
            if let ASTNodeType::Call { builtin, .. } = &node.node_type {
                if !out.contains(builtin) {
                    out.push(*builtin);
                }
            }
        });
        out
    }

    fn visit<F: FnMut(&ASTNode)>(&self, f: &mut F) {
        f(self);
        match &self.node_type {
            ASTNodeType::Call { args, .. } | ASTNodeType::List(args) => {
                for arg in args {
                    arg.visit(f);
                }
            }
            ASTNodeType::UnaryOp { expr, .. } => expr.visit(f),
            ASTNodeType::BinaryOp { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            ASTNodeType::Literal(_) | ASTNodeType::Identifier(_) => {}
        }
    }
}

impl Display for ASTNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_type)
    }
}

/// A parser for converting tokens into an AST.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let tokens = tokens
            .into_iter()
            .filter(|t| t.token_type != TokenType::Whitespace)
            .collect();
        Parser {
            tokens,
            position: 0,
        }
    }

    /// Parse the tokens into an AST.
    ///
    /// Every call token is checked against the whitelist before any node is
    /// built, so a disallowed call is reported even when the rest of the
    /// expression would also fail to parse.
    pub fn parse(&mut self) -> Result<ASTNode, ParseError> {
        self.check_calls()?;

        if self.tokens.is_empty() {
            return Err(ParseError::syntax("empty expression", None));
        }

        let ast = self.parse_expression()?;
        if let Some(token) = self.tokens.get(self.position) {
            return Err(ParseError::syntax(
                format!("unexpected '{}'", token.value),
                Some(token.start),
            ));
        }
        Ok(ast)
    }

    fn check_calls(&self) -> Result<(), ParseError> {
        for token in &self.tokens {
            if token.token_type == TokenType::Func && token.subtype == TokenSubType::Open {
                let name = token.func_name();
                if is_identifier(name) && Builtin::from_name(name).is_none() {
                    return Err(ParseError::DisallowedFunction {
                        name: name.to_string(),
                        position: token.start,
                    });
                }
            }
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn end_position(&self) -> Option<usize> {
        self.tokens.last().map(|t| t.end)
    }

    fn parse_expression(&mut self) -> Result<ASTNode, ParseError> {
        self.parse_binary_op(0)
    }

    fn parse_binary_op(&mut self, min_precedence: u8) -> Result<ASTNode, ParseError> {
        let mut left = self.parse_unary_op()?;

        while let Some(token) = self.peek() {
            if token.token_type != TokenType::OpInfix {
                break;
            }

            let (precedence, associativity) =
                token.get_precedence().unwrap_or((0, Associativity::Left));
            if precedence < min_precedence {
                break;
            }

            let op_token = token.clone();
            self.position += 1;

            let next_min_precedence = if associativity == Associativity::Left {
                precedence + 1
            } else {
                precedence
            };

            let right = self.parse_binary_op(next_min_precedence)?;
            left = ASTNode::new(
                ASTNodeType::BinaryOp {
                    op: op_token.value.clone(),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                Some(op_token),
            );
        }

        Ok(left)
    }

    fn parse_unary_op(&mut self) -> Result<ASTNode, ParseError> {
        if let Some(token) = self.peek() {
            if token.token_type == TokenType::OpPrefix {
                let op_token = token.clone();
                self.position += 1;
                let expr = self.parse_unary_op()?;
                return Ok(ASTNode::new(
                    ASTNodeType::UnaryOp {
                        op: op_token.value.clone(),
                        expr: Box::new(expr),
                    },
                    Some(op_token),
                ));
            }
        }
        self.parse_postfix_op()
    }

    fn parse_postfix_op(&mut self) -> Result<ASTNode, ParseError> {
        let mut expr = self.parse_primary()?;

        while let Some(token) = self.peek() {
            if token.token_type != TokenType::OpPostfix {
                break;
            }
            let op_token = token.clone();
            self.position += 1;
            expr = ASTNode::new(
                ASTNodeType::UnaryOp {
                    op: op_token.value.clone(),
                    expr: Box::new(expr),
                },
                Some(op_token),
            );
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<ASTNode, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(ParseError::syntax(
                "unexpected end of expression",
                self.end_position(),
            ));
        };

        match (token.token_type, token.subtype) {
            (TokenType::Operand, _) => {
                self.position += 1;
                self.parse_operand(token)
            }
            (TokenType::Func, TokenSubType::Open) => {
                self.position += 1;
                self.parse_function(token)
            }
            (TokenType::Paren, TokenSubType::Open) => {
                self.position += 1;
                let expr = self.parse_expression()?;
                match self.peek() {
                    Some(t) if t.token_type == TokenType::Paren && t.subtype == TokenSubType::Close => {
                        self.position += 1;
                        Ok(expr)
                    }
                    other => Err(ParseError::syntax(
                        "expected closing parenthesis",
                        other.map(|t| t.start).or(self.end_position()),
                    )),
                }
            }
            (TokenType::List, TokenSubType::Open) => {
                self.position += 1;
                let items = self.parse_arguments(TokenType::List)?;
                Ok(ASTNode::new(ASTNodeType::List(items), Some(token)))
            }
            _ => Err(ParseError::syntax(
                format!("unexpected '{}'", token.value),
                Some(token.start),
            )),
        }
    }

    fn parse_operand(&mut self, token: Token) -> Result<ASTNode, ParseError> {
        let node_type = match token.subtype {
            TokenSubType::Number => {
                let value = token.value.parse::<f64>().map_err(|_| {
                    ParseError::syntax(format!("invalid number '{}'", token.value), Some(token.start))
                })?;
                ASTNodeType::Literal(Value::Number(value))
            }
            TokenSubType::Text => ASTNodeType::Literal(Value::Text(unquote(&token.value))),
            TokenSubType::Logical => {
                ASTNodeType::Literal(Value::Boolean(token.value.eq_ignore_ascii_case("TRUE")))
            }
            TokenSubType::Null => ASTNodeType::Literal(Value::Null),
            TokenSubType::Identifier => ASTNodeType::Identifier(token.value.clone()),
            _ => {
                return Err(ParseError::syntax(
                    format!("invalid token '{}'", token.value),
                    Some(token.start),
                ));
            }
        };
        Ok(ASTNode::new(node_type, Some(token)))
    }

    fn parse_function(&mut self, func_token: Token) -> Result<ASTNode, ParseError> {
        let name = func_token.func_name();
        let builtin = match Builtin::from_name(name) {
            Some(b) => b,
            None if is_identifier(name) => {
                return Err(ParseError::DisallowedFunction {
                    name: name.to_string(),
                    position: func_token.start,
                });
            }
            None => {
                return Err(ParseError::syntax(
                    format!("'{name}' is not callable"),
                    Some(func_token.start),
                ));
            }
        };
        let args = self.parse_arguments(TokenType::Func)?;
        Ok(ASTNode::new(
            ASTNodeType::Call { builtin, args },
            Some(func_token),
        ))
    }

    /// Parse a comma-separated sequence up to the closer of `group`
    /// (`)` for calls, `}` for lists). Empty slots are rejected.
    fn parse_arguments(&mut self, group: TokenType) -> Result<Vec<ASTNode>, ParseError> {
        let mut args = Vec::new();

        if let Some(t) = self.peek() {
            if t.token_type == group && t.subtype == TokenSubType::Close {
                self.position += 1;
                return Ok(args);
            }
        }

        loop {
            if let Some(t) = self.peek() {
                if t.token_type == TokenType::Sep
                    || (t.token_type == group && t.subtype == TokenSubType::Close)
                {
                    return Err(ParseError::syntax("empty argument", Some(t.start)));
                }
            }
            args.push(self.parse_expression()?);

            match self.peek() {
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg => {
                    self.position += 1;
                }
                Some(t) if t.token_type == group && t.subtype == TokenSubType::Close => {
                    self.position += 1;
                    return Ok(args);
                }
                Some(t) => {
                    return Err(ParseError::syntax(
                        format!("expected ',' or closer, got '{}'", t.value),
                        Some(t.start),
                    ));
                }
                None => {
                    return Err(ParseError::syntax(
                        "unexpected end of expression",
                        self.end_position(),
                    ));
                }
            }
        }
    }
}

fn unquote(raw: &str) -> String {
    let Some(delim) = raw.chars().next() else {
        return String::new();
    };
    let inner = raw
        .strip_prefix(delim)
        .and_then(|s| s.strip_suffix(delim))
        .unwrap_or(raw);
    let doubled: String = [delim, delim].iter().collect();
    inner.replace(&doubled, &delim.to_string())
}

/// Lexical scan for `name(` / `name (` outside string literals. Used when the
/// tokenizer itself rejects the text, so a malformed expression still
/// reports a disallowed call rather than hiding it behind a syntax error.
fn find_disallowed_call(formula: &str) -> Option<(String, usize)> {
    let bytes = formula.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' || b == b'\'' {
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b {
                    if bytes.get(i + 1) == Some(&b) {
                        i += 2;
                        continue;
                    }
                    break;
                }
                i += 1;
            }
            i += 1;
        } else if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
            {
                i += 1;
            }
            let name = &formula[start..i];
            let mut j = i;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if bytes.get(j) == Some(&b'(') && Builtin::from_name(name).is_none() {
                return Some((name.to_string(), start));
            }
        } else if b.is_ascii_digit() {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Tokenize and parse one expression.
pub fn parse<T: AsRef<str>>(formula: T) -> Result<ASTNode, ParseError> {
    let formula = formula.as_ref();
    let tokens = match Tokenizer::new(formula) {
        Ok(t) => t.items,
        Err(err) => {
            if let Some((name, position)) = find_disallowed_call(formula) {
                return Err(ParseError::DisallowedFunction { name, position });
            }
            return Err(err.into());
        }
    };
    Parser::new(tokens).parse()
}
