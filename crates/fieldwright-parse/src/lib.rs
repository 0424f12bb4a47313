pub mod builtin;
pub mod parser;
pub mod pretty;
pub mod tokenizer;

pub use builtin::Builtin;
pub use parser::{ASTNode, ASTNodeType, ParseError, Parser, parse};
pub use pretty::{canonical_formula, pretty_print};
pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer, TokenizerError};

// Re-export common types
pub use fieldwright_common::{EvalError, EvalErrorKind, Value};
