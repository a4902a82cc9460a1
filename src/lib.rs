pub mod ast;
#[cfg(feature = "cli")]
pub mod cli;
pub mod convert;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod ops;
pub mod output;
pub mod parser;
pub mod query;
pub mod rational;
pub mod transform;
pub mod value;

pub use ast::{BinOp, Expr, Token, UnaryOp};
pub use convert::{ConvertOptions, json_to_value, parse_json, value_to_json};
pub use evaluator::EvalError;
pub use lexer::{LexError, Lexer, tokenize};
pub use output::{to_json, to_json_pretty};
pub use parser::{CompileOptions, ParseError, Parser, parse};
pub use query::{Query, QueryError};
pub use rational::Rational;
pub use value::{Map, Value};
