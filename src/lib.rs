// Declare modules publicly so they are part of the library interface
pub mod ast;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod source;
mod stack;
pub mod types;

pub use ast::{BinaryOp, FunctionDecl, LogicalOp, Node, NodeKind, UnaryOp};
pub use environment::{EnvError, Environment};
pub use evaluator::{
    CapturedOutput, ControlSignal, EvalResult, Interpreter, InterpreterConfig, RuntimeError,
};
pub use lexer::{LexError, Lexer, Token, TokenKind, tokenize};
pub use parser::{ParseError, Parser, parse_program};
pub use source::Span;
pub use types::{Arity, Closure, NativeContext, NativeFn, NativeFunction, Value};

use thiserror::Error;

/// Any failure from lexing, parsing or running a program.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Lex(LexError),
    #[error(transparent)]
    Parse(ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    pub fn span(&self) -> Span {
        match self {
            Error::Lex(error) => error.span(),
            Error::Parse(error) => error.span(),
            Error::Runtime(error) => error.span(),
        }
    }
}

impl From<LexError> for Error {
    fn from(error: LexError) -> Self {
        Error::Lex(error)
    }
}

// Lexer failures surface through the parser but are reported as their own kind.
impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        match error {
            ParseError::Lex(error) => Error::Lex(error),
            other => Error::Parse(other),
        }
    }
}
