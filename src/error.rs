use thiserror::Error;

use crate::token::Token;

pub type CompileResult<T> = Result<T, CompileError>;

/// Any failure the pipeline can produce. Every variant is fatal to the
/// class being compiled; there is no recovery or multi-error collection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Lexical(#[from] LexicalError),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    UnresolvedSymbol(#[from] UnresolvedSymbolError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexicalError {
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Integer literal '{literal}' exceeds 32767")]
    IntegerOutOfRange { literal: String },
    #[error("Unrecognized input at '{fragment}'")]
    UnrecognizedInput { fragment: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("Expected {expected}, got {got}")]
    UnexpectedToken { expected: String, got: Token },
    #[error("Unexpected end of input while looking for {expected}")]
    UnexpectedEof { expected: String },
    #[error("Subroutine '{subroutine}' does not end with a return statement")]
    MissingReturn { subroutine: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SemanticError {
    #[error("'void' is not a value type")]
    VoidVariable,
    #[error("Cannot assign to subroutine '{name}'")]
    AssignToSubroutine { name: String },
    #[error("'{symbol}' is not a unary operator")]
    InvalidUnaryOperator { symbol: char },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unresolved identifier '{name}'")]
pub struct UnresolvedSymbolError {
    pub name: String,
}
