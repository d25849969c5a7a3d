//! Compiler from the Jack teaching language to stack-machine VM
//! instructions.
//!
//! The pipeline is three small stages wired left to right:
//! - `tokenizer` turns source text into a cursor of lexical tokens.
//! - `parser` consumes the cursor into a per-class syntax tree (`ast`).
//! - `codegen` walks the tree, resolving names through `symbols` and
//!   emitting `vm` instruction text.
//!
//! Each class compiles on its own; nothing is shared between classes.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod fixtures;
pub mod parser;
pub mod symbols;
pub mod token;
pub mod tokenizer;
pub mod vm;

pub use error::{CompileError, CompileResult};

/// Compile one class's source text into VM instruction text.
pub fn compile(source: &str) -> CompileResult<String> {
    let mut tokens = tokenizer::Tokenizer::new(source);
    let class = parser::parse(&mut tokens)?;
    codegen::compile(&class)
}
