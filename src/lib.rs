//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and run strictly in sequence:
//! - `tokenizer` produces tokens on demand from the source text.
//! - `parser` pulls tokens and builds the `ast::Program` tree.
//! - `codegen` walks the finished tree and emits x86-64 AT&T assembly.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod ast;
pub mod error;
pub mod parser;
pub mod tokenizer;

mod codegen;

pub use error::{CompileError, CompileResult};

/// Compile a source string into AT&T assembly. Nothing is returned unless
/// every stage succeeded.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let program = parser::parse(source)?;
  compile_program(&program)
}

/// Lower an already parsed program.
pub fn compile_program(program: &ast::Program) -> CompileResult<String> {
  codegen::generate(program)
}
