//! Source text → `Chunk` bytecode, in three stages (§4): [`lexer`] tokenizes,
//! [`parser`] builds the [`ast`], and [`compiler`] walks it into a
//! `dai_core::bytecode::Chunk` while threading a [`symbol`] scope. [`error`]
//! carries the two fatal-before-execution error kinds the pipeline can
//! produce.
//!
//! Grounded on `vitte-compiler/src/lib.rs`'s single-pass
//! tokenize → parse → codegen shape, widened from its four-operator MVP to
//! dai's full grammar and split across one module per stage the way that
//! scale warrants.

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod symbol;

use dai_core::bytecode::Chunk;
use dai_core::heap::Heap;

pub use error::{CompileError, SyntaxError};

/// Either half of the pipeline can fail before a single opcode executes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FrontendError {
    #[error(transparent)]
    Lex(#[from] lexer::LexError),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Runs the whole `source → Chunk` pipeline against `heap` (compiling a
/// `fn` literal allocates its `FunctionObj` there, per §4.4). `file` is
/// attached to every token/span for error reporting and becomes the
/// resulting module's `FunctionObj::source_file` equivalent.
pub fn compile_str(heap: &mut Heap, source: &str, file: impl Into<String>) -> Result<Chunk, FrontendError> {
    let file = file.into();
    let tokens = lexer::tokenize(source, file.clone())?;
    let program = parser::parse(tokens, file.clone())?;
    let chunk = compiler::Compiler::new(heap, file).compile_module(&program)?;
    Ok(chunk)
}

/// Reads `path` and runs [`compile_str`] over its contents.
pub fn compile_file(heap: &mut Heap, path: impl AsRef<std::path::Path>) -> std::io::Result<Result<Chunk, FrontendError>> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)?;
    Ok(compile_str(heap, &source, path.to_string_lossy().into_owned()))
}

/// Same as [`compile_str`], but predefines `builtin_names` in the root
/// scope as `SymbolKind::Builtin`s (§4.3) so `name(...)` calls resolve to
/// `Op::GetBuiltin` instead of an undefined-name error. The embedder
/// (`dai-vm`'s `import`/`load_file`, `dai-stdlib`'s install list) is
/// responsible for keeping this list's order in sync with the VM's own
/// builtins table.
pub fn compile_str_with_builtins(
    heap: &mut Heap,
    source: &str,
    file: impl Into<String>,
    builtin_names: &[&str],
) -> Result<Chunk, FrontendError> {
    let file = file.into();
    let tokens = lexer::tokenize(source, file.clone())?;
    let program = parser::parse(tokens, file.clone())?;
    let chunk = compiler::Compiler::with_builtins(heap, file, builtin_names).compile_module(&program)?;
    Ok(chunk)
}

/// Same as [`compile_str_with_builtins`], but also returns the top-level
/// name→slot table (`Compiler::compile_module_with_globals`) a `ModuleObj`
/// needs for by-name global lookup. This is the entry point `dai-vm`'s
/// module loader and `import` use.
pub fn compile_module_with_globals(
    heap: &mut Heap,
    source: &str,
    file: impl Into<String>,
    builtin_names: &[&str],
) -> Result<(Chunk, Vec<(String, u32)>), FrontendError> {
    let file = file.into();
    let tokens = lexer::tokenize(source, file.clone())?;
    let program = parser::parse(tokens, file.clone())?;
    let result = compiler::Compiler::with_builtins(heap, file, builtin_names).compile_module_with_globals(&program)?;
    Ok(result)
}

/// Re-exports covering the pipeline's common types, for `dai-vm`/`dai-cli`
/// to pull in with a single `use dai_compiler::prelude::*;`.
pub mod prelude {
    pub use crate::ast::{Program, Stmt, StmtKind, Expr, ExprKind};
    pub use crate::compiler::Compiler;
    pub use crate::error::{CompileError, SyntaxError};
    pub use crate::lexer::{tokenize, LexError, Token, TokenKind};
    pub use crate::parser::parse;
    pub use crate::{
        compile_file, compile_module_with_globals, compile_str, compile_str_with_builtins, FrontendError,
    };
}
