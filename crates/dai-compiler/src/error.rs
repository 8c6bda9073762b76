//! `SyntaxError` and `CompileError` (§7) — both position-bearing, both
//! abort the pipeline before any bytecode executes. Distinct from
//! `dai_core::RuntimeErrorValue`, which is a first-class VM value instead.

use thiserror::Error;

use crate::lexer::Pos;

#[derive(Debug, Error, Clone)]
#[error("{file}:{line}:{column}: {message}")]
pub struct SyntaxError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl SyntaxError {
    pub fn new(file: impl Into<String>, pos: Pos, message: impl Into<String>) -> Self {
        SyntaxError { file: file.into(), line: pos.line, column: pos.col, message: message.into() }
    }
}

#[derive(Debug, Error, Clone)]
#[error("{file}:{line}:{column}: {message}")]
pub struct CompileError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl CompileError {
    pub fn new(file: impl Into<String>, line: u32, column: u32, message: impl Into<String>) -> Self {
        CompileError { file: file.into(), line, column, message: message.into() }
    }
}
