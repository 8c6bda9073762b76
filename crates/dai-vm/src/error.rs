//! Everything that can stop the interpreter before it reaches a normal
//! `Return` (§7): a frontend failure from `dai-compiler`, an I/O error
//! loading a module file, or a runtime error unwound out of the bytecode
//! loop together with its traceback.

use dai_core::error::RuntimeErrorValue;

/// One unwound frame, innermost first — `to_string()` on the whole
/// traceback is what `dai-cli` prints on an uncaught error.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl std::fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  at {} ({}:{})", self.function, self.file, self.line)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error(transparent)]
    Frontend(#[from] dai_compiler::FrontendError),

    #[error("{0}")]
    Io(String),

    /// Every opcode-level and native-call error surfaces this way — there
    /// is no catch/try in the language, so a `Runtime` error always means
    /// the whole program is about to stop (§7).
    #[error("{value}")]
    Runtime { value: RuntimeErrorValue, traceback: Vec<TraceFrame> },

    #[error("{0}")]
    Embed(String),
}

impl From<std::io::Error> for VmError {
    fn from(e: std::io::Error) -> Self {
        VmError::Io(e.to_string())
    }
}

impl VmError {
    pub fn traceback(&self) -> &[TraceFrame] {
        match self {
            VmError::Runtime { traceback, .. } => traceback,
            _ => &[],
        }
    }

    /// `traceback`, rendered innermost-first, one line per frame — §6.4's
    /// host-facing format.
    pub fn format_traceback(&self) -> String {
        self.traceback().iter().map(|f| f.to_string()).collect::<Vec<_>>().join("\n")
    }
}

pub type VmResult<T> = Result<T, VmError>;
