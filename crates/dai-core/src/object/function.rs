//! Function, Closure, BuiltinFunction, CFunction, BoundMethod.

use std::sync::Arc;

use crate::bytecode::Chunk;
use crate::error::RuntimeErrorKind;
use crate::heap::{Heap, ObjRef};
use crate::value::Value;

/// Error produced by a native (builtin or embedding) call; the VM wraps this
/// into a first-class `Error` value at the call site, tagged with the same
/// `RuntimeErrorKind` subkinds any other runtime error carries (`assert`
/// failures are `AssertionError`, not a generic `TypeError`, per
/// `dai_builtin.c`'s `builtin_assert`/`builtin_assert_eq`).
#[derive(Debug, Clone)]
pub struct NativeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

impl NativeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        NativeError { kind, message: message.into() }
    }

    /// Most native-function argument checks (arity, wrong type) are plain
    /// `TypeError`s; this is the common case.
    pub fn type_error(message: impl Into<String>) -> Self {
        NativeError::new(RuntimeErrorKind::TypeError, message)
    }
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A compiled function: one per `fn` literal or declaration, shared by every
/// closure created over it. Carries its own chunk rather than indexing into
/// a shared one, mirroring the source's per-function `Chunk`.
#[derive(Debug, Clone)]
pub struct FunctionObj {
    pub name: String,
    pub arity: u8,
    pub max_local_count: u16,
    pub max_stack_size: u16,
    pub chunk: Chunk,
    pub source_file: String,
    /// Set when the function is compiled as a method, so `super.x` inside it
    /// resolves starting at this class.
    pub superclass: Option<ObjRef>,
    pub defaults: Vec<Value>,
    pub module: Option<ObjRef>,
    /// Free-variable count resolved at compile time; a `ClosureObj` built
    /// over this function always has exactly this many `frees`.
    pub free_count: u8,
}

/// A `Function` plus the free values it captured at `Closure`-instruction
/// time (by value, per the closures testable property).
#[derive(Debug, Clone)]
pub struct ClosureObj {
    pub function: ObjRef,
    pub frees: Vec<Value>,
}

/// Context handed to a native function: heap access plus the argument
/// window. Native functions never walk frames or touch the operand stack
/// directly; the VM marshals that.
pub struct NativeCtx<'a> {
    pub heap: &'a mut Heap,
}

pub type NativeFn =
    Arc<dyn Fn(&mut NativeCtx<'_>, Value, &[Value]) -> Result<Value, NativeError> + Send + Sync>;

/// A host-implemented callable registered into `dai-stdlib` or by an
/// embedder via `register_function`.
#[derive(Clone)]
pub struct BuiltinFunctionObj {
    pub name: String,
    pub arity: i32,
    pub func: NativeFn,
}

impl std::fmt::Debug for BuiltinFunctionObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinFunctionObj")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// A function registered through the embedding API: distinguished from
/// `BuiltinFunctionObj` because it additionally carries the trampoline the
/// embedding surface uses to unpack `poparg_*`/`setrv_*` calls (§6.1).
#[derive(Clone)]
pub struct CFunctionObj {
    pub name: String,
    pub arity: i32,
    pub func: NativeFn,
}

impl std::fmt::Debug for CFunctionObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CFunctionObj")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// `(receiver, closure)` pair produced by `get_method`/property access on an
/// instance when the looked-up member is a method.
#[derive(Debug, Clone, Copy)]
pub struct BoundMethodObj {
    pub receiver: Value,
    pub closure: ObjRef,
}
