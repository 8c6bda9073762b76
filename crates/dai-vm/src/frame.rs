//! Call frames: where execution currently is, and where its locals live on
//! the operand stack.
//!
//! Grounded on `dai_vm.h`'s `CallFrame` (`function`, `closure`, `ip`,
//! `slots`, `returnCallback`) and `vitte-vm/src/lib.rs`'s `Frame` shape.
//! `slots`/`base` point at the callee's own stack slot, not one past it —
//! `define_self()` always occupies local index 0 in every function scope,
//! so that slot holds the callee value itself until a method/constructor
//! call overwrites it with the receiver.

use dai_core::heap::ObjRef;

/// Which kind of chunk owner a frame is running: a `FunctionObj`'s own
/// chunk, or a module's top-level chunk (the one frame that isn't backed by
/// any `FunctionObj` at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOwner {
    Function(ObjRef),
    Module(ObjRef),
}

/// Work left to do once a pushed frame returns, before its result becomes
/// visible to the caller's bytecode.
#[derive(Debug, Clone, Copy)]
pub enum ReturnCallback {
    /// `__init__`'s return_callback (dai_vm.c's `DaiVM_post_init`): verify
    /// every declared field was assigned, mark the instance initialized,
    /// and substitute it for whatever `__init__` itself returned.
    PostInit { instance: ObjRef },
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub owner: FrameOwner,
    /// `Some` only when `owner` is a `Closure` call; `GetFree` panics to
    /// reach into this field, so it is always `Some` in a frame that
    /// contains a `GetFree` instruction.
    pub closure: Option<ObjRef>,
    pub ip: usize,
    /// Stack index of local slot 0 — the callee value itself (a bare
    /// function/closure for a plain call, the receiver for a method call,
    /// the freshly-allocated instance for a constructor call).
    pub base: usize,
    /// The module whose globals `GetGlobal`/`SetGlobal`/`DefineGlobal`
    /// resolve against while this frame runs.
    pub module: ObjRef,
    pub return_callback: Option<ReturnCallback>,
}

impl Frame {
    pub fn for_function(function: ObjRef, closure: Option<ObjRef>, base: usize, module: ObjRef) -> Self {
        Frame { owner: FrameOwner::Function(function), closure, ip: 0, base, module, return_callback: None }
    }

    pub fn for_module(module: ObjRef, base: usize) -> Self {
        Frame { owner: FrameOwner::Module(module), closure: None, ip: 0, base, module, return_callback: None }
    }
}
