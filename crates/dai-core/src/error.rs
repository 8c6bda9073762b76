//! Runtime errors: the third error kind from §7, "an ordinary first-class
//! value produced by the VM or built-ins". Subkinds only ever surface in
//! the message text — there is one `Error` object kind on the heap
//! (`object::ErrorObj`), and this `RuntimeErrorKind` is the typed handle
//! Rust code uses internally to build a consistently worded message before
//! it becomes that value.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    TypeError,
    PropertyError,
    KeyError,
    IndexError,
    AssertionError,
    ZeroDivision,
    StackOverflow,
    RecursionError,
}

impl RuntimeErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            RuntimeErrorKind::TypeError => "TypeError",
            RuntimeErrorKind::PropertyError => "PropertyError",
            RuntimeErrorKind::KeyError => "KeyError",
            RuntimeErrorKind::IndexError => "IndexError",
            RuntimeErrorKind::AssertionError => "AssertionError",
            RuntimeErrorKind::ZeroDivision => "ZeroDivision",
            RuntimeErrorKind::StackOverflow => "StackOverflow",
            RuntimeErrorKind::RecursionError => "RecursionError",
        }
    }
}

/// A runtime error before it is wrapped into a first-class `Error` value.
/// Kept as a plain Rust error (not yet heap-allocated) so the VM can use
/// `?` through its own dispatch helpers; the call site that ultimately
/// surfaces it to script code converts it with `to_message`.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {detail}")]
pub struct RuntimeErrorValue {
    pub kind: RuntimeErrorKind,
    pub detail: String,
}

impl std::fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl RuntimeErrorValue {
    pub fn new(kind: RuntimeErrorKind, detail: impl Into<String>) -> Self {
        RuntimeErrorValue { kind, detail: detail.into() }
    }

    /// The text stored in the heap `Error` object's message buffer.
    pub fn to_message(&self) -> String {
        format!("{}: {}", self.kind.label(), self.detail)
    }
}
