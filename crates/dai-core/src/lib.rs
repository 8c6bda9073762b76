//! dai-core — the value model, object model, GC, and bytecode chunk format
//! shared by the rest of the `dai` workspace.
//!
//! Contains everything needed to represent and hold bytecode without
//! depending on the compiler or the VM loop itself.
//!
//! ## Modules
//! - `value`    : the tagged-union `Value` (nil, bool, int, float, obj-ref).
//! - `object`   : every heap object kind and the polymorphic operations
//!   (`get_property`, `subscript_get`, `equal`, `hash`, `iter_init`, ...)
//!   the VM dispatches through.
//! - `heap`     : the object arena (`Heap`) and its `ObjRef` handles.
//! - `intern`   : the string-interning table.
//! - `gc`       : the tri-color mark-and-sweep collector.
//! - `bytecode` : `Chunk`, `Op`, the constant pool.
//! - `error`    : `RuntimeErrorKind`/`RuntimeErrorValue`, the VM's
//!   first-class `Error` value before it's wrapped onto the heap.
//!
//! ## Features
//! - **tracing** *(default)*: instrumentation via `tracing`.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

pub mod bytecode;
pub mod error;
pub mod gc;
pub mod heap;
pub mod intern;
pub mod object;
pub mod value;

pub use bytecode::{Chunk, ConstPool, ConstValue, LineTable, Op};
pub use error::{RuntimeErrorKind, RuntimeErrorValue};
pub use heap::{Heap, ObjRef};
pub use intern::InternTable;
pub use value::Value;

/// Crate version, exposed for `dai-cli`'s `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use crate::{
        bytecode::{self, Chunk, ConstPool, ConstValue, LineTable, Op},
        error::{RuntimeErrorKind, RuntimeErrorValue},
        gc,
        heap::{Heap, ObjRef},
        intern::InternTable,
        object::{self, Obj},
        value::Value,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn a_full_pipeline_slice_allocates_and_collects() {
        let mut heap = Heap::new();
        let mut interned = InternTable::new();
        let mut gc_state = gc::GcState::new();

        let s = interned.intern(&mut heap, "hello");
        let freed = gc::collect(&mut heap, &mut interned, &mut gc_state, &[s]);
        assert_eq!(freed, 0, "rooted string must survive its own collection");

        let freed = gc::collect(&mut heap, &mut interned, &mut gc_state, &[]);
        assert!(freed > 0, "unrooted string becomes collectible once the root list is empty");
    }
}
