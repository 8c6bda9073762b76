//! Struct: the extension hook native modules (e.g. a host-provided canvas
//! module) use to stash arbitrary data on the dai heap.

use std::any::Any;

/// Native payload plus a destructor invoked during sweep, before the owning
/// slot is released — mirrors the C struct vtable's `destructor` callback.
pub struct StructObj {
    pub type_name: String,
    pub data: Box<dyn Any + Send + Sync>,
    destructor: Option<Box<dyn FnMut(&mut (dyn Any + Send + Sync)) + Send + Sync>>,
}

impl StructObj {
    pub fn new(
        type_name: impl Into<String>,
        data: Box<dyn Any + Send + Sync>,
        destructor: Option<Box<dyn FnMut(&mut (dyn Any + Send + Sync)) + Send + Sync>>,
    ) -> Self {
        StructObj { type_name: type_name.into(), data, destructor }
    }

    /// Invoked once by the GC sweep pass, before this slot's memory is
    /// reclaimed.
    pub fn run_destructor(&mut self) {
        if let Some(mut d) = self.destructor.take() {
            d(&mut *self.data);
        }
    }
}

impl std::fmt::Debug for StructObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructObj").field("type_name", &self.type_name).finish_non_exhaustive()
    }
}
