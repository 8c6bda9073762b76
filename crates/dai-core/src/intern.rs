//! String interning: deduplicated immutable strings with precomputed hash.
//!
//! Strings with equal bytes share identity (§3.3) — `intern` returns the
//! same `ObjRef` for the same bytes every time. The table holds its entries
//! *weakly* with respect to the GC: it is a root only in the sense that
//! `gc::collect` walks it to drop unmarked entries before sweeping, not in
//! the sense that interned strings are kept alive forever (§4.5).

use ahash::AHashMap;

use crate::heap::{Heap, ObjRef};
use crate::object::{Obj, StringObj};

#[derive(Debug, Default)]
pub struct InternTable {
    by_bytes: AHashMap<Box<str>, ObjRef>,
}

impl InternTable {
    pub fn new() -> Self {
        InternTable::default()
    }

    /// Returns the canonical `String` object for `s`, allocating one on the
    /// heap only the first time these bytes are seen.
    pub fn intern(&mut self, heap: &mut Heap, s: &str) -> ObjRef {
        if let Some(&r) = self.by_bytes.get(s) {
            return r;
        }
        let r = heap.alloc(Obj::Str(StringObj::new(s)));
        self.by_bytes.insert(s.into(), r);
        r
    }

    pub fn len(&self) -> usize {
        self.by_bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_bytes.is_empty()
    }

    /// Drops every entry whose backing object the GC didn't mark this
    /// cycle — called by `gc::collect` right before it sweeps the heap, so
    /// dead strings don't keep a stale `by_bytes` entry around forever.
    pub(crate) fn retain_marked(&mut self, heap: &Heap) {
        self.by_bytes.retain(|_, r| heap.is_marked(*r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_bytes_intern_to_the_same_ref() {
        let mut heap = Heap::new();
        let mut table = InternTable::new();
        let a = table.intern(&mut heap, "monkey");
        let b = table.intern(&mut heap, "monkey");
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn different_bytes_intern_separately() {
        let mut heap = Heap::new();
        let mut table = InternTable::new();
        let a = table.intern(&mut heap, "mon");
        let b = table.intern(&mut heap, "key");
        assert_ne!(a, b);
    }
}
