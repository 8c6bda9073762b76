//! Module: a compiled script file, owning its own globals.

use ahash::AHashMap;

use crate::bytecode::Chunk;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct ModuleObj {
    pub name: String,
    pub filename: String,
    pub chunk: Chunk,
    pub globals: Vec<Value>,
    pub slot_by_name: AHashMap<String, u16>,
    /// Flips to `true` once the module has finished running top to bottom.
    /// While `false`, a circular `import` sees `undefined` for any global it
    /// requests, which the VM turns into a `PropertyError`.
    pub compiled: bool,
}

impl ModuleObj {
    pub fn new(name: String, filename: String, chunk: Chunk) -> Self {
        ModuleObj {
            name,
            filename,
            chunk,
            globals: Vec::new(),
            slot_by_name: AHashMap::new(),
            compiled: false,
        }
    }

    pub fn define_global_slot(&mut self, name: String, slot: u16) {
        self.slot_by_name.insert(name, slot);
        if self.globals.len() <= slot as usize {
            self.globals.resize(slot as usize + 1, Value::Undefined);
        }
    }
}
