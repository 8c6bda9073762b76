//! Nested lexical scopes and free-variable (upvalue) capture (§4.3),
//! grounded directly on `dai_symboltable.c`: same `predefine`/`define`
//! two-phase global handling, same resolve-then-capture-across-function-
//! boundary algorithm, same implicit `self` at local index 0. The entries
//! map is an `ahash::AHashMap` rather than the original's open-addressed
//! `SymbolMap`, since Rust's std/ahash maps already give us that structure.

use ahash::AHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Builtin,
    Global,
    Local,
    Free,
    SelfRef,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    /// -1 for builtins, 0 for globals, >0 for locals of nested scopes —
    /// mirrors the original's depth field exactly.
    pub depth: i32,
    pub index: u32,
    pub defined: bool,
    pub kind: SymbolKind,
    pub is_const: bool,
}

pub struct SymbolTable {
    store: AHashMap<String, Symbol>,
    num_symbols: u32,
    num_symbols_of_outer: u32,
    depth: i32,
    outer: Option<Box<SymbolTable>>,
    function_depth: i32,
    free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new_root() -> Self {
        SymbolTable {
            store: AHashMap::new(),
            num_symbols: 0,
            num_symbols_of_outer: 0,
            depth: 0,
            outer: None,
            function_depth: 0,
            free_symbols: Vec::new(),
        }
    }

    fn is_local(&self) -> bool {
        self.depth > 0
    }

    /// True at module (top-level) scope, where `var`/`fn`/`class` names
    /// land in the dense global-slot array instead of on the operand stack.
    pub fn is_global(&self) -> bool {
        self.depth == 0
    }

    /// A block/if/while/for scope: same function, deeper lexical depth.
    pub fn new_enclosed(outer: SymbolTable) -> Self {
        let depth = outer.depth + 1;
        let function_depth = outer.function_depth;
        let num_symbols_of_outer =
            if outer.is_local() { outer.num_symbols_of_outer + outer.num_symbols } else { 0 };
        SymbolTable {
            store: AHashMap::new(),
            num_symbols: 0,
            num_symbols_of_outer,
            depth,
            function_depth,
            free_symbols: Vec::new(),
            outer: Some(Box::new(outer)),
        }
    }

    /// A function-body scope: local slot numbering restarts at 0, and
    /// crossing into it is what makes an outer local a free-variable
    /// capture instead of a plain local reference.
    pub fn new_function(outer: SymbolTable) -> Self {
        let depth = outer.depth + 1;
        let function_depth = outer.function_depth + 1;
        SymbolTable {
            store: AHashMap::new(),
            num_symbols: 0,
            num_symbols_of_outer: 0,
            depth,
            function_depth,
            free_symbols: Vec::new(),
            outer: Some(Box::new(outer)),
        }
    }

    /// Pops back to the enclosing scope, returning it.
    pub fn pop(&mut self) -> SymbolTable {
        *self.outer.take().expect("pop on root symbol table")
    }

    pub fn count(&self) -> u32 {
        self.num_symbols
    }

    /// Total local slots in use by this scope, including the enclosing
    /// block scopes of the same function — the high-water mark the
    /// compiler needs for `FunctionObj::max_local_count`.
    pub fn total_slots(&self) -> u32 {
        self.num_symbols + self.num_symbols_of_outer
    }

    /// Reserves a global slot without marking it defined yet — the
    /// forward-reference pass over top-level `var`/`fn`/`class` names.
    pub fn predefine(&mut self, name: &str) -> Symbol {
        let index = self.num_symbols + self.num_symbols_of_outer;
        let kind = if self.depth == 0 { SymbolKind::Global } else { SymbolKind::Local };
        let symbol = Symbol { name: name.to_string(), depth: self.depth, index, defined: false, kind, is_const: false };
        self.num_symbols += 1;
        let prev = self.store.insert(name.to_string(), symbol.clone());
        debug_assert!(prev.is_none(), "predefine of an already-known name");
        symbol
    }

    /// Defines `name`, upgrading a prior `predefine` to `defined` if one
    /// exists, otherwise allocating a fresh slot.
    pub fn define(&mut self, name: &str) -> Symbol {
        self.define_with_const(name, false)
    }

    /// Same as `define`, but marks the binding immutable (a `con` binding).
    pub fn define_with_const(&mut self, name: &str, is_const: bool) -> Symbol {
        let mut symbol = if let Some(existing) = self.store.get(name) {
            debug_assert!(!existing.defined, "double-define of {name}");
            let mut s = existing.clone();
            s.defined = true;
            s
        } else {
            let index = self.num_symbols + self.num_symbols_of_outer;
            Symbol {
                name: name.to_string(),
                depth: self.depth,
                index,
                defined: true,
                kind: SymbolKind::Global,
                is_const: false,
            }
        };
        symbol.kind = if self.depth == 0 { SymbolKind::Global } else { SymbolKind::Local };
        symbol.is_const = is_const;
        self.num_symbols += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: u32, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            depth: -1,
            index,
            defined: true,
            kind: SymbolKind::Builtin,
            is_const: true,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// The implicit `self` at local slot 0 of every function scope; must be
    /// called before any other `define` in that scope.
    pub fn define_self(&mut self) -> Symbol {
        debug_assert_eq!(self.num_symbols, 0);
        debug_assert_eq!(self.num_symbols_of_outer, 0);
        let symbol = Symbol {
            name: "self".to_string(),
            depth: self.depth,
            index: 0,
            defined: true,
            kind: SymbolKind::SelfRef,
            is_const: true,
        };
        self.store.insert("self".to_string(), symbol.clone());
        self.num_symbols += 1;
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let index = self.free_symbols.len() as u32;
        let symbol = Symbol {
            name: original.name.clone(),
            depth: original.depth,
            index,
            defined: true,
            kind: SymbolKind::Free,
            is_const: original.is_const,
        };
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Resolves `name`, recursing into enclosing scopes. Crossing a
    /// function boundary while resolving turns the outer symbol into a
    /// captured free variable in every intervening function scope.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(sym) = self.store.get(name) {
            return Some(sym.clone());
        }
        let outer = self.outer.as_mut()?;
        let found = outer.resolve(name)?;
        if !matches!(found.kind, SymbolKind::Builtin | SymbolKind::Global)
            && self.function_depth > outer.function_depth
        {
            return Some(self.define_free(found));
        }
        Some(found)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.store.get(name).map(|s| s.defined).unwrap_or(false)
    }

    pub fn free_symbols(&self) -> &[Symbol] {
        &self.free_symbols
    }

    /// Every name bound directly in this scope as a module-level global,
    /// with its dense slot index — the name↔slot correspondence a
    /// `ModuleObj` needs for by-name lookup (`import`'s attribute access,
    /// the embedding API's `get_int`/`set_int`-family calls), which the
    /// `Op::GetGlobal`/`SetGlobal`/`DefineGlobal` bytecode itself never
    /// carries (it addresses globals by slot alone).
    pub fn global_bindings(&self) -> Vec<(String, u32)> {
        self.store
            .values()
            .filter(|s| matches!(s.kind, SymbolKind::Global))
            .map(|s| (s.name.clone(), s.index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_get_sequential_indices() {
        let mut root = SymbolTable::new_root();
        let a = root.predefine("a");
        let b = root.predefine("b");
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
        assert!(!root.is_defined("a"));
        root.define("a");
        assert!(root.is_defined("a"));
    }

    #[test]
    fn nested_function_locals_restart_at_self() {
        let mut root = SymbolTable::new_root();
        root.define("outer_var");
        let mut func = SymbolTable::new_function(root);
        func.define_self();
        let p = func.define("x");
        assert_eq!(p.index, 1);
        assert!(matches!(p.kind, SymbolKind::Local));
    }

    #[test]
    fn crossing_a_function_boundary_captures_a_free_variable() {
        let mut root = SymbolTable::new_root();
        root.define("outer_var");
        let mut outer_func = SymbolTable::new_function(root);
        outer_func.define_self();
        outer_func.define("captured");
        let mut inner_func = SymbolTable::new_function(outer_func);
        inner_func.define_self();
        let resolved = inner_func.resolve("captured").expect("should resolve");
        assert!(matches!(resolved.kind, SymbolKind::Free));
        assert_eq!(inner_func.free_symbols().len(), 1);
    }

    #[test]
    fn block_scope_locals_offset_past_outer_locals() {
        let mut func = SymbolTable::new_function(SymbolTable::new_root());
        func.define_self();
        func.define("a");
        let mut block = SymbolTable::new_enclosed(func);
        assert_eq!(block.count(), 0);
        let b = block.define("b");
        // index continues past the enclosing function's self+a (2 slots).
        assert_eq!(b.index, 2);
    }
}
