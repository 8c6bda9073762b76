//! The host-facing embedding surface (§6.1), grounded on `cbdai/dai.h`'s
//! `dai_new`/`dai_load_file`/`dai_get_*`/`dai_set_*`/`dai_get_function`/
//! `daicall_*`/`dai_register_function` — the "newer cbdai API with the
//! explicit call builder" the source notes as canonical over the older
//! `src/dai.c` surface.
//!
//! The C API aborts the process on a missing global or a failed call; a
//! host embedding a VM written in a language with first-class `Result`
//! should not inherit that — every fallible operation here returns
//! [`VmResult`] instead.

use dai_core::heap::ObjRef;
use dai_core::object::{NativeFn, Obj};
use dai_core::value::Value;

use crate::error::VmError;
use crate::vm::{Vm, VmOptions};
use crate::VmResult;

/// A scalar or callable value crossing the host/script boundary. Unlike
/// the internal `Value`, this never carries a bare heap reference the host
/// could dangle by holding past a collection.
#[derive(Debug, Clone)]
pub enum EmbedValue {
    Nil,
    Int(i64),
    Float(f64),
    Str(String),
    Function(FunctionHandle),
}

/// A script function or closure, as returned by [`Embedder::get_function`]
/// — the Rust analogue of the C API's opaque `dai_func_t`.
#[derive(Debug, Clone, Copy)]
pub struct FunctionHandle(Value);

/// Owns a [`Vm`] and the single top-level module it was given via
/// [`Embedder::load_file`]/[`Embedder::load_source`]. `dai_load_file`'s doc
/// comment says "Only can be called once"; `loaded` enforces the same rule
/// instead of silently re-running (or aborting on) a second call.
pub struct Embedder {
    vm: Vm,
    module: Option<ObjRef>,
    loaded: bool,
}

impl Embedder {
    pub fn new() -> Self {
        Self::with_options(VmOptions::default())
    }

    pub fn with_options(options: VmOptions) -> Self {
        Embedder { vm: Vm::with_options(options), module: None, loaded: false }
    }

    /// Registers a host function callable from script as `name`. Mirrors
    /// `dai_register_function`'s "must be called before `dai_load_file`"
    /// rule: once a script is loaded, its builtin-name table is frozen, so
    /// registering later would silently be invisible to it.
    pub fn register_function(&mut self, name: impl Into<String>, arity: i32, func: NativeFn) -> VmResult<()> {
        if self.loaded {
            return Err(VmError::Embed("cannot register a function after load_file".to_string()));
        }
        self.vm.register_builtin(name, arity, func, true);
        Ok(())
    }

    /// Loads and runs `path` as the program's single top-level module.
    pub fn load_file(&mut self, path: impl AsRef<std::path::Path>) -> VmResult<()> {
        self.begin_load()?;
        let module = self.vm.load_file(path)?;
        self.finish_load(module)
    }

    /// Same as [`Embedder::load_file`] but from an in-memory source string
    /// (e.g. an embedded script bundled into the host binary).
    pub fn load_source(&mut self, name: impl Into<String>, source: &str, file: impl Into<String>) -> VmResult<()> {
        self.begin_load()?;
        let module = self.vm.load_module(name, source, file)?;
        self.finish_load(module)
    }

    fn begin_load(&mut self) -> VmResult<()> {
        if self.loaded {
            return Err(VmError::Embed("load_file/load_source can only be called once".to_string()));
        }
        Ok(())
    }

    fn finish_load(&mut self, module: ObjRef) -> VmResult<()> {
        self.vm.run_module(module)?;
        self.module = Some(module);
        self.loaded = true;
        Ok(())
    }

    fn module(&self) -> VmResult<ObjRef> {
        self.module.ok_or_else(|| VmError::Embed("no script loaded".to_string()))
    }

    fn global(&self, name: &str) -> VmResult<Value> {
        let module = self.module()?;
        let Obj::Module(m) = self.vm.heap().get(module) else { unreachable!("embedder module is always a ModuleObj") };
        m.slot_by_name
            .get(name)
            .map(|&slot| m.globals[slot as usize])
            .ok_or_else(|| VmError::Embed(format!("no global named '{name}'")))
    }

    fn set_global(&mut self, name: &str, value: Value) -> VmResult<()> {
        let module = self.module()?;
        let Obj::Module(m) = self.vm.heap_mut().get_mut(module) else { unreachable!("embedder module is always a ModuleObj") };
        match m.slot_by_name.get(name) {
            Some(&slot) => {
                m.globals[slot as usize] = value;
                Ok(())
            }
            None => Err(VmError::Embed(format!("no global named '{name}'"))),
        }
    }

    pub fn get_int(&self, name: &str) -> VmResult<i64> {
        match self.global(name)? {
            Value::Int(i) => Ok(i),
            other => Err(VmError::Embed(format!("global '{name}' is a {}, not an int", other.type_name()))),
        }
    }

    pub fn set_int(&mut self, name: &str, value: i64) -> VmResult<()> {
        self.set_global(name, Value::Int(value))
    }

    pub fn get_float(&self, name: &str) -> VmResult<f64> {
        match self.global(name)? {
            Value::Float(f) => Ok(f),
            other => Err(VmError::Embed(format!("global '{name}' is a {}, not a float", other.type_name()))),
        }
    }

    pub fn set_float(&mut self, name: &str, value: f64) -> VmResult<()> {
        self.set_global(name, Value::Float(value))
    }

    pub fn get_string(&self, name: &str) -> VmResult<String> {
        match self.global(name)? {
            Value::Obj(r) => match self.vm.heap().get(r) {
                Obj::Str(s) => Ok(s.bytes.to_string()),
                other => Err(VmError::Embed(format!("global '{name}' is a {}, not a string", other.kind_name()))),
            },
            other => Err(VmError::Embed(format!("global '{name}' is a {}, not a string", other.type_name()))),
        }
    }

    pub fn set_string(&mut self, name: &str, value: &str) -> VmResult<()> {
        let r = self.vm.intern(value);
        self.set_global(name, Value::Obj(r))
    }

    /// Resolves a script function or closure by global name, for a later
    /// [`Embedder::call`].
    pub fn get_function(&self, name: &str) -> VmResult<FunctionHandle> {
        let value = self.global(name)?;
        let is_callable = matches!(value, Value::Obj(r) if matches!(
            self.vm.heap().get(r),
            Obj::Function(_) | Obj::Closure(_) | Obj::BoundMethod(_)
        ));
        if !is_callable {
            return Err(VmError::Embed(format!("global '{name}' is not callable")));
        }
        Ok(FunctionHandle(value))
    }

    /// Pushes `handle`, pushes each of `args` in order, executes, and
    /// converts the return value back into an [`EmbedValue`] — the Rust
    /// collapse of `daicall_push_function` + repeated `daicall_pusharg_*`
    /// + `daicall_execute` + `daicall_getrv_*` into one call.
    pub fn call(&mut self, handle: &FunctionHandle, args: &[EmbedValue]) -> VmResult<EmbedValue> {
        let values: Vec<Value> = args.iter().map(|a| self.to_value(a)).collect();
        let result = self.vm.call_value(handle.0, &values)?;
        Ok(self.from_value(result))
    }

    fn to_value(&mut self, arg: &EmbedValue) -> Value {
        match arg {
            EmbedValue::Nil => Value::Nil,
            EmbedValue::Int(i) => Value::Int(*i),
            EmbedValue::Float(f) => Value::Float(*f),
            EmbedValue::Str(s) => Value::Obj(self.vm.intern(s)),
            EmbedValue::Function(h) => h.0,
        }
    }

    fn from_value(&self, value: Value) -> EmbedValue {
        match value {
            Value::Nil | Value::Undefined => EmbedValue::Nil,
            Value::Bool(b) => EmbedValue::Int(b as i64),
            Value::Int(i) => EmbedValue::Int(i),
            Value::Float(f) => EmbedValue::Float(f),
            Value::Obj(r) => match self.vm.heap().get(r) {
                Obj::Str(s) => EmbedValue::Str(s.bytes.to_string()),
                Obj::Function(_) | Obj::Closure(_) | Obj::BoundMethod(_) => EmbedValue::Function(FunctionHandle(value)),
                _ => EmbedValue::Nil,
            },
        }
    }
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new()
    }
}
