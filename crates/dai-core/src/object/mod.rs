//! The object model: every heap object kind, and the polymorphic
//! `Operation` surface (§3.2) the VM dispatches through.
//!
//! The source represents this as a per-kind C function-pointer vtable with
//! optional (nullable) slots. Rust already has a closed, exhaustively
//! matchable sum type for "one of these kinds" — `Obj` below is that sealed
//! discriminated union, and the methods in this module are the dispatch
//! table, matching on the tag once instead of chasing function pointers
//! (design notes §9). A missing operation is simply a `match` arm that
//! returns a typed error instead of a `None` function pointer.

pub mod class;
pub mod collection;
pub mod function;
pub mod module;
pub mod string_obj;
pub mod struct_obj;

use crate::error::{RuntimeErrorKind, RuntimeErrorValue};
use crate::heap::{Heap, ObjRef};
use crate::value::Value;

pub use class::{ClassObj, FieldSlot, InstanceObj};
pub use collection::{ArrayIteratorObj, ArrayObj, MapIteratorObj, MapObj, RangeIteratorObj, TupleObj};
pub use function::{
    BoundMethodObj, BuiltinFunctionObj, CFunctionObj, ClosureObj, FunctionObj, NativeCtx, NativeError,
    NativeFn,
};
pub use module::ModuleObj;
pub use string_obj::StringObj;
pub use struct_obj::StructObj;

/// How many recursive levels `string`/`equal` may descend into containers
/// before giving up. Matches the "depth budget" terminology from §3.3 (the
/// alternative to a visited-pointer set).
pub const RECURSION_BUDGET: u32 = 64;

#[derive(Debug)]
pub enum Obj {
    Str(StringObj),
    Function(FunctionObj),
    Closure(ClosureObj),
    BuiltinFunction(BuiltinFunctionObj),
    CFunction(CFunctionObj),
    BoundMethod(BoundMethodObj),
    Class(ClassObj),
    Instance(InstanceObj),
    Array(ArrayObj),
    ArrayIterator(ArrayIteratorObj),
    Map(MapObj),
    MapIterator(MapIteratorObj),
    RangeIterator(RangeIteratorObj),
    Tuple(TupleObj),
    Module(ModuleObj),
    Error(ErrorObj),
    Struct(StructObj),
}

#[derive(Debug, Clone)]
pub struct ErrorObj {
    pub message: String,
}

impl Obj {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Obj::Str(_) => "string",
            Obj::Function(_) => "function",
            Obj::Closure(_) => "function",
            Obj::BuiltinFunction(_) => "builtin",
            Obj::CFunction(_) => "builtin",
            Obj::BoundMethod(_) => "bound_method",
            Obj::Class(_) => "class",
            Obj::Instance(_) => "instance",
            Obj::Array(_) => "array",
            Obj::ArrayIterator(_) => "array_iterator",
            Obj::Map(_) => "map",
            Obj::MapIterator(_) => "map_iterator",
            Obj::RangeIterator(_) => "range_iterator",
            Obj::Tuple(_) => "tuple",
            Obj::Module(_) => "module",
            Obj::Error(_) => "error",
            Obj::Struct(_) => "struct",
        }
    }

    /// Rough accounting used to drive the GC's heap-growth trigger. Doesn't
    /// need to be exact, only monotonic with real memory use.
    pub fn approx_size(&self) -> usize {
        let base = std::mem::size_of::<Obj>();
        base + match self {
            Obj::Str(s) => s.bytes.len(),
            Obj::Array(a) => a.items.len() * std::mem::size_of::<Value>(),
            Obj::Tuple(t) => t.items.len() * std::mem::size_of::<Value>(),
            Obj::Map(m) => m.len() * std::mem::size_of::<Value>() * 2,
            Obj::Instance(i) => i.fields.len() * std::mem::size_of::<Value>(),
            Obj::Closure(c) => c.frees.len() * std::mem::size_of::<Value>(),
            _ => 0,
        }
    }

    /// Every `ObjRef` this object directly points at — the GC's per-kind
    /// "trace children" step.
    pub fn trace(&self, out: &mut Vec<ObjRef>) {
        match self {
            Obj::Closure(c) => {
                out.push(c.function);
                for v in &c.frees {
                    if let Value::Obj(r) = v {
                        out.push(*r);
                    }
                }
            }
            Obj::Function(f) => {
                if let Some(m) = f.module {
                    out.push(m);
                }
                if let Some(s) = f.superclass {
                    out.push(s);
                }
                for v in &f.defaults {
                    if let Value::Obj(r) = v {
                        out.push(*r);
                    }
                }
                for c in f.chunk.consts.function_consts() {
                    out.push(*c);
                }
            }
            Obj::BoundMethod(b) => {
                out.push(b.closure);
                if let Value::Obj(r) = b.receiver {
                    out.push(r);
                }
            }
            Obj::Class(c) => {
                if let Some(p) = c.parent {
                    out.push(p);
                }
                out.extend(c.instance_methods.values().copied());
                out.extend(c.class_methods.values().copied());
                if let Some(i) = c.init {
                    out.push(i);
                }
                for v in c.instance_fields.iter().map(|f| f.default).chain(c.class_field_values.iter().copied()) {
                    if let Value::Obj(r) = v {
                        out.push(r);
                    }
                }
            }
            Obj::Instance(i) => {
                out.push(i.class);
                for v in &i.fields {
                    if let Value::Obj(r) = v {
                        out.push(*r);
                    }
                }
            }
            Obj::Array(a) => {
                for v in &a.items {
                    if let Value::Obj(r) = v {
                        out.push(*r);
                    }
                }
            }
            Obj::ArrayIterator(it) => out.push(it.array),
            Obj::Tuple(t) => {
                for v in &t.items {
                    if let Value::Obj(r) = v {
                        out.push(*r);
                    }
                }
            }
            Obj::Map(m) => {
                for (k, v) in m.iter() {
                    if let Value::Obj(r) = k {
                        out.push(r);
                    }
                    if let Value::Obj(r) = v {
                        out.push(r);
                    }
                }
            }
            Obj::MapIterator(it) => out.push(it.map),
            Obj::Module(m) => out.extend(m.globals.iter().filter_map(|v| v.as_obj())),
            Obj::Str(_)
            | Obj::BuiltinFunction(_)
            | Obj::CFunction(_)
            | Obj::RangeIterator(_)
            | Obj::Error(_)
            | Obj::Struct(_) => {}
        }
    }
}

type RtResult<T> = Result<T, RuntimeErrorValue>;

/// User-visible to-string. Containers format their elements recursively,
/// bottoming out at `[...]`/`{...}`/`(...)` once `RECURSION_BUDGET` is spent
/// — the cycle-termination behavior required by §3.3.
pub fn display_string(heap: &Heap, r: ObjRef, budget: u32) -> String {
    if budget == 0 {
        return match heap.get(r) {
            Obj::Array(_) => "[...]".into(),
            Obj::Map(_) => "{...}".into(),
            Obj::Tuple(_) => "(...)".into(),
            other => format!("<{}>", other.kind_name()),
        };
    }
    match heap.get(r) {
        Obj::Str(s) => s.bytes.to_string(),
        Obj::Function(f) => format!("<fn {}>", f.name),
        Obj::Closure(c) => display_value_with_heap(heap, Value::Obj(c.function), budget),
        Obj::BuiltinFunction(b) => format!("<builtin {}>", b.name),
        Obj::CFunction(c) => format!("<builtin {}>", c.name),
        Obj::BoundMethod(_) => "<bound method>".to_string(),
        Obj::Class(c) => format!("<class {}>", c.name),
        Obj::Instance(i) => {
            let class = heap.get(i.class);
            let name = if let Obj::Class(c) = class { c.name.as_str() } else { "?" };
            format!("<instance of {name}>")
        }
        Obj::Array(a) => {
            let parts: Vec<String> =
                a.items.iter().map(|v| display_value_with_heap(heap, *v, budget - 1)).collect();
            format!("[{}]", parts.join(", "))
        }
        Obj::Tuple(t) => {
            let parts: Vec<String> =
                t.items.iter().map(|v| display_value_with_heap(heap, *v, budget - 1)).collect();
            format!("({})", parts.join(", "))
        }
        Obj::Map(m) => {
            let parts: Vec<String> = m
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}: {}",
                        display_value_with_heap(heap, k, budget - 1),
                        display_value_with_heap(heap, v, budget - 1)
                    )
                })
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Obj::ArrayIterator(_) => "<array_iterator>".to_string(),
        Obj::MapIterator(_) => "<map_iterator>".to_string(),
        Obj::RangeIterator(_) => "<range_iterator>".to_string(),
        Obj::Module(m) => format!("<module {}>", m.name),
        Obj::Error(e) => format!("Error: {}", e.message),
        Obj::Struct(s) => format!("<struct {}>", s.type_name),
    }
}

pub fn display_value_with_heap(heap: &Heap, v: Value, budget: u32) -> String {
    match v {
        Value::Undefined => "undefined".to_string(),
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format!("{f}"),
        Value::Obj(r) => display_string(heap, r, budget),
    }
}

/// `hash` op: required for map keys. Containers are not hashable.
pub fn hash_value(heap: &Heap, v: Value) -> RtResult<u64> {
    Ok(match v {
        Value::Nil => 0,
        Value::Bool(b) => b as u64,
        Value::Int(i) => i as u64,
        Value::Float(f) => f.to_bits(),
        Value::Undefined => u64::MAX,
        Value::Obj(r) => match heap.get(r) {
            Obj::Str(s) => s.hash as u64,
            other => {
                return Err(RuntimeErrorValue::new(
                    RuntimeErrorKind::TypeError,
                    format!("unhashable type: '{}'", other.kind_name()),
                ))
            }
        },
    })
}

/// `equal(a, b, depth_budget)` — tri-state per §3.2, represented here as
/// `Ok(Some(bool))` / `Ok(None)` for "depth exhausted" (the RecursionError
/// subkind, surfaced by the caller as an Error value when it matters).
pub fn equal_values(heap: &Heap, a: Value, b: Value, budget: u32) -> Option<bool> {
    if budget == 0 {
        return None;
    }
    if let Some(scalar) = a.scalar_eq(&b) {
        return Some(scalar);
    }
    match (a, b) {
        (Value::Obj(ra), Value::Obj(rb)) => {
            if ra == rb {
                return Some(true);
            }
            match (heap.get(ra), heap.get(rb)) {
                (Obj::Str(x), Obj::Str(y)) => Some(x.hash == y.hash && x.bytes == y.bytes),
                (Obj::Array(x), Obj::Array(y)) => {
                    if x.items.len() != y.items.len() {
                        return Some(false);
                    }
                    for (xi, yi) in x.items.iter().zip(y.items.iter()) {
                        match equal_values(heap, *xi, *yi, budget - 1) {
                            Some(true) => continue,
                            Some(false) => return Some(false),
                            None => return None,
                        }
                    }
                    Some(true)
                }
                (Obj::Tuple(x), Obj::Tuple(y)) => {
                    if x.items.len() != y.items.len() {
                        return Some(false);
                    }
                    for (xi, yi) in x.items.iter().zip(y.items.iter()) {
                        match equal_values(heap, *xi, *yi, budget - 1) {
                            Some(true) => continue,
                            Some(false) => return Some(false),
                            None => return None,
                        }
                    }
                    Some(true)
                }
                // Instances compare by identity only; distinct instances are
                // never `==` even with identical field values (no `ra == rb`
                // match already handled that case above).
                (Obj::Instance(_), Obj::Instance(_)) => Some(false),
                _ => Some(false),
            }
        }
        _ => Some(false),
    }
}

/// `get_property` for the kinds that carry named properties directly
/// (Instance fields + methods, Class statics/methods/`__name__`/
/// `__fields__`/`__class__`, Module globals). Returns `None` when the
/// property genuinely doesn't exist (the VM raises `PropertyError`).
pub fn get_property(heap: &Heap, r: ObjRef, name: &str) -> Option<Value> {
    match heap.get(r) {
        Obj::Instance(inst) => {
            if let Obj::Class(class) = heap.get(inst.class) {
                if let Some(&idx) = class.instance_field_index.get(name) {
                    return Some(inst.fields[idx]);
                }
                if let Some(&closure) = class.instance_methods.get(name) {
                    return Some(Value::Obj(closure));
                }
            }
            None
        }
        Obj::Class(class) => match name {
            "__name__" => None, // constructed by the caller (needs a fresh interned string)
            "__fields__" => None,
            "__class__" => None,
            _ => {
                if let Some(&idx) = class.class_field_index.get(name) {
                    return Some(class.class_field_values[idx]);
                }
                class.class_methods.get(name).map(|&c| Value::Obj(c))
            }
        },
        Obj::Module(m) => m.slot_by_name.get(name).map(|&slot| m.globals[slot as usize]),
        _ => None,
    }
}

/// `set_property`. Returns `Err` when the target is const and already
/// initialized, or doesn't support property assignment at all.
pub fn set_property(heap: &mut Heap, r: ObjRef, name: &str, value: Value) -> RtResult<()> {
    match heap.get_mut(r) {
        Obj::Instance(inst) => {
            let class_ref = inst.class;
            let initialized = inst.initialized;
            let (idx, is_const) = {
                let class = heap.get(class_ref);
                let Obj::Class(class) = class else { unreachable!() };
                match class.instance_field_index.get(name) {
                    Some(&idx) => (idx, class.instance_fields[idx].is_const),
                    None => {
                        return Err(RuntimeErrorValue::new(
                            RuntimeErrorKind::PropertyError,
                            format!("no field named '{name}'"),
                        ))
                    }
                }
            };
            if is_const && initialized {
                return Err(RuntimeErrorValue::new(
                    RuntimeErrorKind::TypeError,
                    format!("cannot assign to const field '{name}'"),
                ));
            }
            let Obj::Instance(inst) = heap.get_mut(r) else { unreachable!() };
            inst.fields[idx] = value;
            Ok(())
        }
        Obj::Class(class) => {
            if let Some(&idx) = class.class_field_index.get(name) {
                if class.class_fields[idx].is_const {
                    return Err(RuntimeErrorValue::new(
                        RuntimeErrorKind::TypeError,
                        format!("cannot assign to const field '{name}'"),
                    ));
                }
                class.class_field_values[idx] = value;
                return Ok(());
            }
            Err(RuntimeErrorValue::new(
                RuntimeErrorKind::PropertyError,
                format!("no class field named '{name}'"),
            ))
        }
        Obj::Module(m) => {
            if let Some(&slot) = m.slot_by_name.get(name) {
                m.globals[slot as usize] = value;
                Ok(())
            } else {
                Err(RuntimeErrorValue::new(
                    RuntimeErrorKind::PropertyError,
                    format!("no global named '{name}'"),
                ))
            }
        }
        other => Err(RuntimeErrorValue::new(
            RuntimeErrorKind::TypeError,
            format!("'{}' does not support property assignment", other.kind_name()),
        )),
    }
}

/// `subscript_get`: `Array`/`Tuple` by integer index, `Map` by arbitrary
/// hashable key, `String` by character index.
///
/// String indexing allocates a fresh one-character `String` object rather
/// than going through the intern table — interning dedups *equal* strings
/// for identity comparison, it isn't required for every computed substring
/// to be canonical.
pub fn subscript_get(heap: &mut Heap, r: ObjRef, key: Value) -> RtResult<Value> {
    match heap.get(r) {
        Obj::Array(a) => index_seq(&a.items, key),
        Obj::Tuple(t) => index_seq(&t.items, key),
        Obj::Str(s) => {
            let Value::Int(i) = key else {
                return Err(RuntimeErrorValue::new(RuntimeErrorKind::TypeError, "string index must be int"));
            };
            let idx = normalize_index(i, s.char_count)
                .ok_or_else(|| RuntimeErrorValue::new(RuntimeErrorKind::IndexError, "string index out of range"))?;
            let ch = s.char_at(idx).expect("index already bounds-checked").to_string();
            Ok(Value::Obj(heap.alloc(Obj::Str(StringObj::new(ch)))))
        }
        Obj::Map(m) => {
            let hash = hash_value(heap, key)?;
            m.get(hash, &key, |a, b| equal_values(heap, *a, *b, RECURSION_BUDGET).unwrap_or(false))
                .ok_or_else(|| RuntimeErrorValue::new(RuntimeErrorKind::KeyError, "key not found"))
        }
        other => Err(RuntimeErrorValue::new(
            RuntimeErrorKind::TypeError,
            format!("'{}' is not subscriptable", other.kind_name()),
        )),
    }
}

/// `subscript_set`.
pub fn subscript_set(heap: &mut Heap, r: ObjRef, key: Value, value: Value) -> RtResult<()> {
    match heap.get_mut(r) {
        Obj::Array(a) => {
            let Value::Int(i) = key else {
                return Err(RuntimeErrorValue::new(RuntimeErrorKind::TypeError, "array index must be int"));
            };
            let idx = normalize_index(i, a.items.len())
                .ok_or_else(|| RuntimeErrorValue::new(RuntimeErrorKind::IndexError, "array index out of range"))?;
            a.items[idx] = value;
            Ok(())
        }
        Obj::Map(_) => {
            let hash = hash_value(heap, key)?;
            // `position` is resolved in a read-only pass so its key_eq
            // closure can borrow `heap` structurally (matching
            // `subscript_get`) without conflicting with the `&mut Heap`
            // the actual insert/overwrite below needs.
            let existing = {
                let Obj::Map(m) = heap.get(r) else { unreachable!() };
                m.position(hash, &key, |a, b| equal_values(heap, *a, *b, RECURSION_BUDGET).unwrap_or(false))
            };
            let Obj::Map(m) = heap.get_mut(r) else { unreachable!() };
            match existing {
                Some(idx) => m.set_value_at(idx, value),
                None => m.insert_new(hash, key, value),
            }
            Ok(())
        }
        other => Err(RuntimeErrorValue::new(
            RuntimeErrorKind::TypeError,
            format!("'{}' does not support item assignment", other.kind_name()),
        )),
    }
}

fn index_seq(items: &[Value], key: Value) -> RtResult<Value> {
    let Value::Int(i) = key else {
        return Err(RuntimeErrorValue::new(RuntimeErrorKind::TypeError, "index must be int"));
    };
    let idx = normalize_index(i, items.len())
        .ok_or_else(|| RuntimeErrorValue::new(RuntimeErrorKind::IndexError, "index out of range"))?;
    Ok(items[idx])
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let idx = if i < 0 { i + len as i64 } else { i };
    (idx >= 0 && (idx as usize) < len).then_some(idx as usize)
}

/// `get_method`: method lookup without binding — used by `CallMethod`'s
/// fast path, which looks the closure up and calls it with the receiver
/// still on the stack rather than allocating a `BoundMethod`.
pub fn get_method(heap: &Heap, r: ObjRef, name: &str) -> Option<ObjRef> {
    match heap.get(r) {
        Obj::Instance(inst) => {
            let Obj::Class(class) = heap.get(inst.class) else { return None };
            class.instance_methods.get(name).copied()
        }
        Obj::Class(class) => class.class_methods.get(name).copied(),
        _ => None,
    }
}

fn type_error(message: impl Into<String>) -> RuntimeErrorValue {
    RuntimeErrorValue::new(RuntimeErrorKind::TypeError, message.into())
}

fn want_string(heap: &Heap, v: Value, who: &str) -> RtResult<String> {
    match v {
        Value::Obj(r) => match heap.get(r) {
            Obj::Str(s) => Ok(s.bytes.to_string()),
            other => Err(type_error(format!("{who} expected string arguments, but got {}", other.kind_name()))),
        },
        other => Err(type_error(format!("{who} expected string arguments, but got {}", other.type_name()))),
    }
}

fn want_int(v: Value, who: &str) -> RtResult<i64> {
    match v {
        Value::Int(i) => Ok(i),
        other => Err(type_error(format!("{who} expected int arguments, but got {}", other.type_name()))),
    }
}

const ARRAY_METHODS: &[&str] =
    &["length", "append", "pop", "sub", "remove", "removeIndex", "extend", "has", "reversed", "reverse", "find"];
const STRING_METHODS: &[&str] =
    &["length", "format", "sub", "find", "replace", "split", "join", "has", "strip", "startswith", "endswith"];
const MAP_METHODS: &[&str] = &["length", "get", "keys", "pop", "has"];

/// Built-in methods on `Array`/`Str`/`Map` receivers, grounded on
/// `dai_object_array.c`/`dai_object_string.c`/`dai_object_map.c`'s per-kind
/// builtin tables. Unlike `get_method`'s `Instance`/`Class` method maps,
/// these aren't closures sitting on the heap waiting to be looked up — the
/// dispatch itself computes the result. Returns `None` for a name this kind
/// doesn't recognize, so the caller can still fall through to a
/// `PropertyError`.
///
/// `Array::sort` is deliberately absent: its comparator callback must call
/// back into running script code (`DaiVM_runCall` in the source), which
/// needs `&mut Vm`, not just `&mut Heap` — `dai-vm` special-cases it before
/// ever reaching this table.
pub fn array_method(heap: &mut Heap, r: ObjRef, name: &str, args: &[Value]) -> Option<RtResult<Value>> {
    if !ARRAY_METHODS.contains(&name) {
        return None;
    }
    Some(array_method_inner(heap, r, name, args))
}

fn array_method_inner(heap: &mut Heap, r: ObjRef, name: &str, args: &[Value]) -> RtResult<Value> {
    match name {
        "length" => {
            if !args.is_empty() {
                return Err(type_error(format!("length() expected no arguments, but got {}", args.len())));
            }
            let Obj::Array(a) = heap.get(r) else { unreachable!() };
            Ok(Value::Int(a.items.len() as i64))
        }
        "append" => {
            if args.is_empty() {
                return Err(type_error("append() expected one or more arguments"));
            }
            let Obj::Array(a) = heap.get_mut(r) else { unreachable!() };
            a.append(args.iter().copied());
            Ok(Value::Obj(r))
        }
        "pop" => {
            if !args.is_empty() {
                return Err(type_error(format!("pop() expected no arguments, but got {}", args.len())));
            }
            let Obj::Array(a) = heap.get_mut(r) else { unreachable!() };
            match a.items.pop() {
                Some(v) => {
                    a.shrink();
                    Ok(v)
                }
                None => Err(type_error("pop from empty array")),
            }
        }
        "sub" => {
            if args.is_empty() || args.len() > 2 {
                return Err(type_error(format!("sub() expected 1-2 arguments, but got {}", args.len())));
            }
            let start_arg = want_int(args[0], "sub()")?;
            let end_arg = if args.len() == 2 { Some(want_int(args[1], "sub()")?) } else { None };
            let Obj::Array(a) = heap.get(r) else { unreachable!() };
            let len = a.items.len() as i64;
            let mut start = start_arg;
            if start < 0 {
                start += len;
                if start < 0 {
                    start = 0;
                }
            }
            let mut end = end_arg.unwrap_or(len);
            if end < 0 {
                end += len;
            } else if end > len {
                end = len;
            }
            if start >= end {
                Ok(Value::Obj(heap.alloc(Obj::Array(ArrayObj::default()))))
            } else {
                let Obj::Array(a) = heap.get(r) else { unreachable!() };
                let slice = a.items[start as usize..end as usize].to_vec();
                Ok(Value::Obj(heap.alloc(Obj::Array(ArrayObj { items: slice }))))
            }
        }
        "remove" => {
            if args.len() != 1 {
                return Err(type_error(format!("remove() expected 1 argument, but got {}", args.len())));
            }
            let Obj::Array(a) = heap.get(r) else { unreachable!() };
            let found = a.items.iter().position(|&v| equal_values(heap, v, args[0], RECURSION_BUDGET).unwrap_or(false));
            match found {
                Some(idx) => {
                    let Obj::Array(a) = heap.get_mut(r) else { unreachable!() };
                    a.items.remove(idx);
                    a.shrink();
                    Ok(Value::Obj(r))
                }
                None => Err(type_error("array.remove(x): x not in array")),
            }
        }
        "removeIndex" => {
            if args.len() != 1 {
                return Err(type_error(format!("removeIndex() expected 1 argument, but got {}", args.len())));
            }
            let idx_arg = want_int(args[0], "removeIndex()")?;
            let Obj::Array(a) = heap.get(r) else { unreachable!() };
            match normalize_index(idx_arg, a.items.len()) {
                Some(idx) => {
                    let Obj::Array(a) = heap.get_mut(r) else { unreachable!() };
                    a.items.remove(idx);
                    a.shrink();
                    Ok(Value::Nil)
                }
                None => Err(RuntimeErrorValue::new(RuntimeErrorKind::IndexError, "removeIndex() index out of range")),
            }
        }
        "extend" => {
            if args.len() != 1 {
                return Err(type_error(format!("extend() expected 1 argument, but got {}", args.len())));
            }
            let Value::Obj(other_ref) = args[0] else {
                return Err(type_error(format!("extend() expected array arguments, but got {}", args[0].type_name())));
            };
            let Obj::Array(other) = heap.get(other_ref) else {
                return Err(type_error(format!("extend() expected array arguments, but got {}", heap.get(other_ref).kind_name())));
            };
            let extra = other.items.clone();
            let Obj::Array(a) = heap.get_mut(r) else { unreachable!() };
            a.append(extra);
            Ok(Value::Obj(r))
        }
        "has" => {
            if args.len() != 1 {
                return Err(type_error(format!("has() expected 1 argument, but got {}", args.len())));
            }
            let Obj::Array(a) = heap.get(r) else { unreachable!() };
            let found = a.items.iter().any(|&v| equal_values(heap, v, args[0], RECURSION_BUDGET).unwrap_or(false));
            Ok(Value::Bool(found))
        }
        "reversed" => {
            if !args.is_empty() {
                return Err(type_error(format!("reversed() expected no arguments, but got {}", args.len())));
            }
            let Obj::Array(a) = heap.get(r) else { unreachable!() };
            let mut items = a.items.clone();
            items.reverse();
            Ok(Value::Obj(heap.alloc(Obj::Array(ArrayObj { items }))))
        }
        "reverse" => {
            if !args.is_empty() {
                return Err(type_error(format!("reverse() expected no arguments, but got {}", args.len())));
            }
            let Obj::Array(a) = heap.get_mut(r) else { unreachable!() };
            a.items.reverse();
            Ok(Value::Obj(r))
        }
        "find" => {
            if args.len() != 1 {
                return Err(type_error(format!("find() expected 1 argument, but got {}", args.len())));
            }
            let Obj::Array(a) = heap.get(r) else { unreachable!() };
            let found = a.items.iter().position(|&v| equal_values(heap, v, args[0], RECURSION_BUDGET).unwrap_or(false));
            Ok(Value::Int(found.map(|i| i as i64).unwrap_or(-1)))
        }
        _ => unreachable!("array_method called with an unrecognized name"),
    }
}

/// Built-in methods on `Str` receivers. See [`array_method`] for the overall
/// shape; grounded on `dai_object_string.c`'s builtin table.
pub fn string_method(heap: &mut Heap, r: ObjRef, name: &str, args: &[Value]) -> Option<RtResult<Value>> {
    if !STRING_METHODS.contains(&name) {
        return None;
    }
    Some(string_method_inner(heap, r, name, args))
}

fn string_method_inner(heap: &mut Heap, r: ObjRef, name: &str, args: &[Value]) -> RtResult<Value> {
    match name {
        "length" => {
            if !args.is_empty() {
                return Err(type_error(format!("length() expected no arguments, but got {}", args.len())));
            }
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            Ok(Value::Int(s.char_count as i64))
        }
        "format" => {
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            let template = s.bytes.to_string();
            let mut out = String::new();
            let mut used = 0usize;
            let mut rest = template.as_str();
            while let Some(pos) = rest.find("{}") {
                out.push_str(&rest[..pos]);
                if used >= args.len() {
                    return Err(type_error("format() not enough arguments"));
                }
                out.push_str(&display_value_with_heap(heap, args[used], RECURSION_BUDGET));
                used += 1;
                rest = &rest[pos + 2..];
            }
            out.push_str(rest);
            if used != args.len() {
                return Err(type_error("format() too many arguments"));
            }
            Ok(Value::Obj(heap.alloc(Obj::Str(StringObj::new(out)))))
        }
        "sub" => {
            if args.is_empty() || args.len() > 2 {
                return Err(type_error(format!("sub() expected 1-2 arguments, but got {}", args.len())));
            }
            let start_arg = want_int(args[0], "sub()")?;
            let end_arg = if args.len() == 2 { Some(want_int(args[1], "sub()")?) } else { None };
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            let len = s.char_count as i64;
            let mut start = start_arg;
            if start < 0 {
                start += len;
                if start < 0 {
                    start = 0;
                }
            }
            let mut end = end_arg.unwrap_or(len);
            if end < 0 {
                end += len;
            } else if end > len {
                end = len;
            }
            if start >= end {
                Ok(Value::Obj(heap.alloc(Obj::Str(StringObj::new("")))))
            } else {
                let Obj::Str(s) = heap.get(r) else { unreachable!() };
                let bstart = s.char_byte_offset(start as usize);
                let bend = s.char_byte_offset(end as usize);
                let slice = s.bytes[bstart..bend].to_string();
                Ok(Value::Obj(heap.alloc(Obj::Str(StringObj::new(slice)))))
            }
        }
        "find" => {
            if args.len() != 1 {
                return Err(type_error(format!("find() expected 1 argument, but got {}", args.len())));
            }
            let needle = want_string(heap, args[0], "find()")?;
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            match s.bytes.find(needle.as_str()) {
                Some(byte_idx) => Ok(Value::Int(s.bytes[..byte_idx].chars().count() as i64)),
                None => Ok(Value::Int(-1)),
            }
        }
        "replace" => {
            if args.len() != 2 && args.len() != 3 {
                return Err(type_error(format!("replace() expected 2-3 arguments, but got {}", args.len())));
            }
            let old = want_string(heap, args[0], "replace()")?;
            let new = want_string(heap, args[1], "replace()")?;
            if old.is_empty() {
                return Err(type_error("replace() empty old string"));
            }
            let count = if args.len() == 3 { want_int(args[2], "replace()")? } else { i64::MAX };
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            let replaced = replace_n(&s.bytes, &old, &new, count);
            Ok(Value::Obj(heap.alloc(Obj::Str(StringObj::new(replaced)))))
        }
        "split" => {
            if args.is_empty() {
                let Obj::Str(s) = heap.get(r) else { unreachable!() };
                let items: Vec<Value> = s
                    .bytes
                    .split_whitespace()
                    .map(|piece| Value::Obj(heap_alloc_str(heap, piece)))
                    .collect();
                return Ok(Value::Obj(heap.alloc(Obj::Array(ArrayObj { items }))));
            }
            if args.len() > 2 {
                return Err(type_error(format!("split() expected 0-2 arguments, but got {}", args.len())));
            }
            let sep = want_string(heap, args[0], "split()")?;
            if sep.is_empty() {
                return Err(type_error("split() empty separator"));
            }
            // split's count argument bounds the result length, so the
            // number of separators consumed is one less.
            let max_splits = if args.len() == 2 { want_int(args[1], "split()")? - 1 } else { i64::MAX };
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            let pieces = split_n(&s.bytes, &sep, max_splits);
            let items: Vec<Value> = pieces.into_iter().map(|p| Value::Obj(heap.alloc(Obj::Str(StringObj::new(p))))).collect();
            Ok(Value::Obj(heap.alloc(Obj::Array(ArrayObj { items }))))
        }
        "join" => {
            if args.len() != 1 {
                return Err(type_error(format!("join() expected 1 argument, but got {}", args.len())));
            }
            let Value::Obj(array_ref) = args[0] else {
                return Err(type_error(format!("join() expected array arguments, but got {}", args[0].type_name())));
            };
            let Obj::Array(array) = heap.get(array_ref) else {
                return Err(type_error(format!("join() expected array arguments, but got {}", heap.get(array_ref).kind_name())));
            };
            let parts: Result<Vec<String>, RuntimeErrorValue> = array
                .items
                .iter()
                .enumerate()
                .map(|(i, &v)| want_string(heap, v, &format!("join() item {i}")))
                .collect();
            let parts = parts?;
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            Ok(Value::Obj(heap.alloc(Obj::Str(StringObj::new(parts.join(&s.bytes))))))
        }
        "has" => {
            if args.len() != 1 {
                return Err(type_error(format!("has() expected 1 argument, but got {}", args.len())));
            }
            let needle = want_string(heap, args[0], "has()")?;
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            Ok(Value::Bool(s.bytes.contains(needle.as_str())))
        }
        "strip" => {
            if !args.is_empty() {
                return Err(type_error(format!("strip() expected no arguments, but got {}", args.len())));
            }
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            let trimmed = s.bytes.trim();
            if trimmed.len() == s.bytes.len() {
                Ok(Value::Obj(r))
            } else {
                Ok(Value::Obj(heap.alloc(Obj::Str(StringObj::new(trimmed)))))
            }
        }
        "startswith" => {
            if args.len() != 1 {
                return Err(type_error(format!("startswith() expected 1 argument, but got {}", args.len())));
            }
            let prefix = want_string(heap, args[0], "startswith()")?;
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            Ok(Value::Bool(s.bytes.starts_with(prefix.as_str())))
        }
        "endswith" => {
            if args.len() != 1 {
                return Err(type_error(format!("endswith() expected 1 argument, but got {}", args.len())));
            }
            let suffix = want_string(heap, args[0], "endswith()")?;
            let Obj::Str(s) = heap.get(r) else { unreachable!() };
            Ok(Value::Bool(s.bytes.ends_with(suffix.as_str())))
        }
        _ => unreachable!("string_method called with an unrecognized name"),
    }
}

fn heap_alloc_str(heap: &mut Heap, s: &str) -> ObjRef {
    heap.alloc(Obj::Str(StringObj::new(s)))
}

/// Replaces up to `max` non-overlapping occurrences of `old` with `new`,
/// left to right. `max == i64::MAX` behaves as "unbounded" (`replace()`'s
/// 2-argument form).
fn replace_n(s: &str, old: &str, new: &str, max: i64) -> String {
    let mut out = String::new();
    let mut rest = s;
    let mut remaining = max;
    while remaining != 0 {
        let Some(pos) = rest.find(old) else { break };
        out.push_str(&rest[..pos]);
        out.push_str(new);
        rest = &rest[pos + old.len()..];
        if remaining != i64::MAX {
            remaining -= 1;
        }
    }
    out.push_str(rest);
    out
}

/// Splits on `sep`, stopping after `max_splits` separators are consumed
/// (so the result has at most `max_splits + 1` pieces). `max_splits < 0`
/// behaves as "unbounded".
fn split_n(s: &str, sep: &str, max_splits: i64) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = s;
    let mut remaining = max_splits;
    loop {
        if remaining == 0 {
            out.push(rest.to_string());
            break;
        }
        match rest.find(sep) {
            Some(pos) => {
                out.push(rest[..pos].to_string());
                rest = &rest[pos + sep.len()..];
                if remaining > 0 {
                    remaining -= 1;
                }
            }
            None => {
                out.push(rest.to_string());
                break;
            }
        }
    }
    out
}

/// Built-in methods on `Map` receivers, grounded on `dai_object_map.c`'s
/// builtin table. See [`array_method`] for the overall shape.
pub fn map_method(heap: &mut Heap, r: ObjRef, name: &str, args: &[Value]) -> Option<RtResult<Value>> {
    if !MAP_METHODS.contains(&name) {
        return None;
    }
    Some(map_method_inner(heap, r, name, args))
}

fn map_method_inner(heap: &mut Heap, r: ObjRef, name: &str, args: &[Value]) -> RtResult<Value> {
    match name {
        "length" => {
            if !args.is_empty() {
                return Err(type_error(format!("length() expected no arguments, but got {}", args.len())));
            }
            let Obj::Map(m) = heap.get(r) else { unreachable!() };
            Ok(Value::Int(m.len() as i64))
        }
        "get" => {
            if args.is_empty() || args.len() > 2 {
                return Err(type_error(format!("get() expected 1-2 arguments, but got {}", args.len())));
            }
            let hash = hash_value(heap, args[0])?;
            let Obj::Map(m) = heap.get(r) else { unreachable!() };
            let found = m.get(hash, &args[0], |a, b| equal_values(heap, *a, *b, RECURSION_BUDGET).unwrap_or(false));
            Ok(found.unwrap_or_else(|| args.get(1).copied().unwrap_or(Value::Nil)))
        }
        "keys" => {
            if !args.is_empty() {
                return Err(type_error(format!("keys() expected no arguments, but got {}", args.len())));
            }
            let items: Vec<Value> = {
                let Obj::Map(m) = heap.get(r) else { unreachable!() };
                m.iter().map(|(k, _)| k).collect()
            };
            Ok(Value::Obj(heap.alloc(Obj::Array(ArrayObj { items }))))
        }
        "pop" => {
            if args.is_empty() || args.len() > 2 {
                return Err(type_error(format!("pop() expected 1-2 arguments, but got {}", args.len())));
            }
            let hash = hash_value(heap, args[0])?;
            let existing = {
                let Obj::Map(m) = heap.get(r) else { unreachable!() };
                m.position(hash, &args[0], |a, b| equal_values(heap, *a, *b, RECURSION_BUDGET).unwrap_or(false))
            };
            match existing {
                Some(idx) => {
                    let Obj::Map(m) = heap.get_mut(r) else { unreachable!() };
                    Ok(m.remove_at(idx))
                }
                None => Ok(args.get(1).copied().unwrap_or(Value::Nil)),
            }
        }
        "has" => {
            if args.len() != 1 {
                return Err(type_error(format!("has() expected 1 argument, but got {}", args.len())));
            }
            let hash = hash_value(heap, args[0])?;
            let Obj::Map(m) = heap.get(r) else { unreachable!() };
            Ok(Value::Bool(m.get(hash, &args[0], |a, b| equal_values(heap, *a, *b, RECURSION_BUDGET).unwrap_or(false)).is_some()))
        }
        _ => unreachable!("map_method called with an unrecognized name"),
    }
}

/// `iter_init`: produces the iterator object for a value used in `for .. in`.
pub fn iter_init(heap: &mut Heap, v: Value) -> RtResult<Value> {
    let Value::Obj(r) = v else {
        return Err(RuntimeErrorValue::new(
            RuntimeErrorKind::TypeError,
            "value is not iterable",
        ));
    };
    match heap.get(r) {
        Obj::Array(_) => Ok(Value::Obj(heap.alloc(Obj::ArrayIterator(ArrayIteratorObj { array: r, cursor: 0 })))),
        Obj::Map(_) => Ok(Value::Obj(heap.alloc(Obj::MapIterator(MapIteratorObj { map: r, cursor: 0 })))),
        Obj::RangeIterator(_) => Ok(v),
        other => Err(RuntimeErrorValue::new(
            RuntimeErrorKind::TypeError,
            format!("'{}' is not iterable", other.kind_name()),
        )),
    }
}

/// `iter_next`: returns `(index, element)`, or `None` once exhausted (the
/// `undefined` sentinel in the bytecode semantics).
pub fn iter_next(heap: &mut Heap, iterator: ObjRef) -> Option<(Value, Value)> {
    match heap.get_mut(iterator) {
        Obj::ArrayIterator(it) => {
            let array = it.array;
            let cursor = it.cursor;
            let Obj::Array(a) = heap.get(array) else { unreachable!() };
            if cursor >= a.items.len() {
                return None;
            }
            let elem = a.items[cursor];
            let Obj::ArrayIterator(it) = heap.get_mut(iterator) else { unreachable!() };
            it.cursor += 1;
            Some((Value::Int(cursor as i64), elem))
        }
        Obj::MapIterator(it) => {
            let map = it.map;
            let cursor = it.cursor;
            let Obj::Map(m) = heap.get(map) else { unreachable!() };
            let entry = m.iter().nth(cursor);
            let Obj::MapIterator(it) = heap.get_mut(iterator) else { unreachable!() };
            it.cursor += 1;
            entry.map(|(k, v)| (k, v))
        }
        Obj::RangeIterator(it) => it.next().map(|(i, v)| (Value::Int(i), Value::Int(v))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap_with_array(items: Vec<Value>) -> (Heap, ObjRef) {
        let mut heap = Heap::new();
        let r = heap.alloc(Obj::Array(ArrayObj { items }));
        (heap, r)
    }

    #[test]
    fn array_index_wraps_negative() {
        let (mut heap, r) = heap_with_array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(subscript_get(&mut heap, r, Value::Int(-1)).unwrap(), Value::Int(3));
    }

    #[test]
    fn array_index_out_of_range_errors() {
        let (mut heap, r) = heap_with_array(vec![Value::Int(1)]);
        assert!(subscript_get(&mut heap, r, Value::Int(5)).is_err());
    }

    #[test]
    fn array_equality_is_structural() {
        let (heap, r1) = heap_with_array(vec![Value::Int(1), Value::Int(2)]);
        let mut heap = heap;
        let r2 = heap.alloc(Obj::Array(ArrayObj { items: vec![Value::Int(1), Value::Int(2)] }));
        assert_eq!(equal_values(&heap, Value::Obj(r1), Value::Obj(r2), RECURSION_BUDGET), Some(true));
    }

    #[test]
    fn cyclic_array_print_terminates() {
        let mut heap = Heap::new();
        let r = heap.alloc(Obj::Array(ArrayObj::default()));
        let Obj::Array(a) = heap.get_mut(r) else { unreachable!() };
        a.items.push(Value::Obj(r));
        let s = display_string(&heap, r, RECURSION_BUDGET);
        assert!(s.contains("[...]") || s.starts_with('['));
    }
}
