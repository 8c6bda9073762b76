//! The flat builtin-function list (§ builtins), grounded on
//! `dai_builtin.c`'s `builtin_funcs[]`: `print, len, type, assert,
//! assert_eq, range, abs, import`.
//!
//! `import` is registered here only so it occupies a builtin slot and a
//! name the compiler can resolve `import(...)` calls against — its actual
//! body is never run. `Vm::dispatch` recognizes the name `"import"` on a
//! `BuiltinFunction` and routes the call to `Vm::do_import` before it would
//! ever reach this closure.

use std::sync::Arc;

use dai_core::error::RuntimeErrorKind;
use dai_core::object::{NativeCtx, NativeError, NativeFn, Obj, RECURSION_BUDGET};
use dai_core::value::Value;
use dai_vm::Vm;

/// `Value::type_name()` only distinguishes scalars from "object"; built-ins
/// like `type()` need the finer per-kind name `Obj::kind_name()` gives.
fn type_name_of(heap: &dai_core::heap::Heap, v: Value) -> &'static str {
    match v {
        Value::Obj(r) => heap.get(r).kind_name(),
        other => other.type_name(),
    }
}

fn native(f: impl Fn(&mut NativeCtx<'_>, Value, &[Value]) -> Result<Value, NativeError> + Send + Sync + 'static) -> NativeFn {
    Arc::new(f)
}

fn print_fn() -> NativeFn {
    native(|ctx, _receiver, args| {
        use std::io::Write;
        let mut out = String::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&dai_core::object::display_value_with_heap(ctx.heap, *arg, RECURSION_BUDGET));
        }
        out.push(' ');
        out.push('\n');
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(out.as_bytes());
        Ok(Value::Nil)
    })
}

fn len_fn() -> NativeFn {
    native(|ctx, _receiver, args| {
        if args.len() != 1 {
            return Err(NativeError::type_error(format!("len() expected 1 argument, but got {}", args.len())));
        }
        match args[0] {
            Value::Obj(r) => match ctx.heap.get(r) {
                Obj::Str(s) => Ok(Value::Int(s.char_count as i64)),
                Obj::Array(a) => Ok(Value::Int(a.items.len() as i64)),
                other => Err(NativeError::type_error(format!("'len' not supported '{}'", other.kind_name()))),
            },
            other => Err(NativeError::type_error(format!("'len' not supported '{}'", other.type_name()))),
        }
    })
}

fn type_fn() -> NativeFn {
    native(|ctx, _receiver, args| {
        if args.len() != 1 {
            return Err(NativeError::type_error(format!("type() expected 1 argument, but got {}", args.len())));
        }
        let name = type_name_of(ctx.heap, args[0]);
        let r = ctx.heap.alloc(Obj::Str(dai_core::object::StringObj::new(name)));
        Ok(Value::Obj(r))
    })
}

fn assert_fn() -> NativeFn {
    native(|ctx, _receiver, args| {
        if args.is_empty() || args.len() > 2 {
            return Err(NativeError::type_error(format!("assert() expected 1 or 2 arguments, but got {}", args.len())));
        }
        let message = match args.get(1) {
            Some(Value::Obj(r)) => match ctx.heap.get(*r) {
                Obj::Str(s) => Some(s.bytes.to_string()),
                _ => return Err(NativeError::type_error("assert() expected string as second argument")),
            },
            Some(_) => return Err(NativeError::type_error("assert() expected string as second argument")),
            None => None,
        };
        if !args[0].is_truthy() {
            return Err(NativeError::new(
                RuntimeErrorKind::AssertionError,
                match message {
                    Some(m) => format!("assertion failed: {m}"),
                    None => "assertion failed".to_string(),
                },
            ));
        }
        Ok(Value::Nil)
    })
}

fn assert_eq_fn() -> NativeFn {
    native(|ctx, _receiver, args| {
        if args.len() != 2 && args.len() != 3 {
            return Err(NativeError::type_error(format!("assert_eq() expected 2 or 3 arguments, but got {}", args.len())));
        }
        let message = match args.get(2) {
            Some(Value::Obj(r)) => match ctx.heap.get(*r) {
                Obj::Str(s) => Some(s.bytes.to_string()),
                _ => return Err(NativeError::type_error("assert_eq() expected string as third argument")),
            },
            Some(_) => return Err(NativeError::type_error("assert_eq() expected string as third argument")),
            None => None,
        };
        let equal = dai_core::object::equal_values(ctx.heap, args[0], args[1], RECURSION_BUDGET)
            .ok_or_else(|| NativeError::new(RuntimeErrorKind::RecursionError, "assert_eq() exceeded recursion budget"))?;
        if !equal {
            let a = dai_core::object::display_value_with_heap(ctx.heap, args[0], RECURSION_BUDGET);
            let b = dai_core::object::display_value_with_heap(ctx.heap, args[1], RECURSION_BUDGET);
            let detail = match message {
                Some(m) => format!("assertion failed: {a} != {b} {m}"),
                None => format!("assertion failed: {a} != {b}"),
            };
            return Err(NativeError::new(RuntimeErrorKind::AssertionError, detail));
        }
        Ok(Value::Nil)
    })
}

fn range_fn() -> NativeFn {
    native(|ctx, _receiver, args| {
        if args.is_empty() || args.len() > 3 {
            return Err(NativeError::type_error(format!("range() expected 1-3 arguments, but got {}", args.len())));
        }
        let mut ints = [0i64; 3];
        for (i, a) in args.iter().enumerate() {
            match a {
                Value::Int(n) => ints[i] = *n,
                other => return Err(NativeError::type_error(format!("range() expected int arguments, but got {}", other.type_name()))),
            }
        }
        let (start, end, step) = match args.len() {
            1 => (0, ints[0], 1),
            2 => (ints[0], ints[1], 1),
            _ => (ints[0], ints[1], ints[2]),
        };
        let iterator = dai_core::object::RangeIteratorObj::new(start, end, step);
        let r = ctx.heap.alloc(Obj::RangeIterator(iterator));
        Ok(Value::Obj(r))
    })
}

fn abs_fn() -> NativeFn {
    native(|_ctx, _receiver, args| {
        if args.len() != 1 {
            return Err(NativeError::type_error(format!("abs() expected 1 argument, but got {}", args.len())));
        }
        match args[0] {
            Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(NativeError::type_error(format!("abs() expected number arguments, but got {}", other.type_name()))),
        }
    })
}

/// Never actually invoked — see the module doc comment.
fn import_stub() -> NativeFn {
    native(|_ctx, _receiver, _args| {
        Err(NativeError::type_error("import() should have been intercepted by the VM dispatch loop"))
    })
}

/// Registers `print, len, type, assert, assert_eq, range, abs, import` at
/// the next 8 builtin slots, in that exact order.
pub fn install(vm: &mut Vm) {
    vm.register_builtin("print", -1, print_fn(), false);
    vm.register_builtin("len", 1, len_fn(), false);
    vm.register_builtin("type", 1, type_fn(), false);
    vm.register_builtin("assert", -1, assert_fn(), false);
    vm.register_builtin("assert_eq", -1, assert_eq_fn(), false);
    vm.register_builtin("range", -1, range_fn(), false);
    vm.register_builtin("abs", 1, abs_fn(), false);
    vm.register_builtin("import", 1, import_stub(), false);
}
