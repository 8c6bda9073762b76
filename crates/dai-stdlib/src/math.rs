//! The `math` builtin namespace: `math.sqrt`, `math.sin`, `math.cos`.
//! Grounded on `dai_builtin.c`'s `builtin_math_sqrt`/`builtin_math_sin`/
//! `builtin_math_cos` and `builtin_math_module`.

use std::sync::Arc;

use dai_core::object::{NativeCtx, NativeError, NativeFn};
use dai_core::value::Value;
use dai_vm::Vm;

fn native(f: impl Fn(&mut NativeCtx<'_>, Value, &[Value]) -> Result<Value, NativeError> + Send + Sync + 'static) -> NativeFn {
    Arc::new(f)
}

fn as_f64(name: &str, v: Value) -> Result<f64, NativeError> {
    match v {
        Value::Int(i) => Ok(i as f64),
        Value::Float(f) => Ok(f),
        other => Err(NativeError::type_error(format!("{name}() expected number arguments, but got {}", other.type_name()))),
    }
}

fn unary(name: &'static str, op: fn(f64) -> f64) -> NativeFn {
    native(move |_ctx, _receiver, args| {
        if args.len() != 1 {
            return Err(NativeError::type_error(format!("math.{name}() expected 1 argument, but got {}", args.len())));
        }
        Ok(Value::Float(op(as_f64(&format!("math.{name}"), args[0])?)))
    })
}

pub fn install(vm: &mut Vm) {
    vm.register_namespace(
        "math",
        vec![("sqrt", 1, unary("sqrt", f64::sqrt)), ("sin", 1, unary("sin", f64::sin)), ("cos", 1, unary("cos", f64::cos))],
    );
}
