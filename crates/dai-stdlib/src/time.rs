//! The `time` builtin namespace: `time.time()`, `time.timef()`,
//! `time.sleep(seconds)`. Grounded on `dai_builtin.c`'s
//! `builtin_time_time`/`builtin_time_timef`/`builtin_time_sleep` and
//! `builtin_time_module`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dai_core::object::{NativeCtx, NativeError, NativeFn};
use dai_core::value::Value;
use dai_vm::Vm;

fn native(f: impl Fn(&mut NativeCtx<'_>, Value, &[Value]) -> Result<Value, NativeError> + Send + Sync + 'static) -> NativeFn {
    Arc::new(f)
}

fn now() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

fn time_fn() -> NativeFn {
    native(|_ctx, _receiver, args| {
        if !args.is_empty() {
            return Err(NativeError::type_error(format!("time.time() expected no arguments, but got {}", args.len())));
        }
        Ok(Value::Int(now().as_secs() as i64))
    })
}

fn timef_fn() -> NativeFn {
    native(|_ctx, _receiver, args| {
        if !args.is_empty() {
            return Err(NativeError::type_error(format!("time.timef() expected no arguments, but got {}", args.len())));
        }
        Ok(Value::Float(now().as_secs_f64()))
    })
}

fn sleep_fn() -> NativeFn {
    native(|_ctx, _receiver, args| {
        if args.len() != 1 {
            return Err(NativeError::type_error(format!("time.sleep() expected 1 argument, but got {}", args.len())));
        }
        let secs = match args[0] {
            Value::Int(i) => i as f64,
            Value::Float(f) => f,
            other => return Err(NativeError::type_error(format!("time.sleep() expected number arguments, but got {}", other.type_name()))),
        };
        if secs > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(secs));
        }
        Ok(Value::Nil)
    })
}

pub fn install(vm: &mut Vm) {
    vm.register_namespace("time", vec![("time", 0, time_fn()), ("timef", 0, timef_fn()), ("sleep", 1, sleep_fn())]);
}
