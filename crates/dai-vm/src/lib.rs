//! The call-frame stack machine (§5), its object model's runtime error
//! surface (§7), and the host embedding API (§6.1).
//!
//! Grounded on `dai_vm.c`/`dai_vm.h` (the bytecode interpreter) and
//! `cbdai/dai.h` (the embedding surface), structured the way `vitte-vm`
//! splits a machine crate: one module per concern (`frame`, `error`, `vm`,
//! `embed`) rather than one file holding everything.
#![forbid(unsafe_code)]

pub mod embed;
mod error;
mod frame;
mod vm;

pub use embed::{EmbedValue, Embedder, FunctionHandle};
pub use error::{TraceFrame, VmError, VmResult};
pub use frame::{Frame, FrameOwner, ReturnCallback};
pub use vm::{Vm, VmOptions};

/// Re-exports for `use dai_vm::prelude::*` — the handful of types a caller
/// driving the VM directly (rather than through [`Embedder`]) actually
/// needs.
pub mod prelude {
    pub use crate::{EmbedValue, Embedder, FunctionHandle, Vm, VmError, VmOptions, VmResult};
}

#[cfg(test)]
mod tests {
    use dai_core::object::Obj;
    use dai_core::value::Value;

    use super::*;

    fn run(vm: &mut Vm, source: &str) -> VmResult<Value> {
        let module = vm.load_module("test", source, "test.dai")?;
        vm.run_module(module)
    }

    fn run_and_get_global(vm: &mut Vm, source: &str, name: &str) -> Value {
        let module = vm.load_module("test", source, "test.dai").expect("compiles");
        vm.run_module(module).expect("runs");
        let Obj::Module(m) = vm.heap().get(module) else { unreachable!() };
        let slot = *m.slot_by_name.get(name).expect("global exists");
        m.globals[slot as usize]
    }

    #[test]
    fn arithmetic_and_globals() {
        let mut vm = Vm::new();
        let value = run_and_get_global(&mut vm, "var x = 2 + 3 * 4;", "x");
        assert_eq!(value, Value::Int(14));
    }

    #[test]
    fn recursive_fibonacci() {
        let mut vm = Vm::new();
        let source = r#"
            fn fib(n) {
                if (n < 2) { return n; };
                return fib(n - 1) + fib(n - 2);
            };
            var result = fib(10);
        "#;
        let value = run_and_get_global(&mut vm, source, "result");
        assert_eq!(value, Value::Int(55));
    }

    #[test]
    fn closures_capture_by_value() {
        let mut vm = Vm::new();
        let source = r#"
            fn make_adder(x) {
                fn adder(y) {
                    return x + y;
                };
                return adder;
            };
            var add3 = make_adder(3);
            var result = add3(4);
        "#;
        let value = run_and_get_global(&mut vm, source, "result");
        assert_eq!(value, Value::Int(7));
    }

    #[test]
    fn string_concatenation_interns() {
        let mut vm = Vm::new();
        let source = r#"
            var a = "mon" + "key";
            var b = "monkey";
            var same = a == b;
        "#;
        let value = run_and_get_global(&mut vm, source, "same");
        assert_eq!(value, Value::Bool(true));
    }

    #[test]
    fn for_in_sums_an_array() {
        let mut vm = Vm::new();
        let source = r#"
            var items = [1, 2, 3, 4];
            var total = 0;
            for (i, v in items) {
                total = total + v;
            };
        "#;
        let value = run_and_get_global(&mut vm, source, "total");
        assert_eq!(value, Value::Int(10));
    }

    #[test]
    fn classes_and_inheritance() {
        let mut vm = Vm::new();
        let source = r#"
            class Base {
                fn get() {
                    return 1;
                };
            };
            class Derived < Base {
                fn get() {
                    return super.get() + 10;
                };
            };
            var d = Derived();
            var result = d.get();
        "#;
        let value = run_and_get_global(&mut vm, source, "result");
        assert_eq!(value, Value::Int(11));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let mut vm = Vm::new();
        let err = run(&mut vm, "var x = 1 / 0;").expect_err("divides by zero");
        assert!(matches!(err, VmError::Runtime { .. }));
    }
}
