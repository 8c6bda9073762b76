//! Built-in functions bound into a [`dai_vm::Vm`] at construction time.
//!
//! Grounded on `original_source/src/dai_builtin.c`'s `init_builtin_objects`:
//! a flat list of top-level natives (`print, len, type, assert, assert_eq,
//! range, abs, import`) followed by two hand-built namespace modules
//! (`time`, `math`). Unlike `vitte-stdlib`'s "bootstrap `.vit` sources plus
//! a few native helpers" split, every dai builtin is host-native — the
//! original implements them all in C, never in dai itself — so there is no
//! `sources()`/`compile_all()` half of this crate to carry over.
#![forbid(unsafe_code)]

mod math;
mod time;
mod toplevel;

use dai_vm::Vm;

/// Registers every built-in at its canonical slot, in `dai_builtin.c`'s
/// exact order: the 8 top-level functions first, then `time`, then `math`.
/// Callers compile against `vm.builtin_names()` *after* calling this, never
/// before — slot order is install order.
pub fn install(vm: &mut Vm) {
    toplevel::install(vm);
    time::install(vm);
    math::install(vm);
}

#[cfg(test)]
mod tests {
    use dai_core::object::Obj;
    use dai_core::value::Value;
    use dai_vm::Vm;

    use super::*;

    fn run_and_get_global(vm: &mut Vm, source: &str, name: &str) -> Value {
        let module = vm.load_module("test", source, "test.dai").expect("compiles");
        vm.run_module(module).expect("runs");
        let Obj::Module(m) = vm.heap().get(module) else { unreachable!() };
        let slot = *m.slot_by_name.get(name).expect("global exists");
        m.globals[slot as usize]
    }

    #[test]
    fn installed_names_match_dai_builtin_c_order() {
        let mut vm = Vm::new();
        install(&mut vm);
        assert_eq!(
            vm.builtin_names(),
            vec!["print", "len", "type", "assert", "assert_eq", "range", "abs", "import", "time", "math"]
        );
    }

    #[test]
    fn len_and_abs() {
        let mut vm = Vm::new();
        install(&mut vm);
        let value = run_and_get_global(&mut vm, "var result = len(\"hello\") + abs(-3);", "result");
        assert_eq!(value, Value::Int(8));
    }

    #[test]
    fn type_of_reports_kind_names() {
        let mut vm = Vm::new();
        install(&mut vm);
        let source = r#"
            var a = type(1) == "int";
            var b = type("x") == "string";
            var c = type([1]) == "array";
            var result = a and b and c;
        "#;
        let value = run_and_get_global(&mut vm, source, "result");
        assert_eq!(value, Value::Bool(true));
    }

    #[test]
    fn assert_eq_passes_on_equal_values() {
        let mut vm = Vm::new();
        let source = "assert_eq(1 + 1, 2); var result = true;";
        install(&mut vm);
        let value = run_and_get_global(&mut vm, source, "result");
        assert_eq!(value, Value::Bool(true));
    }

    #[test]
    fn assert_failure_is_a_runtime_error() {
        let mut vm = Vm::new();
        install(&mut vm);
        let module = vm.load_module("test", "assert(1 == 2);", "test.dai").expect("compiles");
        let err = vm.run_module(module).expect_err("assertion fails");
        assert!(matches!(err, dai_vm::VmError::Runtime { .. }));
    }

    #[test]
    fn range_drives_a_for_in_loop() {
        let mut vm = Vm::new();
        install(&mut vm);
        let source = r#"
            var total = 0;
            for (i, v in range(0, 5)) {
                total = total + v;
            };
            var result = total;
        "#;
        let value = run_and_get_global(&mut vm, source, "result");
        assert_eq!(value, Value::Int(10));
    }

    #[test]
    fn math_and_time_namespaces_are_callable() {
        let mut vm = Vm::new();
        install(&mut vm);
        let source = r#"
            var root = math.sqrt(16.0);
            var result = root == 4.0;
        "#;
        let value = run_and_get_global(&mut vm, source, "result");
        assert_eq!(value, Value::Bool(true));
    }
}
