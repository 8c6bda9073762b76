use dai_core::bytecode::{Chunk, ConstValue, Op};
use dai_core::gc::{self, GcState};
use dai_core::heap::Heap;
use dai_core::intern::InternTable;
use dai_core::object::{ArrayObj, ClassObj, InstanceObj, Obj};
use dai_core::value::Value;

#[test]
fn class_instance_graph_survives_collection_while_rooted() {
    let mut heap = Heap::new();
    let mut interned = InternTable::new();
    let mut gc_state = GcState::new();

    let class = heap.alloc(Obj::Class(ClassObj::new("Point".into(), None)));
    let instance = heap.alloc(Obj::Instance(InstanceObj::new(class, 0)));

    let freed = gc::collect(&mut heap, &mut interned, &mut gc_state, &[instance]);
    assert_eq!(freed, 0);
    assert!(matches!(heap.get(instance), Obj::Instance(_)));
}

#[test]
fn a_chunk_can_be_built_and_its_constants_deduped() {
    let mut chunk = Chunk::new();
    let k1 = chunk.add_const(ConstValue::I64(2));
    let k2 = chunk.add_const(ConstValue::I64(3));
    let k3 = chunk.add_const(ConstValue::I64(2));
    assert_eq!(k1, k3);
    assert_ne!(k1, k2);

    chunk.push_op(Op::Constant(k1), 1);
    chunk.push_op(Op::Constant(k2), 1);
    chunk.push_op(Op::Add, 1);
    chunk.push_op(Op::ReturnValue, 1);
    assert_eq!(chunk.ops.len(), 4);
}

#[test]
fn unreferenced_array_of_arrays_is_fully_reclaimed() {
    let mut heap = Heap::new();
    let mut interned = InternTable::new();
    let mut gc_state = GcState::new();

    let inner = heap.alloc(Obj::Array(ArrayObj { items: vec![Value::Int(1), Value::Int(2)] }));
    let _outer = heap.alloc(Obj::Array(ArrayObj { items: vec![Value::Obj(inner)] }));

    let freed = gc::collect(&mut heap, &mut interned, &mut gc_state, &[]);
    assert!(freed > 0);
}
