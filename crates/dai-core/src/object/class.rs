//! Class and Instance.

use ahash::AHashMap;

use crate::heap::ObjRef;
use crate::value::Value;

/// One declared field: name, const-ness, default value expression result,
/// and the dense index its value occupies in every instance's `fields`.
#[derive(Debug, Clone)]
pub struct FieldSlot {
    pub name: String,
    pub is_const: bool,
    pub default: Value,
    pub dense_index: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ClassObj {
    pub name: String,
    pub parent: Option<ObjRef>,

    /// User-declared instance fields, in declaration order. This doubles as
    /// the `__fields__` class attribute and as the positional-construction
    /// convention.
    pub instance_fields: Vec<FieldSlot>,
    pub instance_field_index: AHashMap<String, usize>,

    /// Class (static) fields: values live directly on the class, not per
    /// instance.
    pub class_fields: Vec<FieldSlot>,
    pub class_field_values: Vec<Value>,
    pub class_field_index: AHashMap<String, usize>,

    pub instance_methods: AHashMap<String, ObjRef>,
    pub class_methods: AHashMap<String, ObjRef>,

    /// Cached `__init__`, if the class or an ancestor declares one.
    pub init: Option<ObjRef>,
}

impl ClassObj {
    pub fn new(name: String, parent: Option<ObjRef>) -> Self {
        ClassObj { name, parent, ..Default::default() }
    }

    pub fn declare_instance_field(&mut self, name: String, is_const: bool, default: Value) -> u16 {
        let idx = self.instance_fields.len() as u16;
        self.instance_field_index.insert(name.clone(), self.instance_fields.len());
        self.instance_fields.push(FieldSlot { name, is_const, default, dense_index: idx });
        idx
    }

    pub fn declare_class_field(&mut self, name: String, is_const: bool, default: Value) -> u16 {
        let idx = self.class_fields.len() as u16;
        self.class_field_index.insert(name.clone(), self.class_fields.len());
        self.class_fields.push(FieldSlot { name, is_const, default, dense_index: idx });
        self.class_field_values.push(default);
        idx
    }

    pub fn field_count(&self) -> usize {
        self.instance_fields.len()
    }

    /// Names of user-declared instance fields, in declaration order —
    /// exactly the `__fields__` attribute.
    pub fn field_names(&self) -> Vec<&str> {
        self.instance_fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// `Op::Inherit`'s field/method-table copy: seeds this (child) class
    /// from `parent_ref`/`parent` so parent instance fields occupy the
    /// lower dense indices before the child's own `DefineField`/
    /// `DefineMethod` ops run. Must be called before those ops, on a
    /// freshly-built, still-empty class.
    pub fn inherit_from(&mut self, parent_ref: ObjRef, parent: &ClassObj) {
        debug_assert!(self.instance_fields.is_empty() && self.class_fields.is_empty());
        self.parent = Some(parent_ref);
        self.instance_fields = parent.instance_fields.clone();
        self.instance_field_index = parent.instance_field_index.clone();
        self.class_fields = parent.class_fields.clone();
        self.class_field_values = parent.class_field_values.clone();
        self.class_field_index = parent.class_field_index.clone();
        self.instance_methods = parent.instance_methods.clone();
        self.class_methods = parent.class_methods.clone();
        self.init = parent.init;
    }
}

/// A live object of some `ClassObj`: a dense array of field values indexed
/// by the class's field layout, plus the `initialized` flag the VM flips
/// once `__init__` returns successfully.
#[derive(Debug, Clone)]
pub struct InstanceObj {
    pub class: ObjRef,
    pub fields: Vec<Value>,
    pub initialized: bool,
}

impl InstanceObj {
    pub fn new(class: ObjRef, field_count: usize) -> Self {
        InstanceObj { class, fields: vec![Value::Undefined; field_count], initialized: false }
    }

    /// True once every declared field has been assigned a non-`undefined`
    /// value — the precondition the `__init__` return_callback checks
    /// before marking the instance initialized.
    pub fn all_fields_set(&self) -> bool {
        self.fields.iter().all(|v| !v.is_undefined())
    }
}
