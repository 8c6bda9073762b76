//! Array, ArrayIterator, Map, MapIterator, RangeIterator, Tuple.

use crate::heap::ObjRef;
use crate::value::Value;

/// Growable element vector. Growth/shrink factors mirror `dai_object_array.c`:
/// double capacity when full, halve when length drops to a quarter of it.
#[derive(Debug, Clone, Default)]
pub struct ArrayObj {
    pub items: Vec<Value>,
}

impl ArrayObj {
    /// Appends one or more values, as `append`/`extend`'s shared backing.
    /// Mirrors `DaiObjArray_append1` — growth only, never shrinks.
    pub fn append(&mut self, values: impl IntoIterator<Item = Value>) {
        self.items.extend(values);
    }

    /// Shrinks spare capacity once length drops to a quarter of it. Only
    /// ever called after a removal (`pop`/`remove`/`removeIndex`) — matching
    /// `DaiObjArray_shrink`'s call sites in the original, never after growth.
    pub fn shrink(&mut self) {
        let cap = self.items.capacity();
        if cap > 8 && self.items.len() <= cap / 4 {
            self.items.shrink_to(cap / 2);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArrayIteratorObj {
    pub array: ObjRef,
    pub cursor: usize,
}

/// Open-addressed `(key, value)` table with tombstones, following
/// `dai_object_map.c`/`dai_table.c`'s probing scheme. Key hashing delegates
/// to the key value's own hash op (performed one layer up, in
/// `Obj::hash_op`, since it may need heap access for interned strings);
/// containers (`Array`/`Map`/`Tuple`) are not hashable and are rejected
/// there before a `MapObj` method is ever reached.
#[derive(Debug, Clone, Default)]
pub struct MapObj {
    buckets: Vec<Slot>,
    len: usize,
}

#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Tombstone,
    Occupied { hash: u64, key: Value, value: Value },
}

impl MapObj {
    const MIN_CAPACITY: usize = 8;

    pub fn new() -> Self {
        MapObj { buckets: vec![Slot::Empty; Self::MIN_CAPACITY], len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn grow_if_needed(&mut self) {
        if self.len * 4 < self.buckets.len() * 3 {
            return;
        }
        let old = std::mem::replace(&mut self.buckets, vec![Slot::Empty; self.buckets.len() * 2]);
        self.len = 0;
        for slot in old {
            if let Slot::Occupied { hash, key, value } = slot {
                self.insert_raw(hash, key, value);
            }
        }
    }

    fn insert_raw(&mut self, hash: u64, key: Value, value: Value) {
        let mask = self.buckets.len() - 1;
        let mut idx = hash as usize & mask;
        loop {
            match &self.buckets[idx] {
                Slot::Empty | Slot::Tombstone => {
                    self.buckets[idx] = Slot::Occupied { hash, key, value };
                    self.len += 1;
                    return;
                }
                Slot::Occupied { hash: h, .. } if *h == hash => {
                    self.buckets[idx] = Slot::Occupied { hash, key, value };
                    return;
                }
                _ => idx = (idx + 1) & mask,
            }
        }
    }

    pub fn get(&self, hash: u64, key: &Value, key_eq: impl Fn(&Value, &Value) -> bool) -> Option<Value> {
        self.find_slot(hash, key, &key_eq).map(|idx| match &self.buckets[idx] {
            Slot::Occupied { value, .. } => *value,
            _ => unreachable!(),
        })
    }

    /// Locates the bucket index holding `key`, using `key_eq` for collision
    /// disambiguation. Split out from insert/remove so a caller whose
    /// `key_eq` needs shared access to something a `&mut MapObj` borrow
    /// would conflict with (the heap, for structural string equality) can
    /// resolve the index with a read-only pass, then mutate by index.
    pub fn position(&self, hash: u64, key: &Value, key_eq: impl Fn(&Value, &Value) -> bool) -> Option<usize> {
        self.find_slot(hash, key, &key_eq)
    }

    /// Overwrites the value at an index already known (via `position`) to
    /// hold the target key.
    pub fn set_value_at(&mut self, idx: usize, value: Value) {
        match &mut self.buckets[idx] {
            Slot::Occupied { value: v, .. } => *v = value,
            _ => unreachable!("set_value_at called on a non-occupied slot"),
        }
    }

    /// Removes and returns the value at an index already known (via
    /// `position`) to hold the target key.
    pub fn remove_at(&mut self, idx: usize) -> Value {
        let slot = std::mem::replace(&mut self.buckets[idx], Slot::Tombstone);
        self.len -= 1;
        match slot {
            Slot::Occupied { value, .. } => value,
            _ => unreachable!("remove_at called on a non-occupied slot"),
        }
    }

    /// Inserts a key known (via `position` returning `None`) not to be
    /// present yet, growing first if that would overfill the table.
    pub fn insert_new(&mut self, hash: u64, key: Value, value: Value) {
        self.grow_if_needed();
        self.insert_raw(hash, key, value);
    }

    fn find_slot(&self, hash: u64, key: &Value, key_eq: &impl Fn(&Value, &Value) -> bool) -> Option<usize> {
        let mask = self.buckets.len() - 1;
        let mut idx = hash as usize & mask;
        for _ in 0..self.buckets.len() {
            match &self.buckets[idx] {
                Slot::Empty => return None,
                Slot::Occupied { hash: h, key: k, .. } if *h == hash && key_eq(k, key) => {
                    return Some(idx);
                }
                _ => idx = (idx + 1) & mask,
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.buckets.iter().filter_map(|s| match s {
            Slot::Occupied { key, value, .. } => Some((*key, *value)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MapIteratorObj {
    pub map: ObjRef,
    pub cursor: usize,
}

/// `(start, end, step, current, index)`, producing integers until the
/// step-appropriate bound is crossed.
#[derive(Debug, Clone, Copy)]
pub struct RangeIteratorObj {
    pub start: i64,
    pub end: i64,
    pub step: i64,
    pub current: i64,
    pub index: i64,
}

impl RangeIteratorObj {
    pub fn new(start: i64, end: i64, step: i64) -> Self {
        RangeIteratorObj { start, end, step, current: start, index: 0 }
    }

    fn exhausted(&self) -> bool {
        if self.step > 0 {
            self.current >= self.end
        } else if self.step < 0 {
            self.current <= self.end
        } else {
            true
        }
    }

    /// Returns `(index, element)` and advances, or `None` once exhausted.
    pub fn next(&mut self) -> Option<(i64, i64)> {
        if self.exhausted() {
            return None;
        }
        let out = (self.index, self.current);
        self.current += self.step;
        self.index += 1;
        Some(out)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TupleObj {
    pub items: Vec<Value>,
}
