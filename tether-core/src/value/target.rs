//! Raw targets.
//!
//! A [`Target`] is the plain data a host makes reactive. It is a shared,
//! identity-bearing cell; every `raw_*` operation reads or writes it directly
//! with no tracking or triggering. Reactive access goes through a
//! [`Proxy`](crate::Proxy) instead.
//!
//! A target's registry entry, and the deps in it, live as long as the
//! target. An effect that is never stopped is owned by those deps, and its
//! closure usually owns a handle to the target, so the pair is only freed
//! once the effect is stopped.

use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use super::{PropKey, Value, MAX_INDEX, MAX_LENGTH};
use crate::diagnostics;
use crate::reactive::runtime;

/// Identity of a target or wrapper.
///
/// Ids are never reused, so a stale id left in a side table can never alias
/// a newer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Shape of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Record,
    Sequence,
    Map,
    Set,
    WeakMap,
    WeakSet,
}

impl TargetKind {
    /// Map/set-like shapes, intercepted through instrumented methods.
    pub fn is_collection(self) -> bool {
        !matches!(self, TargetKind::Record | TargetKind::Sequence)
    }

    /// Collections that can be iterated, sized and cleared.
    pub fn is_iterable_collection(self) -> bool {
        matches!(self, TargetKind::Map | TargetKind::Set)
    }

    /// Collections holding key/value pairs.
    pub fn is_map_like(self) -> bool {
        matches!(self, TargetKind::Map | TargetKind::WeakMap)
    }

    pub fn is_weak(self) -> bool {
        matches!(self, TargetKind::WeakMap | TargetKind::WeakSet)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            TargetKind::Record => "Object",
            TargetKind::Sequence => "Array",
            TargetKind::Map => "Map",
            TargetKind::Set => "Set",
            TargetKind::WeakMap => "WeakMap",
            TargetKind::WeakSet => "WeakSet",
        }
    }
}

/// Sequence storage: the present slots plus a length.
///
/// Slots below the length that hold nothing are holes. Holes read as
/// `undefined` but are not own keys, so storage stays proportional to the
/// number of present slots whatever the length.
#[derive(Debug, Clone, Default)]
pub struct Slots {
    items: BTreeMap<usize, Value>,
    len: usize,
}

impl Slots {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(&index)
    }

    /// Whether `index` holds a value (is not a hole or out of range).
    pub fn has(&self, index: usize) -> bool {
        self.items.contains_key(&index)
    }

    /// Store `value` at `index`, growing the length past it. Indices above
    /// [`MAX_INDEX`] are refused.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        if index > MAX_INDEX {
            return false;
        }
        self.items.insert(index, value);
        self.len = self.len.max(index + 1);
        true
    }

    /// Turn `index` into a hole. Returns whether it held a value.
    pub fn delete(&mut self, index: usize) -> bool {
        self.items.remove(&index).is_some()
    }

    /// Truncate or extend with holes. Lengths above [`MAX_LENGTH`] are refused.
    pub fn set_len(&mut self, len: usize) -> bool {
        if len > MAX_LENGTH {
            return false;
        }
        let _truncated = self.items.split_off(&len);
        self.len = len;
        true
    }

    /// Present slots in index order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &Value)> {
        self.items.iter().map(|(index, value)| (*index, value))
    }

    /// Lowest hole below the length, if any.
    pub fn first_hole(&self) -> Option<usize> {
        let mut expected = 0;
        for index in self.items.keys() {
            if *index != expected {
                return Some(expected);
            }
            expected = index + 1;
        }
        (expected < self.len).then_some(expected)
    }
}

impl FromIterator<Value> for Slots {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let items: BTreeMap<usize, Value> = iter.into_iter().enumerate().collect();
        let len = items.len();
        Self { items, len }
    }
}

/// Storage behind a target.
#[derive(Debug, Clone)]
pub enum TargetData {
    Record(IndexMap<PropKey, Value>),
    Sequence(Slots),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
    /// Weak collections hold their keys strongly here; only object keys are
    /// accepted, and the collection is never enumerated.
    WeakMap(IndexMap<Value, Value>),
    WeakSet(IndexSet<Value>),
}

impl TargetData {
    pub fn kind(&self) -> TargetKind {
        match self {
            TargetData::Record(_) => TargetKind::Record,
            TargetData::Sequence(_) => TargetKind::Sequence,
            TargetData::Map(_) => TargetKind::Map,
            TargetData::Set(_) => TargetKind::Set,
            TargetData::WeakMap(_) => TargetKind::WeakMap,
            TargetData::WeakSet(_) => TargetKind::WeakSet,
        }
    }

    fn empty(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Record => TargetData::Record(IndexMap::new()),
            TargetKind::Sequence => TargetData::Sequence(Slots::default()),
            TargetKind::Map => TargetData::Map(IndexMap::new()),
            TargetKind::Set => TargetData::Set(IndexSet::new()),
            TargetKind::WeakMap => TargetData::WeakMap(IndexMap::new()),
            TargetKind::WeakSet => TargetData::WeakSet(IndexSet::new()),
        }
    }
}

struct TargetInner {
    id: ObjectId,
    skip: Cell<bool>,
    data: RefCell<TargetData>,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        runtime::forget_target(self.id);
    }
}

/// A raw, shared, identity-compared container.
#[derive(Clone)]
pub struct Target(Rc<TargetInner>);

impl Target {
    pub fn new(data: TargetData) -> Self {
        Self(Rc::new(TargetInner {
            id: ObjectId::next(),
            skip: Cell::new(false),
            data: RefCell::new(data),
        }))
    }

    pub fn empty(kind: TargetKind) -> Self {
        Self::new(TargetData::empty(kind))
    }

    pub fn record<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<PropKey>,
        V: Into<Value>,
    {
        Self::new(TargetData::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn sequence<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::new(TargetData::Sequence(
            items.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::new(TargetData::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn set<V: Into<Value>>(members: impl IntoIterator<Item = V>) -> Self {
        Self::new(TargetData::Set(
            members.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn kind(&self) -> TargetKind {
        self.0.data.borrow().kind()
    }

    /// Borrow the underlying storage.
    ///
    /// The borrow must be released before any reactive operation touches
    /// this target again.
    pub fn data(&self) -> Ref<'_, TargetData> {
        self.0.data.borrow()
    }

    /// Exclude this target from wrapping: reactive factories return it as-is.
    pub fn mark_raw(&self) -> &Self {
        self.0.skip.set(true);
        self
    }

    pub fn is_marked_raw(&self) -> bool {
        self.0.skip.get()
    }

    /// Copy of the current contents under a new identity.
    pub fn snapshot(&self) -> Target {
        Target::new(self.0.data.borrow().clone())
    }

    // ------------------------------------------------------------------------
    // Record / sequence access
    // ------------------------------------------------------------------------

    pub fn raw_get(&self, key: &PropKey) -> Value {
        match &*self.0.data.borrow() {
            TargetData::Record(fields) => fields.get(key).cloned().unwrap_or_default(),
            TargetData::Sequence(slots) => match key {
                PropKey::Index(i) => slots.get(*i).cloned().unwrap_or_default(),
                k if k.is_length() => Value::from(slots.len()),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    pub fn raw_has(&self, key: &PropKey) -> bool {
        match &*self.0.data.borrow() {
            TargetData::Record(fields) => fields.contains_key(key),
            TargetData::Sequence(slots) => match key {
                PropKey::Index(i) => slots.has(*i),
                k => k.is_length(),
            },
            _ => false,
        }
    }

    /// Write a property. Returns `false` when the write is not representable
    /// (an invalid `length`, a named slot on a sequence, a collection).
    pub fn raw_set(&self, key: &PropKey, value: Value) -> bool {
        if key.is_length() && self.kind() == TargetKind::Sequence {
            return self.raw_set_len(&value);
        }
        match &mut *self.0.data.borrow_mut() {
            TargetData::Record(fields) => {
                fields.insert(key.clone(), value);
                true
            }
            TargetData::Sequence(slots) => match key {
                PropKey::Index(i) => slots.set(*i, value),
                _ => false,
            },
            _ => false,
        }
    }

    fn raw_set_len(&self, value: &Value) -> bool {
        let len = value
            .as_number()
            .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= MAX_LENGTH as f64);
        let Some(len) = len else {
            diagnostics::warn(&format!("Invalid array length: {value:?}"));
            return false;
        };
        match &mut *self.0.data.borrow_mut() {
            TargetData::Sequence(slots) => slots.set_len(len as usize),
            _ => false,
        }
    }

    /// Delete a property. Deleting a sequence slot leaves a hole.
    pub fn raw_delete(&self, key: &PropKey) -> bool {
        match &mut *self.0.data.borrow_mut() {
            TargetData::Record(fields) => {
                fields.shift_remove(key);
                true
            }
            TargetData::Sequence(slots) => match key {
                PropKey::Index(i) => {
                    slots.delete(*i);
                    true
                }
                k => !k.is_length(),
            },
            _ => false,
        }
    }

    pub fn raw_own_keys(&self) -> Vec<PropKey> {
        match &*self.0.data.borrow() {
            TargetData::Record(fields) => fields.keys().cloned().collect(),
            TargetData::Sequence(slots) => slots
                .iter()
                .map(|(index, _)| PropKey::Index(index))
                .chain(std::iter::once(PropKey::length()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Length of a sequence; zero for every other shape.
    pub fn raw_len(&self) -> usize {
        match &*self.0.data.borrow() {
            TargetData::Sequence(slots) => slots.len(),
            _ => 0,
        }
    }

    // ------------------------------------------------------------------------
    // Collection access
    // ------------------------------------------------------------------------

    pub fn raw_contains(&self, key: &Value) -> bool {
        match &*self.0.data.borrow() {
            TargetData::Map(m) | TargetData::WeakMap(m) => m.contains_key(key),
            TargetData::Set(s) | TargetData::WeakSet(s) => s.contains(key),
            _ => false,
        }
    }

    pub fn raw_lookup(&self, key: &Value) -> Value {
        match &*self.0.data.borrow() {
            TargetData::Map(m) | TargetData::WeakMap(m) => m.get(key).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// Map insert; existing keys keep their position.
    pub fn raw_insert(&self, key: Value, value: Value) {
        if let TargetData::Map(m) | TargetData::WeakMap(m) = &mut *self.0.data.borrow_mut() {
            m.insert(key, value);
        }
    }

    pub fn raw_add(&self, value: Value) {
        if let TargetData::Set(s) | TargetData::WeakSet(s) = &mut *self.0.data.borrow_mut() {
            s.insert(value);
        }
    }

    pub fn raw_remove(&self, key: &Value) -> bool {
        match &mut *self.0.data.borrow_mut() {
            TargetData::Map(m) | TargetData::WeakMap(m) => m.shift_remove(key).is_some(),
            TargetData::Set(s) | TargetData::WeakSet(s) => s.shift_remove(key),
            _ => false,
        }
    }

    pub fn raw_clear(&self) {
        match &mut *self.0.data.borrow_mut() {
            TargetData::Map(m) => m.clear(),
            TargetData::Set(s) => s.clear(),
            _ => {}
        }
    }

    pub fn raw_size(&self) -> usize {
        match &*self.0.data.borrow() {
            TargetData::Map(m) => m.len(),
            TargetData::Set(s) => s.len(),
            _ => 0,
        }
    }

    /// Entry at an iteration position. Sets yield `(member, member)`.
    pub fn raw_entry_at(&self, pos: usize) -> Option<(Value, Value)> {
        match &*self.0.data.borrow() {
            TargetData::Map(m) => m.get_index(pos).map(|(k, v)| (k.clone(), v.clone())),
            TargetData::Set(s) => s.get_index(pos).map(|v| (v.clone(), v.clone())),
            _ => None,
        }
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.data.try_borrow() {
            Ok(data) => f
                .debug_struct("Target")
                .field("id", &self.0.id.0)
                .field("kind", &data.kind())
                .finish(),
            Err(_) => f.debug_struct("Target").field("id", &self.0.id.0).finish(),
        }
    }
}
