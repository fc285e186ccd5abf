//! Refs
//!
//! A ref is a reactive single-value box. Unlike proxies, which keep their
//! deps in the registry, a ref owns its dep directly.
//!
//! Any type implementing [`RefLike`] can be stored in a reactive container as
//! a [`Value::Ref`]; containers unwrap it on read and write through it on
//! assignment.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::context;
use super::dep::Dep;
use super::effect::DebuggerEventKind;
use super::operations::{TrackKey, TrackOpType, TriggerOpType};
use super::proxy::{is_readonly, is_shallow, to_raw, to_reactive};
use super::runtime::{self, EventInfo, TriggerExtra};
use crate::value::{has_changed, ObjectId, Value};

/// The ref capability: a gettable, settable `.value` slot.
pub trait RefLike {
    /// Read the value, tracking it.
    fn get_value(&self) -> Value;

    /// Write the value, triggering dependents on change.
    fn set_value(&self, value: Value);

    /// Readonly refs reject overwrite through containers.
    fn is_readonly(&self) -> bool {
        false
    }

    fn is_shallow(&self) -> bool {
        false
    }
}

/// Type-erased, identity-compared handle to a ref.
#[derive(Clone)]
pub struct RefValue(Rc<dyn RefLike>);

impl RefValue {
    pub fn new(inner: Rc<dyn RefLike>) -> Self {
        Self(inner)
    }

    fn addr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl std::ops::Deref for RefValue {
    type Target = dyn RefLike;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for RefValue {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for RefValue {}

impl Hash for RefValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for RefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({:p})", self.addr())
    }
}

pub(crate) fn value_key() -> TrackKey {
    TrackKey::from("value")
}

/// Subscribe the active computation to a ref's dep.
pub(crate) fn track_ref_value(dep: &Dep, id: ObjectId) {
    if !context::is_tracking() {
        return;
    }
    let key = value_key();
    runtime::track_effects(
        dep,
        EventInfo {
            target: id,
            kind: DebuggerEventKind::Track(TrackOpType::Get),
            key: Some(&key),
            extra: None,
        },
    );
}

/// Notify everything subscribed to a ref's dep.
pub(crate) fn trigger_ref_value(dep: &Dep, id: ObjectId, new_value: Option<Value>) {
    let key = value_key();
    let extra = TriggerExtra {
        new_value,
        ..TriggerExtra::default()
    };
    runtime::trigger_effects(
        dep.subscribers(),
        &EventInfo {
            target: id,
            kind: DebuggerEventKind::Trigger(TriggerOpType::Set),
            key: Some(&key),
            extra: Some(&extra),
        },
    );
}

struct RefInner {
    id: ObjectId,
    dep: Dep,
    raw: RefCell<Value>,
    value: RefCell<Value>,
    shallow: bool,
}

impl RefInner {
    fn get(&self) -> Value {
        track_ref_value(&self.dep, self.id);
        self.value.borrow().clone()
    }

    fn set(&self, new_value: Value) {
        let direct = self.shallow || is_shallow(&new_value) || is_readonly(&new_value);
        let new_raw = if direct { new_value.clone() } else { to_raw(&new_value) };

        if !has_changed(&new_raw, &self.raw.borrow()) {
            return;
        }
        let stored = if direct { new_value } else { to_reactive(new_value) };
        *self.raw.borrow_mut() = new_raw;
        *self.value.borrow_mut() = stored.clone();
        trigger_ref_value(&self.dep, self.id, Some(stored));
    }
}

impl RefLike for RefInner {
    fn get_value(&self) -> Value {
        self.get()
    }

    fn set_value(&self, value: Value) {
        self.set(value);
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }
}

/// A reactive single-value box.
///
/// Deep refs store objects as reactive proxies; [`Ref::shallow`] stores
/// values as given.
#[derive(Clone)]
pub struct Ref(Rc<RefInner>);

impl Ref {
    pub fn new(value: impl Into<Value>) -> Self {
        Self::create(value.into(), false)
    }

    pub fn shallow(value: impl Into<Value>) -> Self {
        Self::create(value.into(), true)
    }

    fn create(value: Value, shallow: bool) -> Self {
        let (raw, value) = if shallow {
            (value.clone(), value)
        } else {
            (to_raw(&value), to_reactive(value))
        };
        Self(Rc::new(RefInner {
            id: ObjectId::next(),
            dep: Dep::new(),
            raw: RefCell::new(raw),
            value: RefCell::new(value),
            shallow,
        }))
    }

    pub fn get(&self) -> Value {
        self.0.get()
    }

    pub fn set(&self, value: impl Into<Value>) {
        self.0.set(value.into());
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn is_shallow(&self) -> bool {
        self.0.shallow
    }

    /// This ref as a storable [`Value::Ref`]. Repeated calls compare equal.
    pub fn to_value(&self) -> Value {
        Value::Ref(RefValue::new(self.0.clone()))
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        r.to_value()
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.0.id)
            .field("value", &*self.0.value.borrow())
            .field("shallow", &self.0.shallow)
            .finish()
    }
}

/// Force-notify a ref's dependents, e.g. after mutating a shallow ref's
/// contents in place.
pub fn trigger_ref(r: &Ref) {
    let value = r.0.value.borrow().clone();
    trigger_ref_value(&r.0.dep, r.0.id, Some(value));
}

pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// The ref's value for refs, the value itself otherwise.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get_value(),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::ReactiveEffect;
    use crate::value::{Target, TargetKind};
    use std::cell::Cell;

    #[test]
    fn ref_triggers_only_on_change() {
        let count = Ref::new(0);
        let runs = Rc::new(Cell::new(0));
        let (count_clone, runs_clone) = (count.clone(), runs.clone());
        let effect = ReactiveEffect::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            count_clone.get()
        });
        effect.run();

        count.set(1);
        assert_eq!(runs.get(), 2);
        count.set(1);
        assert_eq!(runs.get(), 2);
        count.set(f64::NAN);
        count.set(f64::NAN);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn deep_ref_wraps_objects() {
        let target = Target::empty(TargetKind::Record);
        let deep = Ref::new(target.clone());
        assert!(deep.get().as_proxy().is_some());

        let shallow = Ref::shallow(target.clone());
        assert_eq!(shallow.get(), Value::Object(target));
    }

    #[test]
    fn trigger_ref_forces_notification() {
        let r = Ref::shallow(1);
        let runs = Rc::new(Cell::new(0));
        let (r_clone, runs_clone) = (r.clone(), runs.clone());
        let effect = ReactiveEffect::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            r_clone.get();
        });
        effect.run();

        trigger_ref(&r);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn unref_and_identity() {
        let r = Ref::new("x");
        assert!(is_ref(&r.to_value()));
        assert_eq!(r.to_value(), r.to_value());
        assert_eq!(unref(&r.to_value()), Value::from("x"));
        assert_eq!(unref(&Value::from(3)), Value::from(3));
    }
}
