//! Computed Values
//!
//! A computed value is a cached derived value that re-evaluates only when
//! read after one of its dependencies changed.
//!
//! # How Computed Values Work
//!
//! 1. The getter runs inside an effect flagged as computed. That effect has
//!    a scheduler, so a trigger never re-runs the getter directly.
//!
//! 2. The scheduler marks the value dirty and notifies the computed value's
//!    own dependents. Because computed effects are triggered before plain
//!    effects, every computed value in a trigger pass is dirty before any
//!    plain effect reads it.
//!
//! 3. The next read re-runs the getter and caches the result. Reads while
//!    clean return the cache.
//!
//! Nothing recomputes unless something reads it.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::dep::Dep;
use super::effect::ReactiveEffect;
use super::refs::{track_ref_value, trigger_ref_value, RefLike, RefValue};
use crate::diagnostics;
use crate::value::{ObjectId, Value};

struct ComputedInner<T: 'static> {
    id: ObjectId,
    dep: Dep,
    value: RefCell<T>,
    dirty: Cell<bool>,
    effect: ReactiveEffect<T>,
    setter: Option<Box<dyn Fn(T)>>,
}

impl<T: Clone + Default + 'static> ComputedInner<T> {
    fn get(&self) -> T {
        track_ref_value(&self.dep, self.id);
        if self.dirty.replace(false) {
            // A getter reading itself yields None; keep the previous value.
            if let Some(value) = self.effect.run() {
                *self.value.borrow_mut() = value;
            }
        }
        self.value.borrow().clone()
    }

    fn set(&self, value: T) {
        match &self.setter {
            Some(setter) => setter(value),
            None => diagnostics::warn("Write operation failed: computed value is readonly"),
        }
    }

    fn mark_dirty(&self) {
        if !self.dirty.replace(true) {
            trigger_ref_value(&self.dep, self.id, None);
        }
    }
}

impl<T: 'static> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

/// A lazily evaluated, cached derived value.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(1);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get().as_number().unwrap_or(0.0) * 2.0
/// });
///
/// assert_eq!(doubled.get(), 2.0);
/// count.set(5);
/// assert_eq!(doubled.get(), 10.0);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + Default + 'static> Computed<T> {
    /// Create a getter-only computed value. The getter runs on first read.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None)
    }

    /// Create a writable computed value; writes are passed to `setter`.
    pub fn with_setter<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(Box::new(getter), Some(Box::new(setter)))
    }

    fn build(getter: Box<dyn Fn() -> T>, setter: Option<Box<dyn Fn(T)>>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let effect = ReactiveEffect::with_scheduler(getter, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.mark_dirty();
                }
            });
            effect.state().set_computed(true);

            ComputedInner {
                id: ObjectId::next(),
                dep: Dep::new(),
                value: RefCell::new(T::default()),
                dirty: Cell::new(true),
                effect,
                setter,
            }
        });
        Self { inner }
    }

    /// Current value, recomputed first if a dependency changed.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Write through the setter; warns for getter-only computed values.
    pub fn set(&self, value: T) {
        self.inner.set(value);
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.setter.is_none()
    }

    /// Whether the next read recomputes.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// The effect running the getter.
    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.inner.effect
    }
}

impl Computed<Value> {
    /// This computed value as a storable [`Value::Ref`].
    pub fn to_value(&self) -> Value {
        Value::Ref(RefValue::new(self.inner.clone()))
    }
}

impl From<Computed<Value>> for Value {
    fn from(c: Computed<Value>) -> Self {
        c.to_value()
    }
}

impl RefLike for ComputedInner<Value> {
    fn get_value(&self) -> Value {
        self.get()
    }

    fn set_value(&self, value: Value) {
        self.set(value);
    }

    fn is_readonly(&self) -> bool {
        self.setter.is_none()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Computed");
        s.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(value) => s.field("value", &*value),
            Err(_) => s.field("value", &"<computing>"),
        };
        s.field("dirty", &self.inner.dirty.get()).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect, EffectOptions};
    use crate::reactive::refs::Ref;

    fn number(value: Value) -> f64 {
        value.as_number().unwrap_or(f64::NAN)
    }

    #[test]
    fn computed_is_lazy_and_cached() {
        let count = Ref::new(1);
        let evaluations = Rc::new(Cell::new(0));
        let (count_clone, evals_clone) = (count.clone(), evaluations.clone());
        let doubled = Computed::new(move || {
            evals_clone.set(evals_clone.get() + 1);
            number(count_clone.get()) * 2.0
        });

        assert_eq!(evaluations.get(), 0);
        assert_eq!(doubled.get(), 2.0);
        assert_eq!(doubled.get(), 2.0);
        assert_eq!(evaluations.get(), 1);

        count.set(5);
        assert!(doubled.is_dirty());
        assert_eq!(evaluations.get(), 1);
        assert_eq!(doubled.get(), 10.0);
        assert_eq!(evaluations.get(), 2);
    }

    #[test]
    fn effects_see_refreshed_computed_values() {
        let count = Ref::new(1);
        let count_clone = count.clone();
        let plus_one = Computed::new(move || number(count_clone.get()) + 1.0);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (seen_clone, count_reader, plus_one_reader) =
            (seen.clone(), count.clone(), plus_one.clone());
        let _runner = effect(
            move || {
                // Read the ref first so the effect subscribes before the computed.
                let base = number(count_reader.get());
                seen_clone.borrow_mut().push((base, plus_one_reader.get()));
            },
            EffectOptions::default(),
        );

        count.set(2);
        let seen = seen.borrow();
        assert!(seen.iter().all(|(base, derived)| *derived == base + 1.0));
        assert_eq!(seen.last(), Some(&(2.0, 3.0)));
    }

    #[test]
    fn getter_only_computed_rejects_writes() {
        let fixed = Computed::new(|| 7.0);
        fixed.set(1.0);
        assert_eq!(fixed.get(), 7.0);
        assert!(fixed.is_readonly());
    }

    #[test]
    fn setter_receives_writes() {
        let source = Ref::new(1);
        let (getter_source, setter_source) = (source.clone(), source.clone());
        let mirrored = Computed::with_setter(
            move || number(getter_source.get()),
            move |value: f64| setter_source.set(value),
        );

        mirrored.set(4.0);
        assert_eq!(mirrored.get(), 4.0);
        assert_eq!(number(source.get()), 4.0);
    }

    #[test]
    fn dropping_computed_stops_its_effect() {
        let count = Ref::new(1);
        let count_clone = count.clone();
        let c = Computed::new(move || number(count_clone.get()));
        c.get();
        let effect = c.effect().clone();
        assert!(effect.is_active());

        drop(c);
        assert!(!effect.is_active());
    }
}
