//! Dependency Sets
//!
//! A [`Dep`] is the set of computations subscribed to one `(target, key)`
//! pair, plus two generation bitfields used to reconcile subscriptions after
//! a run without wiping and rebuilding them.
//!
//! # How Marking Works
//!
//! Each level of computation nesting owns one bit, `1 << depth`.
//!
//! 1. Before a run, every dep the computation already subscribes to gets the
//!    bit set in `w` ("was tracked").
//!
//! 2. During the run, each dep that is read gets the bit set in `n` ("newly
//!    tracked"). A dep already marked `w` needs no re-subscription.
//!
//! 3. After the run, deps with `w` but not `n` were not read this time and
//!    drop the computation. Both bits are then cleared.
//!
//! Deps hold their subscribers strongly. Computations hold their deps weakly,
//! so a dep whose target is gone simply disappears from the computation's
//! list on the next reconciliation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::context;
use super::effect::EffectState;
use super::subscriber::{Subscriber, SubscriberId};

struct DepInner {
    subscribers: RefCell<IndexMap<SubscriberId, Rc<dyn Subscriber>>>,
    w: Cell<u32>,
    n: Cell<u32>,
}

/// A set of subscribed computations with generation markers.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

/// Non-owning handle held by a computation.
#[derive(Clone)]
pub(crate) struct WeakDep(Weak<DepInner>);

impl WeakDep {
    pub(crate) fn upgrade(&self) -> Option<Dep> {
        self.0.upgrade().map(Dep)
    }
}

impl Dep {
    /// Create an empty dep with both markers cleared.
    pub fn new() -> Self {
        Self(Rc::new(DepInner {
            subscribers: RefCell::new(IndexMap::new()),
            w: Cell::new(0),
            n: Cell::new(0),
        }))
    }

    /// A dep pre-filled with `subscribers`, deduplicated by id.
    pub fn with_subscribers(subscribers: impl IntoIterator<Item = Rc<dyn Subscriber>>) -> Self {
        let dep = Self::new();
        for subscriber in subscribers {
            dep.add(subscriber);
        }
        dep
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.0.subscribers.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.0.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn add(&self, subscriber: Rc<dyn Subscriber>) {
        let id = subscriber.state().id();
        self.0.subscribers.borrow_mut().insert(id, subscriber);
    }

    pub(crate) fn remove(&self, id: SubscriberId) {
        // Drop the handle outside the borrow; it may be the last one.
        let removed = self.0.subscribers.borrow_mut().shift_remove(&id);
        drop(removed);
    }

    /// Snapshot of the subscribers in subscription order.
    pub(crate) fn subscribers(&self) -> Vec<Rc<dyn Subscriber>> {
        self.0.subscribers.borrow().values().cloned().collect()
    }

    pub(crate) fn downgrade(&self) -> WeakDep {
        WeakDep(Rc::downgrade(&self.0))
    }

    /// Whether both handles refer to the same dep.
    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn was_tracked(&self) -> bool {
        self.0.w.get() & context::track_op_bit() > 0
    }

    pub(crate) fn new_tracked(&self) -> bool {
        self.0.n.get() & context::track_op_bit() > 0
    }

    pub(crate) fn mark_was(&self) {
        self.0.w.set(self.0.w.get() | context::track_op_bit());
    }

    pub(crate) fn mark_new(&self) {
        self.0.n.set(self.0.n.get() | context::track_op_bit());
    }

    fn clear_marks(&self) {
        let bit = context::track_op_bit();
        self.0.w.set(self.0.w.get() & !bit);
        self.0.n.set(self.0.n.get() & !bit);
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("subscribers", &self.len())
            .field("w", &self.0.w.get())
            .field("n", &self.0.n.get())
            .finish()
    }
}

/// Mark every dep the computation currently holds as "was tracked".
pub(crate) fn init_dep_markers(state: &EffectState) {
    for dep in state.deps().iter().filter_map(WeakDep::upgrade) {
        dep.mark_was();
    }
}

/// Drop subscriptions that were not renewed during the run and clear the
/// current depth's bits.
pub(crate) fn finalize_dep_markers(state: &EffectState) {
    let id = state.id();
    let mut stale = Vec::new();

    state.retain_deps(|weak| match weak.upgrade() {
        Some(dep) => {
            let keep = !(dep.was_tracked() && !dep.new_tracked());
            if !keep {
                stale.push(dep.clone());
            }
            dep.clear_marks();
            keep
        }
        None => false,
    });

    for dep in stale {
        dep.remove(id);
    }
}
