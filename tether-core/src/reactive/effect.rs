//! Effect Implementation
//!
//! A [`ReactiveEffect`] wraps a zero-argument function and re-runs it
//! whenever reactive state it read changes.
//!
//! # How Effects Work
//!
//! 1. `run()` enters a [`ReactiveContext`], making the effect the active
//!    computation. Every reactive read during the body subscribes the effect
//!    to the dep of what was read.
//!
//! 2. When the context is dropped, subscriptions that were not renewed in
//!    this run are removed (see [`dep`](super::dep) for the marking scheme).
//!
//! 3. A trigger re-runs the effect, or calls its scheduler if it has one.
//!    The scheduler decides when, and whether, `run()` actually happens.
//!
//! # Stopping
//!
//! `stop()` unsubscribes the effect from every dep and marks it inactive. An
//! inactive effect still runs its body when called directly, but tracks
//! nothing. Stopping an effect from inside its own body is deferred until
//! the body returns.
//!
//! # Nesting
//!
//! Effects may run other effects. Each run remembers the previously active
//! computation as its parent; an effect that finds itself on its own parent
//! chain does not run again.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::context::{self, ReactiveContext};
use super::dep::WeakDep;
use super::operations::{TrackKey, TrackOpType, TriggerOpType};
use super::subscriber::{Subscriber, SubscriberId};
use crate::value::{ObjectId, Target, Value};

/// Callback deciding when a triggered effect actually runs.
pub type Scheduler = Rc<dyn Fn()>;

/// Debug hook receiving track/trigger events.
pub type DebuggerHook = Rc<dyn Fn(&DebuggerEvent)>;

/// What happened in a [`DebuggerEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerEventKind {
    Track(TrackOpType),
    Trigger(TriggerOpType),
}

/// Payload passed to `on_track` and `on_trigger` hooks.
#[derive(Debug, Clone)]
pub struct DebuggerEvent {
    /// The effect being subscribed or triggered.
    pub effect: SubscriberId,
    /// The target, ref or computed whose dep is involved.
    pub target: ObjectId,
    pub kind: DebuggerEventKind,
    pub key: Option<TrackKey>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
    /// Contents of a collection before it was cleared.
    pub old_target: Option<Target>,
}

/// Bookkeeping shared by every kind of computation.
pub struct EffectState {
    id: SubscriberId,
    active: Cell<bool>,
    deps: RefCell<SmallVec<[WeakDep; 8]>>,
    parent: RefCell<Option<Rc<dyn Subscriber>>>,
    allow_recurse: Cell<bool>,
    defer_stop: Cell<bool>,
    computed: Cell<bool>,
    scheduler: RefCell<Option<Scheduler>>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
    on_track: RefCell<Option<DebuggerHook>>,
    on_trigger: RefCell<Option<DebuggerHook>>,
}

impl EffectState {
    fn new(scheduler: Option<Scheduler>) -> Self {
        Self {
            id: SubscriberId::new(),
            active: Cell::new(true),
            deps: RefCell::new(SmallVec::new()),
            parent: RefCell::new(None),
            allow_recurse: Cell::new(false),
            defer_stop: Cell::new(false),
            computed: Cell::new(false),
            scheduler: RefCell::new(scheduler),
            on_stop: RefCell::new(None),
            on_track: RefCell::new(None),
            on_trigger: RefCell::new(None),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn allow_recurse(&self) -> bool {
        self.allow_recurse.get()
    }

    /// Whether this computation backs a computed value.
    pub fn is_computed(&self) -> bool {
        self.computed.get()
    }

    pub(crate) fn set_computed(&self, computed: bool) {
        self.computed.set(computed);
    }

    pub(crate) fn scheduler(&self) -> Option<Scheduler> {
        self.scheduler.borrow().clone()
    }

    pub(crate) fn on_track(&self) -> Option<DebuggerHook> {
        self.on_track.borrow().clone()
    }

    pub(crate) fn on_trigger(&self) -> Option<DebuggerHook> {
        self.on_trigger.borrow().clone()
    }

    pub(crate) fn deps(&self) -> Ref<'_, SmallVec<[WeakDep; 8]>> {
        self.deps.borrow()
    }

    pub(crate) fn push_dep(&self, dep: WeakDep) {
        self.deps.borrow_mut().push(dep);
    }

    pub(crate) fn retain_deps(&self, f: impl FnMut(&mut WeakDep) -> bool) {
        self.deps.borrow_mut().retain(f);
    }

    pub(crate) fn dep_count(&self) -> usize {
        self.deps
            .borrow()
            .iter()
            .filter(|dep| dep.upgrade().is_some())
            .count()
    }

    pub(crate) fn set_parent(&self, parent: Option<Rc<dyn Subscriber>>) {
        *self.parent.borrow_mut() = parent;
    }

    pub(crate) fn take_parent(&self) -> Option<Rc<dyn Subscriber>> {
        self.parent.borrow_mut().take()
    }

    fn parent(&self) -> Option<Rc<dyn Subscriber>> {
        self.parent.borrow().clone()
    }

    pub(crate) fn take_defer_stop(&self) -> bool {
        self.defer_stop.replace(false)
    }

    /// Unsubscribe from every dep and forget them.
    pub(crate) fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in deps.iter().filter_map(WeakDep::upgrade) {
            dep.remove(self.id);
        }
    }

    /// Deactivate. Deferred when called from inside the computation's own run.
    pub(crate) fn stop(&self) {
        if context::is_active_subscriber(self.id) {
            self.defer_stop.set(true);
        } else if self.active.get() {
            self.cleanup();
            let on_stop = self.on_stop.borrow_mut().take();
            if let Some(on_stop) = on_stop {
                on_stop();
            }
            self.active.set(false);
            tracing::debug!(effect = ?self.id, "effect stopped");
        }
    }
}

struct EffectInner<T> {
    state: EffectState,
    func: Box<dyn Fn() -> T>,
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn state(&self) -> &EffectState {
        &self.state
    }

    fn run_dyn(self: Rc<Self>) {
        let _ = run_effect(&self);
    }
}

fn run_effect<T: 'static>(inner: &Rc<EffectInner<T>>) -> Option<T> {
    if !inner.state.is_active() {
        return Some((inner.func)());
    }

    let mut ancestor = context::active_subscriber();
    while let Some(current) = ancestor {
        if current.state().id() == inner.state.id() {
            return None;
        }
        ancestor = current.state().parent();
    }

    let _ctx = ReactiveContext::enter(inner.clone());
    Some((inner.func)())
}

/// A re-runnable computation with tracked dependencies.
///
/// Cloning shares the same underlying effect. Every dep the effect reads
/// holds it strongly, so dropping the handles does not free it. Call
/// [`stop`](Self::stop) to release an effect that is no longer needed.
///
/// # Example
///
/// ```rust,ignore
/// let state = reactive(Target::record([("count", 0)])).into_proxy().unwrap();
///
/// let effect = ReactiveEffect::new({
///     let state = state.clone();
///     move || println!("count is {:?}", state.get("count"))
/// });
/// effect.run();
///
/// state.set("count", 5); // prints "count is 5"
/// ```
pub struct ReactiveEffect<T> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> ReactiveEffect<T> {
    /// Create an effect. It does not run until [`run`](Self::run) is called.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(func), None)
    }

    /// Create an effect whose triggers call `scheduler` instead of running.
    pub fn with_scheduler<F, S>(func: F, scheduler: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn() + 'static,
    {
        Self::build(Box::new(func), Some(Rc::new(scheduler)))
    }

    fn build(func: Box<dyn Fn() -> T>, scheduler: Option<Scheduler>) -> Self {
        Self {
            inner: Rc::new(EffectInner {
                state: EffectState::new(scheduler),
                func,
            }),
        }
    }

    /// Run the body, refreshing dependencies.
    ///
    /// Returns `None` when the effect is already running further up the
    /// stack; the body is not executed in that case.
    pub fn run(&self) -> Option<T> {
        run_effect(&self.inner)
    }

    /// Unsubscribe from everything and stop reacting. Idempotent.
    pub fn stop(&self) {
        self.inner.state.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.is_active()
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.state.id()
    }

    /// Get the number of deps the effect currently subscribes to.
    pub fn dependency_count(&self) -> usize {
        self.inner.state.dep_count()
    }

    pub fn set_scheduler(&self, scheduler: Option<Scheduler>) {
        *self.inner.state.scheduler.borrow_mut() = scheduler;
    }

    pub fn set_allow_recurse(&self, allow: bool) {
        self.inner.state.allow_recurse.set(allow);
    }

    /// Callback invoked once, when the effect is stopped.
    pub fn set_on_stop(&self, on_stop: Option<Box<dyn FnOnce()>>) {
        *self.inner.state.on_stop.borrow_mut() = on_stop;
    }

    pub fn set_on_track(&self, hook: Option<DebuggerHook>) {
        *self.inner.state.on_track.borrow_mut() = hook;
    }

    pub fn set_on_trigger(&self, hook: Option<DebuggerHook>) {
        *self.inner.state.on_trigger.borrow_mut() = hook;
    }

    pub(crate) fn state(&self) -> &EffectState {
        &self.inner.state
    }
}

impl<T> Clone for ReactiveEffect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ReactiveEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = &self.inner.state;
        f.debug_struct("ReactiveEffect")
            .field("id", &state.id)
            .field("active", &state.active.get())
            .field("dependency_count", &state.dep_count())
            .field("computed", &state.computed.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// effect() / stop()
// ----------------------------------------------------------------------------

/// Options for [`effect`].
#[derive(Default)]
pub struct EffectOptions {
    /// Do not run immediately.
    pub lazy: bool,
    pub scheduler: Option<Scheduler>,
    /// Let the effect re-trigger itself while running.
    pub allow_recurse: bool,
    pub on_stop: Option<Box<dyn FnOnce()>>,
    pub on_track: Option<DebuggerHook>,
    pub on_trigger: Option<DebuggerHook>,
}

/// Handle returned by [`effect`].
pub struct EffectRunner<T> {
    effect: ReactiveEffect<T>,
}

impl<T: 'static> EffectRunner<T> {
    /// Run the effect manually.
    pub fn run(&self) -> Option<T> {
        self.effect.run()
    }

    pub fn effect(&self) -> &ReactiveEffect<T> {
        &self.effect
    }
}

impl<T> Clone for EffectRunner<T> {
    fn clone(&self) -> Self {
        Self {
            effect: self.effect.clone(),
        }
    }
}

impl<T> fmt::Debug for EffectRunner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRunner")
            .field("effect", &self.effect)
            .finish()
    }
}

/// Create an effect, run it immediately unless `lazy`, and return a runner.
///
/// The effect stays subscribed until [`stop`] is called on the runner.
/// Dropping the runner is not enough: the deps it read keep the effect, and
/// with it the closure's captured proxies, alive for as long as the targets
/// they track. Hosts that create effects per view must stop them on teardown.
pub fn effect<T, F>(func: F, options: EffectOptions) -> EffectRunner<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    let effect = ReactiveEffect::new(func);
    effect.set_scheduler(options.scheduler);
    effect.set_allow_recurse(options.allow_recurse);
    effect.set_on_stop(options.on_stop);
    effect.set_on_track(options.on_track);
    effect.set_on_trigger(options.on_trigger);

    if !options.lazy {
        effect.run();
    }
    EffectRunner { effect }
}

/// Stop the effect behind a runner.
pub fn stop<T: 'static>(runner: &EffectRunner<T>) {
    runner.effect.stop();
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
