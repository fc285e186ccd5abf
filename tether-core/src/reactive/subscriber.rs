//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: plain
//! effects and the effects backing computed values. Deps hold subscribers
//! type-erased behind the [`Subscriber`] trait, so one dep can notify
//! computations with different result types.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::effect::EffectState;

/// Unique identifier for a subscriber.
///
/// Each computation gets a unique ID when created. Deps key their subscriber
/// sets by this ID, which is what deduplicates repeated reads in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation that can be subscribed to deps and re-run by a trigger.
pub trait Subscriber {
    /// Bookkeeping shared by every computation kind.
    fn state(&self) -> &EffectState;

    /// Re-run the computation, discarding its result.
    fn run_dyn(self: Rc<Self>);
}
