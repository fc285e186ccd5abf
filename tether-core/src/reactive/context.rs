//! Tracking Context
//!
//! The tracking context records which computation is currently running and
//! whether reads should be recorded at all. `track` consults it on every
//! reactive read.
//!
//! # Implementation
//!
//! The state lives in a thread-local slot. The kernel is single-threaded and
//! cooperative, so there is no lock, only a save/restore discipline:
//!
//! - Running a computation enters a [`ReactiveContext`], which installs the
//!   computation as active (remembering the previous one as its parent),
//!   force-enables tracking and bumps the nesting depth. Dropping the guard
//!   restores all of it, including when the computation body panics.
//!
//! - [`pause_tracking`] and [`enable_tracking`] push the current enabled
//!   flag onto a stack; [`reset_tracking`] pops it. An unmatched reset falls
//!   back to "enabled".
//!
//! The nesting depth selects the generation bit used by dep reconciliation.
//! Past the configured ceiling, runs fall back to a full unsubscribe instead.

use std::cell::RefCell;
use std::mem::replace;
use std::rc::Rc;

use super::dep;
use super::subscriber::{Subscriber, SubscriberId};
use crate::config;

struct TrackingState {
    active: Option<Rc<dyn Subscriber>>,
    should_track: bool,
    track_stack: Vec<bool>,
    depth: u32,
}

thread_local! {
    static CONTEXT: RefCell<TrackingState> = const {
        RefCell::new(TrackingState {
            active: None,
            should_track: true,
            track_stack: Vec::new(),
            depth: 0,
        })
    };
}

/// Temporarily disable tracking. Pair with [`reset_tracking`].
pub fn pause_tracking() {
    CONTEXT.with(|c| {
        let mut c = c.borrow_mut();
        let last = replace(&mut c.should_track, false);
        c.track_stack.push(last);
    });
}

/// Force tracking on, even inside a paused region. Pair with [`reset_tracking`].
pub fn enable_tracking() {
    CONTEXT.with(|c| {
        let mut c = c.borrow_mut();
        let last = replace(&mut c.should_track, true);
        c.track_stack.push(last);
    });
}

/// Restore the tracking flag saved by the matching pause/enable call.
pub fn reset_tracking() {
    CONTEXT.with(|c| {
        let mut c = c.borrow_mut();
        c.should_track = c.track_stack.pop().unwrap_or(true);
    });
}

/// Run `f` with tracking paused.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    pause_tracking();
    let _reset = ResetOnDrop;
    f()
}

struct ResetOnDrop;

impl Drop for ResetOnDrop {
    fn drop(&mut self) {
        reset_tracking();
    }
}

/// Whether the tracking flag is currently on.
pub fn should_track() -> bool {
    CONTEXT.with(|c| c.borrow().should_track)
}

/// Whether a read right now would be recorded.
pub fn is_tracking() -> bool {
    CONTEXT.with(|c| {
        let c = c.borrow();
        c.should_track && c.active.is_some()
    })
}

pub(crate) fn active_subscriber() -> Option<Rc<dyn Subscriber>> {
    CONTEXT.with(|c| c.borrow().active.clone())
}

pub(crate) fn is_active_subscriber(id: SubscriberId) -> bool {
    CONTEXT.with(|c| {
        c.borrow()
            .active
            .as_ref()
            .is_some_and(|active| active.state().id() == id)
    })
}

/// Current computation nesting depth.
pub(crate) fn depth() -> u32 {
    CONTEXT.with(|c| c.borrow().depth)
}

/// Generation bit for the current depth.
pub(crate) fn track_op_bit() -> u32 {
    1u32.checked_shl(depth()).unwrap_or(0)
}

/// Whether the current depth reconciles deps with generation bits.
pub(crate) fn uses_markers() -> bool {
    depth() <= config::current().max_marker_bits
}

/// Guard for one computation run.
///
/// Entering installs the computation as active; dropping restores the
/// previous computation, tracking flag and depth, then performs a deferred
/// stop if one was requested during the run.
pub struct ReactiveContext {
    subscriber: Rc<dyn Subscriber>,
    last_should_track: bool,
}

impl ReactiveContext {
    pub(crate) fn enter(subscriber: Rc<dyn Subscriber>) -> Self {
        let last_should_track = CONTEXT.with(|c| {
            let mut c = c.borrow_mut();
            let parent = c.active.replace(subscriber.clone());
            subscriber.state().set_parent(parent);
            c.depth += 1;
            replace(&mut c.should_track, true)
        });

        let state = subscriber.state();
        if uses_markers() {
            dep::init_dep_markers(state);
        } else {
            state.cleanup();
        }

        Self {
            subscriber,
            last_should_track,
        }
    }

    /// Check if there is an active computation.
    pub fn is_active() -> bool {
        CONTEXT.with(|c| c.borrow().active.is_some())
    }

    /// Get the current computation's ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT.with(|c| c.borrow().active.as_ref().map(|s| s.state().id()))
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let state = self.subscriber.state();
        if uses_markers() {
            dep::finalize_dep_markers(state);
        }

        let parent = state.take_parent();
        CONTEXT.with(|c| {
            let mut c = c.borrow_mut();
            c.depth -= 1;
            c.active = parent;
            c.should_track = self.last_should_track;
        });

        if state.take_defer_stop() {
            state.stop();
        }
    }
}
