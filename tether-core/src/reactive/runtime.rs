//! Reactive Runtime
//!
//! The runtime connects reads to writes. It owns the registry mapping each
//! target to its per-key deps and implements the two halves of the protocol.
//!
//! # How It Works
//!
//! 1. A read through a proxy calls [`track`]. If a computation is active and
//!    tracking is enabled, the dep for `(target, key)` is looked up (created
//!    on demand) and the computation subscribes to it.
//!
//! 2. A write through a proxy calls [`trigger`]. The runtime works out which
//!    deps of the target are affected by this kind of mutation, flattens
//!    their subscribers into one deduplicated list, and re-runs them:
//!    computed values first, then plain effects.
//!
//! # Registry Lifetime
//!
//! The registry is keyed by [`ObjectId`], never by the target itself, so
//! registering a target does not keep it alive. When a target is dropped its
//! entry is removed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context;
use super::dep::Dep;
use super::effect::{DebuggerEvent, DebuggerEventKind};
use super::operations::{TrackKey, TrackOpType, TriggerOpType};
use super::subscriber::{Subscriber, SubscriberId};
use crate::value::{ObjectId, Target, TargetKind, Value};

type KeyToDepMap = IndexMap<TrackKey, Dep>;

thread_local! {
    static TARGET_MAP: RefCell<HashMap<ObjectId, KeyToDepMap>> = RefCell::new(HashMap::new());
}

/// Values describing a mutation, forwarded to `on_trigger` hooks.
#[derive(Debug, Clone, Default)]
pub struct TriggerExtra {
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
    /// Contents of a collection before it was cleared.
    pub old_target: Option<Target>,
}

impl TriggerExtra {
    pub fn new_value(value: Value) -> Self {
        Self {
            new_value: Some(value),
            ..Self::default()
        }
    }

    pub fn values(new_value: Value, old_value: Value) -> Self {
        Self {
            new_value: Some(new_value),
            old_value: Some(old_value),
            old_target: None,
        }
    }

    pub fn old_value(value: Value) -> Self {
        Self {
            old_value: Some(value),
            ..Self::default()
        }
    }
}

/// What a dep notification is about, for debug hooks.
pub(crate) struct EventInfo<'a> {
    pub(crate) target: ObjectId,
    pub(crate) kind: DebuggerEventKind,
    pub(crate) key: Option<&'a TrackKey>,
    pub(crate) extra: Option<&'a TriggerExtra>,
}

impl EventInfo<'_> {
    fn for_effect(&self, effect: SubscriberId) -> DebuggerEvent {
        DebuggerEvent {
            effect,
            target: self.target,
            kind: self.kind,
            key: self.key.cloned(),
            new_value: self.extra.and_then(|e| e.new_value.clone()),
            old_value: self.extra.and_then(|e| e.old_value.clone()),
            old_target: self.extra.and_then(|e| e.old_target.clone()),
        }
    }
}

/// Drop the registry entry of a target that no longer exists.
pub(crate) fn forget_target(id: ObjectId) {
    let _ = TARGET_MAP.try_with(|map| {
        let removed = match map.try_borrow_mut() {
            Ok(mut map) => map.remove(&id),
            Err(_) => None,
        };
        // Deps may own the last handle to effects; release them unborrowed.
        drop(removed);
    });
}

/// Record that the active computation read `key` of `target`.
///
/// No-op when nothing is running or tracking is paused.
pub fn track(target: &Target, op: TrackOpType, key: impl Into<TrackKey>) {
    if !context::is_tracking() {
        return;
    }
    let key = key.into();
    tracing::trace!(target_id = target.id().raw(), %op, ?key, "track");

    let dep = TARGET_MAP.with(|map| {
        map.borrow_mut()
            .entry(target.id())
            .or_default()
            .entry(key.clone())
            .or_default()
            .clone()
    });

    track_effects(
        &dep,
        EventInfo {
            target: target.id(),
            kind: DebuggerEventKind::Track(op),
            key: Some(&key),
            extra: None,
        },
    );
}

/// Subscribe the active computation to `dep`.
pub(crate) fn track_effects(dep: &Dep, info: EventInfo<'_>) {
    let Some(active) = context::active_subscriber() else {
        return;
    };
    let state = active.state();

    let should_track = if context::uses_markers() {
        if dep.new_tracked() {
            false
        } else {
            dep.mark_new();
            !dep.was_tracked()
        }
    } else {
        !dep.contains(state.id())
    };

    if should_track {
        dep.add(active.clone());
        state.push_dep(dep.downgrade());
        if let Some(on_track) = state.on_track() {
            on_track(&info.for_effect(state.id()));
        }
    }
}

/// Re-run every computation affected by a mutation of `target`.
pub fn trigger(target: &Target, op: TriggerOpType, key: Option<TrackKey>, extra: TriggerExtra) {
    let kind = target.kind();
    let deps: SmallVec<[Dep; 4]> = TARGET_MAP.with(|map| {
        let map = map.borrow();
        let Some(dep_map) = map.get(&target.id()) else {
            return SmallVec::new();
        };
        collect_deps(dep_map, kind, op, key.as_ref(), &extra)
    });

    if deps.is_empty() {
        return;
    }
    tracing::trace!(target_id = target.id().raw(), %op, ?key, deps = deps.len(), "trigger");

    let info = EventInfo {
        target: target.id(),
        kind: DebuggerEventKind::Trigger(op),
        key: key.as_ref(),
        extra: Some(&extra),
    };

    if let [dep] = deps.as_slice() {
        trigger_effects(dep.subscribers(), &info);
    } else {
        let merged = Dep::with_subscribers(deps.iter().flat_map(Dep::subscribers));
        trigger_effects(merged.subscribers(), &info);
    }
}

fn collect_deps(
    dep_map: &KeyToDepMap,
    kind: TargetKind,
    op: TriggerOpType,
    key: Option<&TrackKey>,
    extra: &TriggerExtra,
) -> SmallVec<[Dep; 4]> {
    let mut deps = SmallVec::new();
    let is_sequence = kind == TargetKind::Sequence;

    if op == TriggerOpType::Clear {
        deps.extend(dep_map.values().cloned());
        return deps;
    }

    if is_sequence && key.is_some_and(|k| *k == TrackKey::length()) {
        let new_length = extra
            .new_value
            .as_ref()
            .and_then(Value::as_number)
            .filter(|n| *n >= 0.0)
            .map_or(0, |n| n as usize);
        for (k, dep) in dep_map {
            if *k == TrackKey::length() || k.as_index().is_some_and(|i| i >= new_length) {
                deps.push(dep.clone());
            }
        }
        return deps;
    }

    let mut push = |k: &TrackKey| {
        if let Some(dep) = dep_map.get(k) {
            deps.push(dep.clone());
        }
    };

    if let Some(key) = key {
        push(key);
    }

    match op {
        TriggerOpType::Add => {
            if !is_sequence {
                push(&TrackKey::Iterate);
                if kind == TargetKind::Map {
                    push(&TrackKey::MapKeyIterate);
                }
            } else if key.and_then(TrackKey::as_index).is_some() {
                push(&TrackKey::length());
            }
        }
        TriggerOpType::Delete => {
            if !is_sequence {
                push(&TrackKey::Iterate);
                if kind == TargetKind::Map {
                    push(&TrackKey::MapKeyIterate);
                }
            }
        }
        TriggerOpType::Set => {
            if kind == TargetKind::Map {
                push(&TrackKey::Iterate);
            }
        }
        TriggerOpType::Clear => {}
    }

    deps
}

/// Re-run `effects`: computed values first, then everything else.
pub(crate) fn trigger_effects(effects: Vec<Rc<dyn Subscriber>>, info: &EventInfo<'_>) {
    let (computed, plain): (Vec<_>, Vec<_>) =
        effects.into_iter().partition(|e| e.state().is_computed());

    for effect in computed.into_iter().chain(plain) {
        trigger_effect(effect, info);
    }
}

fn trigger_effect(effect: Rc<dyn Subscriber>, info: &EventInfo<'_>) {
    let state = effect.state();
    if !state.is_active() {
        return;
    }
    if context::is_active_subscriber(state.id()) && !state.allow_recurse() {
        return;
    }

    if let Some(on_trigger) = state.on_trigger() {
        on_trigger(&info.for_effect(state.id()));
    }

    match state.scheduler() {
        Some(scheduler) => scheduler(),
        None => effect.run_dyn(),
    }
}

/// The dep registered for `key` on `target`, if any computation ever read it.
pub fn get_dep(target: &Target, key: impl Into<TrackKey>) -> Option<Dep> {
    let key = key.into();
    TARGET_MAP.with(|map| {
        map.borrow()
            .get(&target.id())
            .and_then(|deps| deps.get(&key))
            .cloned()
    })
}
