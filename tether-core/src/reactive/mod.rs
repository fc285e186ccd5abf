//! Reactive Primitives
//!
//! This module implements the dependency tracking kernel: effects, deps, the
//! target registry, refs, computed values, and the proxy views that connect
//! plain data to all of it.
//!
//! # Concepts
//!
//! ## Effects
//!
//! A [`ReactiveEffect`] wraps a function. Running it makes it the active
//! effect; every tracked read during the run subscribes it to the dep of
//! whatever was read. When one of those deps is triggered the effect runs
//! again, or its scheduler is called instead.
//!
//! ## Deps and the Registry
//!
//! A [`Dep`] is the set of effects that depend on one tracked key. Deps for
//! proxied data live in a registry keyed by target identity, then by key.
//! Entries disappear when the target is dropped.
//!
//! ## Proxies
//!
//! [`reactive`], [`readonly`] and their shallow variants return a [`Proxy`],
//! an explicit accessor view over a [`Target`](crate::value::Target). The
//! accessors call [`track`] on reads and [`trigger`] on writes.
//!
//! ## Refs and Computed Values
//!
//! A [`Ref`] is a single reactive slot that owns its dep. A [`Computed`] is a
//! cached derived value driven by a scheduler-based effect.
//!
//! # Implementation Notes
//!
//! All tracking state is thread-local. Nothing here is `Send`; each thread
//! that uses the kernel gets an independent registry and tracking context.
//!
//! Deps from the previous run are reconciled with generation bits rather
//! than cleared and rebuilt, so a re-run that reads the same keys does no
//! subscription churn. Runs nested deeper than the configured marker ceiling
//! fall back to a full cleanup.

mod base_handlers;
mod collection_handlers;
mod computed;
mod context;
mod dep;
mod effect;
mod operations;
mod proxy;
mod refs;
pub(crate) mod runtime;
mod subscriber;

pub use base_handlers::{
    ProxyHandler, MUTABLE_HANDLERS, READONLY_HANDLERS, SHALLOW_READONLY_HANDLERS,
    SHALLOW_REACTIVE_HANDLERS,
};
pub use collection_handlers::{
    CollectionHandlers, CollectionIter, MUTABLE_COLLECTION_HANDLERS,
    READONLY_COLLECTION_HANDLERS, SHALLOW_COLLECTION_HANDLERS,
    SHALLOW_READONLY_COLLECTION_HANDLERS,
};
pub use computed::Computed;
pub use context::{
    enable_tracking, is_tracking, pause_tracking, reset_tracking, should_track, untracked,
    ReactiveContext,
};
pub use dep::Dep;
pub use effect::{
    effect, stop, DebuggerEvent, DebuggerEventKind, DebuggerHook, EffectOptions, EffectRunner,
    EffectState, ReactiveEffect, Scheduler,
};
pub use operations::{TrackKey, TrackOpType, TriggerOpType};
pub use proxy::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, to_reactive, to_readonly, Proxy, ProxyMode,
    ReactiveFlag,
};
pub use refs::{is_ref, trigger_ref, unref, Ref, RefLike, RefValue};
pub use runtime::{get_dep, track, trigger, TriggerExtra};
pub use subscriber::{Subscriber, SubscriberId};
