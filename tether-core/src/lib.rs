//! Tether Core
//!
//! This crate provides the dependency tracking kernel of the Tether reactive
//! framework. It implements:
//!
//! - Effects with automatic, dynamic dependency tracking
//! - The track/trigger protocol over a per-target dep registry
//! - Reactive and readonly proxy views over records and sequences
//! - Instrumented map, set, weak map and weak set access
//! - Refs and lazily cached computed values
//!
//! Component trees, rendering and job batching live outside this crate. They
//! plug in through an effect's scheduler callback.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: the dynamic value model and raw targets
//! - `reactive`: effects, deps, track/trigger, proxies, refs, computed values
//! - `config`: per-thread tracking configuration
//! - `diagnostics`: non-fatal warnings
//! - `error`: the error type for the few fallible operations
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::{effect, reactive, EffectOptions, Target};
//!
//! let state = reactive(Target::record([("count", 0)])).into_proxy().unwrap();
//!
//! let reader = state.clone();
//! let runner = effect(
//!     move || println!("count: {:?}", reader.get("count")),
//!     EffectOptions::default(),
//! );
//! // prints "count: 0"
//!
//! state.set("count", 1);
//! // prints "count: 1"
//!
//! tether_core::stop(&runner);
//! state.set("count", 2);
//! // nothing printed
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod reactive;
pub mod value;

pub use config::TrackingConfig;
pub use error::{Error, Result};
pub use reactive::{
    effect, is_proxy, is_reactive, is_readonly, is_ref, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, stop, to_raw, track, trigger, unref, Computed,
    EffectOptions, EffectRunner, Proxy, ReactiveEffect, Ref,
};
pub use value::{has_changed, ObjectId, PropKey, Symbol, Target, TargetKind, Value};
