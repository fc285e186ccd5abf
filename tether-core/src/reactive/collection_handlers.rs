//! Instrumented map and set methods.
//!
//! Collections have no per-key property access to intercept, so every method
//! is re-implemented here: it operates on the raw collection and calls
//! `track`/`trigger` explicitly. One [`CollectionHandlers`] bundle exists per
//! proxy mode.
//!
//! Keys are looked up in both their given and raw form, since an effect may
//! have used either. Iteration tracks once, when the iterator is created.

use std::fmt;

use super::operations::{TrackKey, TrackOpType, TriggerOpType};
use super::proxy::{
    is_readonly, is_shallow, to_raw, to_reactive, to_readonly, Proxy, ProxyMode, Underlying,
};
use super::runtime::{track, trigger, TriggerExtra};
use crate::config;
use crate::diagnostics;
use crate::value::{has_changed, Target, TargetKind, Value};

/// Instrumented collection methods for one proxy mode.
#[derive(Debug)]
pub struct CollectionHandlers {
    readonly: bool,
    shallow: bool,
}

pub static MUTABLE_COLLECTION_HANDLERS: CollectionHandlers = CollectionHandlers {
    readonly: false,
    shallow: false,
};
pub static SHALLOW_COLLECTION_HANDLERS: CollectionHandlers = CollectionHandlers {
    readonly: false,
    shallow: true,
};
pub static READONLY_COLLECTION_HANDLERS: CollectionHandlers = CollectionHandlers {
    readonly: true,
    shallow: false,
};
pub static SHALLOW_READONLY_COLLECTION_HANDLERS: CollectionHandlers = CollectionHandlers {
    readonly: true,
    shallow: true,
};

pub(crate) fn handlers_for(mode: ProxyMode) -> &'static CollectionHandlers {
    match mode {
        ProxyMode::Reactive => &MUTABLE_COLLECTION_HANDLERS,
        ProxyMode::ShallowReactive => &SHALLOW_COLLECTION_HANDLERS,
        ProxyMode::Readonly => &READONLY_COLLECTION_HANDLERS,
        ProxyMode::ShallowReadonly => &SHALLOW_READONLY_COLLECTION_HANDLERS,
    }
}

/// Which iteration method created an iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IterMethod {
    Keys,
    Values,
    Entries,
}

fn describe(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_owned(),
        None => format!("{value:?}"),
    }
}

fn is_weak_key(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Proxy(_) | Value::Ref(_))
}

/// Warn when a collection holds both the raw and the wrapped form of a key.
fn check_identity_keys(raw: &Target, key: &Value) {
    if !config::current().dev_checks {
        return;
    }
    let raw_key = to_raw(key);
    if raw_key != *key && raw.raw_contains(&raw_key) {
        let kind = raw.kind();
        let as_keys = if kind.is_map_like() { " as keys" } else { "" };
        diagnostics::warn(&format!(
            "Reactive {} contains both the raw and reactive versions of the same object{as_keys}, \
             which can lead to inconsistencies. Avoid differentiating between the raw and reactive \
             versions of an object and only use the reactive version if possible.",
            kind.name()
        ));
    }
}

impl CollectionHandlers {
    fn wrap(&self, value: Value) -> Value {
        if self.shallow {
            value
        } else if self.readonly {
            to_readonly(value)
        } else {
            to_reactive(value)
        }
    }

    fn store_form(&self, value: Value) -> Value {
        if !self.shallow && !is_shallow(&value) && !is_readonly(&value) {
            to_raw(&value)
        } else {
            value
        }
    }

    fn refuse(&self, operation: &str, key: Option<&Value>) {
        let on_key = key.map(|k| format!("on key \"{}\" ", describe(k))).unwrap_or_default();
        diagnostics::warn(&format!("{operation} operation {on_key}failed: target is readonly."));
    }

    fn track_key_forms(&self, raw: &Target, op: TrackOpType, key: &Value, raw_key: &Value) {
        if self.readonly {
            return;
        }
        if key != raw_key {
            track(raw, op, key.clone());
        }
        track(raw, op, raw_key.clone());
    }

    pub(crate) fn lookup(&self, proxy: &Proxy, key: Value) -> Value {
        let raw = proxy.raw_target();
        let raw_key = to_raw(&key);
        self.track_key_forms(raw, TrackOpType::Get, &key, &raw_key);

        let underlying_lookup = |k: &Value| match proxy.underlying() {
            Underlying::Raw(target) => target.raw_lookup(k),
            Underlying::Observed(inner) => inner.lookup(k.clone()),
        };

        if raw.raw_contains(&key) {
            self.wrap(underlying_lookup(&key))
        } else if raw.raw_contains(&raw_key) {
            self.wrap(underlying_lookup(&raw_key))
        } else {
            // A readonly view over a reactive map still subscribes through
            // the inner proxy.
            if let Underlying::Observed(inner) = proxy.underlying() {
                inner.lookup(key);
            }
            Value::Undefined
        }
    }

    pub(crate) fn contains(&self, proxy: &Proxy, key: Value) -> bool {
        let raw = proxy.raw_target();
        let raw_key = to_raw(&key);
        self.track_key_forms(raw, TrackOpType::Has, &key, &raw_key);

        let underlying_has = |k: &Value| match proxy.underlying() {
            Underlying::Raw(target) => target.raw_contains(k),
            Underlying::Observed(inner) => inner.contains(k.clone()),
        };

        if key == raw_key {
            underlying_has(&key)
        } else {
            underlying_has(&key) || underlying_has(&raw_key)
        }
    }

    pub(crate) fn size(&self, proxy: &Proxy) -> usize {
        if !self.readonly {
            track(proxy.raw_target(), TrackOpType::Iterate, TrackKey::Iterate);
        }
        match proxy.underlying() {
            Underlying::Raw(target) => target.raw_size(),
            Underlying::Observed(inner) => inner.size(),
        }
    }

    pub(crate) fn add(&self, proxy: &Proxy, value: Value) {
        if self.readonly {
            self.refuse("Add", Some(&value));
            return;
        }
        let raw = proxy.raw_target();
        let value = self.store_form(value);
        if raw.kind().is_weak() && !is_weak_key(&value) {
            diagnostics::warn(&format!("Invalid value used in weak set: {}", describe(&value)));
            return;
        }

        if !raw.raw_contains(&value) {
            raw.raw_add(value.clone());
            trigger(
                raw,
                TriggerOpType::Add,
                Some(TrackKey::Entry(value.clone())),
                TriggerExtra::new_value(value),
            );
        }
    }

    pub(crate) fn insert(&self, proxy: &Proxy, key: Value, value: Value) {
        if self.readonly {
            self.refuse("Set", Some(&key));
            return;
        }
        let raw = proxy.raw_target();
        if raw.kind().is_weak() && !is_weak_key(&key) {
            diagnostics::warn(&format!("Invalid value used as weak map key: {}", describe(&key)));
            return;
        }
        let value = self.store_form(value);

        let mut key = key;
        let mut had_key = raw.raw_contains(&key);
        if !had_key {
            key = to_raw(&key);
            had_key = raw.raw_contains(&key);
        } else {
            check_identity_keys(raw, &key);
        }

        let old_value = raw.raw_lookup(&key);
        raw.raw_insert(key.clone(), value.clone());

        if !had_key {
            trigger(
                raw,
                TriggerOpType::Add,
                Some(TrackKey::Entry(key)),
                TriggerExtra::new_value(value),
            );
        } else if has_changed(&value, &old_value) {
            trigger(
                raw,
                TriggerOpType::Set,
                Some(TrackKey::Entry(key)),
                TriggerExtra::values(value, old_value),
            );
        }
    }

    pub(crate) fn remove(&self, proxy: &Proxy, key: Value) -> bool {
        if self.readonly {
            self.refuse("Delete", Some(&key));
            return false;
        }
        let raw = proxy.raw_target();

        let mut key = key;
        let mut had_key = raw.raw_contains(&key);
        if !had_key {
            key = to_raw(&key);
            had_key = raw.raw_contains(&key);
        } else {
            check_identity_keys(raw, &key);
        }

        let old_value = if raw.kind().is_map_like() {
            raw.raw_lookup(&key)
        } else {
            Value::Undefined
        };
        let result = raw.raw_remove(&key);
        if had_key {
            trigger(
                raw,
                TriggerOpType::Delete,
                Some(TrackKey::Entry(key)),
                TriggerExtra::old_value(old_value),
            );
        }
        result
    }

    pub(crate) fn clear(&self, proxy: &Proxy) {
        if self.readonly {
            self.refuse("Clear", None);
            return;
        }
        let raw = proxy.raw_target();
        let had_items = raw.raw_size() != 0;
        let old_target = config::current().dev_checks.then(|| raw.snapshot());

        raw.raw_clear();
        if had_items {
            trigger(
                raw,
                TriggerOpType::Clear,
                None,
                TriggerExtra {
                    old_target,
                    ..TriggerExtra::default()
                },
            );
        }
    }

    pub(crate) fn for_each(&'static self, proxy: &Proxy, mut f: impl FnMut(Value, Value)) {
        for (key, value) in self.iterate(proxy, IterMethod::Entries) {
            f(value, key);
        }
    }

    /// Start an iteration, tracking the iteration key once.
    pub(crate) fn iterate(&'static self, proxy: &Proxy, method: IterMethod) -> PairCursor {
        let raw = proxy.raw_target();
        let key_only = method == IterMethod::Keys && raw.kind() == TargetKind::Map;

        let source = match proxy.underlying() {
            Underlying::Raw(target) => Source::Raw {
                target: target.clone(),
                pos: 0,
            },
            Underlying::Observed(inner) => {
                let inner_handlers = handlers_for(inner.mode());
                Source::Observed(Box::new(inner_handlers.iterate(inner, method)))
            }
        };

        if !self.readonly {
            let key = if key_only {
                TrackKey::MapKeyIterate
            } else {
                TrackKey::Iterate
            };
            track(raw, TrackOpType::Iterate, key);
        }

        PairCursor {
            source,
            handlers: self,
        }
    }
}

enum Source {
    Empty,
    Raw { target: Target, pos: usize },
    Observed(Box<PairCursor>),
}

/// Walks a collection as `(key, value)` pairs, wrapping per mode.
pub(crate) struct PairCursor {
    source: Source,
    handlers: &'static CollectionHandlers,
}

impl Iterator for PairCursor {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = match &mut self.source {
            Source::Empty => return None,
            Source::Raw { target, pos } => {
                let entry = target.raw_entry_at(*pos)?;
                *pos += 1;
                entry
            }
            Source::Observed(inner) => inner.next()?,
        };
        Some((self.handlers.wrap(key), self.handlers.wrap(value)))
    }
}

/// Iterator returned by `keys`, `values` and `entries`.
///
/// The collection is read live: entries added behind the cursor are not
/// revisited, entries added ahead of it are.
pub struct CollectionIter<T> {
    cursor: PairCursor,
    project: fn((Value, Value)) -> T,
}

impl<T> CollectionIter<T> {
    pub(crate) fn new(cursor: PairCursor, project: fn((Value, Value)) -> T) -> Self {
        Self { cursor, project }
    }

    pub(crate) fn empty(project: fn((Value, Value)) -> T) -> Self {
        Self {
            cursor: PairCursor {
                source: Source::Empty,
                handlers: &MUTABLE_COLLECTION_HANDLERS,
            },
            project,
        }
    }
}

impl<T> Iterator for CollectionIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.cursor.next().map(self.project)
    }
}

impl<T> fmt::Debug for CollectionIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionIter")
            .field("handlers", self.cursor.handlers)
            .finish()
    }
}
