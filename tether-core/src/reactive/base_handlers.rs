//! Handlers for records and sequences.
//!
//! [`ProxyHandler`] is the interception seam: one implementation for mutable
//! proxies and one for readonly views, each instantiated deep and shallow.
//! Reads share one implementation; the two differ in how they write.
//!
//! Sequence methods that both read and write `length` (`push`, `pop`,
//! `shift`, `unshift`, `splice`) run through the handlers like any other
//! access, but with tracking paused, so an effect that pushes does not end up
//! depending on the length it just changed. Searches (`includes`, `index_of`,
//! `last_index_of`) on mutable proxies track every index first, then search
//! the raw items, retrying with the unwrapped argument on a miss.

use super::context::untracked;
use super::operations::{TrackKey, TrackOpType, TriggerOpType};
use super::proxy::{
    is_readonly, is_shallow, to_raw, to_reactive, to_readonly, Proxy, ProxyMode, Underlying,
};
use super::refs::is_ref;
use super::runtime::{track, trigger, TriggerExtra};
use crate::diagnostics;
use crate::value::{has_changed, PropKey, TargetData, TargetKind, Value};

/// Keys that are read through without tracking.
fn is_non_trackable(key: &PropKey) -> bool {
    matches!(key.as_name(), Some("__proto__" | "__v_isRef" | "__isVue"))
}

/// Interception of property access on a record or sequence proxy.
pub trait ProxyHandler {
    fn is_readonly(&self) -> bool;

    fn is_shallow(&self) -> bool;

    /// Read `key`, tracking it unless readonly, and wrap or unwrap the result
    /// for the caller.
    fn get(&self, proxy: &Proxy, key: &PropKey) -> Value {
        if let Some(flag) = proxy.reserved_flag(key) {
            return flag;
        }

        let raw = proxy.raw_target();
        let res = match proxy.underlying() {
            Underlying::Raw(target) => target.raw_get(key),
            Underlying::Observed(inner) => inner.get(key.clone()),
        };

        if key.is_builtin_symbol() || is_non_trackable(key) {
            return res;
        }

        if !self.is_readonly() {
            track(raw, TrackOpType::Get, key);
        }

        if self.is_shallow() {
            return res;
        }

        if let Value::Ref(r) = &res {
            // Refs in sequence slots keep their identity.
            let in_slot = raw.kind() == TargetKind::Sequence && key.as_index().is_some();
            return if in_slot { res } else { r.get_value() };
        }

        if self.is_readonly() {
            to_readonly(res)
        } else {
            to_reactive(res)
        }
    }

    fn set(&self, proxy: &Proxy, key: &PropKey, value: Value) -> bool;

    fn delete_property(&self, proxy: &Proxy, key: &PropKey) -> bool;

    fn has(&self, proxy: &Proxy, key: &PropKey) -> bool;

    fn own_keys(&self, proxy: &Proxy) -> Vec<PropKey>;
}

/// Handler for reactive and shallow reactive proxies.
#[derive(Debug)]
pub struct MutableReactiveHandler {
    shallow: bool,
}

/// Handler for readonly and shallow readonly views.
#[derive(Debug)]
pub struct ReadonlyReactiveHandler {
    shallow: bool,
}

pub static MUTABLE_HANDLERS: MutableReactiveHandler = MutableReactiveHandler { shallow: false };
pub static SHALLOW_REACTIVE_HANDLERS: MutableReactiveHandler =
    MutableReactiveHandler { shallow: true };
pub static READONLY_HANDLERS: ReadonlyReactiveHandler = ReadonlyReactiveHandler { shallow: false };
pub static SHALLOW_READONLY_HANDLERS: ReadonlyReactiveHandler =
    ReadonlyReactiveHandler { shallow: true };

pub(crate) fn handler_for(mode: ProxyMode) -> &'static dyn ProxyHandler {
    match mode {
        ProxyMode::Reactive => &MUTABLE_HANDLERS,
        ProxyMode::ShallowReactive => &SHALLOW_REACTIVE_HANDLERS,
        ProxyMode::Readonly => &READONLY_HANDLERS,
        ProxyMode::ShallowReadonly => &SHALLOW_READONLY_HANDLERS,
    }
}

impl ProxyHandler for MutableReactiveHandler {
    fn is_readonly(&self) -> bool {
        false
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }

    fn set(&self, proxy: &Proxy, key: &PropKey, value: Value) -> bool {
        let raw = proxy.raw_target();
        let mut value = value;
        let mut old_value = raw.raw_get(key);

        if is_readonly(&old_value) && is_ref(&old_value) && !is_ref(&value) {
            return false;
        }

        if !self.shallow {
            if !is_shallow(&value) && !is_readonly(&value) {
                old_value = to_raw(&old_value);
                value = to_raw(&value);
            }
            if raw.kind() != TargetKind::Sequence {
                if let Value::Ref(old_ref) = &old_value {
                    if !is_ref(&value) {
                        old_ref.set_value(value);
                        return true;
                    }
                }
            }
        }

        let had_key = match key.as_index() {
            Some(index) if raw.kind() == TargetKind::Sequence => index < raw.raw_len(),
            _ => raw.raw_has(key),
        };
        let result = raw.raw_set(key, value.clone());

        if result && proxy.is_canonical() {
            if !had_key {
                trigger(
                    raw,
                    TriggerOpType::Add,
                    Some(key.into()),
                    TriggerExtra::new_value(value),
                );
            } else if has_changed(&value, &old_value) {
                trigger(
                    raw,
                    TriggerOpType::Set,
                    Some(key.into()),
                    TriggerExtra::values(value, old_value),
                );
            }
        }
        result
    }

    fn delete_property(&self, proxy: &Proxy, key: &PropKey) -> bool {
        let raw = proxy.raw_target();
        let had_key = raw.raw_has(key);
        let old_value = raw.raw_get(key);
        let result = raw.raw_delete(key);
        if result && had_key {
            trigger(
                raw,
                TriggerOpType::Delete,
                Some(key.into()),
                TriggerExtra::old_value(old_value),
            );
        }
        result
    }

    fn has(&self, proxy: &Proxy, key: &PropKey) -> bool {
        let raw = proxy.raw_target();
        let result = raw.raw_has(key);
        if !key.is_builtin_symbol() {
            track(raw, TrackOpType::Has, key);
        }
        result
    }

    fn own_keys(&self, proxy: &Proxy) -> Vec<PropKey> {
        let raw = proxy.raw_target();
        let key = if raw.kind() == TargetKind::Sequence {
            TrackKey::length()
        } else {
            TrackKey::Iterate
        };
        track(raw, TrackOpType::Iterate, key);
        raw.raw_own_keys()
    }
}

impl ProxyHandler for ReadonlyReactiveHandler {
    fn is_readonly(&self) -> bool {
        true
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }

    fn set(&self, _proxy: &Proxy, key: &PropKey, _value: Value) -> bool {
        diagnostics::warn(&format!("Set operation on key \"{key}\" failed: target is readonly."));
        true
    }

    fn delete_property(&self, _proxy: &Proxy, key: &PropKey) -> bool {
        diagnostics::warn(&format!(
            "Delete operation on key \"{key}\" failed: target is readonly."
        ));
        true
    }

    fn has(&self, proxy: &Proxy, key: &PropKey) -> bool {
        match proxy.underlying() {
            Underlying::Raw(target) => target.raw_has(key),
            Underlying::Observed(inner) => inner.has(key.clone()),
        }
    }

    fn own_keys(&self, proxy: &Proxy) -> Vec<PropKey> {
        match proxy.underlying() {
            Underlying::Raw(target) => target.raw_own_keys(),
            Underlying::Observed(inner) => inner.own_keys(),
        }
    }
}

/// `hasOwnProperty`: tracked as a `Has` read on mutable proxies.
pub(crate) fn has_own_property(proxy: &Proxy, key: &PropKey) -> bool {
    let raw = proxy.raw_target();
    if !proxy.is_readonly() {
        track(raw, TrackOpType::Has, key);
    }
    raw.raw_has(key)
}

pub(crate) fn length_of(proxy: &Proxy) -> usize {
    proxy
        .get(PropKey::length())
        .as_number()
        .filter(|n| *n >= 0.0)
        .map_or(0, |n| n as usize)
}

// ----------------------------------------------------------------------------
// Sequence searches
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchMethod {
    Includes,
    IndexOf,
    LastIndexOf,
}

impl SearchMethod {
    /// `includes` uses SameValueZero; the index searches use strict equality.
    fn matches(self, item: &Value, needle: &Value) -> bool {
        match (self, item, needle) {
            (SearchMethod::Includes, _, _) => item == needle,
            (_, Value::Number(a), Value::Number(b)) => a == b,
            _ => item == needle,
        }
    }

    fn find(
        self,
        items: impl DoubleEndedIterator<Item = (usize, Value)>,
        needle: &Value,
    ) -> Option<usize> {
        let mut items = items;
        let hit = |(_, item): &(usize, Value)| self.matches(item, needle);
        let found = match self {
            SearchMethod::LastIndexOf => items.rfind(hit),
            _ => items.find(hit),
        };
        found.map(|(index, _)| index)
    }
}

pub(crate) fn search(proxy: &Proxy, needle: &Value, method: SearchMethod) -> Option<usize> {
    match proxy.underlying() {
        Underlying::Observed(inner) => return search(inner, needle, method),
        Underlying::Raw(_) if proxy.is_readonly() => {
            // Plain readonly views compare against wrapped reads. Holes only
            // count for `includes`, and only as `undefined`.
            let len = length_of(proxy);
            let items: Vec<(usize, Value)> = (0..len)
                .filter(|&i| method == SearchMethod::Includes || proxy.has(i))
                .map(|i| (i, proxy.get(i)))
                .collect();
            return method.find(items.into_iter(), needle);
        }
        Underlying::Raw(_) => {}
    }

    let raw = proxy.raw_target();
    let len = length_of(proxy);
    for index in 0..len {
        track(raw, TrackOpType::Get, index);
    }

    let raw_search = |needle: &Value| {
        let data = raw.data();
        let TargetData::Sequence(slots) = &*data else {
            return None;
        };
        let items = slots.iter().map(|(index, item)| (index, item.clone()));
        let found = method.find(items, needle);
        match found {
            None if method == SearchMethod::Includes && needle.is_undefined() => {
                slots.first_hole()
            }
            found => found,
        }
    };

    raw_search(needle).or_else(|| {
        let raw_needle = to_raw(needle);
        if raw_needle != *needle {
            raw_search(&raw_needle)
        } else {
            None
        }
    })
}

// ----------------------------------------------------------------------------
// Length-mutating sequence methods
// ----------------------------------------------------------------------------

fn move_slot(proxy: &Proxy, from: usize, to: usize) {
    if proxy.has(from) {
        let value = proxy.get(from);
        proxy.set(to, value);
    } else {
        proxy.delete_property(to);
    }
}

pub(crate) fn push(proxy: &Proxy, items: Vec<Value>) -> usize {
    untracked(|| {
        let mut len = length_of(proxy);
        for item in items {
            proxy.set(len, item);
            len += 1;
        }
        proxy.set(PropKey::length(), len);
        len
    })
}

pub(crate) fn pop(proxy: &Proxy) -> Value {
    untracked(|| {
        let len = length_of(proxy);
        if len == 0 {
            proxy.set(PropKey::length(), 0);
            return Value::Undefined;
        }
        let index = len - 1;
        let element = proxy.get(index);
        proxy.delete_property(index);
        proxy.set(PropKey::length(), index);
        element
    })
}

pub(crate) fn shift(proxy: &Proxy) -> Value {
    untracked(|| {
        let len = length_of(proxy);
        if len == 0 {
            proxy.set(PropKey::length(), 0);
            return Value::Undefined;
        }
        let first = proxy.get(0usize);
        for k in 1..len {
            move_slot(proxy, k, k - 1);
        }
        proxy.delete_property(len - 1);
        proxy.set(PropKey::length(), len - 1);
        first
    })
}

pub(crate) fn unshift(proxy: &Proxy, items: Vec<Value>) -> usize {
    untracked(|| {
        let len = length_of(proxy);
        let count = items.len();
        if count > 0 {
            for k in (0..len).rev() {
                move_slot(proxy, k, k + count);
            }
            for (j, item) in items.into_iter().enumerate() {
                proxy.set(j, item);
            }
        }
        proxy.set(PropKey::length(), len + count);
        len + count
    })
}

pub(crate) fn splice(
    proxy: &Proxy,
    start: usize,
    delete_count: usize,
    items: Vec<Value>,
) -> Vec<Value> {
    untracked(|| {
        let len = length_of(proxy);
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        let item_count = items.len();

        let removed: Vec<Value> = (start..start + delete_count)
            .filter(|&k| proxy.has(k))
            .map(|k| proxy.get(k))
            .collect();

        if item_count < delete_count {
            for k in start..len - delete_count {
                move_slot(proxy, k + delete_count, k + item_count);
            }
            for k in (len - delete_count + item_count..len).rev() {
                proxy.delete_property(k);
            }
        } else if item_count > delete_count {
            for k in (start..len - delete_count).rev() {
                move_slot(proxy, k + delete_count, k + item_count);
            }
        }

        for (j, item) in items.into_iter().enumerate() {
            proxy.set(start + j, item);
        }
        proxy.set(PropKey::length(), len - delete_count + item_count);
        removed
    })
}
