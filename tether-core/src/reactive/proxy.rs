//! Reactive Proxies
//!
//! A [`Proxy`] is a reactive or readonly view of a [`Target`]. Rust has no
//! transparent property interception, so the view exposes explicit accessor
//! methods; each one runs through the handler bundle for the proxy's mode and
//! the target's shape, which calls `track` on reads and `trigger` on writes.
//!
//! # Modes
//!
//! There are four modes, {reactive, readonly} x {deep, shallow}. Each target
//! has at most one live wrapper per mode: the factories consult a per-mode
//! cache keyed by target identity, so wrapping the same target twice yields
//! the same proxy. The caches hold wrappers weakly.
//!
//! A readonly view can be layered over a mutable proxy. Reads then go through
//! the inner proxy, so they still track, while writes are refused by the
//! outer view.
//!
//! # Nested Values
//!
//! Deep proxies wrap nested objects lazily, on each read, in the same
//! readonly-ness as the parent. Shallow proxies return nested values as
//! stored.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::thread::LocalKey;

use super::base_handlers::{self, SearchMethod};
use super::collection_handlers::{self, CollectionHandlers, CollectionIter, IterMethod};
use crate::diagnostics;
use crate::value::{ObjectId, PropKey, Target, TargetKind, Value};

/// Wrapper mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyMode {
    Reactive,
    ShallowReactive,
    Readonly,
    ShallowReadonly,
}

impl ProxyMode {
    pub fn is_readonly(self) -> bool {
        matches!(self, ProxyMode::Readonly | ProxyMode::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, ProxyMode::ShallowReactive | ProxyMode::ShallowReadonly)
    }

    fn cache(self) -> &'static LocalKey<ProxyCache> {
        match self {
            ProxyMode::Reactive => &REACTIVE_MAP,
            ProxyMode::ShallowReactive => &SHALLOW_REACTIVE_MAP,
            ProxyMode::Readonly => &READONLY_MAP,
            ProxyMode::ShallowReadonly => &SHALLOW_READONLY_MAP,
        }
    }
}

/// Reserved keys answered by every proxy instead of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactiveFlag {
    Skip,
    IsReactive,
    IsReadonly,
    IsShallow,
    Raw,
}

impl ReactiveFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            ReactiveFlag::Skip => "__v_skip",
            ReactiveFlag::IsReactive => "__v_isReactive",
            ReactiveFlag::IsReadonly => "__v_isReadonly",
            ReactiveFlag::IsShallow => "__v_isShallow",
            ReactiveFlag::Raw => "__v_raw",
        }
    }

    fn from_key(key: &PropKey) -> Option<Self> {
        Some(match key.as_name()? {
            "__v_skip" => ReactiveFlag::Skip,
            "__v_isReactive" => ReactiveFlag::IsReactive,
            "__v_isReadonly" => ReactiveFlag::IsReadonly,
            "__v_isShallow" => ReactiveFlag::IsShallow,
            "__v_raw" => ReactiveFlag::Raw,
            _ => return None,
        })
    }
}

impl From<ReactiveFlag> for PropKey {
    fn from(flag: ReactiveFlag) -> Self {
        PropKey::from(flag.as_str())
    }
}

/// What a proxy forwards to.
#[derive(Clone)]
pub(crate) enum Underlying {
    Raw(Target),
    /// A readonly view over a mutable proxy.
    Observed(Proxy),
}

impl Underlying {
    fn id(&self) -> ObjectId {
        match self {
            Underlying::Raw(target) => target.id(),
            Underlying::Observed(proxy) => proxy.id(),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Underlying::Raw(target) => Value::Object(target.clone()),
            Underlying::Observed(proxy) => Value::Proxy(proxy.clone()),
        }
    }
}

type ProxyCache = RefCell<HashMap<ObjectId, Weak<ProxyInner>>>;

thread_local! {
    static REACTIVE_MAP: ProxyCache = RefCell::new(HashMap::new());
    static SHALLOW_REACTIVE_MAP: ProxyCache = RefCell::new(HashMap::new());
    static READONLY_MAP: ProxyCache = RefCell::new(HashMap::new());
    static SHALLOW_READONLY_MAP: ProxyCache = RefCell::new(HashMap::new());
}

struct ProxyInner {
    id: ObjectId,
    raw: Target,
    underlying: Underlying,
    mode: ProxyMode,
}

impl Drop for ProxyInner {
    fn drop(&mut self) {
        let key = self.underlying.id();
        let _ = self.mode.cache().try_with(|cache| {
            if let Ok(mut cache) = cache.try_borrow_mut() {
                if cache.get(&key).is_some_and(|w| w.strong_count() == 0) {
                    cache.remove(&key);
                }
            }
        });
    }
}

/// A reactive or readonly view of a target.
///
/// Cloning yields another handle to the same wrapper; equality is identity.
#[derive(Clone)]
pub struct Proxy(Rc<ProxyInner>);

impl Proxy {
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn mode(&self) -> ProxyMode {
        self.0.mode
    }

    pub fn kind(&self) -> TargetKind {
        self.0.raw.kind()
    }

    /// The fully unwrapped target, even for layered views.
    pub fn raw(&self) -> Target {
        self.0.raw.clone()
    }

    pub(crate) fn raw_target(&self) -> &Target {
        &self.0.raw
    }

    pub(crate) fn underlying(&self) -> &Underlying {
        &self.0.underlying
    }

    pub fn is_readonly(&self) -> bool {
        self.0.mode.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.0.mode.is_shallow()
    }

    /// True for mutable proxies and for readonly views layered over one.
    pub fn is_reactive(&self) -> bool {
        if !self.is_readonly() {
            return true;
        }
        match &self.0.underlying {
            Underlying::Observed(inner) => inner.is_reactive(),
            Underlying::Raw(_) => false,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Proxy(self.clone())
    }

    /// Whether this is the cached wrapper for its target in its mode.
    pub(crate) fn is_canonical(&self) -> bool {
        let key = self.0.underlying.id();
        self.0.mode.cache().with(|cache| {
            cache
                .borrow()
                .get(&key)
                .is_some_and(|w| w.as_ptr() == Rc::as_ptr(&self.0))
        })
    }

    pub(crate) fn reserved_flag(&self, key: &PropKey) -> Option<Value> {
        let value = match ReactiveFlag::from_key(key)? {
            ReactiveFlag::Skip => Value::Bool(self.0.raw.is_marked_raw()),
            ReactiveFlag::IsReactive => Value::Bool(!self.is_readonly()),
            ReactiveFlag::IsReadonly => Value::Bool(self.is_readonly()),
            ReactiveFlag::IsShallow => Value::Bool(self.is_shallow()),
            ReactiveFlag::Raw if self.is_canonical() => self.0.underlying.to_value(),
            ReactiveFlag::Raw => Value::Undefined,
        };
        Some(value)
    }

    fn unsupported(&self, method: &str) {
        diagnostics::warn(&format!(
            "{method}() is not supported on a reactive {}",
            self.kind().name()
        ));
    }

    fn base(&self, method: &str) -> Option<&'static dyn base_handlers::ProxyHandler> {
        if self.kind().is_collection() {
            self.unsupported(method);
            None
        } else {
            Some(base_handlers::handler_for(self.0.mode))
        }
    }

    fn sequence(&self, method: &str) -> bool {
        let ok = self.kind() == TargetKind::Sequence;
        if !ok {
            self.unsupported(method);
        }
        ok
    }

    fn collection(
        &self,
        method: &str,
        allowed: fn(TargetKind) -> bool,
    ) -> Option<&'static CollectionHandlers> {
        if allowed(self.kind()) {
            Some(collection_handlers::handlers_for(self.0.mode))
        } else {
            self.unsupported(method);
            None
        }
    }

    // ------------------------------------------------------------------------
    // Records and sequences
    // ------------------------------------------------------------------------

    /// Read a property, tracking it.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let key = key.into();
        if self.kind().is_collection() {
            if let Some(flag) = self.reserved_flag(&key) {
                return flag;
            }
        }
        match self.base("get") {
            Some(handler) => handler.get(self, &key),
            None => Value::Undefined,
        }
    }

    /// Write a property. Returns whether the write was applied; readonly
    /// views report `true` without writing.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        match self.base("set") {
            Some(handler) => handler.set(self, &key.into(), value.into()),
            None => false,
        }
    }

    pub fn delete_property(&self, key: impl Into<PropKey>) -> bool {
        match self.base("delete_property") {
            Some(handler) => handler.delete_property(self, &key.into()),
            None => false,
        }
    }

    /// The `in` check.
    pub fn has(&self, key: impl Into<PropKey>) -> bool {
        match self.base("has") {
            Some(handler) => handler.has(self, &key.into()),
            None => false,
        }
    }

    pub fn has_own_property(&self, key: impl Into<PropKey>) -> bool {
        match self.base("has_own_property") {
            Some(_) => base_handlers::has_own_property(self, &key.into()),
            None => false,
        }
    }

    /// Enumerate keys. Sequences list their present indices, skipping
    /// holes, followed by `length`.
    pub fn own_keys(&self) -> Vec<PropKey> {
        match self.base("own_keys") {
            Some(handler) => handler.own_keys(self),
            None => Vec::new(),
        }
    }

    /// A sequence's `length`, tracked.
    pub fn len(&self) -> usize {
        if !self.sequence("len") {
            return 0;
        }
        base_handlers::length_of(self)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assign a sequence's `length`, truncating or padding with holes.
    /// Lengths past [`MAX_LENGTH`](crate::value::MAX_LENGTH) are refused with
    /// a warning.
    pub fn set_len(&self, len: usize) -> bool {
        if !self.sequence("set_len") {
            return false;
        }
        self.set(PropKey::length(), len)
    }

    /// Append values, returning the new length.
    pub fn push<I, V>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if !self.sequence("push") {
            return 0;
        }
        base_handlers::push(self, items.into_iter().map(Into::into).collect())
    }

    pub fn pop(&self) -> Value {
        if !self.sequence("pop") {
            return Value::Undefined;
        }
        base_handlers::pop(self)
    }

    pub fn shift(&self) -> Value {
        if !self.sequence("shift") {
            return Value::Undefined;
        }
        base_handlers::shift(self)
    }

    /// Prepend values, returning the new length.
    pub fn unshift<I, V>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if !self.sequence("unshift") {
            return 0;
        }
        base_handlers::unshift(self, items.into_iter().map(Into::into).collect())
    }

    /// Remove `delete_count` items at `start` and insert `items` there.
    /// Returns the removed items.
    pub fn splice<I, V>(&self, start: usize, delete_count: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        if !self.sequence("splice") {
            return Vec::new();
        }
        let items = items.into_iter().map(Into::into).collect();
        base_handlers::splice(self, start, delete_count, items)
    }

    pub fn includes(&self, value: impl Into<Value>) -> bool {
        if !self.sequence("includes") {
            return false;
        }
        base_handlers::search(self, &value.into(), SearchMethod::Includes).is_some()
    }

    pub fn index_of(&self, value: impl Into<Value>) -> Option<usize> {
        if !self.sequence("index_of") {
            return None;
        }
        base_handlers::search(self, &value.into(), SearchMethod::IndexOf)
    }

    pub fn last_index_of(&self, value: impl Into<Value>) -> Option<usize> {
        if !self.sequence("last_index_of") {
            return None;
        }
        base_handlers::search(self, &value.into(), SearchMethod::LastIndexOf)
    }

    // ------------------------------------------------------------------------
    // Maps and sets
    // ------------------------------------------------------------------------

    /// `Map.get`.
    pub fn lookup(&self, key: impl Into<Value>) -> Value {
        match self.collection("lookup", TargetKind::is_map_like) {
            Some(handlers) => handlers.lookup(self, key.into()),
            None => Value::Undefined,
        }
    }

    /// `Map.has` / `Set.has`.
    pub fn contains(&self, key: impl Into<Value>) -> bool {
        match self.collection("contains", TargetKind::is_collection) {
            Some(handlers) => handlers.contains(self, key.into()),
            None => false,
        }
    }

    pub fn size(&self) -> usize {
        match self.collection("size", TargetKind::is_iterable_collection) {
            Some(handlers) => handlers.size(self),
            None => 0,
        }
    }

    /// `Set.add`.
    pub fn add(&self, value: impl Into<Value>) -> &Self {
        if let Some(handlers) = self.collection("add", is_set_like) {
            handlers.add(self, value.into());
        }
        self
    }

    /// `Map.set`.
    pub fn insert(&self, key: impl Into<Value>, value: impl Into<Value>) -> &Self {
        if let Some(handlers) = self.collection("insert", TargetKind::is_map_like) {
            handlers.insert(self, key.into(), value.into());
        }
        self
    }

    /// `Map.delete` / `Set.delete`.
    pub fn remove(&self, key: impl Into<Value>) -> bool {
        match self.collection("remove", TargetKind::is_collection) {
            Some(handlers) => handlers.remove(self, key.into()),
            None => false,
        }
    }

    pub fn clear(&self) {
        if let Some(handlers) = self.collection("clear", TargetKind::is_iterable_collection) {
            handlers.clear(self);
        }
    }

    /// Visit every entry as `(value, key)`. Sets pass each member twice.
    pub fn for_each(&self, f: impl FnMut(Value, Value)) {
        if let Some(handlers) = self.collection("for_each", TargetKind::is_iterable_collection) {
            handlers.for_each(self, f);
        }
    }

    /// Map keys, or set members.
    pub fn keys(&self) -> CollectionIter<Value> {
        self.iterate("keys", IterMethod::Keys, |(key, _)| key)
    }

    pub fn values(&self) -> CollectionIter<Value> {
        self.iterate("values", IterMethod::Values, |(_, value)| value)
    }

    /// `(key, value)` pairs; sets yield `(member, member)`.
    pub fn entries(&self) -> CollectionIter<(Value, Value)> {
        self.iterate("entries", IterMethod::Entries, |entry| entry)
    }

    fn iterate<T>(
        &self,
        name: &str,
        method: IterMethod,
        project: fn((Value, Value)) -> T,
    ) -> CollectionIter<T> {
        match self.collection(name, TargetKind::is_iterable_collection) {
            Some(handlers) => CollectionIter::new(handlers.iterate(self, method), project),
            None => CollectionIter::empty(project),
        }
    }
}

fn is_set_like(kind: TargetKind) -> bool {
    matches!(kind, TargetKind::Set | TargetKind::WeakSet)
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Proxy {}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.0.id.raw())
            .field("mode", &self.0.mode)
            .field("target", &self.0.raw.id().raw())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Factories
// ----------------------------------------------------------------------------

/// Deep reactive view of an object. Readonly proxies are returned as-is.
pub fn reactive(value: impl Into<Value>) -> Value {
    let value = value.into();
    if is_readonly(&value) {
        return value;
    }
    create_reactive_object(value, ProxyMode::Reactive)
}

/// Reactive view that tracks only the top level.
pub fn shallow_reactive(value: impl Into<Value>) -> Value {
    create_reactive_object(value.into(), ProxyMode::ShallowReactive)
}

/// Deep readonly view. Over a mutable proxy, reads keep tracking.
pub fn readonly(value: impl Into<Value>) -> Value {
    create_reactive_object(value.into(), ProxyMode::Readonly)
}

pub fn shallow_readonly(value: impl Into<Value>) -> Value {
    create_reactive_object(value.into(), ProxyMode::ShallowReadonly)
}

fn create_reactive_object(value: Value, mode: ProxyMode) -> Value {
    let underlying = match value {
        Value::Object(target) => {
            if target.is_marked_raw() {
                return Value::Object(target);
            }
            Underlying::Raw(target)
        }
        Value::Proxy(proxy) => {
            if mode.is_readonly() && !proxy.is_readonly() {
                Underlying::Observed(proxy)
            } else {
                return Value::Proxy(proxy);
            }
        }
        other => {
            diagnostics::warn(&format!("value cannot be made reactive: {other:?}"));
            return other;
        }
    };

    let key = underlying.id();
    let existing = mode
        .cache()
        .with(|cache| cache.borrow().get(&key).and_then(Weak::upgrade));
    if let Some(existing) = existing {
        return Value::Proxy(Proxy(existing));
    }

    let raw = match &underlying {
        Underlying::Raw(target) => target.clone(),
        Underlying::Observed(proxy) => proxy.raw(),
    };
    let inner = Rc::new(ProxyInner {
        id: ObjectId::next(),
        raw,
        underlying,
        mode,
    });
    mode.cache()
        .with(|cache| cache.borrow_mut().insert(key, Rc::downgrade(&inner)));
    tracing::trace!(target_id = inner.raw.id().raw(), ?mode, "proxy created");
    Value::Proxy(Proxy(inner))
}

// ----------------------------------------------------------------------------
// Predicates and conversions
// ----------------------------------------------------------------------------

/// True for mutable proxies, including behind a readonly view.
pub fn is_reactive(value: &Value) -> bool {
    match value {
        Value::Proxy(proxy) => proxy.is_reactive(),
        _ => false,
    }
}

/// True for readonly proxies and readonly refs.
pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Proxy(proxy) => proxy.is_readonly(),
        Value::Ref(r) => r.is_readonly(),
        _ => false,
    }
}

pub fn is_shallow(value: &Value) -> bool {
    match value {
        Value::Proxy(proxy) => proxy.is_shallow(),
        Value::Ref(r) => r.is_shallow(),
        _ => false,
    }
}

pub fn is_proxy(value: &Value) -> bool {
    matches!(value, Value::Proxy(_))
}

/// Strip every layer of wrapping.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Proxy(proxy) => Value::Object(proxy.raw()),
        other => other.clone(),
    }
}

/// [`reactive`] for objects; other values pass through.
pub fn to_reactive(value: Value) -> Value {
    if value.is_object() {
        reactive(value)
    } else {
        value
    }
}

/// [`readonly`] for objects; other values pass through.
pub fn to_readonly(value: Value) -> Value {
    if value.is_object() {
        readonly(value)
    } else {
        value
    }
}

/// Exclude a target from wrapping.
pub fn mark_raw(value: Value) -> Value {
    if let Value::Object(target) = &value {
        target.mark_raw();
    }
    value
}
