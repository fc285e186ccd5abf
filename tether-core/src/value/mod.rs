//! Dynamic Values
//!
//! Reactive targets are opaque user data of arbitrary shape, so the kernel
//! works over a small dynamic value model rather than over concrete Rust
//! types.
//!
//! # Equality
//!
//! Two notions of equality are in play:
//!
//! - `PartialEq`/`Hash` on [`Value`] implement SameValueZero. `NaN` equals
//!   `NaN`, `+0` equals `-0`, and objects, proxies, refs and symbols compare by
//!   identity. This is what collection keys, set members and dep keys use.
//!
//! - [`has_changed`] decides whether a write is a real change. It follows
//!   `Object.is`: `NaN` is unchanged when written over `NaN`, but `+0` and
//!   `-0` are distinct.

mod target;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub use target::{ObjectId, Slots, Target, TargetData, TargetKind};

use crate::error::Error;
use crate::reactive::{Proxy, RefValue};

/// A dynamically typed value stored in, or read from, a reactive target.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (IEEE double).
    Number(f64),
    /// Immutable string.
    String(Rc<str>),
    /// Symbol, compared by identity.
    Symbol(Symbol),
    /// A raw, unwrapped target.
    Object(Target),
    /// A reactive or readonly wrapper around a target.
    Proxy(Proxy),
    /// A single-value box that containers auto-unwrap.
    Ref(RefValue),
}

impl Value {
    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(_) => "object",
            Value::Proxy(_) => "proxy",
            Value::Ref(_) => "ref",
        }
    }

    /// True for raw targets and wrappers.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Proxy(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Object(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// Consume the value, returning the wrapper if it is one.
    pub fn into_proxy(self) -> Option<Proxy> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_ref_value(&self) -> Option<&RefValue> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }
}

/// Whether writing `new` over `old` is an observable change.
///
/// `Object.is` semantics: `NaN` over `NaN` is not a change, `-0` over `+0` is.
pub fn has_changed(new: &Value, old: &Value) -> bool {
    match (new, old) {
        (Value::Number(a), Value::Number(b)) => {
            if a.is_nan() && b.is_nan() {
                false
            } else {
                a != b || a.is_sign_negative() != b.is_sign_negative()
            }
        }
        _ => new != old,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Proxy(a), Value::Proxy(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                // Keep Hash consistent with SameValueZero equality.
                let bits = if *n == 0.0 {
                    0u64
                } else if n.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::String(s) => s.hash(state),
            Value::Symbol(s) => s.hash(state),
            Value::Object(t) => t.id().hash(state),
            Value::Proxy(p) => p.id().hash(state),
            Value::Ref(r) => r.hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Symbol(s) => write!(f, "{s:?}"),
            Value::Object(t) => write!(f, "{t:?}"),
            Value::Proxy(p) => write!(f, "{p:?}"),
            Value::Ref(r) => write!(f, "{r:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        Value::Symbol(s)
    }
}

impl From<Target> for Value {
    fn from(t: Target) -> Self {
        Value::Object(t)
    }
}

impl From<Proxy> for Value {
    fn from(p: Proxy) -> Self {
        Value::Proxy(p)
    }
}

impl From<RefValue> for Value {
    fn from(r: RefValue) -> Self {
        Value::Ref(r)
    }
}

/// Builds raw targets for arrays and objects, recursively.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Object(Target::sequence(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(fields) => Value::Object(Target::record(
                fields.into_iter().map(|(k, v)| (PropKey::from(k), Value::from(v))),
            )),
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> Error {
    Error::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_number().ok_or_else(|| mismatch("number", &value))
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or_else(|| mismatch("boolean", &value))
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(s.to_string()),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl TryFrom<Value> for Target {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(t) => Ok(t),
            other => Err(mismatch("object", &other)),
        }
    }
}

impl TryFrom<Value> for Proxy {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Proxy(p) => Ok(p),
            other => Err(mismatch("proxy", &other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Symbols
// ----------------------------------------------------------------------------

struct SymbolInner {
    description: Option<Rc<str>>,
    builtin: bool,
}

/// A unique, identity-compared property key.
#[derive(Clone)]
pub struct Symbol(Rc<SymbolInner>);

thread_local! {
    static WELL_KNOWN: [Symbol; 5] = [
        Symbol::builtin("Symbol.iterator"),
        Symbol::builtin("Symbol.asyncIterator"),
        Symbol::builtin("Symbol.hasInstance"),
        Symbol::builtin("Symbol.toPrimitive"),
        Symbol::builtin("Symbol.toStringTag"),
    ];
}

impl Symbol {
    /// Create a fresh symbol.
    pub fn new(description: Option<&str>) -> Self {
        Self(Rc::new(SymbolInner {
            description: description.map(Rc::from),
            builtin: false,
        }))
    }

    fn builtin(description: &str) -> Self {
        Self(Rc::new(SymbolInner {
            description: Some(Rc::from(description)),
            builtin: true,
        }))
    }

    pub fn iterator() -> Self {
        WELL_KNOWN.with(|s| s[0].clone())
    }

    pub fn async_iterator() -> Self {
        WELL_KNOWN.with(|s| s[1].clone())
    }

    pub fn has_instance() -> Self {
        WELL_KNOWN.with(|s| s[2].clone())
    }

    pub fn to_primitive() -> Self {
        WELL_KNOWN.with(|s| s[3].clone())
    }

    pub fn to_string_tag() -> Self {
        WELL_KNOWN.with(|s| s[4].clone())
    }

    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    /// Well-known symbols are never tracked as dependencies.
    pub fn is_builtin(&self) -> bool {
        self.0.builtin
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

// ----------------------------------------------------------------------------
// Property keys
// ----------------------------------------------------------------------------

/// Key of a record property or sequence slot.
///
/// Canonical integer strings (`"0"`, `"17"`) normalise to [`PropKey::Index`]
/// so that `"2"` and `2` address the same slot.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Index(usize),
    Name(Rc<str>),
    Symbol(Symbol),
}

impl PropKey {
    /// The `length` key of sequences.
    pub fn length() -> Self {
        PropKey::Name(Rc::from("length"))
    }

    pub fn is_length(&self) -> bool {
        matches!(self, PropKey::Name(n) if &**n == "length")
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            PropKey::Index(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PropKey::Name(n) => Some(n),
            _ => None,
        }
    }

    pub(crate) fn is_builtin_symbol(&self) -> bool {
        matches!(self, PropKey::Symbol(s) if s.is_builtin())
    }
}

/// Largest integer key that addresses a sequence slot. Larger integers are
/// ordinary property names.
pub const MAX_INDEX: usize = u32::MAX as usize - 1;

/// Largest representable sequence length.
pub const MAX_LENGTH: usize = u32::MAX as usize;

fn parse_index(s: &str) -> Option<usize> {
    let n: usize = s.parse().ok()?;
    (n <= MAX_INDEX && n.to_string() == s).then_some(n)
}

impl From<&str> for PropKey {
    fn from(s: &str) -> Self {
        match parse_index(s) {
            Some(i) => PropKey::Index(i),
            None => PropKey::Name(Rc::from(s)),
        }
    }
}

impl From<String> for PropKey {
    fn from(s: String) -> Self {
        PropKey::from(s.as_str())
    }
}

impl From<usize> for PropKey {
    fn from(i: usize) -> Self {
        if i <= MAX_INDEX {
            PropKey::Index(i)
        } else {
            PropKey::Name(Rc::from(i.to_string()))
        }
    }
}

impl From<Symbol> for PropKey {
    fn from(s: Symbol) -> Self {
        PropKey::Symbol(s)
    }
}

impl From<&PropKey> for PropKey {
    fn from(k: &PropKey) -> Self {
        k.clone()
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Index(i) => write!(f, "{i}"),
            PropKey::Name(n) => f.write_str(n),
            PropKey::Symbol(s) => write!(f, "{s:?}"),
        }
    }
}

impl fmt::Debug for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn integer_strings_normalise_to_indices() {
        assert_eq!(PropKey::from("2"), PropKey::Index(2));
        assert_eq!(PropKey::from("02"), PropKey::Name(Rc::from("02")));
        assert_eq!(PropKey::from("-1"), PropKey::Name(Rc::from("-1")));
        assert!(PropKey::from("length").is_length());
    }

    #[test]
    fn integers_past_the_index_range_are_names() {
        assert_eq!(PropKey::from(MAX_INDEX), PropKey::Index(MAX_INDEX));
        assert_eq!(PropKey::from("4294967295"), PropKey::Name(Rc::from("4294967295")));
        assert_eq!(PropKey::from(usize::MAX).as_index(), None);
    }

    #[test]
    fn same_value_zero_for_keys() {
        let mut set = HashSet::new();
        set.insert(Value::Number(f64::NAN));
        set.insert(Value::Number(f64::NAN));
        set.insert(Value::Number(0.0));
        set.insert(Value::Number(-0.0));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn has_changed_follows_object_is() {
        assert!(!has_changed(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
        assert!(has_changed(&Value::Number(-0.0), &Value::Number(0.0)));
        assert!(!has_changed(&Value::from("a"), &Value::from("a")));
        assert!(has_changed(&Value::Null, &Value::Undefined));

        let a = Target::empty(TargetKind::Record);
        let b = Target::empty(TargetKind::Record);
        assert!(!has_changed(&Value::from(a.clone()), &Value::from(a)));
        assert!(has_changed(&Value::from(b), &Value::from(Target::empty(TargetKind::Record))));
    }

    #[test]
    fn builtin_symbols_are_stable() {
        assert_eq!(Symbol::iterator(), Symbol::iterator());
        assert!(Symbol::iterator().is_builtin());
        assert!(!Symbol::new(Some("mine")).is_builtin());
        assert_ne!(Symbol::new(None), Symbol::new(None));
    }

    #[test]
    fn typed_extraction() {
        assert_eq!(f64::try_from(Value::from(3)), Ok(3.0));
        assert_eq!(
            bool::try_from(Value::from("yes")),
            Err(Error::TypeMismatch {
                expected: "boolean",
                found: "string"
            })
        );
        assert_eq!(String::try_from(Value::from("x")).unwrap(), "x");
    }

    #[test]
    fn json_builds_nested_targets() {
        let value = Value::from(serde_json::json!({ "a": [1, 2], "b": { "c": null } }));
        let target = value.as_target().unwrap();
        assert_eq!(target.kind(), TargetKind::Record);

        let a = target.raw_get(&PropKey::from("a"));
        let seq = a.as_target().unwrap();
        assert_eq!(seq.kind(), TargetKind::Sequence);
        assert_eq!(seq.raw_len(), 2);
    }
}
