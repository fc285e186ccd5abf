//! Operation kinds and dep keys.

use std::fmt;

use serde::Serialize;

use crate::value::{PropKey, Value};

/// Why a dependency was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackOpType {
    /// Property or entry read, e.g. `obj.a`.
    Get,
    /// Membership test, e.g. `"a" in obj`.
    Has,
    /// Enumeration, e.g. `Object.keys(obj)` or iterating a map.
    Iterate,
}

/// Why effects are being re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOpType {
    /// An existing key got a new value.
    Set,
    /// A new key appeared.
    Add,
    /// A key was removed.
    Delete,
    /// A collection was emptied.
    Clear,
}

impl fmt::Display for TrackOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrackOpType::Get => "get",
            TrackOpType::Has => "has",
            TrackOpType::Iterate => "iterate",
        })
    }
}

impl fmt::Display for TriggerOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerOpType::Set => "Set",
            TriggerOpType::Add => "Add",
            TriggerOpType::Delete => "Delete",
            TriggerOpType::Clear => "Clear",
        })
    }
}

/// Key under which a target's dep is registered.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TrackKey {
    /// A record property or sequence slot.
    Prop(PropKey),
    /// A map key or set member.
    Entry(Value),
    /// Whole-object iteration: key enumeration, `in`, collection iteration.
    Iterate,
    /// Iteration over a map's keys only.
    MapKeyIterate,
}

impl TrackKey {
    pub fn length() -> Self {
        TrackKey::Prop(PropKey::length())
    }

    pub(crate) fn as_index(&self) -> Option<usize> {
        match self {
            TrackKey::Prop(p) => p.as_index(),
            _ => None,
        }
    }
}

impl From<PropKey> for TrackKey {
    fn from(key: PropKey) -> Self {
        TrackKey::Prop(key)
    }
}

impl From<&PropKey> for TrackKey {
    fn from(key: &PropKey) -> Self {
        TrackKey::Prop(key.clone())
    }
}

impl From<&str> for TrackKey {
    fn from(key: &str) -> Self {
        TrackKey::Prop(PropKey::from(key))
    }
}

impl From<usize> for TrackKey {
    fn from(index: usize) -> Self {
        TrackKey::Prop(PropKey::Index(index))
    }
}

impl From<Value> for TrackKey {
    fn from(key: Value) -> Self {
        TrackKey::Entry(key)
    }
}

impl fmt::Debug for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKey::Prop(p) => write!(f, "{p}"),
            TrackKey::Entry(v) => write!(f, "{v:?}"),
            TrackKey::Iterate => f.write_str("Symbol(iterate)"),
            TrackKey::MapKeyIterate => f.write_str("Symbol(Map key iterate)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_types_serialize_as_plain_strings() {
        assert_eq!(serde_json::to_string(&TrackOpType::Iterate).unwrap(), "\"iterate\"");
        assert_eq!(serde_json::to_string(&TriggerOpType::Add).unwrap(), "\"add\"");
    }

    #[test]
    fn string_keys_address_sequence_slots() {
        assert_eq!(TrackKey::from("3"), TrackKey::from(3usize));
        assert_eq!(TrackKey::from("3").as_index(), Some(3));
        assert_ne!(TrackKey::Iterate, TrackKey::MapKeyIterate);
        assert_eq!(TrackKey::from("length"), TrackKey::length());
    }
}
