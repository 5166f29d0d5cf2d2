//! # Typed Values
//!
//! Purpose: Represent the five value kinds as a single tagged variant so a
//! key's type tag and its container are the same piece of data — the
//! key-index/container coupling the reference implementation needs a
//! separate structure for disappears by construction.
//!
//! ## Design Principles
//!
//! 1. **Tagged Variant**: One `Value` enum per key, matching on `Kind`
//!    reaches the right container directly, no dynamic dispatch.
//! 2. **Stable Ordinals**: `Kind` values are persisted as-is in the
//!    snapshot format, so their discriminants must stay stable.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// Externally visible value kind, stable across snapshot versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Kind {
    String = 0,
    Hash = 1,
    List = 2,
    Set = 3,
    Zset = 4,
}

impl Kind {
    /// Returns the externally visible type name used by `TYPE`.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::String => "string",
            Kind::Hash => "hash",
            Kind::List => "list",
            Kind::Set => "set",
            Kind::Zset => "zset",
        }
    }
}

/// A key's value: exactly one of the five reserved kinds.
///
/// `Zset` is reserved per the scope note: the container type exists so the
/// tag slot and `TYPE`/`DEL`/`EXPIRE`/`TTL` behave uniformly across it, but
/// no zset-specific commands are implemented against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(HashSet<String>),
    Zset(BTreeMap<OrderedF64, BTreeSet<String>>),
}

impl Value {
    /// Returns the kind tag for this value.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Str(_) => Kind::String,
            Value::Hash(_) => Kind::Hash,
            Value::List(_) => Kind::List,
            Value::Set(_) => Kind::Set,
            Value::Zset(_) => Kind::Zset,
        }
    }
}

/// Total-ordered wrapper around `f64` so zset scores can key a `BTreeMap`.
///
/// NaN scores are never constructed by this crate (there are no zset
/// commands yet to construct them), so the `Ord` impl only has to be total
/// enough for the reserved container to type-check and round-trip through
/// the snapshot format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderedF64(pub f64);

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}
