//! # Keyspace Entry
//!
//! Purpose: Pair a typed value with its optional expiration deadline. This
//! is the unit the keyspace map stores per key and the unit the snapshot
//! engine serializes.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A single keyspace entry: a typed value plus an optional absolute
/// expiration deadline (Unix-epoch seconds; `None` means no expiration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<i64>,
}

impl Entry {
    /// Wraps a value with no expiration set.
    pub fn new(value: Value) -> Self {
        Entry {
            value,
            expires_at: None,
        }
    }

    /// Returns true if this entry's deadline has passed as of `now`
    /// (Unix-epoch seconds). Entries with no deadline never expire.
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}
