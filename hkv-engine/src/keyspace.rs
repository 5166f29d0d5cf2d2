//! # Typed Keyspace
//!
//! Purpose: The single logical namespace binding each key to exactly one
//! value kind. A key's presence in the map *is* the key-index entry and its
//! `Value` variant *is* the type tag, so the "key appears in exactly one
//! container" invariant from the reference data model holds by
//! construction rather than by bookkeeping across separate structures.
//!
//! ## Design Principles
//!
//! 1. **Single Owner, One Lock**: All reads and writes go through one
//!    `parking_lot::RwLock`, so a command's "first byte read" to "last reply
//!    byte queued" never interleaves with another command's mutation.
//! 2. **Lazy + Active Expiration**: Every read path also checks the current
//!    entry's deadline and purges it if due, independent of whether the
//!    background timer task has fired yet.
//! 3. **Direct Dispatch**: Each command maps to one typed method here; there
//!    is no generic "engine trait" indirection to reach the right
//!    container.

use std::collections::{HashSet, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;

use hkv_common::{HkvError, HkvResult};

use crate::entry::Entry;
use crate::value::Value;

/// TTL query result, mirroring the wire-visible `-2`/`-1`/non-negative
/// encoding `TTL` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// Key does not exist (or just expired).
    Missing,
    /// Key exists but has no expiration set.
    NoExpiry,
    /// Key expires in the given number of seconds (non-negative, rounded).
    Remaining(i64),
}

/// Returns the current Unix-epoch time in whole seconds.
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

struct Inner {
    map: HashMap<String, Entry, RandomState>,
    modifications: u64,
}

/// The typed, single-owner keyspace shared by every connection's dispatcher.
pub struct Keyspace {
    inner: RwLock<Inner>,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    /// Creates an empty keyspace.
    pub fn new() -> Self {
        Keyspace {
            inner: RwLock::new(Inner {
                map: HashMap::with_hasher(RandomState::new()),
                modifications: 0,
            }),
        }
    }

    /// Rebuilds a keyspace from a restored snapshot image. Entries whose
    /// deadline has already passed are dropped rather than kept around to
    /// be lazily purged later, matching the "Rehydrate" contract's
    /// immediate-delete half.
    pub fn from_entries(entries: HashMap<String, Entry, RandomState>) -> Self {
        let now = now_epoch();
        let map: HashMap<String, Entry, RandomState> = entries
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .collect();
        Keyspace {
            inner: RwLock::new(Inner {
                map,
                modifications: 0,
            }),
        }
    }

    /// Returns the number of mutations recorded since the last reset.
    pub fn modifications(&self) -> u64 {
        self.inner.read().modifications
    }

    /// Resets the modification counter to zero, returning its prior value.
    pub fn reset_modifications(&self) -> u64 {
        let mut inner = self.inner.write();
        std::mem::replace(&mut inner.modifications, 0)
    }

    /// Clones every live entry for snapshotting. Takes only a read lock, so
    /// background saves never block command dispatch for the whole write.
    pub fn snapshot_entries(&self) -> HashMap<String, Entry, RandomState> {
        let inner = self.inner.read();
        inner.map.clone()
    }

    // ---- generic operations -------------------------------------------------

    /// `KEYS <pattern>`: returns every live key matching the glob pattern.
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        purge_expired(&mut inner, now);
        inner
            .map
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect()
    }

    /// `DEL <k1> <k2> ...`: removes each key, returns the count removed.
    pub fn del(&self, keys: &[String]) -> i64 {
        let now = now_epoch();
        let mut inner = self.inner.write();
        let mut removed = 0i64;
        for key in keys {
            if let Some(entry) = inner.map.remove(key) {
                if !entry.is_expired_at(now) {
                    removed += 1;
                }
            }
        }
        inner.modifications += removed as u64;
        removed
    }

    /// `TYPE <k>`: returns the kind name, or `none` for an absent key.
    pub fn type_of(&self, key: &str) -> &'static str {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            Some(entry) => entry.value.kind().as_str(),
            None => "none",
        }
    }

    /// `EXPIRE <k> <seconds>`: sets the deadline. Returns `true` if the key
    /// exists and the deadline was set, `false` if the key is absent.
    pub fn set_expire(&self, key: &str, seconds: i64) -> bool {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + seconds);
                true
            }
            None => false,
        }
    }

    /// `PERSIST <k>`: clears the deadline if one is set. Returns `true` if a
    /// deadline was removed.
    pub fn persist(&self, key: &str) -> bool {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            Some(entry) if entry.expires_at.is_some() => {
                entry.expires_at = None;
                true
            }
            _ => false,
        }
    }

    /// `TTL <k>`.
    pub fn ttl(&self, key: &str) -> TtlStatus {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => TtlStatus::Missing,
            Some(entry) => match entry.expires_at {
                None => TtlStatus::NoExpiry,
                Some(deadline) => TtlStatus::Remaining((deadline - now).max(0)),
            },
        }
    }

    /// Returns the current deadline for a key, if any, without mutating
    /// anything. Used by the expiration timer set to detect races between
    /// a cancelled/replaced deadline and a task that already fired.
    pub fn current_deadline(&self, key: &str) -> Option<i64> {
        self.inner.read().map.get(key).and_then(|e| e.expires_at)
    }

    /// Returns every key with a live deadline. Used once at startup to
    /// rehydrate the expiration timer set after restoring a snapshot.
    pub fn deadlines(&self) -> Vec<(String, i64)> {
        self.inner
            .read()
            .map
            .iter()
            .filter_map(|(key, entry)| entry.expires_at.map(|deadline| (key.clone(), deadline)))
            .collect()
    }

    /// Deletes `key` only if its current deadline still equals `expected`.
    /// Used by a firing timer task to avoid deleting a key whose deadline
    /// was cancelled or replaced after the task was scheduled.
    pub fn delete_if_deadline_is(&self, key: &str, expected: i64) -> bool {
        let mut inner = self.inner.write();
        let matches = matches!(inner.map.get(key), Some(e) if e.expires_at == Some(expected));
        if matches {
            inner.map.remove(key);
            inner.modifications += 1;
        }
        matches
    }

    // ---- strings --------------------------------------------------------

    /// `SET k v [EX s]`. Always overwrites whatever kind previously
    /// occupied `key`, matching real-world `SET` semantics; no WRONGTYPE
    /// check applies because `SET` replaces the whole value rather than
    /// mutating in place.
    pub fn set_string(&self, key: String, value: String, ttl_secs: Option<i64>) {
        let mut inner = self.inner.write();
        let expires_at = ttl_secs.map(|secs| now_epoch() + secs);
        inner.map.insert(key, Entry { value: Value::Str(value), expires_at });
        inner.modifications += 1;
    }

    /// `MSET k1 v1 ...`. Every pair clears any prior TTL, matching `SET`.
    pub fn mset(&self, pairs: Vec<(String, String)>) {
        let mut inner = self.inner.write();
        let count = pairs.len() as u64;
        for (key, value) in pairs {
            inner.map.insert(key, Entry::new(Value::Str(value)));
        }
        inner.modifications += count;
    }

    /// `GET k`: strict about type — a non-string key is `WRONGTYPE`.
    pub fn get_string(&self, key: &str) -> HkvResult<Option<String>> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                _ => Err(HkvError::WrongType),
            },
        }
    }

    /// `MGET k1 ...`: lenient about type, like real `MGET` — a key holding
    /// a non-string value renders as `nil` alongside a genuinely missing
    /// key, rather than failing the whole batch.
    pub fn mget(&self, keys: &[String]) -> Vec<Option<String>> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        keys.iter()
            .map(|key| match live_entry_mut(&mut inner, key, now) {
                Some(entry) => match &entry.value {
                    Value::Str(s) => Some(s.clone()),
                    _ => None,
                },
                None => None,
            })
            .collect()
    }

    // ---- hashes -----------------------------------------------------------

    /// `HSET`/`HMSET k f1 v1 ...`: creates the hash if absent, overwrites
    /// fields if present. WRONGTYPE if `key` holds a non-hash value.
    pub fn hset(&self, key: &str, fields: Vec<(String, String)>) -> HkvResult<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        let map = match &mut entry.value {
            Value::Hash(map) => map,
            _ => return Err(HkvError::WrongType),
        };
        let count = fields.len() as u64;
        for (field, value) in fields {
            map.insert(field, value);
        }
        inner.modifications += count;
        Ok(())
    }

    /// `HGET`/`HMGET k f1 ...`: WRONGTYPE if `key` holds a non-hash value;
    /// missing fields render as `nil`; a missing key renders all fields nil.
    pub fn hget(&self, key: &str, fields: &[String]) -> HkvResult<Vec<Option<String>>> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Ok(vec![None; fields.len()]),
            Some(entry) => match &entry.value {
                Value::Hash(map) => Ok(fields.iter().map(|f| map.get(f).cloned()).collect()),
                _ => Err(HkvError::WrongType),
            },
        }
    }

    /// `HLEN k`.
    pub fn hlen(&self, key: &str) -> HkvResult<i64> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Hash(map) => Ok(map.len() as i64),
                _ => Err(HkvError::WrongType),
            },
        }
    }

    /// `HKEYS k`.
    pub fn hkeys(&self, key: &str) -> HkvResult<Vec<String>> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Hash(map) => Ok(map.keys().cloned().collect()),
                _ => Err(HkvError::WrongType),
            },
        }
    }

    /// `HGETALL k`: field/value pairs, field ordering not observable.
    pub fn hgetall(&self, key: &str) -> HkvResult<Vec<(String, String)>> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Hash(map) => {
                    Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                }
                _ => Err(HkvError::WrongType),
            },
        }
    }

    // ---- lists --------------------------------------------------------------

    /// `LPUSH k v1 ...`: each value is pushed to the head in argument
    /// order, so the last argument ends up at index 0.
    pub fn lpush(&self, key: &str, values: Vec<String>) -> HkvResult<i64> {
        let mut inner = self.inner.write();
        let entry = inner
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        let list = match &mut entry.value {
            Value::List(list) => list,
            _ => return Err(HkvError::WrongType),
        };
        let count = values.len() as u64;
        for value in values {
            list.push_front(value);
        }
        let len = list.len() as i64;
        inner.modifications += count;
        Ok(len)
    }

    /// `RPUSH k v1 ...`: each value is appended to the tail in argument
    /// order, so the last argument ends up at the tail.
    pub fn rpush(&self, key: &str, values: Vec<String>) -> HkvResult<i64> {
        let mut inner = self.inner.write();
        let entry = inner
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        let list = match &mut entry.value {
            Value::List(list) => list,
            _ => return Err(HkvError::WrongType),
        };
        let count = values.len() as u64;
        for value in values {
            list.push_back(value);
        }
        let len = list.len() as i64;
        inner.modifications += count;
        Ok(len)
    }

    /// `LPOP k`: removes and returns the head, or `nil` if empty/missing.
    /// A list emptied by this call is removed from the keyspace entirely.
    pub fn lpop(&self, key: &str) -> HkvResult<Option<String>> {
        self.list_pop(key, true)
    }

    /// `RPOP k`: removes and returns the tail (the corrected behavior from
    /// the Open Questions — the original source's later iteration also
    /// pops the tail for `RPOP`).
    pub fn rpop(&self, key: &str) -> HkvResult<Option<String>> {
        self.list_pop(key, false)
    }

    fn list_pop(&self, key: &str, from_head: bool) -> HkvResult<Option<String>> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        let popped = match live_entry_mut(&mut inner, key, now) {
            None => return Ok(None),
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    if from_head {
                        list.pop_front()
                    } else {
                        list.pop_back()
                    }
                }
                _ => return Err(HkvError::WrongType),
            },
        };
        if popped.is_some() {
            inner.modifications += 1;
            let now_empty = matches!(
                inner.map.get(key),
                Some(Entry { value: Value::List(list), .. }) if list.is_empty()
            );
            if now_empty {
                inner.map.remove(key);
            }
        }
        Ok(popped)
    }

    /// `LLEN k`.
    pub fn llen(&self, key: &str) -> HkvResult<i64> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list.len() as i64),
                _ => Err(HkvError::WrongType),
            },
        }
    }

    /// `LINDEX k i`: supports negative indices (counted from the tail).
    pub fn lindex(&self, key: &str, index: i64) -> HkvResult<Option<String>> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(resolve_index(list.len(), index)
                    .and_then(|idx| list.get(idx))
                    .cloned()),
                _ => Err(HkvError::WrongType),
            },
        }
    }

    /// `LSET k i v`: overwrites in place. `NotFound` if the key is absent,
    /// `IndexOutOfRange` if the index doesn't resolve.
    pub fn lset(&self, key: &str, index: i64, value: String) -> HkvResult<()> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Err(HkvError::NotFound),
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    let idx = resolve_index(list.len(), index).ok_or(HkvError::IndexOutOfRange)?;
                    list[idx] = value;
                    inner.modifications += 1;
                    Ok(())
                }
                _ => Err(HkvError::WrongType),
            },
        }
    }

    // ---- sets ---------------------------------------------------------------

    /// `SADD k m1 ...`: returns the number of members newly added.
    pub fn sadd(&self, key: &str, members: Vec<String>) -> HkvResult<i64> {
        let mut inner = self.inner.write();
        let entry = inner
            .map
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        let set = match &mut entry.value {
            Value::Set(set) => set,
            _ => return Err(HkvError::WrongType),
        };
        let mut added = 0i64;
        for member in members {
            if set.insert(member) {
                added += 1;
            }
        }
        inner.modifications += added as u64;
        Ok(added)
    }

    /// `SREM k m1 ...`: returns the number of members actually removed.
    pub fn srem(&self, key: &str, members: &[String]) -> HkvResult<i64> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Ok(0),
            Some(entry) => match &mut entry.value {
                Value::Set(set) => {
                    let mut removed = 0i64;
                    for member in members {
                        if set.remove(member) {
                            removed += 1;
                        }
                    }
                    if set.is_empty() {
                        inner.map.remove(key);
                    }
                    inner.modifications += removed as u64;
                    Ok(removed)
                }
                _ => Err(HkvError::WrongType),
            },
        }
    }

    /// `SPOP k`: removes and returns an arbitrary member, or `nil` if empty.
    pub fn spop(&self, key: &str) -> HkvResult<Option<String>> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        let popped = match live_entry_mut(&mut inner, key, now) {
            None => return Ok(None),
            Some(entry) => match &mut entry.value {
                Value::Set(set) => {
                    let member = set.iter().next().cloned();
                    if let Some(member) = &member {
                        set.remove(member);
                    }
                    member
                }
                _ => return Err(HkvError::WrongType),
            },
        };
        if popped.is_some() {
            inner.modifications += 1;
            let now_empty = matches!(
                inner.map.get(key),
                Some(Entry { value: Value::Set(set), .. }) if set.is_empty()
            );
            if now_empty {
                inner.map.remove(key);
            }
        }
        Ok(popped)
    }

    /// `SCARD k`.
    pub fn scard(&self, key: &str) -> HkvResult<i64> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.len() as i64),
                _ => Err(HkvError::WrongType),
            },
        }
    }

    /// `SMEMBERS k`.
    pub fn smembers(&self, key: &str) -> HkvResult<Vec<String>> {
        let now = now_epoch();
        let mut inner = self.inner.write();
        match live_entry_mut(&mut inner, key, now) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(HkvError::WrongType),
            },
        }
    }
}

/// Resolves a Redis-style (possibly negative) index against a length.
/// Returns `None` if the resolved index is out of range.
fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let resolved = if index < 0 {
        let from_tail = (-index) as usize;
        if from_tail > len {
            return None;
        }
        len - from_tail
    } else {
        index as usize
    };
    if resolved < len {
        Some(resolved)
    } else {
        None
    }
}

/// Looks up `key`, purging it first if its deadline has passed. Returns
/// `None` for an absent or just-expired key. Counts an active-purge
/// deletion as a mutation, matching the timer's "expiration counts as a
/// mutation" rule.
fn live_entry_mut<'a>(inner: &'a mut Inner, key: &str, now: i64) -> Option<&'a mut Entry> {
    let expired = matches!(inner.map.get(key), Some(entry) if entry.is_expired_at(now));
    if expired {
        inner.map.remove(key);
        inner.modifications += 1;
        return None;
    }
    inner.map.get_mut(key)
}

fn purge_expired(inner: &mut Inner, now: i64) {
    let expired: Vec<String> = inner
        .map
        .iter()
        .filter(|(_, entry)| entry.is_expired_at(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        inner.map.remove(key);
    }
    inner.modifications += expired.len() as u64;
}

/// Glob match: `*` matches any run of characters (including zero); no `?`
/// or character classes. Ported from the reference implementation's
/// two-pointer scan over Unicode scalar values.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = candidate.chars().collect();
    let mut i = 0usize;
    let mut j = 0usize;

    while i < p.len() && j < s.len() {
        if p[i] == '*' {
            i += 1;
        } else if p[i] != s[j] {
            j += 1;
        } else {
            i += 1;
            j += 1;
        }
    }

    if !p[i..].iter().all(|&c| c == '*') {
        return false;
    }
    if j != s.len() && p.last() != Some(&'*') {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_gate_blocks_wrong_kind() {
        let ks = Keyspace::new();
        ks.set_string("a".into(), "b".into(), None);
        assert!(matches!(ks.hget("a", &["f".into()]), Err(HkvError::WrongType)));
    }

    #[test]
    fn list_head_and_tail() {
        let ks = Keyspace::new();
        let len = ks.rpush("L", vec!["x".into(), "y".into(), "z".into()]).unwrap();
        assert_eq!(len, 3);
        assert_eq!(ks.lpop("L").unwrap(), Some("x".into()));
        assert_eq!(ks.rpop("L").unwrap(), Some("z".into()));
        assert_eq!(ks.llen("L").unwrap(), 1);
    }

    #[test]
    fn lpush_last_argument_ends_at_head() {
        let ks = Keyspace::new();
        ks.lpush("L", vec!["x".into(), "y".into(), "z".into()]).unwrap();
        assert_eq!(ks.lindex("L", 0).unwrap(), Some("z".into()));
        assert_eq!(ks.lindex("L", -1).unwrap(), Some("x".into()));
    }

    #[test]
    fn empty_list_removes_key() {
        let ks = Keyspace::new();
        ks.rpush("L", vec!["x".into()]).unwrap();
        ks.lpop("L").unwrap();
        assert_eq!(ks.type_of("L"), "none");
    }

    #[test]
    fn persist_cancels_ttl_lookup() {
        let ks = Keyspace::new();
        ks.set_string("k".into(), "v".into(), None);
        assert!(ks.set_expire("k", 100));
        assert!(ks.persist("k"));
        assert_eq!(ks.ttl("k"), TtlStatus::NoExpiry);
    }

    #[test]
    fn glob_matches_prefix_star() {
        assert!(glob_match("user:*", "user:1"));
        assert!(glob_match("user:*", "user:2"));
        assert!(!glob_match("user:*", "admin"));
    }

    #[test]
    fn mset_then_mget_roundtrip() {
        let ks = Keyspace::new();
        ks.mset(vec![("a".into(), "1".into()), ("b".into(), "2".into())]);
        assert_eq!(
            ks.mget(&["a".into(), "b".into()]),
            vec![Some("1".into()), Some("2".into())]
        );
    }

    #[test]
    fn lset_out_of_range_errors() {
        let ks = Keyspace::new();
        ks.rpush("L", vec!["a".into()]).unwrap();
        assert!(matches!(ks.lset("L", 5, "x".into()), Err(HkvError::IndexOutOfRange)));
    }

    #[test]
    fn negative_index_counts_from_tail() {
        let ks = Keyspace::new();
        ks.rpush("L", vec!["a".into(), "b".into(), "c".into()]).unwrap();
        assert_eq!(ks.lindex("L", -1).unwrap(), Some("c".into()));
        assert_eq!(ks.lindex("L", -3).unwrap(), Some("a".into()));
        assert_eq!(ks.lindex("L", -4).unwrap(), None);
    }
}
