//! Keyspace / Database (spec.md §4.3): a numbered mapping from key to
//! (value, optional expiry, optional encoding hint), with lazy and active
//! expiration. Generalizes the teacher's `redis/db.rs` (which only had a
//! `HashMap<String, String>` dict/expires skeleton) into the full typed
//! store the rest of the engine needs.

use std::collections::HashMap;

use bytes::Bytes;

use crate::value::Value;

/// One keyspace slot: the value, its absolute-millisecond expiry if any,
/// and the write-version stamped on every successful mutation (spec.md §3,
/// used by `WATCH`).
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub expire_at_ms: Option<u64>,
    pub version: u64,
}

/// Outcome of resolving a key, distinguishing "never existed" from "existed
/// but just expired" so the caller can emit the `expired` keyspace
/// notification exactly once (spec.md §8 invariant).
pub enum Lookup<'a> {
    Hit(&'a Entry),
    Miss,
    JustExpired,
}

#[derive(Default)]
pub struct Database {
    entries: HashMap<Bytes, Entry>,
    /// Global version counter is shared across all databases on the
    /// server (spec.md §3); each `Database` borrows a pointer to it via
    /// `bump_version` called with the server-wide counter by the caller.
    pub id: usize,
}

impl Database {
    pub fn new(id: usize) -> Self {
        Database {
            entries: HashMap::new(),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(entry: &Entry, now_ms: u64) -> bool {
        matches!(entry.expire_at_ms, Some(t) if t <= now_ms)
    }

    /// The single choke point (spec.md §9 design note) lazy-expire checks
    /// pass through. Removes the key if its TTL has passed, returning
    /// `JustExpired` so the caller can emit exactly one notification.
    pub fn lookup(&mut self, key: &[u8], now_ms: u64) -> Lookup<'_> {
        let expired = matches!(self.entries.get(key), Some(e) if Self::is_expired(e, now_ms));
        if expired {
            self.entries.remove(key);
            return Lookup::JustExpired;
        }
        match self.entries.get(key) {
            Some(e) => Lookup::Hit(e),
            None => Lookup::Miss,
        }
    }

    pub fn get(&mut self, key: &[u8], now_ms: u64) -> Option<&Value> {
        match self.lookup(key, now_ms) {
            Lookup::Hit(_) => self.entries.get(key).map(|e| &e.value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &[u8], now_ms: u64) -> Option<&mut Value> {
        match self.lookup(key, now_ms) {
            Lookup::Hit(_) => self.entries.get_mut(key).map(|e| &mut e.value),
            _ => None,
        }
    }

    pub fn contains(&mut self, key: &[u8], now_ms: u64) -> bool {
        self.get(key, now_ms).is_some()
    }

    pub fn entry_mut(&mut self, key: &[u8], now_ms: u64) -> Option<&mut Entry> {
        match self.lookup(key, now_ms) {
            Lookup::Hit(_) => self.entries.get_mut(key),
            _ => None,
        }
    }

    /// Insert/replace a value, stamping the given version. Any existing
    /// TTL is cleared, matching plain `SET`/aggregate-creation semantics;
    /// callers that must preserve TTL (e.g. in-place aggregate pushes) use
    /// `entry_mut` instead.
    pub fn set(&mut self, key: Bytes, value: Value, version: u64) {
        self.entries.insert(
            key,
            Entry {
                value,
                expire_at_ms: None,
                version,
            },
        );
    }

    pub fn set_with_expiry(&mut self, key: Bytes, value: Value, expire_at_ms: Option<u64>, version: u64) {
        self.entries.insert(
            key,
            Entry {
                value,
                expire_at_ms,
                version,
            },
        );
    }

    /// Remove the key if its value is an empty aggregate (spec.md §3
    /// invariant); called by write handlers after mutating an aggregate
    /// in place.
    pub fn remove_if_empty(&mut self, key: &[u8]) {
        let should_remove = matches!(self.entries.get(key), Some(e) if e.value.is_empty_aggregate());
        if should_remove {
            self.entries.remove(key);
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        self.entries.remove(key)
    }

    pub fn rename(&mut self, from: &[u8], to: Bytes, version: u64) -> bool {
        if let Some(mut entry) = self.entries.remove(from) {
            entry.version = version;
            self.entries.insert(to, entry);
            true
        } else {
            false
        }
    }

    pub fn expire_at(&mut self, key: &[u8], at_ms: Option<u64>, version: u64) -> bool {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expire_at_ms = at_ms;
            entry.version = version;
            true
        } else {
            false
        }
    }

    pub fn ttl_ms(&self, key: &[u8], now_ms: u64) -> Option<Option<u64>> {
        self.entries.get(key).map(|e| {
            e.expire_at_ms.map(|at| at.saturating_sub(now_ms))
        })
    }

    pub fn version(&self, key: &[u8]) -> Option<u64> {
        self.entries.get(key).map(|e| e.version)
    }

    pub fn bump_version(&mut self, key: &[u8], version: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.version = version;
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &Bytes> {
        self.entries.keys()
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }

    /// Opportunistic active-expiry sweep: examine up to `sample_size` keys
    /// and evict the expired ones. Not required for correctness (spec.md
    /// §4.3) — lazy expiry on access is the invariant-bearing mechanism.
    /// Returns the keys removed so the caller can emit notifications.
    pub fn active_expire_cycle(&mut self, now_ms: u64, sample_size: usize) -> Vec<Bytes> {
        let expired: Vec<Bytes> = self
            .entries
            .iter()
            .take(sample_size)
            .filter(|(_, e)| Self::is_expired(e, now_ms))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn lazy_expiry_removes_the_key_exactly_once() {
        let mut db = Database::new(0);
        db.set_with_expiry(Bytes::from("k"), Value::String(Bytes::from("v")), Some(100), 1);
        assert!(matches!(db.lookup(b"k", 50), Lookup::Hit(_)));
        assert!(matches!(db.lookup(b"k", 150), Lookup::JustExpired));
        assert!(matches!(db.lookup(b"k", 200), Lookup::Miss));
    }

    #[test]
    fn remove_if_empty_deletes_exhausted_aggregates() {
        let mut db = Database::new(0);
        db.set(Bytes::from("l"), Value::List(Default::default()), 1);
        db.remove_if_empty(b"l");
        assert!(db.get(b"l", 0).is_none());
    }
}
