//! Value Model (spec.md §4.2): a tagged union of the supported value
//! kinds. Replaces the teacher's `redis/obj.rs` `RedisObject` enum (which
//! only had `String`/`List`/`Set`/`ZSet`/`Hash` stub variants) with a
//! fully worked-out variant per kind plus the per-kind algorithms its
//! handlers need.

pub mod bitmap;
pub mod geo;
pub mod hyperloglog;
pub mod stream;
pub mod string;
pub mod zset;

use std::collections::{HashMap, HashSet, VecDeque};

use bytes::Bytes;

pub use stream::Stream;
pub use zset::ZSet;

/// A key holds exactly one of these kinds at a time (spec.md §3).
#[derive(Debug, Clone)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(HashSet<Bytes>),
    ZSet(ZSet),
    Stream(Stream),
}

/// The name `TYPE` and `WRONGTYPE` checks report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    List,
    Hash,
    Set,
    ZSet,
    Stream,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Hash(_) => ValueKind::Hash,
            Value::Set(_) => ValueKind::Set,
            Value::ZSet(_) => ValueKind::ZSet,
            Value::Stream(_) => ValueKind::Stream,
        }
    }

    /// Empty aggregate values do not exist (spec.md §3 Invariants), except
    /// Streams which persist so consumer groups can still reference them.
    pub fn is_empty_aggregate(&self) -> bool {
        match self {
            Value::String(_) | Value::Stream(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::ZSet(z) => z.is_empty(),
        }
    }
}

impl ValueKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::List => "list",
            ValueKind::Hash => "hash",
            ValueKind::Set => "set",
            ValueKind::ZSet => "zset",
            ValueKind::Stream => "stream",
        }
    }
}
