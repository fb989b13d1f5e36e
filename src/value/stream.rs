//! Stream (spec.md §4.2): an append-only log of `ms-seq` id-tagged entries
//! with named consumer groups and per-consumer pending-entries lists
//! (PELs). `BTreeMap<StreamId, _>` gives the "strictly increasing in
//! lexicographic (ms, seq) order" invariant for free from `Ord`.

use std::collections::BTreeMap;

use bytes::Bytes;

/// `(ms, seq)`. `Ord` is derived field-order, matching Redis's
/// lexicographic `ms` then `seq` comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn next(self) -> StreamId {
        if self.seq == u64::MAX {
            StreamId {
                ms: self.ms + 1,
                seq: 0,
            }
        } else {
            StreamId {
                ms: self.ms,
                seq: self.seq + 1,
            }
        }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

#[derive(Debug, Clone, Default)]
pub struct Consumer {
    pub seen_time_ms: u64,
    pub active_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PelEntry {
    pub consumer: Bytes,
    pub delivery_time_ms: u64,
    pub delivery_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ConsumerGroup {
    pub last_delivered_id: StreamId,
    pub pending: BTreeMap<StreamId, PelEntry>,
    pub consumers: std::collections::HashMap<Bytes, Consumer>,
}

#[derive(Debug, Clone, Default)]
pub struct Stream {
    pub entries: BTreeMap<StreamId, Entry>,
    pub last_id: StreamId,
    pub max_deleted_id: StreamId,
    pub entries_added: u64,
    pub groups: std::collections::HashMap<Bytes, ConsumerGroup>,
}

impl Stream {
    pub fn new() -> Self {
        Stream::default()
    }

    /// Resolve `*` (or a partial `ms-*`) against `last_id`, matching
    /// spec.md §3: `seq` increments when multiple entries share a
    /// millisecond.
    pub fn next_id(&self, now_ms: u64) -> StreamId {
        if now_ms > self.last_id.ms {
            StreamId {
                ms: now_ms,
                seq: 0,
            }
        } else {
            self.last_id.next()
        }
    }

    pub fn append(&mut self, id: StreamId, fields: Vec<(Bytes, Bytes)>) {
        self.entries.insert(id, Entry { id, fields });
        self.last_id = id;
        self.entries_added += 1;
    }

    pub fn delete(&mut self, id: StreamId) -> bool {
        if self.entries.remove(&id).is_some() {
            if id > self.max_deleted_id {
                self.max_deleted_id = id;
            }
            true
        } else {
            false
        }
    }

    pub fn range(&self, start: StreamId, end: StreamId) -> impl Iterator<Item = &Entry> {
        self.entries.range(start..=end).map(|(_, e)| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase_within_the_same_millisecond() {
        let mut s = Stream::new();
        let id1 = s.next_id(100);
        s.append(id1, vec![]);
        let id2 = s.next_id(100);
        assert!(id2 > id1);
        assert_eq!(id2, StreamId { ms: 100, seq: 1 });
    }

    #[test]
    fn ids_reset_sequence_on_a_new_millisecond() {
        let mut s = Stream::new();
        s.append(s.next_id(100), vec![]);
        let id = s.next_id(101);
        assert_eq!(id, StreamId { ms: 101, seq: 0 });
    }
}
