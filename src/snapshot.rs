//! Persistence hook (spec.md §6): `SAVE`/`BGSAVE`/`LASTSAVE` invoke an
//! injected snapshotter whose contract is "synchronously or asynchronously
//! produce an opaque snapshot of the entire server state"; `DEBUG RELOAD`
//! round-trips it. spec.md §1 excludes real AOF/RDB disk formats from
//! scope ("persistence to disk (AOF/RDB) beyond an in-memory snapshot
//! hook"), so this is a trait plus an in-memory default rather than a
//! binary-compatible RDB writer — the teacher's `rdb.rs`/`aof.rs` (which
//! targeted byte-for-byte RDB compatibility) have no counterpart here; see
//! DESIGN.md.

use std::sync::Mutex;

/// An opaque, in-process snapshot blob. The default snapshotter never
/// needs to look inside it; a test harness that wants `DEBUG RELOAD` to
/// observe real state can swap in a `Snapshotter` that serializes the
/// keyspace.
pub type Snapshot = Vec<u8>;

pub trait Snapshotter: Send {
    fn save(&mut self, data: Snapshot);
    fn load(&self) -> Option<Snapshot>;
}

/// Keeps the most recent snapshot in memory; good enough for `DEBUG
/// RELOAD` round-trip tests without touching disk.
#[derive(Default)]
pub struct MemorySnapshotter {
    last: Mutex<Option<Snapshot>>,
    last_save_at_ms: Mutex<u64>,
}

impl MemorySnapshotter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_save_time(&self, now_ms: u64) {
        *self.last_save_at_ms.lock().unwrap() = now_ms;
    }

    pub fn last_save_unix_seconds(&self) -> u64 {
        *self.last_save_at_ms.lock().unwrap() / 1000
    }
}

impl Snapshotter for MemorySnapshotter {
    fn save(&mut self, data: Snapshot) {
        *self.last.lock().unwrap() = Some(data);
    }

    fn load(&self) -> Option<Snapshot> {
        self.last.lock().unwrap().clone()
    }
}
