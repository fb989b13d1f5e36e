//! Blocking Coordinator (spec.md §4.7): wait queues keyed by `(db, key,
//! kind)` for `BLPOP`/`BRPOP`/`BLMOVE`/`BZPOPMIN`/`BZPOPMAX`. Grounded on
//! the teacher's `ClientFlags::blocked()`/`blocking_keys` fields in
//! `redis/client.rs`, generalized from a single boolean flag into the
//! passive-waiter-record design spec.md §9 calls for: "the writer that
//! satisfies the condition synchronously dequeues and completes the
//! waiter", avoiding a condition-variable per key.
//!
//! Because the socket I/O loop is an external collaborator (spec.md §1),
//! a waiter here is a `std::sync::mpsc::Sender` the *connection* owns; the
//! connection loop blocks on the paired `Receiver` with the documented
//! timeout outside of the global server lock. This keeps the core usable
//! synchronously, without an async runtime, exactly as §9 asks.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Sender;

use bytes::Bytes;

/// The family of blocking command a waiter is parked for; determines what
/// `notify_key_ready` re-checks before waking it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitKind {
    List,
    ZSet,
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct WaitQueueKey {
    db_index: usize,
    key: u64, // hashed below; see `Waiters::key_hash`
    kind: WaitKind,
}

/// What a waiter is told once its key becomes ready: which database/key
/// unblocked it, so it can re-run its (tiny) command logic under the same
/// lock that performed the write.
pub struct WakeSignal {
    pub db_index: usize,
    pub key: Bytes,
}

struct Waiter {
    client_id: u64,
    sender: Sender<WakeSignal>,
}

/// Wait queues keyed by `(db, key, kind)`, FIFO per key (spec.md §4.7).
#[derive(Default)]
pub struct Waiters {
    queues: HashMap<(usize, Bytes, WaitKind), VecDeque<Waiter>>,
}

impl Waiters {
    pub fn register(
        &mut self,
        db_index: usize,
        key: Bytes,
        kind: WaitKind,
        client_id: u64,
        sender: Sender<WakeSignal>,
    ) {
        self.queues
            .entry((db_index, key, kind))
            .or_default()
            .push_back(Waiter { client_id, sender });
    }

    /// A write touched `key`; wake the first FIFO waiter, if any. The
    /// caller is expected to have already performed the write under the
    /// server lock, so the woken waiter's recheck (done by the caller
    /// re-running its pop logic) observes a consistent state.
    pub fn notify_key_ready(&mut self, db_index: usize, key: &[u8], kind: WaitKind) -> Option<u64> {
        let queue = self
            .queues
            .get_mut(&(db_index, Bytes::copy_from_slice(key), kind))?;
        while let Some(waiter) = queue.pop_front() {
            let signal = WakeSignal {
                db_index,
                key: Bytes::copy_from_slice(key),
            };
            if waiter.sender.send(signal).is_ok() {
                if queue.is_empty() {
                    self.queues.remove(&(db_index, Bytes::copy_from_slice(key), kind));
                }
                return Some(waiter.client_id);
            }
            // Receiver already gone (client disconnected between register
            // and wakeup); try the next FIFO waiter.
        }
        None
    }

    /// Remove every waiter belonging to `client_id` (spec.md §4.7:
    /// disconnect removes its waiters).
    pub fn remove_client(&mut self, client_id: u64) {
        for queue in self.queues.values_mut() {
            queue.retain(|w| w.client_id != client_id);
        }
        self.queues.retain(|_, q| !q.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn wakes_the_first_fifo_waiter_for_a_key() {
        let mut waiters = Waiters::default();
        let (tx1, rx1) = channel();
        let (tx2, rx2) = channel();
        waiters.register(0, Bytes::from("q"), WaitKind::List, 1, tx1);
        waiters.register(0, Bytes::from("q"), WaitKind::List, 2, tx2);

        let woken = waiters.notify_key_ready(0, b"q", WaitKind::List);
        assert_eq!(woken, Some(1));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn disconnect_removes_its_waiters() {
        let mut waiters = Waiters::default();
        let (tx, _rx) = channel();
        waiters.register(0, Bytes::from("q"), WaitKind::List, 1, tx);
        waiters.remove_client(1);
        assert_eq!(waiters.notify_key_ready(0, b"q", WaitKind::List), None);
    }
}
