//! Transaction Coordinator (spec.md §4.6): per-connection `WATCH`/`MULTI`/
//! `EXEC`/`DISCARD` state plus key-version tracking. Generalizes the
//! teacher's `MultiState`/`MultiCmd` skeleton in `redis/client.rs` (whose
//! `exec_command`/`discard_command` were both `todo!()`) into a working
//! state machine.

use bytes::Bytes;

/// Connection transaction state (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Normal,
    Queuing,
    /// A syntax/arity error occurred while queuing; `EXEC` will abort.
    Dirty,
}

/// One command captured while `QUEUING`, ready to replay atomically at
/// `EXEC`.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub args: Vec<Bytes>,
}

#[derive(Debug, Clone, Copy)]
pub struct WatchedKey {
    pub db_index: usize,
    pub version: u64,
}

#[derive(Default)]
pub struct Transaction {
    pub state_flag: Option<TxState>,
    pub queue: Vec<QueuedCommand>,
    pub watches: Vec<(Bytes, WatchedKey)>,
}

impl Transaction {
    pub fn state(&self) -> TxState {
        self.state_flag.unwrap_or(TxState::Normal)
    }

    pub fn is_active(&self) -> bool {
        self.state_flag.is_some()
    }

    pub fn begin(&mut self) {
        self.state_flag = Some(TxState::Normal);
        // A fresh MULTI starts with an empty queue but is otherwise
        // "queuing" from the dispatcher's point of view; `state()` reports
        // `Normal` only before `MULTI` is ever called.
        self.queue.clear();
    }

    pub fn is_queuing(&self) -> bool {
        matches!(self.state_flag, Some(TxState::Queuing) | Some(TxState::Dirty))
    }

    pub fn enqueue(&mut self, args: Vec<Bytes>) {
        self.queue.push(QueuedCommand { args });
    }

    pub fn mark_dirty(&mut self) {
        self.state_flag = Some(TxState::Dirty);
    }

    pub fn watch(&mut self, key: Bytes, db_index: usize, version: u64) {
        self.watches.push((key, WatchedKey { db_index, version }));
    }

    pub fn clear_watches(&mut self) {
        self.watches.clear();
    }

    pub fn reset(&mut self) {
        self.state_flag = None;
        self.queue.clear();
        self.watches.clear();
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.state_flag, Some(TxState::Dirty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_transaction_is_not_active() {
        let tx = Transaction::default();
        assert!(!tx.is_active());
    }

    #[test]
    fn begin_then_enqueue_then_reset() {
        let mut tx = Transaction::default();
        tx.begin();
        tx.state_flag = Some(TxState::Queuing);
        tx.enqueue(vec![Bytes::from("INCR"), Bytes::from("x")]);
        assert_eq!(tx.queue.len(), 1);
        tx.reset();
        assert!(!tx.is_active());
        assert!(tx.queue.is_empty());
    }
}
