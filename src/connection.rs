//! Connection State (spec.md §3), generalizing the teacher's
//! `redis/client.rs` `RedisClient` struct (fd, db, argv, flags, mstate,
//! blocking_keys, …) into the engine's typed per-connection record. The
//! socket itself is owned by the external I/O loop (spec.md §1); this
//! struct is everything the dispatcher needs to know about the client
//! issuing the current command.

use std::collections::HashSet;

use bytes::Bytes;

use crate::resp::ProtoVer;
use crate::transaction::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    On,
    Off,
    Skip,
}

pub struct ConnectionState {
    pub client_id: u64,
    pub db_index: usize,
    pub authenticated: bool,
    pub name: Option<Bytes>,
    pub proto: ProtoVer,
    pub reply_mode: ReplyMode,
    pub subscribed_channels: HashSet<Bytes>,
    pub subscribed_patterns: HashSet<Bytes>,
    pub transaction: Transaction,
    pub closing: bool,
}

impl ConnectionState {
    pub fn new(client_id: u64, requires_auth: bool) -> Self {
        ConnectionState {
            client_id,
            db_index: 0,
            authenticated: !requires_auth,
            name: None,
            proto: ProtoVer::Resp2,
            reply_mode: ReplyMode::On,
            subscribed_channels: HashSet::new(),
            subscribed_patterns: HashSet::new(),
            transaction: Transaction::default(),
            closing: false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        !self.subscribed_channels.is_empty() || !self.subscribed_patterns.is_empty()
    }
}
