//! `redis_emu`: an in-process, Redis-wire-protocol-compatible key-value
//! store emulator (spec.md §1), intended as a drop-in substitute for a real
//! Redis instance in tests and local development. The socket I/O loop,
//! real AOF/RDB persistence, cluster/replication, and the Lua evaluator
//! are all external collaborators the engine talks to through traits
//! (`script::ScriptEngine`, `snapshot::Snapshotter`) rather than things
//! this crate implements itself — see `src/bin/server.rs` for a minimal
//! demo of wiring a real `std::net::TcpListener` on top of `Server`.

pub mod blocking;
pub mod clock;
pub mod commands;
pub mod config;
pub mod connection;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod pubsub;
pub mod resp;
pub mod script;
pub mod server;
pub mod snapshot;
pub mod transaction;
pub mod value;

pub use error::{RedisError, RedisResult};
pub use server::{Server, ServerState};
