//! Error taxonomy, mirrored to the RESP `-PREFIX message` line a client sees.
//!
//! Grounded on `valkum-redis-rs`'s and `Nikiloyden-hitbox`'s use of
//! `thiserror` for library error types; replaces the teacher's ad hoc
//! `String` errors (see the old `redis/cmd.rs` `Result<(), String>` get
//! handlers) with a typed enum the dispatcher can map in one place.

use thiserror::Error;

/// One variant per row of spec.md §7's error taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RedisError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR {0}")]
    Generic(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR unknown command '{0}', with args beginning with: {1}")]
    UnknownCommand(String, String),

    #[error("ERR unknown subcommand or wrong number of arguments for '{0}'. Try {1} HELP.")]
    UnknownSubcommand(String, String),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR value is not a valid float")]
    NotAFloat,

    #[error("ERR increment would overflow")]
    IncrOverflow,

    #[error("ERR min or max not valid string range item")]
    InvalidLexRange,

    #[error("ERR min or max not valid float")]
    InvalidScoreRange,

    #[error("ERR index out of range")]
    IndexOutOfRange,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR source and destination objects are the same")]
    SameObject,

    #[error("NOSCRIPT No matching script. Please use EVAL.")]
    NoScript,

    #[error("BUSYGROUP Consumer Group name already exists")]
    BusyGroup,

    #[error("NOGROUP No such key '{0}' or consumer group '{1}'")]
    NoGroup(String, String),

    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,

    #[error("ERR WATCH inside MULTI is not allowed")]
    WatchInsideMulti,

    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAbort,

    #[error("ERR {0} is not allowed in transactions")]
    NotAllowedInTransaction(String),

    #[error("NOAUTH Authentication required.")]
    NoAuth,

    #[error("WRONGPASS invalid username-password pair or user is disabled.")]
    WrongPass,

    #[error("NOPERM this user has no permissions to run this command")]
    NoPerm,

    #[error("ERR This instance has pub/sub clients bound to specific shard channels")]
    PubSubContext,

    #[error("ERR only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT / RESET are allowed in this context")]
    SubscribeContext,

    #[error("NOPROTO unsupported protocol version")]
    NoProto,

    #[error("ERR Protocol error: {0}")]
    Protocol(String),
}

impl RedisError {
    /// The RESP error prefix (the token right after `-`), used by callers
    /// that want to branch on error class without matching the full enum.
    pub fn prefix(&self) -> &'static str {
        match self {
            RedisError::WrongType => "WRONGTYPE",
            RedisError::NoScript => "NOSCRIPT",
            RedisError::BusyGroup => "BUSYGROUP",
            RedisError::NoGroup(..) => "NOGROUP",
            RedisError::ExecAbort => "EXECABORT",
            RedisError::NoAuth => "NOAUTH",
            RedisError::WrongPass => "WRONGPASS",
            RedisError::NoPerm => "NOPERM",
            RedisError::NoProto => "NOPROTO",
            _ => "ERR",
        }
    }

    pub fn generic(msg: impl Into<String>) -> Self {
        RedisError::Generic(msg.into())
    }
}

pub type RedisResult<T> = Result<T, RedisError>;
