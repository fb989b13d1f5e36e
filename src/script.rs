//! Scripting interface (spec.md §6): `EVAL`/`EVALSHA`/`FUNCTION` hand a
//! script body plus `KEYS`/`ARGV` to an opaque evaluator. spec.md §1
//! explicitly excludes the evaluator itself ("embedded scripting
//! evaluator (treated as an opaque sandboxed interpreter whose only
//! contract is described in §6)") from this crate's scope, so this module
//! is a trait plus a default that reports the documented errors — no Lua
//! (or other) interpreter crate is added, since nothing in the retrieval
//! pack grounds one.

use bytes::Bytes;
use sha1::{Digest, Sha1};

use crate::error::{RedisError, RedisResult};

/// A registered script, keyed by its SHA1 (spec.md §3 Server State).
#[derive(Debug, Clone)]
pub struct Script {
    pub sha1: String,
    pub body: Bytes,
}

/// The scripted-call contract (spec.md §6): bypasses `AUTH`, forbids
/// blocking, runs in the caller's database selection.
pub trait ScriptEngine: Send {
    fn eval(&mut self, body: &[u8], keys: &[Bytes], argv: &[Bytes]) -> RedisResult<crate::resp::Frame>;
}

/// Default engine: every script load succeeds (so `SCRIPT LOAD`/`EXISTS`
/// bookkeeping works end to end), but `EVAL`/`EVALSHA`/`FCALL` report that
/// no evaluator is wired in, matching the "opaque external collaborator"
/// contract rather than silently pretending to execute Lua.
#[derive(Default)]
pub struct NullScriptEngine;

impl ScriptEngine for NullScriptEngine {
    fn eval(&mut self, _body: &[u8], _keys: &[Bytes], _argv: &[Bytes]) -> RedisResult<crate::resp::Frame> {
        Err(RedisError::generic(
            "scripting is not available: no ScriptEngine was configured",
        ))
    }
}

pub fn sha1_hex(data: &[u8]) -> String {
    let digest = Sha1::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_matches_known_vector() {
        // SHA1("abc") is a standard published test vector.
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89");
    }

    #[test]
    fn null_engine_reports_no_evaluator() {
        let mut engine = NullScriptEngine;
        assert!(engine.eval(b"return 1", &[], &[]).is_err());
    }
}
