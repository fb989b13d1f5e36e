//! Scripting commands (spec.md §6): `EVAL EVALSHA SCRIPT LOAD/EXISTS/FLUSH
//! FUNCTION LOAD/LIST FCALL`. These only manage script identity bookkeeping
//! and delegate actual execution to `ctx.server.script_engine` — the
//! evaluator itself is an opaque collaborator (spec.md §1 Non-goals),
//! grounded on `script.rs`'s `ScriptEngine` trait.

use bytes::Bytes;

use crate::dispatch::{ok, reply, HandlerCtx, HandlerResult};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::script::{sha1_hex, Script};

fn split_keys_argv(args: &[Bytes], numkeys_idx: usize) -> Result<(&[Bytes], &[Bytes]), RedisError> {
    let numkeys = super::arg_usize(&args[numkeys_idx])?;
    let rest = &args[numkeys_idx + 1..];
    if numkeys > rest.len() {
        return Err(RedisError::generic("Number of keys can't be greater than number of args"));
    }
    Ok(rest.split_at(numkeys))
}

pub fn eval(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let body = args[1].clone();
    let (keys, argv) = split_keys_argv(args, 2)?;
    let sha1 = sha1_hex(&body);
    ctx.server.scripts.entry(sha1.clone()).or_insert_with(|| Script { sha1, body: body.clone() });
    let frame = ctx.server.script_engine.eval(&body, keys, argv)?;
    reply(frame)
}

pub fn evalsha(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sha1 = super::arg_str(&args[1]).to_ascii_lowercase();
    let body = ctx
        .server
        .scripts
        .get(&sha1)
        .map(|script| script.body.clone())
        .ok_or(RedisError::NoScript)?;
    let (keys, argv) = split_keys_argv(args, 2)?;
    let frame = ctx.server.script_engine.eval(&body, keys, argv)?;
    reply(frame)
}

/// `SCRIPT LOAD body | EXISTS sha1 [sha1 ...] | FLUSH [ASYNC|SYNC]`
pub fn script_cmd(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sub = super::arg_str(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "LOAD" => {
            let body = args.get(2).ok_or(RedisError::Syntax)?.clone();
            let sha1 = sha1_hex(&body);
            ctx.server.scripts.insert(sha1.clone(), Script { sha1: sha1.clone(), body });
            reply(Frame::bulk_str(sha1))
        }
        "EXISTS" => {
            let out = args[2..]
                .iter()
                .map(|arg| {
                    let sha1 = super::arg_str(arg).to_ascii_lowercase();
                    Frame::Integer(ctx.server.scripts.contains_key(&sha1) as i64)
                })
                .collect();
            reply(Frame::Array(out))
        }
        "FLUSH" => {
            ctx.server.scripts.clear();
            ok()
        }
        _ => Err(RedisError::UnknownSubcommand(sub, "SCRIPT".into())),
    }
}

/// `FUNCTION LOAD code | LIST`. Redis Functions wrap a script library in a
/// registration shim; since the evaluator itself is out of scope (spec.md
/// §1), this records the library body the same way `SCRIPT LOAD` does and
/// `FCALL` replays it through the same opaque `ScriptEngine`.
pub fn function(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sub = super::arg_str(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "LOAD" => {
            let code = args.last().ok_or(RedisError::Syntax)?.clone();
            let sha1 = sha1_hex(&code);
            ctx.server.scripts.insert(sha1.clone(), Script { sha1: sha1.clone(), body: code });
            reply(Frame::bulk_str(sha1))
        }
        "LIST" => {
            let out = ctx
                .server
                .scripts
                .keys()
                .map(|sha1| Frame::Map(vec![(Frame::bulk_str("library_name"), Frame::bulk_str(sha1.clone()))]))
                .collect();
            reply(Frame::Array(out))
        }
        "DELETE" => {
            let name = args.get(2).ok_or(RedisError::Syntax)?;
            ctx.server.scripts.remove(&super::arg_str(name).to_ascii_lowercase());
            ok()
        }
        "FLUSH" => {
            ctx.server.scripts.clear();
            ok()
        }
        _ => Err(RedisError::UnknownSubcommand(sub, "FUNCTION".into())),
    }
}

pub fn fcall(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sha1 = super::arg_str(&args[1]).to_ascii_lowercase();
    let body = ctx
        .server
        .scripts
        .get(&sha1)
        .map(|script| script.body.clone())
        .ok_or(RedisError::NoScript)?;
    let (keys, argv) = split_keys_argv(args, 2)?;
    let frame = ctx.server.script_engine.eval(&body, keys, argv)?;
    reply(frame)
}
