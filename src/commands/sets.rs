//! Set commands (spec.md §4.5): `SADD SREM SISMEMBER SMISMEMBER SCARD
//! SMEMBERS SPOP SRANDMEMBER SMOVE SUNION SUNIONSTORE SINTER SINTERSTORE
//! SDIFF SDIFFSTORE SINTERCARD SSCAN`.

use std::collections::HashSet;

use bytes::Bytes;
use rand::seq::IteratorRandom;
use rand::Rng;

use super::{arg_i64, arg_usize, typed_get, typed_get_mut};
use crate::dispatch::{ok, reply, HandlerCtx, HandlerResult};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::value::{Value, ValueKind};

fn ensure_set<'a>(ctx: &'a mut HandlerCtx, key: &Bytes) -> Result<&'a mut HashSet<Bytes>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let db = &mut ctx.server.databases[db_index];
    if typed_get(db, key, now_ms, ValueKind::Set)?.is_none() {
        db.set(key.clone(), Value::Set(HashSet::new()), 0);
    }
    match db.get_mut(key, now_ms) {
        Some(Value::Set(s)) => Ok(s),
        _ => unreachable!(),
    }
}

fn with_set<'a>(ctx: &'a mut HandlerCtx, key: &[u8]) -> Result<Option<&'a HashSet<Bytes>>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    match typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::Set)? {
        Some(Value::Set(s)) => Ok(Some(s)),
        _ => Ok(None),
    }
}

fn materialize(ctx: &mut HandlerCtx, key: &[u8]) -> Result<HashSet<Bytes>, RedisError> {
    Ok(with_set(ctx, key)?.cloned().unwrap_or_default())
}

pub fn sadd(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let mut added = 0i64;
    {
        let s = ensure_set(ctx, key)?;
        for m in &args[2..] {
            if s.insert(m.clone()) {
                added += 1;
            }
        }
    }
    if added > 0 {
        let version = ctx.next_version();
        let db_index = ctx.db_index();
        ctx.server.databases[db_index].bump_version(key, version);
        ctx.bump_dirty();
        ctx.notify('s', "sadd", key);
    } else {
        ctx.server.databases[ctx.db_index()].remove_if_empty(key);
    }
    reply(Frame::Integer(added))
}

pub fn srem(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let removed = match typed_get_mut(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::Set)? {
        Some(Value::Set(s)) => args[2..].iter().filter(|m| s.remove(m.as_ref())).count(),
        _ => 0,
    };
    if removed > 0 {
        ctx.server.databases[db_index].remove_if_empty(key);
        let version = ctx.next_version();
        ctx.server.databases[db_index].bump_version(key, version);
        ctx.bump_dirty();
        ctx.notify('s', "srem", key);
    }
    reply(Frame::Integer(removed as i64))
}

pub fn sismember(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let is = with_set(ctx, &args[1])?.map(|s| s.contains(&args[2])).unwrap_or(false);
    reply(Frame::Integer(is as i64))
}

pub fn smismember(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let members = &args[2..];
    let frames = match with_set(ctx, &args[1])? {
        Some(s) => members.iter().map(|m| Frame::Integer(s.contains(m) as i64)).collect(),
        None => vec![Frame::Integer(0); members.len()],
    };
    reply(Frame::Array(frames))
}

pub fn scard(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let len = with_set(ctx, &args[1])?.map(|s| s.len()).unwrap_or(0);
    reply(Frame::Integer(len as i64))
}

pub fn smembers(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let items: Vec<Bytes> = with_set(ctx, &args[1])?.map(|s| s.iter().cloned().collect()).unwrap_or_default();
    reply(Frame::Set(items.into_iter().map(Frame::Bulk).collect()))
}

pub fn spop(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let count = if args.len() > 2 { Some(arg_usize(&args[2])?) } else { None };
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let picked: Vec<Bytes> = {
        let s = match typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::Set)? {
            Some(Value::Set(s)) => s,
            _ => {
                return if count.is_some() {
                    reply(Frame::Set(vec![]))
                } else {
                    reply(Frame::Nil)
                }
            }
        };
        let n = count.unwrap_or(1).min(s.len());
        s.iter().cloned().choose_multiple(&mut ctx.server.rng, n)
    };
    if picked.is_empty() {
        return if count.is_some() { reply(Frame::Set(vec![])) } else { reply(Frame::Nil) };
    }
    if let Some(Value::Set(s)) = ctx.server.databases[db_index].get_mut(key, now_ms) {
        for m in &picked {
            s.remove(m);
        }
    }
    ctx.server.databases[db_index].remove_if_empty(key);
    let version = ctx.next_version();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('s', "spop", key);
    if count.is_some() {
        reply(Frame::Set(picked.into_iter().map(Frame::Bulk).collect()))
    } else {
        reply(Frame::Bulk(picked.into_iter().next().unwrap()))
    }
}

pub fn srandmember(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let count_arg = if args.len() > 2 { Some(arg_i64(&args[2])?) } else { None };
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let s = match typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::Set)? {
        Some(Value::Set(s)) => s,
        _ => {
            return if count_arg.is_some() {
                reply(Frame::Array(vec![]))
            } else {
                reply(Frame::Nil)
            }
        }
    };
    let items: Vec<&Bytes> = s.iter().collect();
    match count_arg {
        None => match items.iter().choose(&mut ctx.server.rng) {
            Some(v) => reply(Frame::Bulk((*v).clone())),
            None => reply(Frame::Nil),
        },
        Some(n) if n >= 0 => {
            let picked = items.iter().copied().choose_multiple(&mut ctx.server.rng, (n as usize).min(items.len()));
            reply(Frame::array_of_bulks(picked.into_iter().cloned()))
        }
        Some(n) => {
            if items.is_empty() {
                return reply(Frame::Array(vec![]));
            }
            let n = (-n) as usize;
            let picked: Vec<Bytes> = (0..n).map(|_| items[ctx.server.rng.gen_range(0..items.len())].clone()).collect();
            reply(Frame::array_of_bulks(picked))
        }
    }
}

pub fn smove(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let src = &args[1];
    let dst = &args[2];
    let member = &args[3];
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    typed_get(&mut ctx.server.databases[db_index], dst, now_ms, ValueKind::Set)?;
    let removed = match typed_get_mut(&mut ctx.server.databases[db_index], src, now_ms, ValueKind::Set)? {
        Some(Value::Set(s)) => s.remove(member.as_ref()),
        _ => false,
    };
    if !removed {
        return reply(Frame::Integer(0));
    }
    ctx.server.databases[db_index].remove_if_empty(src);
    ensure_set(ctx, dst)?.insert(member.clone());
    let v1 = ctx.next_version();
    ctx.server.databases[db_index].bump_version(src, v1);
    let v2 = ctx.next_version();
    ctx.server.databases[db_index].bump_version(dst, v2);
    ctx.bump_dirty();
    ctx.notify('s', "smove", src);
    ctx.notify('s', "smove", dst);
    reply(Frame::Integer(1))
}

enum SetOp {
    Union,
    Inter,
    Diff,
}

fn combine(op: SetOp, sets: &[HashSet<Bytes>]) -> HashSet<Bytes> {
    match op {
        SetOp::Union => {
            let mut out = HashSet::new();
            for s in sets {
                out.extend(s.iter().cloned());
            }
            out
        }
        SetOp::Inter => {
            let mut iter = sets.iter();
            let Some(first) = iter.next() else {
                return HashSet::new();
            };
            let mut out = first.clone();
            for s in iter {
                out.retain(|m| s.contains(m));
            }
            out
        }
        SetOp::Diff => {
            let mut iter = sets.iter();
            let Some(first) = iter.next() else {
                return HashSet::new();
            };
            let mut out = first.clone();
            for s in iter {
                out.retain(|m| !s.contains(m));
            }
            out
        }
    }
}

fn combine_keys(ctx: &mut HandlerCtx, op: SetOp, keys: &[Bytes]) -> Result<HashSet<Bytes>, RedisError> {
    let mut sets = Vec::with_capacity(keys.len());
    for key in keys {
        sets.push(materialize(ctx, key)?);
    }
    Ok(combine(op, &sets))
}

pub fn sunion(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let out = combine_keys(ctx, SetOp::Union, &args[1..])?;
    reply(Frame::Set(out.into_iter().map(Frame::Bulk).collect()))
}
pub fn sinter(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let out = combine_keys(ctx, SetOp::Inter, &args[1..])?;
    reply(Frame::Set(out.into_iter().map(Frame::Bulk).collect()))
}
pub fn sdiff(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let out = combine_keys(ctx, SetOp::Diff, &args[1..])?;
    reply(Frame::Set(out.into_iter().map(Frame::Bulk).collect()))
}

fn store(ctx: &mut HandlerCtx, op: SetOp, dest: &Bytes, keys: &[Bytes]) -> HandlerResult {
    let out = combine_keys(ctx, op, keys)?;
    let len = out.len();
    let db_index = ctx.db_index();
    if out.is_empty() {
        ctx.server.databases[db_index].remove(dest);
    } else {
        let version = ctx.next_version();
        ctx.server.databases[db_index].set(dest.clone(), Value::Set(out), version);
    }
    ctx.bump_dirty();
    ctx.notify('s', "sinterstore", dest);
    reply(Frame::Integer(len as i64))
}

pub fn sunionstore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    store(ctx, SetOp::Union, &args[1], &args[2..])
}
pub fn sinterstore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    store(ctx, SetOp::Inter, &args[1], &args[2..])
}
pub fn sdiffstore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    store(ctx, SetOp::Diff, &args[1], &args[2..])
}

/// `SINTERCARD numkeys key [key ...] [LIMIT n]`
pub fn sintercard(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let numkeys = arg_usize(&args[1])?;
    let keys = &args[2..2 + numkeys];
    let mut limit = 0usize;
    if args.len() > 2 + numkeys {
        if super::is_kw(&args[2 + numkeys], "LIMIT") {
            limit = arg_usize(&args[3 + numkeys])?;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    let out = combine_keys(ctx, SetOp::Inter, keys)?;
    let n = if limit == 0 { out.len() } else { out.len().min(limit) };
    reply(Frame::Integer(n as i64))
}

pub fn sscan(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let pattern = super::hashes::scan_pattern(&args[3..]);
    let items: Vec<Bytes> = with_set(ctx, &args[1])?
        .map(|s| {
            s.iter()
                .filter(|m| pattern.as_ref().map(|p| crate::pubsub::glob_match(p, m)).unwrap_or(true))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    reply(Frame::Array(vec![Frame::bulk_str("0"), Frame::array_of_bulks(items)]))
}
