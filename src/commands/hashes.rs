//! Hash commands (spec.md §4.5): `HSET HSETNX HGET HDEL HLEN HEXISTS HGETALL
//! HKEYS HVALS HMGET HMSET HINCRBY HINCRBYFLOAT HRANDFIELD HSCAN`.

use std::collections::HashMap;

use bytes::Bytes;
use rand::seq::IteratorRandom;
use rand::Rng;

use super::{arg_f64, arg_i64, typed_get, typed_get_mut};
use crate::dispatch::{ok, reply, HandlerCtx, HandlerResult};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::value::{Value, ValueKind};

fn ensure_hash<'a>(ctx: &'a mut HandlerCtx, key: &Bytes) -> Result<&'a mut HashMap<Bytes, Bytes>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let db = &mut ctx.server.databases[db_index];
    if typed_get(db, key, now_ms, ValueKind::Hash)?.is_none() {
        db.set(key.clone(), Value::Hash(HashMap::new()), 0);
    }
    match db.get_mut(key, now_ms) {
        Some(Value::Hash(h)) => Ok(h),
        _ => unreachable!(),
    }
}

pub fn hset(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    if (args.len() - 2) % 2 != 0 || args.len() < 4 {
        return Err(RedisError::generic("wrong number of arguments for 'hset' command"));
    }
    let key = &args[1];
    let mut added = 0i64;
    {
        let h = ensure_hash(ctx, key)?;
        for pair in args[2..].chunks(2) {
            if h.insert(pair[0].clone(), pair[1].clone()).is_none() {
                added += 1;
            }
        }
    }
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('h', "hset", key);
    reply(Frame::Integer(added))
}

pub fn hmset(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    hset(ctx, args)?;
    ok()
}

pub fn hsetnx(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let set;
    {
        let h = ensure_hash(ctx, key)?;
        set = !h.contains_key(&args[2]);
        if set {
            h.insert(args[2].clone(), args[3].clone());
        }
    }
    if set {
        let version = ctx.next_version();
        let db_index = ctx.db_index();
        ctx.server.databases[db_index].bump_version(key, version);
        ctx.bump_dirty();
        ctx.notify('h', "hset", key);
    } else {
        ctx.server.databases[ctx.db_index()].remove_if_empty(key);
    }
    reply(Frame::Integer(set as i64))
}

fn with_hash<'a>(ctx: &'a mut HandlerCtx, key: &[u8]) -> Result<Option<&'a HashMap<Bytes, Bytes>>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    match typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::Hash)? {
        Some(Value::Hash(h)) => Ok(Some(h)),
        _ => Ok(None),
    }
}

pub fn hget(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    match with_hash(ctx, &args[1])?.and_then(|h| h.get(&args[2])) {
        Some(v) => reply(Frame::Bulk(v.clone())),
        None => reply(Frame::Nil),
    }
}

pub fn hmget(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let fields = &args[2..];
    let frames = match with_hash(ctx, &args[1])? {
        Some(h) => fields.iter().map(|f| h.get(f).cloned().map(Frame::Bulk).unwrap_or(Frame::Nil)).collect(),
        None => vec![Frame::Nil; fields.len()],
    };
    reply(Frame::Array(frames))
}

pub fn hdel(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let removed = match typed_get_mut(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::Hash)? {
        Some(Value::Hash(h)) => args[2..].iter().filter(|f| h.remove(f.as_ref()).is_some()).count(),
        _ => 0,
    };
    if removed > 0 {
        ctx.server.databases[db_index].remove_if_empty(key);
        let version = ctx.next_version();
        ctx.server.databases[db_index].bump_version(key, version);
        ctx.bump_dirty();
        ctx.notify('h', "hdel", key);
    }
    reply(Frame::Integer(removed as i64))
}

pub fn hlen(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let len = with_hash(ctx, &args[1])?.map(|h| h.len()).unwrap_or(0);
    reply(Frame::Integer(len as i64))
}

pub fn hexists(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let exists = with_hash(ctx, &args[1])?.map(|h| h.contains_key(&args[2])).unwrap_or(false);
    reply(Frame::Integer(exists as i64))
}

pub fn hgetall(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let pairs: Vec<(Frame, Frame)> = with_hash(ctx, &args[1])?
        .map(|h| h.iter().map(|(k, v)| (Frame::Bulk(k.clone()), Frame::Bulk(v.clone()))).collect())
        .unwrap_or_default();
    reply(Frame::Map(pairs))
}

pub fn hkeys(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let keys: Vec<Bytes> = with_hash(ctx, &args[1])?.map(|h| h.keys().cloned().collect()).unwrap_or_default();
    reply(Frame::array_of_bulks(keys))
}

pub fn hvals(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let vals: Vec<Bytes> = with_hash(ctx, &args[1])?.map(|h| h.values().cloned().collect()).unwrap_or_default();
    reply(Frame::array_of_bulks(vals))
}

pub fn hincrby(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let field = &args[2];
    let delta = arg_i64(&args[3])?;
    let next;
    {
        let h = ensure_hash(ctx, key)?;
        let current = match h.get(field) {
            Some(b) => crate::value::string::parse_canonical_i64(b)?,
            None => 0,
        };
        next = current.checked_add(delta).ok_or(RedisError::IncrOverflow)?;
        h.insert(field.clone(), Bytes::from(next.to_string()));
    }
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('h', "hincrby", key);
    reply(Frame::Integer(next))
}

pub fn hincrbyfloat(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let field = &args[2];
    let delta = arg_f64(&args[3])?;
    let formatted;
    {
        let h = ensure_hash(ctx, key)?;
        let current = match h.get(field) {
            Some(b) => crate::value::string::parse_float(b)?,
            None => 0.0,
        };
        let next = current + delta;
        if next.is_nan() || next.is_infinite() {
            return Err(RedisError::generic("increment would produce NaN or Infinity"));
        }
        formatted = crate::value::string::format_float(next);
        h.insert(field.clone(), Bytes::from(formatted.clone()));
    }
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('h', "hincrbyfloat", key);
    reply(Frame::bulk_str(formatted))
}

pub fn hrandfield(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let count_arg = if args.len() > 2 { Some(arg_i64(&args[2])?) } else { None };
    let with_values = args.len() > 3 && super::is_kw(&args[3], "WITHVALUES");

    let h = match typed_get(&mut ctx.server.databases[db_index], &args[1], now_ms, ValueKind::Hash)? {
        Some(Value::Hash(h)) => h,
        _ => {
            return if count_arg.is_some() {
                reply(Frame::Array(vec![]))
            } else {
                reply(Frame::Nil)
            }
        }
    };
    let entries: Vec<(&Bytes, &Bytes)> = h.iter().collect();
    match count_arg {
        None => match entries.iter().choose(&mut ctx.server.rng) {
            Some((k, _)) => reply(Frame::Bulk((*k).clone())),
            None => reply(Frame::Nil),
        },
        Some(n) if n >= 0 => {
            let n = n as usize;
            let picked: Vec<(&Bytes, &Bytes)> = entries.iter().copied().choose_multiple(&mut ctx.server.rng, n.min(entries.len()));
            Ok(crate::dispatch::Outcome::Reply(hrand_frame(picked, with_values)))
        }
        Some(n) => {
            let n = (-n) as usize;
            if entries.is_empty() {
                return reply(Frame::Array(vec![]));
            }
            let picked: Vec<(&Bytes, &Bytes)> = (0..n).map(|_| entries[ctx.server.rng.gen_range(0..entries.len())]).collect();
            Ok(crate::dispatch::Outcome::Reply(hrand_frame(picked, with_values)))
        }
    }
}

fn hrand_frame(picked: Vec<(&Bytes, &Bytes)>, with_values: bool) -> Frame {
    if with_values {
        Frame::Array(
            picked
                .into_iter()
                .flat_map(|(k, v)| [Frame::Bulk(k.clone()), Frame::Bulk(v.clone())])
                .collect(),
        )
    } else {
        Frame::array_of_bulks(picked.into_iter().map(|(k, _)| k.clone()))
    }
}

/// `HSCAN key cursor [MATCH pattern] [COUNT n]`: a cursorless full scan
/// (spec.md's in-process model has no partitioned hash table to resume
/// across calls, so the first call with cursor `0` returns everything and
/// the cursor is always `0` thereafter, which is a spec-conformant — if
/// minimal — iteration per the `SCAN` family contract).
pub fn hscan(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let pattern = scan_pattern(&args[3..]);
    let items: Vec<(Bytes, Bytes)> = with_hash(ctx, &args[1])?
        .map(|h| {
            h.iter()
                .filter(|(k, _)| pattern.as_ref().map(|p| crate::pubsub::glob_match(p, k)).unwrap_or(true))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    let flat: Vec<Frame> = items.into_iter().flat_map(|(k, v)| [Frame::Bulk(k), Frame::Bulk(v)]).collect();
    reply(Frame::Array(vec![Frame::bulk_str("0"), Frame::Array(flat)]))
}

pub(crate) fn scan_pattern(rest: &[Bytes]) -> Option<Bytes> {
    let mut i = 0;
    while i < rest.len() {
        if super::is_kw(&rest[i], "MATCH") && i + 1 < rest.len() {
            return Some(rest[i + 1].clone());
        }
        i += 1;
    }
    None
}
