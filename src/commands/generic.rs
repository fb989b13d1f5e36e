//! Generic key-space commands (spec.md §4.5): `DEL UNLINK EXISTS TYPE
//! EXPIRE PEXPIRE EXPIREAT PEXPIREAT TTL PTTL PERSIST RENAME RENAMENX COPY
//! RANDOMKEY KEYS SCAN DBSIZE FLUSHDB FLUSHALL MOVE TOUCH OBJECT`.

use bytes::Bytes;
use rand::seq::IteratorRandom;

use super::{arg_i64, is_kw};
use crate::dispatch::{ok, reply, HandlerCtx, HandlerResult};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::value::ValueKind;

fn del_keys(ctx: &mut HandlerCtx, keys: &[Bytes]) -> i64 {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let mut removed = 0;
    for key in keys {
        let existed = ctx.server.databases[db_index].contains(key, now_ms);
        if existed && ctx.server.databases[db_index].remove(key).is_some() {
            removed += 1;
            ctx.notify('g', "del", key);
        }
    }
    if removed > 0 {
        ctx.bump_dirty();
    }
    removed
}

pub fn del(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    reply(Frame::Integer(del_keys(ctx, &args[1..])))
}

pub fn unlink(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    reply(Frame::Integer(del_keys(ctx, &args[1..])))
}

pub fn exists(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let count = args[1..].iter().filter(|k| ctx.server.databases[db_index].contains(k, now_ms)).count();
    reply(Frame::Integer(count as i64))
}

pub fn key_type(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let name = ctx.server.databases[db_index]
        .get(&args[1], now_ms)
        .map(|v| v.kind().type_name())
        .unwrap_or("none");
    reply(Frame::Simple(name.to_string()))
}

pub fn touch(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let count = args[1..].iter().filter(|k| ctx.server.databases[db_index].contains(k, now_ms)).count();
    reply(Frame::Integer(count as i64))
}

fn expire_generic(ctx: &mut HandlerCtx, args: &[Bytes], to_absolute_ms: impl Fn(i64, u64) -> i64) -> HandlerResult {
    let key = &args[1];
    let amount = arg_i64(&args[2])?;
    let mut nx = false;
    let mut xx = false;
    let mut gt = false;
    let mut lt = false;
    for flag in &args[3..] {
        if is_kw(flag, "NX") {
            nx = true;
        } else if is_kw(flag, "XX") {
            xx = true;
        } else if is_kw(flag, "GT") {
            gt = true;
        } else if is_kw(flag, "LT") {
            lt = true;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    if !ctx.server.databases[db_index].contains(key, now_ms) {
        return reply(Frame::Integer(0));
    }
    let target_ms = to_absolute_ms(amount, now_ms).max(0) as u64;
    let current = ctx.server.databases[db_index].ttl_ms(key, now_ms).flatten();
    let current_at = current.map(|remaining| now_ms + remaining);
    let allowed = if nx {
        current_at.is_none()
    } else if xx {
        current_at.is_some()
    } else if gt {
        current_at.map(|c| target_ms > c).unwrap_or(false)
    } else if lt {
        current_at.map(|c| target_ms < c).unwrap_or(true)
    } else {
        true
    };
    if !allowed {
        return reply(Frame::Integer(0));
    }
    if target_ms <= now_ms {
        ctx.server.databases[db_index].remove(key);
        ctx.bump_dirty();
        ctx.notify('g', "expired", key);
        return reply(Frame::Integer(1));
    }
    let version = ctx.next_version();
    ctx.server.databases[db_index].expire_at(key, Some(target_ms), version);
    ctx.bump_dirty();
    ctx.notify('g', "expire", key);
    reply(Frame::Integer(1))
}

pub fn expire(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    expire_generic(ctx, args, |secs, now| now as i64 + secs * 1000)
}
pub fn pexpire(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    expire_generic(ctx, args, |ms, now| now as i64 + ms)
}
pub fn expireat(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    expire_generic(ctx, args, |secs, _now| secs * 1000)
}
pub fn pexpireat(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    expire_generic(ctx, args, |ms, _now| ms)
}

pub fn ttl(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    match ctx.server.databases[db_index].ttl_ms(&args[1], now_ms) {
        None => reply(Frame::Integer(-2)),
        Some(None) => reply(Frame::Integer(-1)),
        Some(Some(remaining)) => reply(Frame::Integer((remaining as i64 + 999) / 1000)),
    }
}

pub fn pttl(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    match ctx.server.databases[db_index].ttl_ms(&args[1], now_ms) {
        None => reply(Frame::Integer(-2)),
        Some(None) => reply(Frame::Integer(-1)),
        Some(Some(remaining)) => reply(Frame::Integer(remaining as i64)),
    }
}

pub fn persist(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let key = &args[1];
    let had_ttl = matches!(ctx.server.databases[db_index].ttl_ms(key, now_ms), Some(Some(_)));
    if had_ttl {
        let version = ctx.next_version();
        ctx.server.databases[db_index].expire_at(key, None, version);
        ctx.bump_dirty();
        ctx.notify('g', "persist", key);
    }
    reply(Frame::Integer(had_ttl as i64))
}

pub fn rename(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    if !ctx.server.databases[db_index].contains(&args[1], now_ms) {
        return Err(RedisError::NoSuchKey);
    }
    let version = ctx.next_version();
    ctx.server.databases[db_index].remove_if_empty(&args[1]);
    ctx.server.databases[db_index].rename(&args[1], args[2].clone(), version);
    ctx.bump_dirty();
    ctx.notify('g', "rename_from", &args[1]);
    ctx.notify('g', "rename_to", &args[2]);
    ok()
}

pub fn renamenx(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    if !ctx.server.databases[db_index].contains(&args[1], now_ms) {
        return Err(RedisError::NoSuchKey);
    }
    if ctx.server.databases[db_index].contains(&args[2], now_ms) {
        return reply(Frame::Integer(0));
    }
    let version = ctx.next_version();
    ctx.server.databases[db_index].rename(&args[1], args[2].clone(), version);
    ctx.bump_dirty();
    ctx.notify('g', "rename_from", &args[1]);
    ctx.notify('g', "rename_to", &args[2]);
    reply(Frame::Integer(1))
}

/// `COPY source destination [DB destination-db] [REPLACE]`
pub fn copy(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let src_db = ctx.db_index();
    let now_ms = ctx.now_ms;
    let mut dst_db = src_db;
    let mut replace = false;
    let mut i = 3;
    while i < args.len() {
        if is_kw(&args[i], "DB") {
            dst_db = super::arg_usize(&args[i + 1])?;
            i += 2;
        } else if is_kw(&args[i], "REPLACE") {
            replace = true;
            i += 1;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    if dst_db == src_db && args[1] == args[2] {
        return Err(RedisError::SameObject);
    }
    let Some(value) = ctx.server.databases[src_db].get(&args[1], now_ms).cloned() else {
        return reply(Frame::Integer(0));
    };
    if !replace && ctx.server.databases[dst_db].contains(&args[2], now_ms) {
        return reply(Frame::Integer(0));
    }
    let ttl = ctx.server.databases[src_db].ttl_ms(&args[1], now_ms).flatten().map(|r| now_ms + r);
    let version = ctx.next_version();
    ctx.server.databases[dst_db].set_with_expiry(args[2].clone(), value, ttl, version);
    ctx.bump_dirty();
    reply(Frame::Integer(1))
}

/// `MOVE key db`
pub fn mv(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let src_db = ctx.db_index();
    let dst_db = super::arg_usize(&args[2])?;
    let now_ms = ctx.now_ms;
    if src_db == dst_db {
        return Err(RedisError::generic("source and destination objects are the same"));
    }
    if !ctx.server.databases[src_db].contains(&args[1], now_ms) || ctx.server.databases[dst_db].contains(&args[1], now_ms) {
        return reply(Frame::Integer(0));
    }
    let Some(entry) = ctx.server.databases[src_db].remove(&args[1]) else {
        return reply(Frame::Integer(0));
    };
    let version = ctx.next_version();
    ctx.server.databases[dst_db].set_with_expiry(args[1].clone(), entry.value, entry.expire_at_ms, version);
    ctx.bump_dirty();
    reply(Frame::Integer(1))
}

pub fn randomkey(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    match ctx.server.databases[db_index].keys().choose(&mut ctx.server.rng) {
        Some(k) => reply(Frame::Bulk(k.clone())),
        None => reply(Frame::Nil),
    }
}

pub fn keys(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let pattern = args[1].clone();
    let matching: Vec<Bytes> = ctx.server.databases[db_index]
        .keys()
        .filter(|k| crate::pubsub::glob_match(&pattern, k))
        .cloned()
        .collect();
    reply(Frame::array_of_bulks(matching))
}

/// `SCAN cursor [MATCH pattern] [COUNT n] [TYPE t]`: a cursorless full
/// scan, same rationale as `HSCAN` (no partitioned hash table to resume
/// across calls in this in-process model).
pub fn scan(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let pattern = super::hashes::scan_pattern(&args[2..]);
    let type_filter = type_filter_from(&args[2..]);
    let keys: Vec<Bytes> = ctx.server.databases[db_index].keys().cloned().collect();
    let matching: Vec<Bytes> = keys
        .into_iter()
        .filter(|k| pattern.as_ref().map(|p| crate::pubsub::glob_match(p, k)).unwrap_or(true))
        .filter(|k| {
            type_filter
                .map(|t| ctx.server.databases[db_index].get(k, now_ms).map(|v| v.kind() == t).unwrap_or(false))
                .unwrap_or(true)
        })
        .collect();
    reply(Frame::Array(vec![Frame::bulk_str("0"), Frame::array_of_bulks(matching)]))
}

fn type_filter_from(rest: &[Bytes]) -> Option<ValueKind> {
    let mut i = 0;
    while i < rest.len() {
        if is_kw(&rest[i], "TYPE") && i + 1 < rest.len() {
            return match rest[i + 1].to_ascii_lowercase().as_slice() {
                b"string" => Some(ValueKind::String),
                b"list" => Some(ValueKind::List),
                b"hash" => Some(ValueKind::Hash),
                b"set" => Some(ValueKind::Set),
                b"zset" => Some(ValueKind::ZSet),
                b"stream" => Some(ValueKind::Stream),
                _ => None,
            };
        }
        i += 1;
    }
    None
}

pub fn dbsize(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    reply(Frame::Integer(ctx.server.databases[db_index].len() as i64))
}

pub fn flushdb(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    ctx.server.databases[db_index].flush();
    ctx.bump_dirty();
    ok()
}

pub fn flushall(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    for db in ctx.server.databases.iter_mut() {
        db.flush();
    }
    ctx.bump_dirty();
    ok()
}

/// `OBJECT ENCODING|REFCOUNT|FREQ|IDLETIME key`
pub fn object(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sub = super::arg_str(&args[1]).to_ascii_uppercase();
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let key = &args[2];
    let value = ctx.server.databases[db_index].get(key, now_ms);
    match sub.as_str() {
        "ENCODING" => {
            let Some(v) = value else { return Err(RedisError::NoSuchKey) };
            reply(Frame::bulk_str(encoding_hint(v)))
        }
        "REFCOUNT" => {
            if value.is_none() {
                return Err(RedisError::NoSuchKey);
            }
            reply(Frame::Integer(1))
        }
        "IDLETIME" => {
            if value.is_none() {
                return Err(RedisError::NoSuchKey);
            }
            reply(Frame::Integer(0))
        }
        "FREQ" => Err(RedisError::generic("An LFU maxmemory policy is not selected, access frequency not tracked.")),
        _ => Err(RedisError::UnknownSubcommand(sub, "OBJECT".into())),
    }
}

/// Approximate encoding names for introspection parity with real Redis;
/// this crate keeps one representation per kind internally, so these are
/// reported based on size thresholds alone, not an actual compact form.
pub(crate) fn encoding_hint(value: &crate::value::Value) -> &'static str {
    use crate::value::Value;
    match value {
        Value::String(s) => {
            if crate::value::string::parse_canonical_i64(s).is_ok() {
                "int"
            } else if s.len() <= 44 {
                "embstr"
            } else {
                "raw"
            }
        }
        Value::List(l) => {
            if l.len() <= 128 {
                "listpack"
            } else {
                "quicklist"
            }
        }
        Value::Hash(h) => {
            if h.len() <= 128 {
                "listpack"
            } else {
                "hashtable"
            }
        }
        Value::Set(s) => {
            if s.iter().all(|m| crate::value::string::parse_canonical_i64(m).is_ok()) && s.len() <= 512 {
                "intset"
            } else if s.len() <= 128 {
                "listpack"
            } else {
                "hashtable"
            }
        }
        Value::ZSet(z) => {
            if z.len() <= 128 {
                "listpack"
            } else {
                "skiplist"
            }
        }
        Value::Stream(_) => "stream",
    }
}
