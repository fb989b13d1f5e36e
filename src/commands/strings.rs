//! String commands (spec.md §4.5): `GET SET SETNX SETEX PSETEX GETSET
//! GETDEL GETEX APPEND STRLEN SETRANGE GETRANGE INCR DECR INCRBY DECRBY
//! INCRBYFLOAT MGET MSET MSETNX SUBSTR`.

use bytes::{Bytes, BytesMut};

use super::{arg_f64, arg_i64, arg_usize, is_kw, typed_get};
use crate::dispatch::{ok, reply, HandlerCtx, HandlerResult};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::value::{Value, ValueKind};

fn get_string(ctx: &mut HandlerCtx, key: &[u8]) -> Result<Option<Bytes>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    match typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::String)? {
        Some(Value::String(b)) => Ok(Some(b.clone())),
        _ => Ok(None),
    }
}

pub fn get(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    match get_string(ctx, &args[1])? {
        Some(b) => reply(Frame::Bulk(b)),
        None => reply(Frame::Nil),
    }
}

pub fn strlen(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let len = get_string(ctx, &args[1])?.map(|b| b.len()).unwrap_or(0);
    reply(Frame::Integer(len as i64))
}

pub fn substr(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    getrange(ctx, args)
}

pub fn getrange(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let data = get_string(ctx, &args[1])?.unwrap_or_default();
    let start = arg_i64(&args[2])?;
    let end = arg_i64(&args[3])?;
    let (lo, hi) = resolve_range(data.len(), start, end);
    if lo > hi || data.is_empty() {
        return reply(Frame::bulk_str(""));
    }
    reply(Frame::Bulk(data.slice(lo..=hi)))
}

fn resolve_range(len: usize, start: i64, end: i64) -> (usize, usize) {
    if len == 0 {
        return (0, 0);
    }
    let norm = |i: i64| -> i64 {
        if i < 0 {
            (len as i64 + i).max(0)
        } else {
            i
        }
    };
    let lo = norm(start).min(len as i64 - 1).max(0) as usize;
    let hi = norm(end).min(len as i64 - 1);
    if hi < 0 {
        (1, 0) // empty: lo > hi
    } else {
        (lo, hi as usize)
    }
}

/// `SET key value [EX sec|PX ms|EXAT ts|PXAT ts|KEEPTTL] [NX|XX] [GET]`
pub fn set(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let value = args[2].clone();
    let mut expire_at_ms: Option<u64> = None;
    let mut keep_ttl = false;
    let mut nx = false;
    let mut xx = false;
    let mut get_old = false;

    let mut i = 3;
    while i < args.len() {
        let a = &args[i];
        if is_kw(a, "NX") {
            nx = true;
            i += 1;
        } else if is_kw(a, "XX") {
            xx = true;
            i += 1;
        } else if is_kw(a, "GET") {
            get_old = true;
            i += 1;
        } else if is_kw(a, "KEEPTTL") {
            keep_ttl = true;
            i += 1;
        } else if is_kw(a, "EX") || is_kw(a, "PX") || is_kw(a, "EXAT") || is_kw(a, "PXAT") {
            if i + 1 >= args.len() {
                return Err(RedisError::Syntax);
            }
            let n = arg_i64(&args[i + 1])?;
            expire_at_ms = Some(resolve_expiry(arg_str_upper(a).as_str(), n, ctx.now_ms)?);
            i += 2;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    if nx && xx {
        return Err(RedisError::Syntax);
    }

    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let db = &mut ctx.server.databases[db_index];
    let existed = db.contains(key, now_ms);
    let old = if get_old {
        match typed_get(db, key, now_ms, ValueKind::String)? {
            Some(Value::String(b)) => Some(b.clone()),
            _ => None,
        }
    } else {
        None
    };

    if (nx && existed) || (xx && !existed) {
        return match (get_old, &old) {
            (true, _) => reply(old.map(Frame::Bulk).unwrap_or(Frame::Nil)),
            (false, _) => reply(Frame::Nil),
        };
    }

    let version = ctx.next_version();
    let db = &mut ctx.server.databases[db_index];
    if keep_ttl {
        let prior_ttl = db.entry_mut(key, now_ms).and_then(|e| e.expire_at_ms);
        db.set_with_expiry(key.clone(), Value::String(value), prior_ttl, version);
    } else {
        db.set_with_expiry(key.clone(), Value::String(value), expire_at_ms, version);
    }
    ctx.bump_dirty();
    ctx.notify('$', "set", key);
    if get_old {
        reply(old.map(Frame::Bulk).unwrap_or(Frame::Nil))
    } else {
        ok()
    }
}

fn arg_str_upper(a: &Bytes) -> String {
    String::from_utf8_lossy(a).to_ascii_uppercase()
}

fn resolve_expiry(kw: &str, n: i64, now_ms: u64) -> Result<u64, RedisError> {
    let ms = match kw {
        "EX" => n.checked_mul(1000).ok_or(RedisError::generic("invalid expire time"))?,
        "PX" => n,
        "EXAT" => return Ok((n.max(0) as u64).saturating_mul(1000)),
        "PXAT" => return Ok(n.max(0) as u64),
        _ => unreachable!(),
    };
    if ms <= 0 {
        return Err(RedisError::generic("invalid expire time in 'set' command"));
    }
    Ok(now_ms + ms as u64)
}

pub fn setnx(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    if ctx.server.databases[db_index].contains(key, now_ms) {
        return reply(Frame::Integer(0));
    }
    let version = ctx.next_version();
    ctx.server.databases[db_index].set(key.clone(), Value::String(args[2].clone()), version);
    ctx.bump_dirty();
    ctx.notify('$', "set", key);
    reply(Frame::Integer(1))
}

pub fn setex(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    set_with_seconds(ctx, args, 1000)
}

pub fn psetex(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    set_with_seconds(ctx, args, 1)
}

fn set_with_seconds(ctx: &mut HandlerCtx, args: &[Bytes], unit_ms: i64) -> HandlerResult {
    let key = &args[1];
    let n = arg_i64(&args[2])?;
    if n <= 0 {
        return Err(RedisError::generic("invalid expire time"));
    }
    let expire_at_ms = ctx.now_ms + (n * unit_ms) as u64;
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    ctx.server.databases[db_index].set_with_expiry(key.clone(), Value::String(args[3].clone()), Some(expire_at_ms), version);
    ctx.bump_dirty();
    ctx.notify('$', "set", key);
    ok()
}

pub fn getset(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let old = get_string(ctx, key)?;
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    ctx.server.databases[db_index].set(key.clone(), Value::String(args[2].clone()), version);
    ctx.bump_dirty();
    ctx.notify('$', "set", key);
    reply(old.map(Frame::Bulk).unwrap_or(Frame::Nil))
}

pub fn getdel(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let old = get_string(ctx, key)?;
    if old.is_some() {
        let db_index = ctx.db_index();
        ctx.server.databases[db_index].remove(key);
        ctx.bump_dirty();
        ctx.notify('g', "del", key);
    }
    reply(old.map(Frame::Bulk).unwrap_or(Frame::Nil))
}

/// `GETEX key [EX sec|PX ms|EXAT ts|PXAT ts|PERSIST]`
pub fn getex(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let old = get_string(ctx, key)?;
    if old.is_none() {
        return reply(Frame::Nil);
    }
    if args.len() > 2 {
        let kw = &args[2];
        let db_index = ctx.db_index();
        let version = ctx.next_version();
        if is_kw(kw, "PERSIST") {
            ctx.server.databases[db_index].expire_at(key, None, version);
        } else if args.len() >= 4 {
            let n = arg_i64(&args[3])?;
            let at = resolve_expiry(arg_str_upper(kw).as_str(), n, ctx.now_ms)?;
            ctx.server.databases[db_index].expire_at(key, Some(at), version);
        } else {
            return Err(RedisError::Syntax);
        }
    }
    reply(old.map(Frame::Bulk).unwrap_or(Frame::Nil))
}

pub fn append(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let mut data = get_string(ctx, key)?.map(|b| b.to_vec()).unwrap_or_default();
    data.extend_from_slice(&args[2]);
    let len = data.len();
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    let prior_ttl = ctx.server.databases[db_index].entry_mut(key, ctx.now_ms).and_then(|e| e.expire_at_ms);
    ctx.server.databases[db_index].set_with_expiry(key.clone(), Value::String(data.into()), prior_ttl, version);
    ctx.bump_dirty();
    ctx.notify('$', "append", key);
    reply(Frame::Integer(len as i64))
}

pub fn setrange(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let offset = arg_usize(&args[2])?;
    let patch = &args[3];
    if patch.is_empty() {
        let len = get_string(ctx, key)?.map(|b| b.len()).unwrap_or(0);
        return reply(Frame::Integer(len as i64));
    }
    let mut data = BytesMut::from(&get_string(ctx, key)?.unwrap_or_default()[..]);
    if data.len() < offset + patch.len() {
        data.resize(offset + patch.len(), 0);
    }
    data[offset..offset + patch.len()].copy_from_slice(patch);
    let len = data.len();
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    let prior_ttl = ctx.server.databases[db_index].entry_mut(key, ctx.now_ms).and_then(|e| e.expire_at_ms);
    ctx.server.databases[db_index].set_with_expiry(key.clone(), Value::String(data.freeze()), prior_ttl, version);
    ctx.bump_dirty();
    ctx.notify('$', "setrange", key);
    reply(Frame::Integer(len as i64))
}

pub fn incr(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    incr_by(ctx, &args[1], 1)
}

pub fn decr(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    incr_by(ctx, &args[1], -1)
}

pub fn incrby(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    incr_by(ctx, &args[1], arg_i64(&args[2])?)
}

pub fn decrby(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let n = arg_i64(&args[2])?;
    let neg = n.checked_neg().ok_or(RedisError::IncrOverflow)?;
    incr_by(ctx, &args[1], neg)
}

fn incr_by(ctx: &mut HandlerCtx, key: &Bytes, delta: i64) -> HandlerResult {
    let current = match get_string(ctx, key)? {
        Some(b) => crate::value::string::parse_canonical_i64(&b)?,
        None => 0,
    };
    let next = current.checked_add(delta).ok_or(RedisError::IncrOverflow)?;
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    let prior_ttl = ctx.server.databases[db_index].entry_mut(key, ctx.now_ms).and_then(|e| e.expire_at_ms);
    ctx.server.databases[db_index].set_with_expiry(key.clone(), Value::String(Bytes::from(next.to_string())), prior_ttl, version);
    ctx.bump_dirty();
    ctx.notify('$', "incrby", key);
    reply(Frame::Integer(next))
}

pub fn incrbyfloat(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let delta = arg_f64(&args[2])?;
    let current = match get_string(ctx, key)? {
        Some(b) => crate::value::string::parse_float(&b)?,
        None => 0.0,
    };
    let next = current + delta;
    if next.is_nan() || next.is_infinite() {
        return Err(RedisError::generic("increment would produce NaN or Infinity"));
    }
    let formatted = crate::value::string::format_float(next);
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    let prior_ttl = ctx.server.databases[db_index].entry_mut(key, ctx.now_ms).and_then(|e| e.expire_at_ms);
    ctx.server.databases[db_index].set_with_expiry(key.clone(), Value::String(Bytes::from(formatted.clone())), prior_ttl, version);
    ctx.bump_dirty();
    ctx.notify('$', "incrbyfloat", key);
    reply(Frame::bulk_str(formatted))
}

pub fn mget(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let mut out = Vec::with_capacity(args.len() - 1);
    for key in &args[1..] {
        out.push(match get_string(ctx, key) {
            Ok(Some(b)) => Frame::Bulk(b),
            _ => Frame::Nil,
        });
    }
    reply(Frame::Array(out))
}

pub fn mset(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    if (args.len() - 1) % 2 != 0 {
        return Err(RedisError::generic("wrong number of arguments for 'mset' command"));
    }
    let db_index = ctx.db_index();
    for pair in args[1..].chunks(2) {
        let version = ctx.next_version();
        ctx.server.databases[db_index].set(pair[0].clone(), Value::String(pair[1].clone()), version);
        ctx.notify('$', "set", &pair[0]);
    }
    ctx.bump_dirty();
    ok()
}

pub fn msetnx(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    if (args.len() - 1) % 2 != 0 {
        return Err(RedisError::generic("wrong number of arguments for 'msetnx' command"));
    }
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    for pair in args[1..].chunks(2) {
        if ctx.server.databases[db_index].contains(&pair[0], now_ms) {
            return reply(Frame::Integer(0));
        }
    }
    for pair in args[1..].chunks(2) {
        let version = ctx.next_version();
        ctx.server.databases[db_index].set(pair[0].clone(), Value::String(pair[1].clone()), version);
        ctx.notify('$', "set", &pair[0]);
    }
    ctx.bump_dirty();
    reply(Frame::Integer(1))
}
