//! List commands (spec.md §4.5): `LPUSH RPUSH LPUSHX RPUSHX LPOP RPOP LLEN
//! LRANGE LINDEX LSET LINSERT LREM LTRIM RPOPLPUSH LMOVE LPOS`, plus the
//! blocking variants in `commands::lists::blocking` (`BLPOP BRPOP BLMOVE
//! BRPOPLPUSH`).

use std::collections::VecDeque;

use bytes::Bytes;

use super::{arg_i64, arg_usize, is_kw, typed_get, typed_get_mut};
use crate::blocking::WaitKind;
use crate::dispatch::{ok, reply, HandlerCtx, HandlerResult, Outcome};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::value::{Value, ValueKind};

fn ensure_list<'a>(ctx: &'a mut HandlerCtx, key: &Bytes) -> Result<&'a mut VecDeque<Bytes>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let db = &mut ctx.server.databases[db_index];
    if typed_get(db, key, now_ms, ValueKind::List)?.is_none() {
        let version = 0; // stamped properly by the caller's `touch`
        db.set(key.clone(), Value::List(VecDeque::new()), version);
    }
    match db.get_mut(key, now_ms) {
        Some(Value::List(l)) => Ok(l),
        _ => unreachable!("just ensured list"),
    }
}

fn push(ctx: &mut HandlerCtx, args: &[Bytes], front: bool, require_existing: bool) -> HandlerResult {
    let key = &args[1];
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    if require_existing && typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::List)?.is_none() {
        return reply(Frame::Integer(0));
    }
    let list = ensure_list(ctx, key)?;
    for v in &args[2..] {
        if front {
            list.push_front(v.clone());
        } else {
            list.push_back(v.clone());
        }
    }
    let len = list.len();
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('l', if front { "lpush" } else { "rpush" }, key);
    super::wake_waiters(ctx, key, WaitKind::List);
    reply(Frame::Integer(len as i64))
}

pub fn lpush(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    push(ctx, args, true, false)
}
pub fn rpush(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    push(ctx, args, false, false)
}
pub fn lpushx(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    push(ctx, args, true, true)
}
pub fn rpushx(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    push(ctx, args, false, true)
}

fn pop_n(ctx: &mut HandlerCtx, key: &Bytes, front: bool, count: Option<usize>) -> Vec<Bytes> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let mut out = Vec::new();
    let n = count.unwrap_or(1);
    if let Ok(Some(Value::List(list))) = typed_get_mut(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::List) {
        for _ in 0..n {
            let popped = if front { list.pop_front() } else { list.pop_back() };
            match popped {
                Some(v) => out.push(v),
                None => break,
            }
        }
    }
    if !out.is_empty() {
        ctx.server.databases[db_index].remove_if_empty(key);
        let version = ctx.next_version();
        ctx.server.databases[db_index].bump_version(key, version);
        ctx.bump_dirty();
        ctx.notify('l', if front { "lpop" } else { "rpop" }, key);
    }
    out
}

fn pop(ctx: &mut HandlerCtx, args: &[Bytes], front: bool) -> HandlerResult {
    let key = &args[1];
    typed_get(&mut ctx.server.databases[ctx.db_index()], key, ctx.now_ms, ValueKind::List)?;
    let count = if args.len() > 2 { Some(arg_usize(&args[2])?) } else { None };
    let has_count = count.is_some();
    let out = pop_n(ctx, key, front, count);
    if has_count {
        reply(Frame::array_of_bulks(out))
    } else {
        match out.into_iter().next() {
            Some(v) => reply(Frame::Bulk(v)),
            None => reply(Frame::Nil),
        }
    }
}

pub fn lpop(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    pop(ctx, args, true)
}
pub fn rpop(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    pop(ctx, args, false)
}

pub fn llen(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let len = match typed_get(&mut ctx.server.databases[db_index], &args[1], now_ms, ValueKind::List)? {
        Some(Value::List(l)) => l.len(),
        _ => 0,
    };
    reply(Frame::Integer(len as i64))
}

fn resolve_index(len: i64, i: i64) -> i64 {
    if i < 0 {
        len + i
    } else {
        i
    }
}

pub fn lrange(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let start = arg_i64(&args[2])?;
    let stop = arg_i64(&args[3])?;
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let list = match typed_get(&mut ctx.server.databases[db_index], &args[1], now_ms, ValueKind::List)? {
        Some(Value::List(l)) => l,
        _ => return reply(Frame::Array(vec![])),
    };
    let len = list.len() as i64;
    let lo = resolve_index(len, start).max(0);
    let hi = resolve_index(len, stop).min(len - 1);
    if lo > hi || len == 0 {
        return reply(Frame::Array(vec![]));
    }
    let items: Vec<Frame> = list.iter().skip(lo as usize).take((hi - lo + 1) as usize).map(|b| Frame::Bulk(b.clone())).collect();
    reply(Frame::Array(items))
}

pub fn lindex(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let idx = arg_i64(&args[2])?;
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let list = match typed_get(&mut ctx.server.databases[db_index], &args[1], now_ms, ValueKind::List)? {
        Some(Value::List(l)) => l,
        _ => return reply(Frame::Nil),
    };
    let real = resolve_index(list.len() as i64, idx);
    if real < 0 || real as usize >= list.len() {
        return reply(Frame::Nil);
    }
    reply(Frame::Bulk(list[real as usize].clone()))
}

pub fn lset(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let idx = arg_i64(&args[2])?;
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let list = match typed_get_mut(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::List)? {
        Some(Value::List(l)) => l,
        Some(_) => return Err(RedisError::WrongType),
        None => return Err(RedisError::NoSuchKey),
    };
    let real = resolve_index(list.len() as i64, idx);
    if real < 0 || real as usize >= list.len() {
        return Err(RedisError::IndexOutOfRange);
    }
    list[real as usize] = args[3].clone();
    let version = ctx.next_version();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('l', "lset", key);
    ok()
}

pub fn linsert(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let before = if is_kw(&args[2], "BEFORE") {
        true
    } else if is_kw(&args[2], "AFTER") {
        false
    } else {
        return Err(RedisError::Syntax);
    };
    let pivot = &args[3];
    let value = args[4].clone();
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let list = match typed_get_mut(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::List)? {
        Some(Value::List(l)) => l,
        Some(_) => return Err(RedisError::WrongType),
        None => return reply(Frame::Integer(0)),
    };
    let pos = list.iter().position(|v| v == pivot);
    let Some(pos) = pos else {
        return reply(Frame::Integer(-1));
    };
    let at = if before { pos } else { pos + 1 };
    list.insert(at, value);
    let len = list.len();
    let version = ctx.next_version();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('l', "linsert", key);
    reply(Frame::Integer(len as i64))
}

pub fn lrem(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let count = arg_i64(&args[2])?;
    let target = &args[3];
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let list = match typed_get_mut(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::List)? {
        Some(Value::List(l)) => l,
        Some(_) => return Err(RedisError::WrongType),
        None => return reply(Frame::Integer(0)),
    };
    let mut removed = 0i64;
    if count >= 0 {
        let limit = if count == 0 { usize::MAX } else { count as usize };
        let mut i = 0;
        while i < list.len() && (removed as usize) < limit {
            if list[i] == *target {
                list.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
    } else {
        let limit = (-count) as usize;
        let mut i = list.len();
        while i > 0 && (removed as usize) < limit {
            i -= 1;
            if list[i] == *target {
                list.remove(i);
                removed += 1;
            }
        }
    }
    if removed > 0 {
        ctx.server.databases[db_index].remove_if_empty(key);
        let version = ctx.next_version();
        ctx.server.databases[db_index].bump_version(key, version);
        ctx.bump_dirty();
        ctx.notify('l', "lrem", key);
    }
    reply(Frame::Integer(removed))
}

pub fn ltrim(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let start = arg_i64(&args[2])?;
    let stop = arg_i64(&args[3])?;
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let list = match typed_get_mut(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::List)? {
        Some(Value::List(l)) => l,
        Some(_) => return Err(RedisError::WrongType),
        None => return ok(),
    };
    let len = list.len() as i64;
    let lo = resolve_index(len, start).max(0);
    let hi = resolve_index(len, stop).min(len - 1);
    if lo > hi || len == 0 {
        list.clear();
    } else {
        let kept: VecDeque<Bytes> = list.iter().skip(lo as usize).take((hi - lo + 1) as usize).cloned().collect();
        *list = kept;
    }
    ctx.server.databases[db_index].remove_if_empty(key);
    let version = ctx.next_version();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('l', "ltrim", key);
    ok()
}

pub fn lpos(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let element = &args[2];
    let mut rank: i64 = 1;
    let mut count: Option<usize> = None;
    let mut maxlen: usize = 0;
    let mut i = 3;
    while i < args.len() {
        if is_kw(&args[i], "RANK") {
            rank = arg_i64(&args[i + 1])?;
            if rank == 0 {
                return Err(RedisError::generic("RANK can't be zero"));
            }
            i += 2;
        } else if is_kw(&args[i], "COUNT") {
            count = Some(arg_usize(&args[i + 1])?);
            i += 2;
        } else if is_kw(&args[i], "MAXLEN") {
            maxlen = arg_usize(&args[i + 1])?;
            i += 2;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let list = match typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::List)? {
        Some(Value::List(l)) => l,
        _ => {
            return if count.is_some() {
                reply(Frame::Array(vec![]))
            } else {
                reply(Frame::Nil)
            }
        }
    };
    let len = list.len();
    let mut found = Vec::new();
    let want = count.unwrap_or(1);
    let unlimited = count == Some(0);
    let scan_limit = if maxlen == 0 { len } else { maxlen };

    if rank > 0 {
        let mut skip = rank - 1;
        for (idx, v) in list.iter().enumerate().take(scan_limit.max(0).min(len)) {
            if v == element {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                found.push(idx as i64);
                if !unlimited && found.len() >= want {
                    break;
                }
            }
        }
    } else {
        let mut skip = (-rank) - 1;
        let start = len.saturating_sub(scan_limit);
        for idx in (start..len).rev() {
            if list[idx] == *element {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                found.push(idx as i64);
                if !unlimited && found.len() >= want {
                    break;
                }
            }
        }
    }
    if count.is_some() {
        reply(Frame::Array(found.into_iter().map(Frame::Integer).collect()))
    } else {
        match found.into_iter().next() {
            Some(i) => reply(Frame::Integer(i)),
            None => reply(Frame::Nil),
        }
    }
}

/// Shared by `RPOPLPUSH`/`LMOVE`/`BRPOPLPUSH`/`BLMOVE`: pop one element from
/// `(src, from_front)` and push it onto `(dst, to_front)`, atomically.
pub(crate) fn move_one(
    ctx: &mut HandlerCtx,
    src: &Bytes,
    dst: &Bytes,
    from_front: bool,
    to_front: bool,
) -> Result<Option<Bytes>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    typed_get(&mut ctx.server.databases[db_index], dst, now_ms, ValueKind::List)?;
    let popped = {
        let list = match typed_get_mut(&mut ctx.server.databases[db_index], src, now_ms, ValueKind::List)? {
            Some(Value::List(l)) => l,
            Some(_) => return Err(RedisError::WrongType),
            None => return Ok(None),
        };
        if from_front {
            list.pop_front()
        } else {
            list.pop_back()
        }
    };
    let Some(value) = popped else {
        return Ok(None);
    };
    ctx.server.databases[db_index].remove_if_empty(src);
    let list = ensure_list(ctx, dst)?;
    if to_front {
        list.push_front(value.clone());
    } else {
        list.push_back(value.clone());
    }
    let v1 = ctx.next_version();
    ctx.server.databases[db_index].bump_version(src, v1);
    let v2 = ctx.next_version();
    ctx.server.databases[db_index].bump_version(dst, v2);
    ctx.bump_dirty();
    ctx.notify('l', if from_front { "lpop" } else { "rpop" }, src);
    ctx.notify('l', if to_front { "lpush" } else { "rpush" }, dst);
    super::wake_waiters(ctx, dst, WaitKind::List);
    Ok(Some(value))
}

pub fn rpoplpush(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    match move_one(ctx, &args[1], &args[2], false, true)? {
        Some(v) => reply(Frame::Bulk(v)),
        None => reply(Frame::Nil),
    }
}

pub fn lmove(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let from_front = parse_side(&args[3])?;
    let to_front = parse_side(&args[4])?;
    match move_one(ctx, &args[1], &args[2], from_front, to_front)? {
        Some(v) => reply(Frame::Bulk(v)),
        None => reply(Frame::Nil),
    }
}

fn parse_side(arg: &Bytes) -> Result<bool, RedisError> {
    if is_kw(arg, "LEFT") {
        Ok(true)
    } else if is_kw(arg, "RIGHT") {
        Ok(false)
    } else {
        Err(RedisError::Syntax)
    }
}

/// `BLPOP key [key ...] timeout` (spec.md §4.7): returns immediately if any
/// key already has elements, otherwise parks the connection.
pub fn blpop(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    blocking_pop(ctx, args, true)
}
pub fn brpop(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    blocking_pop(ctx, args, false)
}

fn blocking_pop(ctx: &mut HandlerCtx, args: &[Bytes], front: bool) -> HandlerResult {
    let keys = &args[1..args.len() - 1];
    let timeout_secs = arg_f64(&args[args.len() - 1])?;
    for key in keys {
        let out = pop_n(ctx, key, front, None);
        if let Some(v) = out.into_iter().next() {
            return reply(Frame::Array(vec![Frame::Bulk(key.clone()), Frame::Bulk(v)]));
        }
    }
    if ctx.conn.transaction.is_active() {
        return reply(Frame::NilArray);
    }
    let db_index = ctx.db_index();
    let client_id = ctx.conn.client_id;
    let receiver =
        crate::server::Server::register_waiter(ctx.server, db_index, keys[0].clone(), WaitKind::List, client_id);
    let deadline_ms = if timeout_secs > 0.0 {
        Some((timeout_secs * 1000.0) as u64)
    } else {
        None
    };
    Ok(Outcome::Block {
        receiver,
        deadline_ms,
        retry_args: args.to_vec(),
    })
}

pub fn brpoplpush(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let timeout_secs = arg_f64(&args[3])?;
    blocking_move(ctx, &args[1], &args[2], false, true, timeout_secs, args)
}

pub fn blmove(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let from_front = parse_side(&args[3])?;
    let to_front = parse_side(&args[4])?;
    let timeout_secs = arg_f64(&args[5])?;
    blocking_move(ctx, &args[1], &args[2], from_front, to_front, timeout_secs, args)
}

fn blocking_move(
    ctx: &mut HandlerCtx,
    src: &Bytes,
    dst: &Bytes,
    from_front: bool,
    to_front: bool,
    timeout_secs: f64,
    args: &[Bytes],
) -> HandlerResult {
    if let Some(v) = move_one(ctx, src, dst, from_front, to_front)? {
        return reply(Frame::Bulk(v));
    }
    if ctx.conn.transaction.is_active() {
        return reply(Frame::Nil);
    }
    let db_index = ctx.db_index();
    let client_id = ctx.conn.client_id;
    let receiver = crate::server::Server::register_waiter(ctx.server, db_index, src.clone(), WaitKind::List, client_id);
    let deadline_ms = if timeout_secs > 0.0 {
        Some((timeout_secs * 1000.0) as u64)
    } else {
        None
    };
    Ok(Outcome::Block {
        receiver,
        deadline_ms,
        retry_args: args.to_vec(),
    })
}
