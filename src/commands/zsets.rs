//! Sorted set commands (spec.md §4.5): `ZADD ZSCORE ZMSCORE ZINCRBY ZCARD
//! ZCOUNT ZRANK ZREVRANK ZRANGE ZREVRANGE ZRANGEBYSCORE ZREVRANGEBYSCORE
//! ZRANGEBYLEX ZREVRANGEBYLEX ZRANGESTORE ZREM ZREMRANGEBYRANK
//! ZREMRANGEBYSCORE ZREMRANGEBYLEX ZPOPMIN ZPOPMAX ZRANDMEMBER ZUNIONSTORE
//! ZINTERSTORE ZDIFFSTORE ZUNION ZINTER ZDIFF ZLEXCOUNT ZSCAN`, plus the
//! blocking variants `BZPOPMIN`/`BZPOPMAX`.

use bytes::Bytes;
use rand::seq::IteratorRandom;
use rand::Rng;

use super::{arg_f64, arg_i64, arg_usize, is_kw, typed_get, typed_get_mut};
use crate::blocking::WaitKind;
use crate::dispatch::{ok, reply, HandlerCtx, HandlerResult, Outcome};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::value::zset::{Bound, LexBound};
use crate::value::{Value, ValueKind, ZSet};

fn ensure_zset<'a>(ctx: &'a mut HandlerCtx, key: &Bytes) -> Result<&'a mut ZSet, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let db = &mut ctx.server.databases[db_index];
    if typed_get(db, key, now_ms, ValueKind::ZSet)?.is_none() {
        db.set(key.clone(), Value::ZSet(ZSet::new()), 0);
    }
    match db.get_mut(key, now_ms) {
        Some(Value::ZSet(z)) => Ok(z),
        _ => unreachable!(),
    }
}

fn with_zset<'a>(ctx: &'a mut HandlerCtx, key: &[u8]) -> Result<Option<&'a ZSet>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    match typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::ZSet)? {
        Some(Value::ZSet(z)) => Ok(Some(z)),
        _ => Ok(None),
    }
}

fn materialize(ctx: &mut HandlerCtx, key: &[u8]) -> Result<ZSet, RedisError> {
    Ok(with_zset(ctx, key)?.cloned().unwrap_or_default())
}

/// `ZADD key [NX|XX] [GT|LT] [CH] [INCR] score member [score member ...]`
pub fn zadd(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let mut nx = false;
    let mut xx = false;
    let mut gt = false;
    let mut lt = false;
    let mut ch = false;
    let mut incr = false;
    let mut i = 2;
    while i < args.len() {
        let a = &args[i];
        if is_kw(a, "NX") {
            nx = true;
        } else if is_kw(a, "XX") {
            xx = true;
        } else if is_kw(a, "GT") {
            gt = true;
        } else if is_kw(a, "LT") {
            lt = true;
        } else if is_kw(a, "CH") {
            ch = true;
        } else if is_kw(a, "INCR") {
            incr = true;
        } else {
            break;
        }
        i += 1;
    }
    if nx && (gt || lt) {
        return Err(RedisError::generic("GT, LT, and/or NX options at the same time are not compatible"));
    }
    let pairs = &args[i..];
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Err(RedisError::Syntax);
    }
    if incr && pairs.len() != 2 {
        return Err(RedisError::generic("INCR option supports a single increment-element pair"));
    }

    let mut added = 0i64;
    let mut changed = 0i64;
    let mut incr_result: Option<Option<f64>> = None;
    {
        let z = ensure_zset(ctx, key)?;
        for pair in pairs.chunks(2) {
            let score = arg_f64(&pair[0])?;
            let member = &pair[1];
            let existing = z.score(member);
            if existing.is_none() && xx {
                if incr {
                    incr_result = Some(None);
                }
                continue;
            }
            if existing.is_some() && nx {
                if incr {
                    incr_result = Some(None);
                }
                continue;
            }
            let next_score = if incr { existing.unwrap_or(0.0) + score } else { score };
            if let Some(cur) = existing {
                if (gt && next_score <= cur) || (lt && next_score >= cur) {
                    if incr {
                        incr_result = Some(None);
                    }
                    continue;
                }
            }
            if next_score.is_nan() {
                return Err(RedisError::NotAFloat);
            }
            let prev = z.insert(member.clone(), next_score);
            if prev.is_none() {
                added += 1;
            } else if prev != Some(next_score) {
                changed += 1;
            }
            if incr {
                incr_result = Some(Some(next_score));
            }
        }
    }
    if added > 0 || changed > 0 {
        let version = ctx.next_version();
        let db_index = ctx.db_index();
        ctx.server.databases[db_index].bump_version(key, version);
        ctx.bump_dirty();
        ctx.notify('z', "zadd", key);
        super::wake_waiters(ctx, key, WaitKind::ZSet);
    } else {
        ctx.server.databases[ctx.db_index()].remove_if_empty(key);
    }
    if incr {
        return match incr_result.flatten() {
            Some(s) => reply(Frame::Double(s)),
            None => reply(Frame::Nil),
        };
    }
    reply(Frame::Integer(if ch { added + changed } else { added }))
}

pub fn zscore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    match with_zset(ctx, &args[1])?.and_then(|z| z.score(&args[2])) {
        Some(s) => reply(Frame::Double(s)),
        None => reply(Frame::Nil),
    }
}

pub fn zmscore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let members = &args[2..];
    let frames = match with_zset(ctx, &args[1])? {
        Some(z) => members.iter().map(|m| z.score(m).map(Frame::Double).unwrap_or(Frame::Nil)).collect(),
        None => vec![Frame::Nil; members.len()],
    };
    reply(Frame::Array(frames))
}

pub fn zincrby(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let delta = arg_f64(&args[2])?;
    let member = &args[3];
    let next;
    {
        let z = ensure_zset(ctx, key)?;
        let current = z.score(member).unwrap_or(0.0);
        next = current + delta;
        if next.is_nan() {
            return Err(RedisError::NotAFloat);
        }
        z.insert(member.clone(), next);
    }
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('z', "zincrby", key);
    reply(Frame::Double(next))
}

pub fn zcard(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let len = with_zset(ctx, &args[1])?.map(|z| z.len()).unwrap_or(0);
    reply(Frame::Integer(len as i64))
}

pub fn zcount(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let min = parse_score_bound(&args[2])?;
    let max = parse_score_bound(&args[3])?;
    let n = with_zset(ctx, &args[1])?.map(|z| z.range_by_score(min, max).len()).unwrap_or(0);
    reply(Frame::Integer(n as i64))
}

pub fn zlexcount(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let min = parse_lex_bound(&args[2])?;
    let max = parse_lex_bound(&args[3])?;
    let n = with_zset(ctx, &args[1])?.map(|z| z.range_by_lex(&min, &max).len()).unwrap_or(0);
    reply(Frame::Integer(n as i64))
}

fn rank(ctx: &mut HandlerCtx, key: &[u8], member: &[u8], reverse: bool) -> HandlerResult {
    let z = match with_zset(ctx, key)? {
        Some(z) => z,
        None => return reply(Frame::Nil),
    };
    match z.rank(member) {
        Some(r) => {
            let idx = if reverse { z.len() - 1 - r } else { r };
            reply(Frame::Integer(idx as i64))
        }
        None => reply(Frame::Nil),
    }
}

pub fn zrank(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    rank(ctx, &args[1], &args[2], false)
}
pub fn zrevrank(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    rank(ctx, &args[1], &args[2], true)
}

fn parse_score_bound(arg: &Bytes) -> Result<Bound, RedisError> {
    if let Some(rest) = arg.strip_prefix(b"(") {
        let text = std::str::from_utf8(rest).map_err(|_| RedisError::InvalidScoreRange)?;
        Ok(Bound::Exclusive(crate::value::string::parse_float(text.as_bytes()).map_err(|_| RedisError::InvalidScoreRange)?))
    } else {
        Ok(Bound::Inclusive(crate::value::string::parse_float(arg).map_err(|_| RedisError::InvalidScoreRange)?))
    }
}

fn parse_lex_bound(arg: &Bytes) -> Result<LexBound, RedisError> {
    if arg.as_ref() == b"-" {
        Ok(LexBound::NegInfinity)
    } else if arg.as_ref() == b"+" {
        Ok(LexBound::PosInfinity)
    } else if let Some(rest) = arg.strip_prefix(b"[") {
        Ok(LexBound::Inclusive(Bytes::copy_from_slice(rest)))
    } else if let Some(rest) = arg.strip_prefix(b"(") {
        Ok(LexBound::Exclusive(Bytes::copy_from_slice(rest)))
    } else {
        Err(RedisError::InvalidLexRange)
    }
}

fn resolve_index(len: i64, i: i64) -> i64 {
    if i < 0 {
        len + i
    } else {
        i
    }
}

fn rank_range_frames(z: &ZSet, start: i64, stop: i64, reverse: bool, with_scores: bool) -> Frame {
    let len = z.len() as i64;
    let lo = resolve_index(len, start).max(0);
    let hi = resolve_index(len, stop).min(len - 1);
    if lo > hi || len == 0 {
        return Frame::Array(vec![]);
    }
    let items: Vec<&crate::value::zset::Ranked> = z.range_by_rank(lo as usize, hi as usize);
    let ordered: Vec<&crate::value::zset::Ranked> = if reverse { items.into_iter().rev().collect() } else { items };
    frames_from_ranked(ordered, with_scores)
}

fn frames_from_ranked(items: Vec<&crate::value::zset::Ranked>, with_scores: bool) -> Frame {
    if with_scores {
        Frame::Array(
            items
                .into_iter()
                .flat_map(|r| [Frame::Bulk(r.member.clone()), Frame::Double(r.score.0)])
                .collect(),
        )
    } else {
        Frame::array_of_bulks(items.into_iter().map(|r| r.member.clone()))
    }
}

pub fn zrange(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    zrange_generic(ctx, args, false)
}
pub fn zrevrange(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    zrange_generic(ctx, args, true)
}

fn zrange_generic(ctx: &mut HandlerCtx, args: &[Bytes], reverse: bool) -> HandlerResult {
    let key = &args[1];
    let start = arg_i64(&args[2])?;
    let stop = arg_i64(&args[3])?;
    let with_scores = args.len() > 4 && is_kw(&args[4], "WITHSCORES");
    let z = match with_zset(ctx, key)? {
        Some(z) => z,
        None => return reply(Frame::Array(vec![])),
    };
    reply(rank_range_frames(z, start, stop, reverse, with_scores))
}

fn zrangebyscore_generic(ctx: &mut HandlerCtx, args: &[Bytes], reverse: bool) -> HandlerResult {
    let key = &args[1];
    let (min_arg, max_arg) = if reverse { (&args[3], &args[2]) } else { (&args[2], &args[3]) };
    let min = parse_score_bound(min_arg)?;
    let max = parse_score_bound(max_arg)?;
    let mut with_scores = false;
    let mut limit: Option<(i64, i64)> = None;
    let mut i = 4;
    while i < args.len() {
        if is_kw(&args[i], "WITHSCORES") {
            with_scores = true;
            i += 1;
        } else if is_kw(&args[i], "LIMIT") {
            limit = Some((arg_i64(&args[i + 1])?, arg_i64(&args[i + 2])?));
            i += 3;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    let z = match with_zset(ctx, key)? {
        Some(z) => z,
        None => return reply(Frame::Array(vec![])),
    };
    let mut items = z.range_by_score(min, max);
    if reverse {
        items.reverse();
    }
    if let Some((offset, count)) = limit {
        let offset = offset.max(0) as usize;
        items = items.into_iter().skip(offset).collect();
        if count >= 0 {
            items.truncate(count as usize);
        }
    }
    reply(frames_from_ranked(items, with_scores))
}

pub fn zrangebyscore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    zrangebyscore_generic(ctx, args, false)
}
pub fn zrevrangebyscore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    zrangebyscore_generic(ctx, args, true)
}

fn zrangebylex_generic(ctx: &mut HandlerCtx, args: &[Bytes], reverse: bool) -> HandlerResult {
    let key = &args[1];
    let (min_arg, max_arg) = if reverse { (&args[3], &args[2]) } else { (&args[2], &args[3]) };
    let min = parse_lex_bound(min_arg)?;
    let max = parse_lex_bound(max_arg)?;
    let mut limit: Option<(i64, i64)> = None;
    if args.len() > 4 {
        if is_kw(&args[4], "LIMIT") {
            limit = Some((arg_i64(&args[5])?, arg_i64(&args[6])?));
        } else {
            return Err(RedisError::Syntax);
        }
    }
    let z = match with_zset(ctx, key)? {
        Some(z) => z,
        None => return reply(Frame::Array(vec![])),
    };
    let mut items = z.range_by_lex(&min, &max);
    if reverse {
        items.reverse();
    }
    if let Some((offset, count)) = limit {
        let offset = offset.max(0) as usize;
        items = items.into_iter().skip(offset).collect();
        if count >= 0 {
            items.truncate(count as usize);
        }
    }
    reply(frames_from_ranked(items, false))
}

pub fn zrangebylex(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    zrangebylex_generic(ctx, args, false)
}
pub fn zrevrangebylex(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    zrangebylex_generic(ctx, args, true)
}

/// `ZRANGESTORE dst src min max [BYSCORE|BYLEX] [REV] [LIMIT off cnt]`
pub fn zrangestore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let dst = &args[1];
    let src = &args[2];
    let mut by_score = false;
    let mut by_lex = false;
    let mut rev = false;
    let mut limit: Option<(i64, i64)> = None;
    let mut i = 5;
    while i < args.len() {
        if is_kw(&args[i], "BYSCORE") {
            by_score = true;
            i += 1;
        } else if is_kw(&args[i], "BYLEX") {
            by_lex = true;
            i += 1;
        } else if is_kw(&args[i], "REV") {
            rev = true;
            i += 1;
        } else if is_kw(&args[i], "LIMIT") {
            limit = Some((arg_i64(&args[i + 1])?, arg_i64(&args[i + 2])?));
            i += 3;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    let z = materialize(ctx, src)?;
    let (min_arg, max_arg) = (&args[3], &args[4]);
    let mut ranked: Vec<(Bytes, f64)> = if by_lex {
        let (lo, hi) = if rev { (max_arg, min_arg) } else { (min_arg, max_arg) };
        let min = parse_lex_bound(lo)?;
        let max = parse_lex_bound(hi)?;
        let mut items = z.range_by_lex(&min, &max);
        if rev {
            items.reverse();
        }
        items.into_iter().map(|r| (r.member.clone(), r.score.0)).collect()
    } else if by_score {
        let (lo, hi) = if rev { (max_arg, min_arg) } else { (min_arg, max_arg) };
        let min = parse_score_bound(lo)?;
        let max = parse_score_bound(hi)?;
        let mut items = z.range_by_score(min, max);
        if rev {
            items.reverse();
        }
        items.into_iter().map(|r| (r.member.clone(), r.score.0)).collect()
    } else {
        let start = arg_i64(min_arg)?;
        let stop = arg_i64(max_arg)?;
        let len = z.len() as i64;
        let lo = resolve_index(len, start).max(0);
        let hi = resolve_index(len, stop).min(len - 1);
        if lo > hi || len == 0 {
            Vec::new()
        } else {
            let mut items = z.range_by_rank(lo as usize, hi as usize);
            if rev {
                items.reverse();
            }
            items.into_iter().map(|r| (r.member.clone(), r.score.0)).collect()
        }
    };
    if let Some((offset, count)) = limit {
        let offset = offset.max(0) as usize;
        ranked = ranked.into_iter().skip(offset).collect();
        if count >= 0 {
            ranked.truncate(count as usize);
        }
    }
    let len = ranked.len();
    let db_index = ctx.db_index();
    if ranked.is_empty() {
        ctx.server.databases[db_index].remove(dst);
    } else {
        let mut out = ZSet::new();
        for (m, s) in ranked {
            out.insert(m, s);
        }
        let version = ctx.next_version();
        ctx.server.databases[db_index].set(dst.clone(), Value::ZSet(out), version);
    }
    ctx.bump_dirty();
    ctx.notify('z', "zrangestore", dst);
    reply(Frame::Integer(len as i64))
}

pub fn zrem(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let removed = match typed_get_mut(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::ZSet)? {
        Some(Value::ZSet(z)) => args[2..].iter().filter(|m| z.remove(m).is_some()).count(),
        _ => 0,
    };
    if removed > 0 {
        ctx.server.databases[db_index].remove_if_empty(key);
        let version = ctx.next_version();
        ctx.server.databases[db_index].bump_version(key, version);
        ctx.bump_dirty();
        ctx.notify('z', "zrem", key);
    }
    reply(Frame::Integer(removed as i64))
}

pub fn zremrangebyrank(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let start = arg_i64(&args[2])?;
    let stop = arg_i64(&args[3])?;
    let members: Vec<Bytes> = {
        let z = match with_zset(ctx, key)? {
            Some(z) => z,
            None => return reply(Frame::Integer(0)),
        };
        let len = z.len() as i64;
        let lo = resolve_index(len, start).max(0);
        let hi = resolve_index(len, stop).min(len - 1);
        if lo > hi || len == 0 {
            Vec::new()
        } else {
            z.range_by_rank(lo as usize, hi as usize).into_iter().map(|r| r.member.clone()).collect()
        }
    };
    remove_members(ctx, key, &members)
}

pub fn zremrangebyscore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let min = parse_score_bound(&args[2])?;
    let max = parse_score_bound(&args[3])?;
    let members: Vec<Bytes> = with_zset(ctx, key)?.map(|z| z.range_by_score(min, max).into_iter().map(|r| r.member.clone()).collect()).unwrap_or_default();
    remove_members(ctx, key, &members)
}

pub fn zremrangebylex(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let min = parse_lex_bound(&args[2])?;
    let max = parse_lex_bound(&args[3])?;
    let members: Vec<Bytes> = with_zset(ctx, key)?.map(|z| z.range_by_lex(&min, &max).into_iter().map(|r| r.member.clone()).collect()).unwrap_or_default();
    remove_members(ctx, key, &members)
}

fn remove_members(ctx: &mut HandlerCtx, key: &[u8], members: &[Bytes]) -> HandlerResult {
    if members.is_empty() {
        return reply(Frame::Integer(0));
    }
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    if let Some(Value::ZSet(z)) = typed_get_mut(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::ZSet)? {
        for m in members {
            z.remove(m);
        }
    }
    ctx.server.databases[db_index].remove_if_empty(key);
    let version = ctx.next_version();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('z', "zremrangebyscore", key);
    reply(Frame::Integer(members.len() as i64))
}

fn pop_extreme(ctx: &mut HandlerCtx, args: &[Bytes], take_max: bool) -> HandlerResult {
    let key = &args[1];
    let count = if args.len() > 2 { arg_usize(&args[2])? } else { 1 };
    let picked: Vec<(Bytes, f64)> = {
        let z = match with_zset(ctx, key)? {
            Some(z) => z,
            None => return reply(Frame::Array(vec![])),
        };
        let mut iter: Box<dyn Iterator<Item = &crate::value::zset::Ranked>> =
            if take_max { Box::new(z.iter_ascending().rev()) } else { Box::new(z.iter_ascending()) };
        (&mut iter).take(count).map(|r| (r.member.clone(), r.score.0)).collect()
    };
    let members: Vec<Bytes> = picked.iter().map(|(m, _)| m.clone()).collect();
    if !members.is_empty() {
        let db_index = ctx.db_index();
        let now_ms = ctx.now_ms;
        if let Some(Value::ZSet(z)) = typed_get_mut(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::ZSet)? {
            for m in &members {
                z.remove(m);
            }
        }
        ctx.server.databases[db_index].remove_if_empty(key);
        let version = ctx.next_version();
        ctx.server.databases[db_index].bump_version(key, version);
        ctx.bump_dirty();
        ctx.notify('z', if take_max { "zpopmax" } else { "zpopmin" }, key);
    }
    let frame = Frame::Array(picked.into_iter().flat_map(|(m, s)| [Frame::Bulk(m), Frame::Double(s)]).collect());
    reply(frame)
}

pub fn zpopmin(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    pop_extreme(ctx, args, false)
}
pub fn zpopmax(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    pop_extreme(ctx, args, true)
}

fn blocking_pop_extreme(ctx: &mut HandlerCtx, args: &[Bytes], take_max: bool) -> HandlerResult {
    let keys = &args[1..args.len() - 1];
    let timeout_secs = arg_f64(&args[args.len() - 1])?;
    for key in keys {
        let popped = {
            let args2 = [Bytes::new(), key.clone()];
            pop_extreme(ctx, &args2, take_max)?
        };
        if let Outcome::Reply(Frame::Array(items)) = popped {
            if !items.is_empty() {
                let mut out = vec![Frame::Bulk(key.clone())];
                out.extend(items);
                return reply(Frame::Array(out));
            }
        }
    }
    if ctx.conn.transaction.is_active() {
        return reply(Frame::NilArray);
    }
    let db_index = ctx.db_index();
    let client_id = ctx.conn.client_id;
    let receiver = crate::server::Server::register_waiter(ctx.server, db_index, keys[0].clone(), WaitKind::ZSet, client_id);
    let deadline_ms = if timeout_secs > 0.0 { Some((timeout_secs * 1000.0) as u64) } else { None };
    Ok(Outcome::Block { receiver, deadline_ms, retry_args: args.to_vec() })
}

pub fn bzpopmin(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    blocking_pop_extreme(ctx, args, false)
}
pub fn bzpopmax(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    blocking_pop_extreme(ctx, args, true)
}

pub fn zrandmember(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let count_arg = if args.len() > 2 { Some(arg_i64(&args[2])?) } else { None };
    let with_scores = args.len() > 3 && is_kw(&args[3], "WITHSCORES");
    let z = match with_zset(ctx, key)? {
        Some(z) => z,
        None => {
            return if count_arg.is_some() {
                reply(Frame::Array(vec![]))
            } else {
                reply(Frame::Nil)
            }
        }
    };
    let items: Vec<&crate::value::zset::Ranked> = z.iter_ascending().collect();
    match count_arg {
        None => match items.iter().choose(&mut ctx.server.rng) {
            Some(r) => reply(Frame::Bulk(r.member.clone())),
            None => reply(Frame::Nil),
        },
        Some(n) if n >= 0 => {
            let picked = items.iter().copied().choose_multiple(&mut ctx.server.rng, (n as usize).min(items.len()));
            reply(frames_from_ranked(picked, with_scores))
        }
        Some(n) => {
            if items.is_empty() {
                return reply(Frame::Array(vec![]));
            }
            let n = (-n) as usize;
            let picked: Vec<&crate::value::zset::Ranked> = (0..n).map(|_| items[ctx.server.rng.gen_range(0..items.len())]).collect();
            reply(frames_from_ranked(picked, with_scores))
        }
    }
}

enum Agg {
    Sum,
    Min,
    Max,
}

fn combine(op_union: bool, sets: &[(ZSet, f64)], agg: Agg) -> ZSet {
    let mut out = ZSet::new();
    if op_union {
        for (z, weight) in sets {
            for (m, s) in z.members() {
                let weighted = s * weight;
                let next = match out.score(m) {
                    Some(existing) => match agg {
                        Agg::Sum => existing + weighted,
                        Agg::Min => existing.min(weighted),
                        Agg::Max => existing.max(weighted),
                    },
                    None => weighted,
                };
                out.insert(m.clone(), next);
            }
        }
    } else {
        let Some((first, w0)) = sets.first() else {
            return out;
        };
        'member: for (m, s) in first.members() {
            let mut acc = s * w0;
            for (z, weight) in &sets[1..] {
                match z.score(m) {
                    Some(other) => {
                        let weighted = other * weight;
                        acc = match agg {
                            Agg::Sum => acc + weighted,
                            Agg::Min => acc.min(weighted),
                            Agg::Max => acc.max(weighted),
                        };
                    }
                    None => continue 'member,
                }
            }
            out.insert(m.clone(), acc);
        }
    }
    out
}

/// `ZUNIONSTORE dst numkeys key [key ...] [WEIGHTS w ...] [AGGREGATE SUM|MIN|MAX]`
fn store_combine(ctx: &mut HandlerCtx, args: &[Bytes], op_union: bool) -> HandlerResult {
    let dst = &args[1];
    let numkeys = arg_usize(&args[2])?;
    let keys = &args[3..3 + numkeys];
    let mut weights = vec![1.0f64; numkeys];
    let mut agg = Agg::Sum;
    let mut i = 3 + numkeys;
    while i < args.len() {
        if is_kw(&args[i], "WEIGHTS") {
            for (slot, w) in weights.iter_mut().zip(&args[i + 1..i + 1 + numkeys]) {
                *slot = arg_f64(w)?;
            }
            i += 1 + numkeys;
        } else if is_kw(&args[i], "AGGREGATE") {
            agg = if is_kw(&args[i + 1], "MIN") {
                Agg::Min
            } else if is_kw(&args[i + 1], "MAX") {
                Agg::Max
            } else {
                Agg::Sum
            };
            i += 2;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    let mut sets = Vec::with_capacity(numkeys);
    for (key, weight) in keys.iter().zip(weights) {
        sets.push((materialize(ctx, key)?, weight));
    }
    let out = combine(op_union, &sets, agg);
    let len = out.len();
    let db_index = ctx.db_index();
    if out.is_empty() {
        ctx.server.databases[db_index].remove(dst);
    } else {
        let version = ctx.next_version();
        ctx.server.databases[db_index].set(dst.clone(), Value::ZSet(out), version);
    }
    ctx.bump_dirty();
    ctx.notify('z', "zunionstore", dst);
    reply(Frame::Integer(len as i64))
}

pub fn zunionstore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    store_combine(ctx, args, true)
}
pub fn zinterstore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    store_combine(ctx, args, false)
}

fn combine_nostore(ctx: &mut HandlerCtx, args: &[Bytes], op_union: bool, diff: bool) -> HandlerResult {
    let numkeys = arg_usize(&args[1])?;
    let keys = &args[2..2 + numkeys];
    let with_scores = args.len() > 2 + numkeys && is_kw(&args[2 + numkeys], "WITHSCORES");
    if diff {
        let mut sets = Vec::with_capacity(numkeys);
        for key in keys {
            sets.push(materialize(ctx, key)?);
        }
        let mut out = sets[0].clone();
        for other in &sets[1..] {
            for (m, _) in other.members() {
                out.remove(m);
            }
        }
        let items: Vec<&crate::value::zset::Ranked> = out.iter_ascending().collect();
        return reply(frames_from_ranked(items, with_scores));
    }
    let mut sets = Vec::with_capacity(numkeys);
    for key in keys {
        sets.push((materialize(ctx, key)?, 1.0));
    }
    let out = combine(op_union, &sets, Agg::Sum);
    let items: Vec<&crate::value::zset::Ranked> = out.iter_ascending().collect();
    reply(frames_from_ranked(items, with_scores))
}

pub fn zunion(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    combine_nostore(ctx, args, true, false)
}
pub fn zinter(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    combine_nostore(ctx, args, false, false)
}
pub fn zdiff(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    combine_nostore(ctx, args, false, true)
}

pub fn zdiffstore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let dst = &args[1];
    let numkeys = arg_usize(&args[2])?;
    let keys = &args[3..3 + numkeys];
    let mut sets = Vec::with_capacity(numkeys);
    for key in keys {
        sets.push(materialize(ctx, key)?);
    }
    let mut out = sets[0].clone();
    for other in &sets[1..] {
        for (m, _) in other.members() {
            out.remove(m);
        }
    }
    let len = out.len();
    let db_index = ctx.db_index();
    if out.is_empty() {
        ctx.server.databases[db_index].remove(dst);
    } else {
        let version = ctx.next_version();
        ctx.server.databases[db_index].set(dst.clone(), Value::ZSet(out), version);
    }
    ctx.bump_dirty();
    ctx.notify('z', "zdiffstore", dst);
    reply(Frame::Integer(len as i64))
}

pub fn zscan(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let pattern = super::hashes::scan_pattern(&args[3..]);
    let items: Vec<(Bytes, f64)> = with_zset(ctx, &args[1])?
        .map(|z| {
            z.iter_ascending()
                .filter(|r| pattern.as_ref().map(|p| crate::pubsub::glob_match(p, &r.member)).unwrap_or(true))
                .map(|r| (r.member.clone(), r.score.0))
                .collect()
        })
        .unwrap_or_default();
    let flat: Vec<Frame> = items.into_iter().flat_map(|(m, s)| [Frame::Bulk(m), Frame::bulk_str(crate::value::string::format_float(s))]).collect();
    reply(Frame::Array(vec![Frame::bulk_str("0"), Frame::Array(flat)]))
}
