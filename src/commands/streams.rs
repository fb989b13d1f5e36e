//! Stream commands (spec.md §4.5/§4.7): `XADD XLEN XRANGE XREVRANGE XDEL
//! XTRIM XREAD XGROUP XREADGROUP XACK XPENDING XCLAIM XAUTOCLAIM XINFO`,
//! the one family with no teacher counterpart at all (the teacher predates
//! Redis Streams); built directly against `value::stream::Stream` the way
//! `zsets.rs` is built against `value::zset::ZSet`.

use bytes::Bytes;

use super::{arg_usize, is_kw, typed_get, typed_get_mut};
use crate::blocking::WaitKind;
use crate::dispatch::{ok, reply, HandlerCtx, HandlerResult, Outcome};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::value::stream::{Consumer, ConsumerGroup, Entry, PelEntry, Stream, StreamId};
use crate::value::{Value, ValueKind};

fn ensure_stream<'a>(ctx: &'a mut HandlerCtx, key: &Bytes) -> Result<&'a mut Stream, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let db = &mut ctx.server.databases[db_index];
    if typed_get(db, key, now_ms, ValueKind::Stream)?.is_none() {
        db.set(key.clone(), Value::Stream(Stream::new()), 0);
    }
    match db.get_mut(key, now_ms) {
        Some(Value::Stream(s)) => Ok(s),
        _ => unreachable!(),
    }
}

fn with_stream<'a>(ctx: &'a mut HandlerCtx, key: &Bytes) -> Result<Option<&'a Stream>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let db = &mut ctx.server.databases[db_index];
    Ok(typed_get(db, key, now_ms, ValueKind::Stream)?.map(|v| match v {
        Value::Stream(s) => s,
        _ => unreachable!(),
    }))
}

fn with_stream_mut<'a>(ctx: &'a mut HandlerCtx, key: &Bytes) -> Result<Option<&'a mut Stream>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let db = &mut ctx.server.databases[db_index];
    Ok(typed_get_mut(db, key, now_ms, ValueKind::Stream)?.map(|v| match v {
        Value::Stream(s) => s,
        _ => unreachable!(),
    }))
}

fn parse_full_id(arg: &Bytes, default_seq: u64) -> Result<StreamId, RedisError> {
    let s = super::arg_str(arg);
    match s.split_once('-') {
        Some((ms, seq)) => Ok(StreamId {
            ms: ms.parse().map_err(|_| RedisError::generic("Invalid stream ID specified as stream command argument"))?,
            seq: seq.parse().map_err(|_| RedisError::generic("Invalid stream ID specified as stream command argument"))?,
        }),
        None => Ok(StreamId {
            ms: s.parse().map_err(|_| RedisError::generic("Invalid stream ID specified as stream command argument"))?,
            seq: default_seq,
        }),
    }
}

fn prev_id(id: StreamId) -> StreamId {
    if id.seq == 0 {
        StreamId {
            ms: id.ms.saturating_sub(1),
            seq: u64::MAX,
        }
    } else {
        StreamId {
            ms: id.ms,
            seq: id.seq - 1,
        }
    }
}

/// Parses a range endpoint for `XRANGE`/`XREVRANGE`: `-`/`+`, a bare `ms`,
/// a full `ms-seq`, or a `(`-prefixed exclusive form of either.
fn parse_range_bound(arg: &Bytes, is_start: bool) -> Result<StreamId, RedisError> {
    let raw = super::arg_str(arg);
    if raw == "-" {
        return Ok(StreamId::MIN);
    }
    if raw == "+" {
        return Ok(StreamId::MAX);
    }
    let (exclusive, body) = match raw.strip_prefix('(') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let default_seq = if is_start { 0 } else { u64::MAX };
    let id = parse_full_id(&Bytes::copy_from_slice(body.as_bytes()), default_seq)?;
    Ok(if exclusive {
        if is_start {
            id.next()
        } else {
            prev_id(id)
        }
    } else {
        id
    })
}

fn entry_frame(entry: &Entry) -> Frame {
    let fields = entry
        .fields
        .iter()
        .flat_map(|(f, v)| [Frame::Bulk(f.clone()), Frame::Bulk(v.clone())])
        .collect();
    Frame::Array(vec![Frame::bulk_str(entry.id.to_string()), Frame::Array(fields)])
}

/// `XADD key [NOMKSTREAM] [MAXLEN|MINID [=|~] threshold [LIMIT n]] id field value [field value ...]`
pub fn xadd(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = args[1].clone();
    let mut i = 2;
    let mut nomkstream = false;
    let mut trim: Option<(bool, Bytes)> = None; // (is_maxlen, threshold)
    loop {
        if is_kw(&args[i], "NOMKSTREAM") {
            nomkstream = true;
            i += 1;
        } else if is_kw(&args[i], "MAXLEN") || is_kw(&args[i], "MINID") {
            let is_maxlen = is_kw(&args[i], "MAXLEN");
            i += 1;
            if is_kw(&args[i], "~") || is_kw(&args[i], "=") {
                i += 1;
            }
            trim = Some((is_maxlen, args[i].clone()));
            i += 1;
            if args.get(i).map(|a| is_kw(a, "LIMIT")).unwrap_or(false) {
                i += 2;
            }
        } else {
            break;
        }
    }
    if nomkstream && with_stream(ctx, &key)?.is_none() {
        return reply(Frame::Nil);
    }
    let id_arg = &args[i];
    i += 1;
    if (args.len() - i) < 2 || (args.len() - i) % 2 != 0 {
        return Err(RedisError::WrongArity("xadd".into()));
    }
    let now_ms = ctx.now_ms;
    let fields: Vec<(Bytes, Bytes)> = args[i..].chunks(2).map(|c| (c[0].clone(), c[1].clone())).collect();

    let stream = ensure_stream(ctx, &key)?;
    let id = if is_kw(id_arg, "*") {
        stream.next_id(now_ms)
    } else {
        let raw = super::arg_str(id_arg);
        let id = if let Some(ms_only) = raw.strip_suffix("-*") {
            let ms: u64 = ms_only.parse().map_err(|_| RedisError::generic("Invalid stream ID specified as stream command argument"))?;
            if ms == stream.last_id.ms {
                stream.last_id.next()
            } else {
                StreamId { ms, seq: 0 }
            }
        } else {
            parse_full_id(id_arg, 0)?
        };
        if id == StreamId::MIN {
            return Err(RedisError::generic("The ID specified in XADD must be greater than 0-0"));
        }
        if stream.entries_added > 0 && id <= stream.last_id {
            return Err(RedisError::generic(
                "The ID specified in XADD is equal or smaller than the target stream top item",
            ));
        }
        id
    };
    stream.append(id, fields);
    if let Some((is_maxlen, threshold)) = trim {
        trim_stream(stream, is_maxlen, &threshold)?;
    }

    super::touch(ctx, &key, 't', "xadd");
    super::wake_waiters(ctx, &key, WaitKind::Stream);
    reply(Frame::bulk_str(id.to_string()))
}

fn trim_stream(stream: &mut Stream, is_maxlen: bool, threshold: &Bytes) -> Result<(), RedisError> {
    if is_maxlen {
        let maxlen = super::arg_usize(threshold)?;
        while stream.entries.len() > maxlen {
            if let Some((&id, _)) = stream.entries.iter().next() {
                stream.delete(id);
            }
        }
    } else {
        let minid = parse_full_id(threshold, 0)?;
        let stale: Vec<StreamId> = stream.entries.range(..minid).map(|(id, _)| *id).collect();
        for id in stale {
            stream.delete(id);
        }
    }
    Ok(())
}

pub fn xlen(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let len = with_stream(ctx, key)?.map(|s| s.entries.len()).unwrap_or(0);
    reply(Frame::Integer(len as i64))
}

fn xrange_generic(ctx: &mut HandlerCtx, args: &[Bytes], reverse: bool) -> HandlerResult {
    let key = &args[1];
    let (start_arg, end_arg) = if reverse { (&args[3], &args[2]) } else { (&args[2], &args[3]) };
    let start = parse_range_bound(start_arg, true)?;
    let end = parse_range_bound(end_arg, false)?;
    let count = if args.len() > 4 && is_kw(&args[4], "COUNT") {
        Some(arg_usize(&args[5])?)
    } else {
        None
    };
    let stream = match with_stream(ctx, key)? {
        Some(s) => s,
        None => return reply(Frame::Array(vec![])),
    };
    if start > end {
        return reply(Frame::Array(vec![]));
    }
    let mut items: Vec<&Entry> = stream.range(start, end).collect();
    if reverse {
        items.reverse();
    }
    if let Some(n) = count {
        items.truncate(n);
    }
    reply(Frame::Array(items.into_iter().map(entry_frame).collect()))
}

pub fn xrange(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    xrange_generic(ctx, args, false)
}
pub fn xrevrange(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    xrange_generic(ctx, args, true)
}

pub fn xdel(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = args[1].clone();
    let ids: Vec<StreamId> = args[2..].iter().map(|a| parse_full_id(a, 0)).collect::<Result<_, _>>()?;
    let mut deleted = 0i64;
    if let Some(stream) = with_stream_mut(ctx, &key)? {
        for id in ids {
            if stream.delete(id) {
                deleted += 1;
            }
        }
    }
    if deleted > 0 {
        super::touch(ctx, &key, 't', "xdel");
    }
    reply(Frame::Integer(deleted))
}

/// `XTRIM key MAXLEN|MINID [=|~] threshold [LIMIT n]`
pub fn xtrim(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = args[1].clone();
    let is_maxlen = is_kw(&args[2], "MAXLEN");
    let mut i = 3;
    if is_kw(&args[i], "~") || is_kw(&args[i], "=") {
        i += 1;
    }
    let threshold = args[i].clone();
    let before = with_stream(ctx, &key)?.map(|s| s.entries.len()).unwrap_or(0);
    if let Some(stream) = with_stream_mut(ctx, &key)? {
        trim_stream(stream, is_maxlen, &threshold)?;
    }
    let after = with_stream(ctx, &key)?.map(|s| s.entries.len()).unwrap_or(0);
    let removed = before.saturating_sub(after);
    if removed > 0 {
        super::touch(ctx, &key, 't', "xtrim");
    }
    reply(Frame::Integer(removed as i64))
}

struct ReadSpec {
    count: Option<usize>,
    block_ms: Option<Option<u64>>,
    keys: Vec<Bytes>,
    ids: Vec<Bytes>,
}

fn parse_read_spec(args: &[Bytes]) -> Result<ReadSpec, RedisError> {
    let mut i = 1;
    let mut count = None;
    let mut block_ms = None;
    while i < args.len() {
        if is_kw(&args[i], "COUNT") {
            count = Some(arg_usize(&args[i + 1])?);
            i += 2;
        } else if is_kw(&args[i], "BLOCK") {
            let ms = arg_usize(&args[i + 1])? as u64;
            block_ms = Some(if ms == 0 { None } else { Some(ms) });
            i += 2;
        } else if is_kw(&args[i], "NOACK") {
            i += 1;
        } else if is_kw(&args[i], "GROUP") {
            i += 3;
        } else if is_kw(&args[i], "STREAMS") {
            i += 1;
            break;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    let rest = &args[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(RedisError::Syntax);
    }
    let n = rest.len() / 2;
    Ok(ReadSpec {
        count,
        block_ms,
        keys: rest[..n].to_vec(),
        ids: rest[n..].to_vec(),
    })
}

/// `XREAD [COUNT n] [BLOCK ms] STREAMS key [key ...] id [id ...]`
pub fn xread(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let spec = parse_read_spec(args)?;
    let mut out = Vec::new();
    for (key, id_arg) in spec.keys.iter().zip(spec.ids.iter()) {
        let since = if is_kw(id_arg, "$") {
            with_stream(ctx, key)?.map(|s| s.last_id).unwrap_or(StreamId::MIN)
        } else {
            parse_full_id(id_arg, u64::MAX)?
        };
        if let Some(stream) = with_stream(ctx, key)? {
            let mut entries: Vec<&Entry> = stream.range(since.next(), StreamId::MAX).collect();
            if let Some(n) = spec.count {
                entries.truncate(n);
            }
            if !entries.is_empty() {
                out.push(Frame::Array(vec![
                    Frame::Bulk(key.clone()),
                    Frame::Array(entries.into_iter().map(entry_frame).collect()),
                ]));
            }
        }
    }
    if !out.is_empty() {
        return reply(Frame::Array(out));
    }
    match spec.block_ms {
        None => reply(Frame::NilArray),
        Some(deadline_ms) if ctx.conn.transaction.is_active() => {
            let _ = deadline_ms;
            reply(Frame::NilArray)
        }
        Some(deadline_ms) => {
            let db_index = ctx.db_index();
            let client_id = ctx.conn.client_id;
            let receiver =
                crate::server::Server::register_waiter(ctx.server, db_index, spec.keys[0].clone(), WaitKind::Stream, client_id);
            Ok(Outcome::Block {
                receiver,
                deadline_ms,
                retry_args: args.to_vec(),
            })
        }
    }
}

/// `XGROUP CREATE key group id|$ [MKSTREAM] | DESTROY key group |
/// CREATECONSUMER key group consumer | DELCONSUMER key group consumer`
pub fn xgroup(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sub = super::arg_str(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "CREATE" => {
            let key = args[2].clone();
            let group = args[3].clone();
            let mkstream = args.iter().any(|a| is_kw(a, "MKSTREAM"));
            if with_stream(ctx, &key)?.is_none() {
                if !mkstream {
                    return Err(RedisError::generic(
                        "The XGROUP subcommand requires the key to exist. Note that for CREATE you may want to use the MKSTREAM option to create an empty stream automatically.",
                    ));
                }
                ensure_stream(ctx, &key)?;
            }
            let id_arg = &args[4];
            let stream = ensure_stream(ctx, &key)?;
            let last_delivered = if is_kw(id_arg, "$") { stream.last_id } else { parse_full_id(id_arg, 0)? };
            if stream.groups.contains_key(&group) {
                return Err(RedisError::BusyGroup);
            }
            stream.groups.insert(
                group,
                ConsumerGroup {
                    last_delivered_id: last_delivered,
                    ..Default::default()
                },
            );
            ok()
        }
        "DESTROY" => {
            let key = args[2].clone();
            let group = &args[3];
            let removed = with_stream_mut(ctx, &key)?
                .map(|s| s.groups.remove(group).is_some())
                .unwrap_or(false);
            reply(Frame::Integer(removed as i64))
        }
        "CREATECONSUMER" => {
            let key = args[2].clone();
            let group = args[3].clone();
            let consumer = args[4].clone();
            let now_ms = ctx.now_ms;
            let stream = with_stream_mut(ctx, &key)?.ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
            let g = stream.groups.get_mut(&group).ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
            let created = !g.consumers.contains_key(&consumer);
            g.consumers.entry(consumer).or_insert_with(|| Consumer {
                seen_time_ms: now_ms,
                active_time_ms: now_ms,
            });
            reply(Frame::Integer(created as i64))
        }
        "DELCONSUMER" => {
            let key = args[2].clone();
            let group = args[3].clone();
            let consumer = args[4].clone();
            let stream = with_stream_mut(ctx, &key)?.ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
            let g = stream.groups.get_mut(&group).ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
            let pending = g.pending.iter().filter(|(_, p)| p.consumer == consumer).count();
            g.pending.retain(|_, p| p.consumer != consumer);
            g.consumers.remove(&consumer);
            reply(Frame::Integer(pending as i64))
        }
        "SETID" => {
            let key = args[2].clone();
            let group = args[3].clone();
            let id_arg = &args[4];
            let stream = with_stream_mut(ctx, &key)?.ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
            let new_id = if is_kw(id_arg, "$") { stream.last_id } else { parse_full_id(id_arg, 0)? };
            let g = stream.groups.get_mut(&group).ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
            g.last_delivered_id = new_id;
            ok()
        }
        _ => Err(RedisError::UnknownSubcommand(sub, "XGROUP".into())),
    }
}

fn arg_string(b: &Bytes) -> String {
    String::from_utf8_lossy(b).to_string()
}

/// `XREADGROUP GROUP group consumer [COUNT n] [BLOCK ms] [NOACK] STREAMS key [key ...] id|> [id|> ...]`
pub fn xreadgroup(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    if !is_kw(&args[1], "GROUP") {
        return Err(RedisError::Syntax);
    }
    let group = args[2].clone();
    let consumer = args[3].clone();
    let noack = args.iter().any(|a| is_kw(a, "NOACK"));
    let spec = parse_read_spec_from(&args[4..])?;
    let now_ms = ctx.now_ms;

    let mut out = Vec::new();
    for (key, id_arg) in spec.keys.iter().zip(spec.ids.iter()) {
        {
            let stream = with_stream_mut(ctx, key)?.ok_or_else(|| RedisError::NoGroup(arg_string(key), arg_string(&group)))?;
            let g = stream
                .groups
                .get_mut(&group)
                .ok_or_else(|| RedisError::NoGroup(arg_string(key), arg_string(&group)))?;
            g.consumers.entry(consumer.clone()).or_insert_with(|| Consumer {
                seen_time_ms: now_ms,
                active_time_ms: now_ms,
            });
        }

        let mut entries = Vec::new();
        if is_kw(id_arg, ">") {
            let since = with_stream(ctx, key)?.unwrap().groups.get(&group).unwrap().last_delivered_id;
            let new_entries: Vec<Entry> = with_stream(ctx, key)?.unwrap().range(since.next(), StreamId::MAX).cloned().collect();
            let limited: Vec<Entry> = match spec.count {
                Some(n) => new_entries.into_iter().take(n).collect(),
                None => new_entries,
            };
            {
                let stream = with_stream_mut(ctx, key)?.unwrap();
                let g = stream.groups.get_mut(&group).unwrap();
                for entry in &limited {
                    g.last_delivered_id = entry.id;
                    if !noack {
                        g.pending.insert(
                            entry.id,
                            PelEntry {
                                consumer: consumer.clone(),
                                delivery_time_ms: now_ms,
                                delivery_count: 1,
                            },
                        );
                    }
                }
                if let Some(c) = g.consumers.get_mut(&consumer) {
                    c.active_time_ms = now_ms;
                }
            }
            entries.extend(limited);
        } else {
            let since = parse_full_id(id_arg, 0)?;
            let ids: Vec<StreamId> = with_stream(ctx, key)?
                .unwrap()
                .groups
                .get(&group)
                .unwrap()
                .pending
                .iter()
                .filter(|(id, p)| **id >= since && p.consumer == consumer)
                .map(|(id, _)| *id)
                .collect();
            let stream = with_stream(ctx, key)?.unwrap();
            for id in ids {
                if let Some(entry) = stream.entries.get(&id) {
                    entries.push(entry.clone());
                }
            }
        }
        if !entries.is_empty() {
            out.push(Frame::Array(vec![Frame::Bulk(key.clone()), Frame::Array(entries.iter().map(entry_frame).collect())]));
        }
    }
    if !out.is_empty() {
        return reply(Frame::Array(out));
    }
    match spec.block_ms {
        Some(deadline_ms) if is_kw(&spec.ids[0], ">") && !ctx.conn.transaction.is_active() => {
            let db_index = ctx.db_index();
            let client_id = ctx.conn.client_id;
            let receiver =
                crate::server::Server::register_waiter(ctx.server, db_index, spec.keys[0].clone(), WaitKind::Stream, client_id);
            Ok(Outcome::Block {
                receiver,
                deadline_ms,
                retry_args: args.to_vec(),
            })
        }
        _ => reply(Frame::NilArray),
    }
}

fn parse_read_spec_from(args: &[Bytes]) -> Result<ReadSpec, RedisError> {
    let mut i = 0;
    let mut count = None;
    let mut block_ms = None;
    while i < args.len() {
        if is_kw(&args[i], "COUNT") {
            count = Some(arg_usize(&args[i + 1])?);
            i += 2;
        } else if is_kw(&args[i], "BLOCK") {
            let ms = arg_usize(&args[i + 1])? as u64;
            block_ms = Some(if ms == 0 { None } else { Some(ms) });
            i += 2;
        } else if is_kw(&args[i], "NOACK") {
            i += 1;
        } else if is_kw(&args[i], "STREAMS") {
            i += 1;
            break;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    let rest = &args[i..];
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(RedisError::Syntax);
    }
    let n = rest.len() / 2;
    Ok(ReadSpec {
        count,
        block_ms,
        keys: rest[..n].to_vec(),
        ids: rest[n..].to_vec(),
    })
}

/// `XACK key group id [id ...]`
pub fn xack(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = args[1].clone();
    let group = args[2].clone();
    let ids: Vec<StreamId> = args[3..].iter().map(|a| parse_full_id(a, 0)).collect::<Result<_, _>>()?;
    let stream = match with_stream_mut(ctx, &key)? {
        Some(s) => s,
        None => return reply(Frame::Integer(0)),
    };
    let g = match stream.groups.get_mut(&group) {
        Some(g) => g,
        None => return reply(Frame::Integer(0)),
    };
    let mut acked = 0i64;
    for id in ids {
        if g.pending.remove(&id).is_some() {
            acked += 1;
        }
    }
    reply(Frame::Integer(acked))
}

/// `XPENDING key group [[IDLE ms] start end count [consumer]]`
pub fn xpending(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = args[1].clone();
    let group = args[2].clone();
    let stream = with_stream(ctx, &key)?.ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
    let g = stream.groups.get(&group).ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;

    if args.len() <= 3 {
        if g.pending.is_empty() {
            return reply(Frame::Array(vec![Frame::Integer(0), Frame::Nil, Frame::Nil, Frame::NilArray]));
        }
        let min = *g.pending.keys().next().unwrap();
        let max = *g.pending.keys().next_back().unwrap();
        let mut per_consumer: std::collections::HashMap<Bytes, i64> = std::collections::HashMap::new();
        for p in g.pending.values() {
            *per_consumer.entry(p.consumer.clone()).or_insert(0) += 1;
        }
        let consumers = per_consumer
            .into_iter()
            .map(|(c, n)| Frame::Array(vec![Frame::Bulk(c), Frame::bulk_str(n.to_string())]))
            .collect();
        return reply(Frame::Array(vec![
            Frame::Integer(g.pending.len() as i64),
            Frame::bulk_str(min.to_string()),
            Frame::bulk_str(max.to_string()),
            Frame::Array(consumers),
        ]));
    }

    let mut i = 3;
    let mut min_idle_ms = 0u64;
    if is_kw(&args[i], "IDLE") {
        min_idle_ms = arg_usize(&args[i + 1])? as u64;
        i += 2;
    }
    let start = parse_range_bound(&args[i], true)?;
    let end = parse_range_bound(&args[i + 1], false)?;
    let count = arg_usize(&args[i + 2])?;
    let consumer_filter = args.get(i + 3);
    let now_ms = ctx.now_ms;

    let mut out = Vec::new();
    for (id, p) in g.pending.range(start..=end) {
        if let Some(filter) = consumer_filter {
            if &p.consumer != filter {
                continue;
            }
        }
        let idle = now_ms.saturating_sub(p.delivery_time_ms);
        if idle < min_idle_ms {
            continue;
        }
        out.push(Frame::Array(vec![
            Frame::bulk_str(id.to_string()),
            Frame::Bulk(p.consumer.clone()),
            Frame::Integer(idle as i64),
            Frame::Integer(p.delivery_count as i64),
        ]));
        if out.len() >= count {
            break;
        }
    }
    reply(Frame::Array(out))
}

/// `XCLAIM key group consumer min-idle-time id [id ...] [IDLE ms] [TIME ms]
/// [RETRYCOUNT n] [FORCE] [JUSTID]`
pub fn xclaim(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = args[1].clone();
    let group = args[2].clone();
    let consumer = args[3].clone();
    let min_idle_ms = arg_usize(&args[4])? as u64;
    let mut ids = Vec::new();
    let mut i = 5;
    while i < args.len() && parse_full_id(&args[i], 0).is_ok() {
        ids.push(parse_full_id(&args[i], 0)?);
        i += 1;
    }
    let mut justid = false;
    let mut force = false;
    while i < args.len() {
        if is_kw(&args[i], "JUSTID") {
            justid = true;
            i += 1;
        } else if is_kw(&args[i], "FORCE") {
            force = true;
            i += 1;
        } else if is_kw(&args[i], "IDLE") || is_kw(&args[i], "TIME") || is_kw(&args[i], "RETRYCOUNT") {
            i += 2;
        } else {
            i += 1;
        }
    }
    let now_ms = ctx.now_ms;
    let stream = with_stream_mut(ctx, &key)?.ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
    let has_entries: Vec<bool> = ids.iter().map(|id| stream.entries.contains_key(id)).collect();
    let g = stream.groups.get_mut(&group).ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
    g.consumers.entry(consumer.clone()).or_insert_with(|| Consumer {
        seen_time_ms: now_ms,
        active_time_ms: now_ms,
    });

    let mut claimed = Vec::new();
    for (id, exists) in ids.iter().zip(has_entries) {
        let idle_ok = g.pending.get(id).map(|p| now_ms.saturating_sub(p.delivery_time_ms) >= min_idle_ms).unwrap_or(force);
        if !exists {
            g.pending.remove(id);
            continue;
        }
        if !idle_ok {
            continue;
        }
        let delivery_count = g.pending.get(id).map(|p| p.delivery_count + 1).unwrap_or(1);
        g.pending.insert(
            *id,
            PelEntry {
                consumer: consumer.clone(),
                delivery_time_ms: now_ms,
                delivery_count,
            },
        );
        claimed.push(*id);
    }
    if justid {
        reply(Frame::Array(claimed.into_iter().map(|id| Frame::bulk_str(id.to_string())).collect()))
    } else {
        let frames = claimed
            .into_iter()
            .filter_map(|id| stream.entries.get(&id).map(entry_frame))
            .collect();
        reply(Frame::Array(frames))
    }
}

/// `XAUTOCLAIM key group consumer min-idle-time start [COUNT n] [JUSTID]`
pub fn xautoclaim(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = args[1].clone();
    let group = args[2].clone();
    let consumer = args[3].clone();
    let min_idle_ms = arg_usize(&args[4])? as u64;
    let start = parse_range_bound(&args[5], true)?;
    let mut count = 100usize;
    let mut justid = false;
    let mut i = 6;
    while i < args.len() {
        if is_kw(&args[i], "COUNT") {
            count = arg_usize(&args[i + 1])?;
            i += 2;
        } else if is_kw(&args[i], "JUSTID") {
            justid = true;
            i += 1;
        } else {
            i += 1;
        }
    }
    let now_ms = ctx.now_ms;
    let stream = with_stream_mut(ctx, &key)?.ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
    let candidate_ids: Vec<StreamId> = stream
        .groups
        .get(&group)
        .ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?
        .pending
        .range(start..)
        .filter(|(_, p)| now_ms.saturating_sub(p.delivery_time_ms) >= min_idle_ms)
        .map(|(id, _)| *id)
        .take(count)
        .collect();

    let g = stream.groups.get_mut(&group).unwrap();
    g.consumers.entry(consumer.clone()).or_insert_with(|| Consumer {
        seen_time_ms: now_ms,
        active_time_ms: now_ms,
    });
    let mut claimed = Vec::new();
    let mut deleted = Vec::new();
    for id in &candidate_ids {
        if !stream.entries.contains_key(id) {
            g.pending.remove(id);
            deleted.push(*id);
            continue;
        }
        let delivery_count = g.pending.get(id).map(|p| p.delivery_count + 1).unwrap_or(1);
        g.pending.insert(
            *id,
            PelEntry {
                consumer: consumer.clone(),
                delivery_time_ms: now_ms,
                delivery_count,
            },
        );
        claimed.push(*id);
    }
    let cursor = if claimed.len() + deleted.len() < candidate_ids.len() {
        "0-0".to_string()
    } else {
        "0-0".to_string()
    };
    let entries_frame = if justid {
        Frame::Array(claimed.iter().map(|id| Frame::bulk_str(id.to_string())).collect())
    } else {
        Frame::Array(claimed.iter().filter_map(|id| stream.entries.get(id).map(entry_frame)).collect())
    };
    reply(Frame::Array(vec![
        Frame::bulk_str(cursor),
        entries_frame,
        Frame::Array(deleted.into_iter().map(|id| Frame::bulk_str(id.to_string())).collect()),
    ]))
}

/// `XINFO STREAM key | GROUPS key | CONSUMERS key group`
pub fn xinfo(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sub = super::arg_str(&args[1]).to_ascii_uppercase();
    let key = args[2].clone();
    match sub.as_str() {
        "STREAM" => {
            let stream = with_stream(ctx, &key)?.ok_or(RedisError::NoSuchKey)?;
            let first = stream.entries.values().next().map(entry_frame).unwrap_or(Frame::Nil);
            let last = stream.entries.values().next_back().map(entry_frame).unwrap_or(Frame::Nil);
            reply(Frame::Map(vec![
                (Frame::bulk_str("length"), Frame::Integer(stream.entries.len() as i64)),
                (Frame::bulk_str("last-generated-id"), Frame::bulk_str(stream.last_id.to_string())),
                (Frame::bulk_str("max-deleted-entry-id"), Frame::bulk_str(stream.max_deleted_id.to_string())),
                (Frame::bulk_str("entries-added"), Frame::Integer(stream.entries_added as i64)),
                (Frame::bulk_str("groups"), Frame::Integer(stream.groups.len() as i64)),
                (Frame::bulk_str("first-entry"), first),
                (Frame::bulk_str("last-entry"), last),
            ]))
        }
        "GROUPS" => {
            let stream = with_stream(ctx, &key)?.ok_or(RedisError::NoSuchKey)?;
            let out = stream
                .groups
                .iter()
                .map(|(name, g)| {
                    Frame::Map(vec![
                        (Frame::bulk_str("name"), Frame::Bulk(name.clone())),
                        (Frame::bulk_str("consumers"), Frame::Integer(g.consumers.len() as i64)),
                        (Frame::bulk_str("pending"), Frame::Integer(g.pending.len() as i64)),
                        (Frame::bulk_str("last-delivered-id"), Frame::bulk_str(g.last_delivered_id.to_string())),
                        (Frame::bulk_str("entries-read"), Frame::Nil),
                        (Frame::bulk_str("lag"), Frame::Nil),
                    ])
                })
                .collect();
            reply(Frame::Array(out))
        }
        "CONSUMERS" => {
            let group = args[3].clone();
            let now_ms = ctx.now_ms;
            let stream = with_stream(ctx, &key)?.ok_or(RedisError::NoSuchKey)?;
            let g = stream.groups.get(&group).ok_or_else(|| RedisError::NoGroup(arg_string(&key), arg_string(&group)))?;
            let out = g
                .consumers
                .iter()
                .map(|(name, c)| {
                    let pending = g.pending.values().filter(|p| &p.consumer == name).count();
                    Frame::Map(vec![
                        (Frame::bulk_str("name"), Frame::Bulk(name.clone())),
                        (Frame::bulk_str("pending"), Frame::Integer(pending as i64)),
                        (Frame::bulk_str("idle"), Frame::Integer(now_ms.saturating_sub(c.seen_time_ms) as i64)),
                        (Frame::bulk_str("inactive"), Frame::Integer(now_ms.saturating_sub(c.active_time_ms) as i64)),
                    ])
                })
                .collect();
            reply(Frame::Array(out))
        }
        _ => Err(RedisError::UnknownSubcommand(sub, "XINFO".into())),
    }
}
