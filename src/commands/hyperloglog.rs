//! HyperLogLog commands (spec.md §4.5): `PFADD PFCOUNT PFMERGE`, a
//! structural overlay on the String value (`value::hyperloglog::Hll`).

use bytes::Bytes;

use super::typed_get;
use crate::dispatch::{reply, HandlerCtx, HandlerResult};
use crate::resp::Frame;
use crate::value::hyperloglog::Hll;
use crate::value::{Value, ValueKind};

fn load(ctx: &mut HandlerCtx, key: &[u8]) -> Result<Hll, crate::error::RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    match typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::String)? {
        Some(Value::String(s)) => Ok(Hll::from_bytes(s)),
        _ => Ok(Hll::new()),
    }
}

pub fn pfadd(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let existed = ctx.server.databases[db_index].contains(key, now_ms);
    let mut hll = load(ctx, key)?;
    let mut changed = false;
    for item in &args[2..] {
        if hll.add(item) {
            changed = true;
        }
    }
    if changed || !existed {
        let version = ctx.next_version();
        let db_index = ctx.db_index();
        ctx.server.databases[db_index].set(key.clone(), Value::String(hll.to_bytes()), version);
        ctx.bump_dirty();
        ctx.notify('$', "pfadd", key);
    }
    reply(Frame::Integer((changed || !existed) as i64))
}

pub fn pfcount(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    if args.len() == 2 {
        let hll = load(ctx, &args[1])?;
        return reply(Frame::Integer(hll.count() as i64));
    }
    let mut merged = Hll::new();
    for key in &args[1..] {
        merged.merge(&load(ctx, key)?);
    }
    reply(Frame::Integer(merged.count() as i64))
}

pub fn pfmerge(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let dst = &args[1];
    let mut merged = load(ctx, dst)?;
    for key in &args[2..] {
        merged.merge(&load(ctx, key)?);
    }
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    ctx.server.databases[db_index].set(dst.clone(), Value::String(merged.to_bytes()), version);
    ctx.bump_dirty();
    ctx.notify('$', "pfadd", dst);
    crate::dispatch::ok()
}
