//! Bitmap commands (spec.md §4.5), a structural overlay on the String
//! value: `SETBIT GETBIT BITCOUNT BITPOS BITOP BITFIELD`.

use bytes::{Bytes, BytesMut};

use super::{arg_i64, is_kw, typed_get, typed_get_mut};
use crate::dispatch::{reply, HandlerCtx, HandlerResult};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::value::bitmap::{self, BitOp};
use crate::value::{Value, ValueKind};

fn ensure_string<'a>(ctx: &'a mut HandlerCtx, key: &Bytes) -> Result<&'a mut Bytes, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let db = &mut ctx.server.databases[db_index];
    if typed_get(db, key, now_ms, ValueKind::String)?.is_none() {
        db.set(key.clone(), Value::String(Bytes::new()), 0);
    }
    match db.get_mut(key, now_ms) {
        Some(Value::String(s)) => Ok(s),
        _ => unreachable!(),
    }
}

fn read_string(ctx: &mut HandlerCtx, key: &[u8]) -> Result<Option<Bytes>, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    match typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::String)? {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        _ => Ok(None),
    }
}

pub fn setbit(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let offset = arg_i64(&args[2])?;
    if offset < 0 || offset >= (4 * 1024 * 1024 * 1024 * 8) {
        return Err(RedisError::generic("bit offset is not an integer or out of range"));
    }
    let bit = match args[3].as_ref() {
        b"0" => false,
        b"1" => true,
        _ => return Err(RedisError::generic("bit is not an integer or out of range")),
    };
    let prev;
    {
        let s = ensure_string(ctx, key)?;
        let mut buf = BytesMut::from(s.as_ref());
        prev = bitmap::set_bit(&mut buf, offset as usize, bit);
        *s = buf.freeze();
    }
    let version = ctx.next_version();
    let db_index = ctx.db_index();
    ctx.server.databases[db_index].bump_version(key, version);
    ctx.bump_dirty();
    ctx.notify('$', "setbit", key);
    reply(Frame::Integer(prev as i64))
}

pub fn getbit(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let offset = arg_i64(&args[2])?;
    if offset < 0 {
        return Err(RedisError::generic("bit offset is not an integer or out of range"));
    }
    let set = match read_string(ctx, &args[1])? {
        Some(s) => bitmap::get_bit(&s, offset as usize),
        None => false,
    };
    reply(Frame::Integer(set as i64))
}

fn resolve_byte_range(len: usize, start: i64, end: i64) -> (usize, usize) {
    let len = len as i64;
    let mut lo = if start < 0 { (len + start).max(0) } else { start };
    let mut hi = if end < 0 { len + end } else { end };
    hi = hi.min(len - 1);
    lo = lo.min(len.max(0));
    if hi < 0 || lo > hi {
        (1, 0)
    } else {
        (lo as usize, hi as usize)
    }
}

/// `BITCOUNT key [start end [BYTE|BIT]]`
pub fn bitcount(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let data = read_string(ctx, &args[1])?.unwrap_or_default();
    if args.len() == 2 {
        return reply(Frame::Integer(bitmap::bit_count(&data, 0, data.len().saturating_sub(1)) as i64));
    }
    if args.len() < 4 {
        return Err(RedisError::Syntax);
    }
    let start = arg_i64(&args[2])?;
    let end = arg_i64(&args[3])?;
    let by_bit = args.len() > 4 && is_kw(&args[4], "BIT");
    if by_bit {
        let total_bits = data.len() * 8;
        let (lo, hi) = resolve_byte_range(total_bits, start, end);
        if lo > hi {
            return reply(Frame::Integer(0));
        }
        let count = (lo..=hi).filter(|&bit| bitmap::get_bit(&data, bit)).count();
        return reply(Frame::Integer(count as i64));
    }
    let (lo, hi) = resolve_byte_range(data.len(), start, end);
    if lo > hi {
        return reply(Frame::Integer(0));
    }
    reply(Frame::Integer(bitmap::bit_count(&data, lo, hi) as i64))
}

/// `BITPOS key bit [start [end [BYTE|BIT]]]`
pub fn bitpos(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let data = read_string(ctx, &args[1])?.unwrap_or_default();
    let target = match args[2].as_ref() {
        b"0" => false,
        b"1" => true,
        _ => return Err(RedisError::generic("The bit argument must be 1 or 0.")),
    };
    if data.is_empty() {
        return reply(Frame::Integer(if target { -1 } else { 0 }));
    }
    let has_range = args.len() > 3;
    let start = if has_range { arg_i64(&args[3])? } else { 0 };
    let explicit_end = args.len() > 4;
    let end = if explicit_end { arg_i64(&args[4])? } else { -1 };
    let by_bit = args.len() > 5 && is_kw(&args[5], "BIT");
    if by_bit {
        let total_bits = data.len() * 8;
        let (lo, hi) = resolve_byte_range(total_bits, start, end);
        if lo > hi {
            return reply(Frame::Integer(-1));
        }
        for bit in lo..=hi {
            if bitmap::get_bit(&data, bit) == target {
                return reply(Frame::Integer(bit as i64));
            }
        }
        return reply(Frame::Integer(-1));
    }
    let (lo, hi) = resolve_byte_range(data.len(), start, end);
    if lo > hi {
        return reply(Frame::Integer(-1));
    }
    match bitmap::bit_pos(&data, target, lo, hi) {
        Some(pos) => {
            // Unbounded search for a clear bit past an all-ones string
            // reports the first bit beyond the string, matching Redis.
            if !target && !explicit_end && pos >= data.len() * 8 {
                reply(Frame::Integer((data.len() * 8) as i64))
            } else {
                reply(Frame::Integer(pos as i64))
            }
        }
        None => {
            if !target && !explicit_end {
                reply(Frame::Integer((data.len() * 8) as i64))
            } else {
                reply(Frame::Integer(-1))
            }
        }
    }
}

/// `BITOP AND|OR|XOR|NOT destkey srckey [srckey ...]`
pub fn bitop(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let op = if is_kw(&args[1], "AND") {
        BitOp::And
    } else if is_kw(&args[1], "OR") {
        BitOp::Or
    } else if is_kw(&args[1], "XOR") {
        BitOp::Xor
    } else if is_kw(&args[1], "NOT") {
        BitOp::Not
    } else {
        return Err(RedisError::Syntax);
    };
    let dst = &args[2];
    let srcs = &args[3..];
    if matches!(op, BitOp::Not) && srcs.len() != 1 {
        return Err(RedisError::generic("BITOP NOT must be called with a single source key"));
    }
    let mut sources = Vec::with_capacity(srcs.len());
    for key in srcs {
        sources.push(read_string(ctx, key)?.unwrap_or_default());
    }
    let result = bitmap::bit_op(op, &sources);
    let len = result.len();
    let db_index = ctx.db_index();
    if result.is_empty() {
        ctx.server.databases[db_index].remove(dst);
    } else {
        let version = ctx.next_version();
        ctx.server.databases[db_index].set(dst.clone(), Value::String(result), version);
    }
    ctx.bump_dirty();
    ctx.notify('$', "set", dst);
    reply(Frame::Integer(len as i64))
}

enum FieldType {
    Signed(u8),
    Unsigned(u8),
}

fn parse_field_type(arg: &Bytes) -> Result<FieldType, RedisError> {
    let text = std::str::from_utf8(arg).map_err(|_| RedisError::Syntax)?;
    let (signed, rest) = match text.as_bytes().first() {
        Some(b'i') => (true, &text[1..]),
        Some(b'u') => (false, &text[1..]),
        _ => return Err(RedisError::generic("Invalid bitfield type. Use something like i16 u8. Note that u64 is not supported but i64 is.")),
    };
    let bits: u8 = rest.parse().map_err(|_| RedisError::Syntax)?;
    if bits == 0 || bits > 64 || (!signed && bits > 63) {
        return Err(RedisError::generic("Invalid bitfield type. Use something like i16 u8. Note that u64 is not supported but i64 is."));
    }
    Ok(if signed { FieldType::Signed(bits) } else { FieldType::Unsigned(bits) })
}

fn parse_bitfield_offset(arg: &Bytes, bits: u8) -> Result<usize, RedisError> {
    if let Some(rest) = arg.strip_prefix(b"#") {
        let n: i64 = std::str::from_utf8(rest).ok().and_then(|s| s.parse().ok()).ok_or(RedisError::Syntax)?;
        Ok((n * bits as i64) as usize)
    } else {
        let n: i64 = std::str::from_utf8(arg).ok().and_then(|s| s.parse().ok()).ok_or(RedisError::Syntax)?;
        Ok(n as usize)
    }
}

fn get_field(data: &[u8], offset: usize, bits: u8, signed: bool) -> i64 {
    let mut raw: u64 = 0;
    for i in 0..bits {
        raw = (raw << 1) | bitmap::get_bit(data, offset + i as usize) as u64;
    }
    if signed && bits < 64 && (raw & (1 << (bits - 1))) != 0 {
        (raw as i64) - (1i64 << bits)
    } else {
        raw as i64
    }
}

fn set_field(buf: &mut BytesMut, offset: usize, bits: u8, value: i64) {
    let raw = value as u64;
    for i in 0..bits {
        let shift = bits - 1 - i;
        let bit = (raw >> shift) & 1 == 1;
        bitmap::set_bit(buf, offset + i as usize, bit);
    }
}

/// `BITFIELD key [GET type offset | SET type offset value | INCRBY type offset increment | OVERFLOW WRAP|SAT|FAIL]...`
pub fn bitfield(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let mut results = Vec::new();
    let mut overflow = "WRAP";
    let mut i = 2;
    let mut buf = BytesMut::from(read_string(ctx, key)?.unwrap_or_default().as_ref());
    let mut dirty = false;
    while i < args.len() {
        if is_kw(&args[i], "OVERFLOW") {
            overflow = match args[i + 1].as_ref() {
                b"WRAP" | b"wrap" => "WRAP",
                b"SAT" | b"sat" => "SAT",
                b"FAIL" | b"fail" => "FAIL",
                _ => return Err(RedisError::Syntax),
            };
            i += 2;
            continue;
        }
        if is_kw(&args[i], "GET") {
            let ftype = parse_field_type(&args[i + 1])?;
            let bits = field_bits(&ftype);
            let signed = matches!(ftype, FieldType::Signed(_));
            let offset = parse_bitfield_offset(&args[i + 2], bits)?;
            results.push(Some(get_field(&buf, offset, bits, signed)));
            i += 3;
        } else if is_kw(&args[i], "SET") {
            let ftype = parse_field_type(&args[i + 1])?;
            let bits = field_bits(&ftype);
            let signed = matches!(ftype, FieldType::Signed(_));
            let offset = parse_bitfield_offset(&args[i + 2], bits)?;
            let value = arg_i64(&args[i + 3])?;
            ensure_capacity(&mut buf, offset, bits);
            let prev = get_field(&buf, offset, bits, signed);
            set_field(&mut buf, offset, bits, value);
            results.push(Some(prev));
            dirty = true;
            i += 4;
        } else if is_kw(&args[i], "INCRBY") {
            let ftype = parse_field_type(&args[i + 1])?;
            let bits = field_bits(&ftype);
            let signed = matches!(ftype, FieldType::Signed(_));
            let offset = parse_bitfield_offset(&args[i + 2], bits)?;
            let delta = arg_i64(&args[i + 3])?;
            ensure_capacity(&mut buf, offset, bits);
            let current = get_field(&buf, offset, bits, signed);
            match apply_overflow(current, delta, bits, signed, overflow) {
                Some(next) => {
                    set_field(&mut buf, offset, bits, next);
                    results.push(Some(next));
                }
                None => results.push(None),
            }
            dirty = true;
            i += 4;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    if dirty {
        let version = ctx.next_version();
        let db_index = ctx.db_index();
        ctx.server.databases[db_index].set(key.clone(), Value::String(buf.freeze()), version);
        ctx.bump_dirty();
        ctx.notify('$', "setbit", key);
    }
    reply(Frame::Array(results.into_iter().map(|r| r.map(Frame::Integer).unwrap_or(Frame::Nil)).collect()))
}

fn field_bits(ftype: &FieldType) -> u8 {
    match ftype {
        FieldType::Signed(b) | FieldType::Unsigned(b) => *b,
    }
}

fn ensure_capacity(buf: &mut BytesMut, offset: usize, bits: u8) {
    let last_byte = (offset + bits as usize - 1) / 8;
    if last_byte >= buf.len() {
        buf.resize(last_byte + 1, 0);
    }
}

fn apply_overflow(current: i64, delta: i64, bits: u8, signed: bool, mode: &str) -> Option<i64> {
    let (min, max): (i128, i128) = if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };
    let raw = current as i128 + delta as i128;
    if raw >= min && raw <= max {
        return Some(raw as i64);
    }
    match mode {
        "FAIL" => None,
        "SAT" => Some(if raw < min { min as i64 } else { max as i64 }),
        _ => {
            let span = max - min + 1;
            let wrapped = ((raw - min).rem_euclid(span)) + min;
            Some(wrapped as i64)
        }
    }
}
