//! Geo commands (spec.md §4.5): `GEOADD GEOPOS GEODIST GEOHASH GEOSEARCH
//! GEOSEARCHSTORE`, all implemented as sorted-set operations over an
//! interleaved geohash score (`value::geo`) — no new value kind.

use bytes::Bytes;

use super::{arg_f64, is_kw};
use crate::dispatch::{reply, HandlerCtx, HandlerResult};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::value::geo;
use crate::value::{Value, ValueKind, ZSet};

fn ensure_zset<'a>(ctx: &'a mut HandlerCtx, key: &Bytes) -> Result<&'a mut ZSet, RedisError> {
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    let db = &mut ctx.server.databases[db_index];
    if super::typed_get(db, key, now_ms, ValueKind::ZSet)?.is_none() {
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
    match super::typed_get(&mut ctx.server.databases[db_index], key, now_ms, ValueKind::ZSet)? {
        Some(Value::ZSet(z)) => Ok(Some(z)),
        _ => Ok(None),
    }
}

/// `GEOADD key [NX|XX] [CH] longitude latitude member [...]`
pub fn geoadd(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = &args[1];
    let mut nx = false;
    let mut xx = false;
    let mut ch = false;
    let mut i = 2;
    while i < args.len() {
        if is_kw(&args[i], "NX") {
            nx = true;
            i += 1;
        } else if is_kw(&args[i], "XX") {
            xx = true;
            i += 1;
        } else if is_kw(&args[i], "CH") {
            ch = true;
            i += 1;
        } else {
            break;
        }
    }
    let triples = &args[i..];
    if triples.is_empty() || triples.len() % 3 != 0 {
        return Err(RedisError::Syntax);
    }
    let mut added = 0i64;
    let mut changed = 0i64;
    {
        let z = ensure_zset(ctx, key)?;
        for chunk in triples.chunks(3) {
            let lon = arg_f64(&chunk[0])?;
            let lat = arg_f64(&chunk[1])?;
            let member = &chunk[2];
            if !(-180.0..=180.0).contains(&lon) || !(-85.05112878..=85.05112878).contains(&lat) {
                return Err(RedisError::generic(format!("invalid longitude,latitude pair {lon:.6},{lat:.6}")));
            }
            let existing = z.score(member);
            if (existing.is_some() && nx) || (existing.is_none() && xx) {
                continue;
            }
            let score = geo::geohash_encode(lon, lat) as f64;
            let prev = z.insert(member.clone(), score);
            if prev.is_none() {
                added += 1;
            } else if prev != Some(score) {
                changed += 1;
            }
        }
    }
    if added > 0 || changed > 0 {
        let version = ctx.next_version();
        let db_index = ctx.db_index();
        ctx.server.databases[db_index].bump_version(key, version);
        ctx.bump_dirty();
        ctx.notify('z', "geoadd", key);
    } else {
        ctx.server.databases[ctx.db_index()].remove_if_empty(key);
    }
    reply(Frame::Integer(if ch { added + changed } else { added }))
}

pub fn geopos(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let members = &args[2..];
    let frames = match with_zset(ctx, &args[1])? {
        Some(z) => members
            .iter()
            .map(|m| match z.score(m) {
                Some(score) => {
                    let (lon, lat) = geo::geohash_decode(score as u64);
                    Frame::Array(vec![Frame::bulk_str(format!("{lon:.17}")), Frame::bulk_str(format!("{lat:.17}"))])
                }
                None => Frame::NilArray,
            })
            .collect(),
        None => vec![Frame::NilArray; members.len()],
    };
    reply(Frame::Array(frames))
}

fn unit_to_meters(unit: &[u8]) -> Result<f64, RedisError> {
    match unit.to_ascii_lowercase().as_slice() {
        b"m" => Ok(1.0),
        b"km" => Ok(1000.0),
        b"mi" => Ok(1609.34),
        b"ft" => Ok(0.3048),
        _ => Err(RedisError::generic("unsupported unit provided. please use m, km, ft, mi")),
    }
}

pub fn geodist(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let unit = if args.len() > 4 { unit_to_meters(&args[4])? } else { 1.0 };
    let z = match with_zset(ctx, &args[1])? {
        Some(z) => z,
        None => return reply(Frame::Nil),
    };
    let (Some(s1), Some(s2)) = (z.score(&args[2]), z.score(&args[3])) else {
        return reply(Frame::Nil);
    };
    let (lon1, lat1) = geo::geohash_decode(s1 as u64);
    let (lon2, lat2) = geo::geohash_decode(s2 as u64);
    let meters = geo::haversine_m(lon1, lat1, lon2, lat2);
    reply(Frame::bulk_str(format!("{:.4}", meters / unit)))
}

const GEOALPHABET: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

fn geohash_string(lon: f64, lat: f64) -> String {
    // Standard 11-char geohash covering the full -180/180, -90/90 range,
    // distinct from the internal 52-bit score (spec.md's GEOHASH output
    // is meant to interop with geohash.org, unlike GEOADD's score).
    let mut lat_range = (-90.0, 90.0);
    let mut lon_range = (-180.0, 180.0);
    let mut bits = Vec::with_capacity(55);
    let mut even = true;
    while bits.len() < 55 {
        if even {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if lon >= mid {
                bits.push(1);
                lon_range.0 = mid;
            } else {
                bits.push(0);
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat >= mid {
                bits.push(1);
                lat_range.0 = mid;
            } else {
                bits.push(0);
                lat_range.1 = mid;
            }
        }
        even = !even;
    }
    bits.chunks(5)
        .map(|chunk| {
            let idx = chunk.iter().fold(0usize, |acc, &b| (acc << 1) | b as usize);
            GEOALPHABET[idx.min(GEOALPHABET.len() - 1)] as char
        })
        .collect()
}

pub fn geohash(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let members = &args[2..];
    let frames = match with_zset(ctx, &args[1])? {
        Some(z) => members
            .iter()
            .map(|m| match z.score(m) {
                Some(score) => {
                    let (lon, lat) = geo::geohash_decode(score as u64);
                    Frame::bulk_str(geohash_string(lon, lat))
                }
                None => Frame::Nil,
            })
            .collect(),
        None => vec![Frame::Nil; members.len()],
    };
    reply(Frame::Array(frames))
}

struct SearchSpec {
    center_lon: f64,
    center_lat: f64,
    radius_m: Option<f64>,
    box_m: Option<(f64, f64)>,
    count: Option<usize>,
    any: bool,
    asc: bool,
    desc: bool,
    with_coord: bool,
    with_dist: bool,
    with_hash: bool,
    unit: f64,
}

/// Parses the shared option grammar of `GEOSEARCH`/`GEOSEARCHSTORE` (from
/// the `FROMMEMBER|FROMLONLAT` token onward).
fn parse_search(ctx: &mut HandlerCtx, key: &[u8], args: &[Bytes]) -> Result<SearchSpec, RedisError> {
    let mut center: Option<(f64, f64)> = None;
    let mut radius_m = None;
    let mut box_m = None;
    let mut count = None;
    let mut any = false;
    let mut asc = false;
    let mut desc = false;
    let mut with_coord = false;
    let mut with_dist = false;
    let mut with_hash = false;
    let mut unit = 1.0;
    let mut i = 0;
    while i < args.len() {
        if is_kw(&args[i], "FROMMEMBER") {
            let z = with_zset(ctx, key)?.ok_or_else(|| RedisError::generic("could not decode requested zset member"))?;
            let score = z.score(&args[i + 1]).ok_or_else(|| RedisError::generic("could not decode requested zset member"))?;
            center = Some(geo::geohash_decode(score as u64));
            i += 2;
        } else if is_kw(&args[i], "FROMLONLAT") {
            center = Some((arg_f64(&args[i + 1])?, arg_f64(&args[i + 2])?));
            i += 3;
        } else if is_kw(&args[i], "BYRADIUS") {
            unit = unit_to_meters(&args[i + 2])?;
            radius_m = Some(arg_f64(&args[i + 1])? * unit);
            i += 3;
        } else if is_kw(&args[i], "BYBOX") {
            unit = unit_to_meters(&args[i + 3])?;
            box_m = Some((arg_f64(&args[i + 1])? * unit, arg_f64(&args[i + 2])? * unit));
            i += 4;
        } else if is_kw(&args[i], "COUNT") {
            count = Some(super::arg_usize(&args[i + 1])?);
            i += 2;
            if i < args.len() && is_kw(&args[i], "ANY") {
                any = true;
                i += 1;
            }
        } else if is_kw(&args[i], "ASC") {
            asc = true;
            i += 1;
        } else if is_kw(&args[i], "DESC") {
            desc = true;
            i += 1;
        } else if is_kw(&args[i], "WITHCOORD") {
            with_coord = true;
            i += 1;
        } else if is_kw(&args[i], "WITHDIST") {
            with_dist = true;
            i += 1;
        } else if is_kw(&args[i], "WITHHASH") {
            with_hash = true;
            i += 1;
        } else if is_kw(&args[i], "STOREDIST") {
            i += 1;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    let (center_lon, center_lat) = center.ok_or_else(|| RedisError::generic("exactly one of FROMMEMBER, FROMLONLAT can be specified for GEOSEARCH"))?;
    Ok(SearchSpec {
        center_lon,
        center_lat,
        radius_m,
        box_m,
        count,
        any,
        asc,
        desc,
        with_coord,
        with_dist,
        with_hash,
        unit,
    })
}

fn run_search(ctx: &mut HandlerCtx, key: &[u8], spec: &SearchSpec) -> Vec<(Bytes, f64, f64, f64, u64)> {
    let z = match with_zset(ctx, key) {
        Ok(Some(z)) => z,
        _ => return Vec::new(),
    };
    let mut hits: Vec<(Bytes, f64, f64, f64, u64)> = Vec::new();
    for (member, score) in z.members() {
        let bits = *score as u64;
        let (lon, lat) = geo::geohash_decode(bits);
        let dist = geo::haversine_m(spec.center_lon, spec.center_lat, lon, lat);
        let within = if let Some(r) = spec.radius_m {
            dist <= r
        } else if let Some((w, h)) = spec.box_m {
            let dx = geo::haversine_m(spec.center_lon, spec.center_lat, lon, spec.center_lat);
            let dy = geo::haversine_m(spec.center_lon, spec.center_lat, spec.center_lon, lat);
            dx <= w / 2.0 && dy <= h / 2.0
        } else {
            false
        };
        if within {
            hits.push((member.clone(), lon, lat, dist, bits));
        }
    }
    if spec.desc {
        hits.sort_by(|a, b| b.3.partial_cmp(&a.3).unwrap());
    } else if spec.asc || !spec.any {
        hits.sort_by(|a, b| a.3.partial_cmp(&b.3).unwrap());
    }
    if let Some(n) = spec.count {
        hits.truncate(n);
    }
    hits
}

fn search_frame(hits: &[(Bytes, f64, f64, f64, u64)], spec: &SearchSpec) -> Frame {
    let plain = !spec.with_coord && !spec.with_dist && !spec.with_hash;
    Frame::Array(
        hits.iter()
            .map(|(member, lon, lat, dist, bits)| {
                if plain {
                    return Frame::Bulk(member.clone());
                }
                let mut row = vec![Frame::Bulk(member.clone())];
                if spec.with_dist {
                    row.push(Frame::bulk_str(format!("{:.4}", dist / spec.unit)));
                }
                if spec.with_hash {
                    row.push(Frame::Integer(*bits as i64));
                }
                if spec.with_coord {
                    row.push(Frame::Array(vec![Frame::bulk_str(format!("{lon:.17}")), Frame::bulk_str(format!("{lat:.17}"))]));
                }
                Frame::Array(row)
            })
            .collect(),
    )
}

/// `GEOSEARCH key FROMMEMBER m | FROMLONLAT lon lat BYRADIUS r unit | BYBOX w h unit [ASC|DESC] [COUNT n [ANY]] [WITHCOORD] [WITHDIST] [WITHHASH]`
pub fn geosearch(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let key = args[1].clone();
    let spec = parse_search(ctx, &key, &args[2..])?;
    let hits = run_search(ctx, &key, &spec);
    reply(search_frame(&hits, &spec))
}

/// `GEOSEARCHSTORE dst src <same search options> [STOREDIST]`
pub fn geosearchstore(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let dst = args[1].clone();
    let src = args[2].clone();
    let store_dist = args[3..].iter().any(|a| is_kw(a, "STOREDIST"));
    let spec = parse_search(ctx, &src, &args[3..])?;
    let hits = run_search(ctx, &src, &spec);
    let len = hits.len();
    let db_index = ctx.db_index();
    if hits.is_empty() {
        ctx.server.databases[db_index].remove(&dst);
    } else {
        let mut out = ZSet::new();
        for (member, _, _, dist, bits) in &hits {
            let score = if store_dist { *dist } else { *bits as f64 };
            out.insert(member.clone(), score);
        }
        let version = ctx.next_version();
        ctx.server.databases[db_index].set(dst.clone(), Value::ZSet(out), version);
    }
    ctx.bump_dirty();
    ctx.notify('z', "geosearchstore", &dst);
    reply(Frame::Integer(len as i64))
}
