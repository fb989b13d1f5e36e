//! Connection & server administration commands (spec.md §4.9 ambient
//! surface): `PING ECHO SELECT SWAPDB AUTH HELLO QUIT RESET CLIENT COMMAND
//! CONFIG DEBUG INFO TIME LASTSAVE SAVE BGSAVE SHUTDOWN`, the catch-all
//! family the teacher split between `redis/client.rs` (connection fields)
//! and `redis.rs` (the `server_cron`/global bookkeeping it reported on).

use bytes::Bytes;

use crate::connection::ReplyMode;
use crate::dispatch::{ok, reply, HandlerCtx, HandlerResult};
use crate::error::RedisError;
use crate::resp::{Frame, ProtoVer};

pub fn ping(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    if ctx.conn.is_subscribed() && ctx.conn.proto == ProtoVer::Resp2 {
        let payload = args.get(1).cloned().unwrap_or_default();
        return reply(Frame::Array(vec![Frame::bulk_str("pong"), Frame::Bulk(payload)]));
    }
    match args.get(1) {
        Some(msg) => reply(Frame::Bulk(msg.clone())),
        None => reply(Frame::Simple("PONG".into())),
    }
}

pub fn echo(_ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    reply(Frame::Bulk(args[1].clone()))
}

pub fn select(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let index = super::arg_usize(&args[1])?;
    if index >= ctx.server.databases.len() {
        return Err(RedisError::generic("DB index is out of range"));
    }
    ctx.conn.db_index = index;
    ok()
}

pub fn swapdb(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let a = super::arg_usize(&args[1])?;
    let b = super::arg_usize(&args[2])?;
    if a >= ctx.server.databases.len() || b >= ctx.server.databases.len() {
        return Err(RedisError::generic("DB index is out of range"));
    }
    ctx.server.databases.swap(a, b);
    ok()
}

pub fn auth(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    // `AUTH password` or `AUTH username password`; only the default user
    // (no ACL support, spec.md §1 Non-goals) is recognized, so a username
    // other than "default" is rejected the same way Redis rejects unknown
    // ACL users.
    let password = match args.len() {
        2 => &args[1],
        3 => {
            if !super::is_kw(&args[1], "default") {
                return Err(RedisError::WrongPass);
            }
            &args[2]
        }
        _ => return Err(RedisError::WrongArity("auth".into())),
    };
    match &ctx.server.requirepass {
        None => Err(RedisError::generic(
            "Client sent AUTH, but no password is set. Did you mean AUTH <username> <password>?",
        )),
        Some(expected) if expected.as_bytes() == password.as_ref() => {
            ctx.conn.authenticated = true;
            ok()
        }
        Some(_) => Err(RedisError::WrongPass),
    }
}

/// `HELLO [protover] [AUTH user pass] [SETNAME name]`
pub fn hello(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let mut i = 1;
    if let Some(arg) = args.get(i) {
        let proto = super::arg_i64(arg).map_err(|_| RedisError::NoProto)?;
        match proto {
            2 => ctx.conn.proto = ProtoVer::Resp2,
            3 => ctx.conn.proto = ProtoVer::Resp3,
            _ => return Err(RedisError::NoProto),
        }
        i += 1;
    }
    while i < args.len() {
        if super::is_kw(&args[i], "auth") {
            if i + 2 >= args.len() {
                return Err(RedisError::Syntax);
            }
            let username = &args[i + 1];
            let password = &args[i + 2];
            if !super::is_kw(username, "default") {
                return Err(RedisError::WrongPass);
            }
            match &ctx.server.requirepass {
                Some(expected) if expected.as_bytes() == password.as_ref() => ctx.conn.authenticated = true,
                Some(_) => return Err(RedisError::WrongPass),
                None => ctx.conn.authenticated = true,
            }
            i += 3;
        } else if super::is_kw(&args[i], "setname") {
            if i + 1 >= args.len() {
                return Err(RedisError::Syntax);
            }
            ctx.conn.name = Some(args[i + 1].clone());
            i += 2;
        } else {
            return Err(RedisError::Syntax);
        }
    }
    if ctx.server.requirepass.is_some() && !ctx.conn.authenticated {
        return Err(RedisError::NoAuth);
    }
    let proto_num = match ctx.conn.proto {
        ProtoVer::Resp2 => 2,
        ProtoVer::Resp3 => 3,
    };
    reply(Frame::Map(vec![
        (Frame::bulk_str("server"), Frame::bulk_str("redis")),
        (Frame::bulk_str("version"), Frame::bulk_str("7.4.0")),
        (Frame::bulk_str("proto"), Frame::Integer(proto_num)),
        (Frame::bulk_str("id"), Frame::Integer(ctx.conn.client_id as i64)),
        (Frame::bulk_str("mode"), Frame::bulk_str("standalone")),
        (Frame::bulk_str("role"), Frame::bulk_str("master")),
        (Frame::bulk_str("modules"), Frame::Array(vec![])),
    ]))
}

pub fn quit(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    ctx.conn.closing = true;
    ok()
}

pub fn reset(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    ctx.conn.transaction.reset();
    ctx.conn.subscribed_channels.clear();
    ctx.conn.subscribed_patterns.clear();
    ctx.server.pubsub.remove_client(ctx.conn.client_id);
    ctx.conn.db_index = 0;
    ctx.conn.proto = ProtoVer::Resp2;
    ctx.conn.reply_mode = ReplyMode::On;
    ctx.conn.name = None;
    ctx.conn.authenticated = ctx.server.requirepass.is_none();
    reply(Frame::Simple("RESET".into()))
}

/// `CLIENT SETNAME|GETNAME|ID|INFO|LIST|NO-EVICT|REPLY|KILL|UNPAUSE`
pub fn client(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sub = super::arg_str(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "SETNAME" => {
            let name = args.get(2).ok_or(RedisError::Syntax)?;
            if name.iter().any(|b| *b == b' ' || *b == b'\n') {
                return Err(RedisError::generic("Client names cannot contain spaces, newlines or special characters."));
            }
            ctx.conn.name = Some(name.clone());
            ok()
        }
        "GETNAME" => reply(Frame::Bulk(ctx.conn.name.clone().unwrap_or_default())),
        "ID" => reply(Frame::Integer(ctx.conn.client_id as i64)),
        "INFO" => reply(Frame::Bulk(Bytes::from(client_info_line(ctx)))),
        "LIST" => reply(Frame::Bulk(Bytes::from(format!("{}\n", client_info_line(ctx))))),
        "NO-EVICT" | "NO-TOUCH" | "UNPAUSE" => ok(),
        "REPLY" => {
            let mode = args.get(2).ok_or(RedisError::Syntax)?;
            if super::is_kw(mode, "on") {
                ctx.conn.reply_mode = ReplyMode::On;
                ok()
            } else if super::is_kw(mode, "off") {
                ctx.conn.reply_mode = ReplyMode::Off;
                reply(Frame::Simple(String::new()))
            } else if super::is_kw(mode, "skip") {
                ctx.conn.reply_mode = ReplyMode::Skip;
                reply(Frame::Simple(String::new()))
            } else {
                Err(RedisError::Syntax)
            }
        }
        "KILL" => reply(Frame::Integer(0)),
        _ => Err(RedisError::UnknownSubcommand(sub, "CLIENT".into())),
    }
}

fn client_info_line(ctx: &HandlerCtx) -> String {
    format!(
        "id={} addr=127.0.0.1:0 name={} db={} resp={}",
        ctx.conn.client_id,
        ctx.conn.name.as_ref().map(|n| String::from_utf8_lossy(n).to_string()).unwrap_or_default(),
        ctx.conn.db_index,
        match ctx.conn.proto {
            ProtoVer::Resp2 => 2,
            ProtoVer::Resp3 => 3,
        }
    )
}

/// `COMMAND | COMMAND COUNT | COMMAND DOCS [name ...]`
pub fn command(_ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    match args.get(1).map(|a| super::arg_str(a).to_ascii_uppercase()) {
        None => {
            let entries = crate::dispatch::all_commands()
                .map(|spec| {
                    Frame::Array(vec![
                        Frame::bulk_str(spec.name),
                        Frame::Integer(arity_hint(spec.arity)),
                        Frame::Array(vec![]),
                    ])
                })
                .collect();
            reply(Frame::Array(entries))
        }
        Some(sub) if sub == "COUNT" => reply(Frame::Integer(crate::dispatch::all_commands().count() as i64)),
        Some(sub) if sub == "DOCS" => {
            let mut out = Vec::new();
            let names: Vec<String> = if args.len() > 2 {
                args[2..].iter().map(|a| super::arg_str(a).to_ascii_lowercase()).collect()
            } else {
                crate::dispatch::all_commands().map(|s| s.name.to_string()).collect()
            };
            for name in names {
                if let Some(spec) = crate::dispatch::lookup(&name) {
                    out.push(Frame::bulk_str(spec.name));
                    out.push(Frame::Map(vec![(Frame::bulk_str("summary"), Frame::bulk_str(""))]));
                }
            }
            reply(Frame::Array(out))
        }
        Some(sub) => Err(RedisError::UnknownSubcommand(sub, "COMMAND".into())),
    }
}

fn arity_hint(arity: crate::dispatch::Arity) -> i64 {
    match arity {
        crate::dispatch::Arity::Fixed(n) => n as i64,
        crate::dispatch::Arity::AtLeast(n) => -(n as i64),
    }
}

/// `CONFIG GET pattern | SET key value | RESETSTAT | REWRITE`
pub fn config(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sub = super::arg_str(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "GET" => {
            let pattern = args.get(2).map(|p| super::arg_str(p)).unwrap_or("*");
            let mut out = Vec::new();
            for (key, value) in ctx.server.config.matching(pattern) {
                out.push(Frame::bulk_str(key));
                out.push(Frame::bulk_str(value));
            }
            reply(Frame::Array(out))
        }
        "SET" => {
            if args.len() < 4 || (args.len() - 2) % 2 != 0 {
                return Err(RedisError::WrongArity("config|set".into()));
            }
            let mut pairs = Vec::new();
            let mut i = 2;
            while i < args.len() {
                let key = super::arg_str(&args[i]).to_string();
                let value = String::from_utf8_lossy(&args[i + 1]).to_string();
                pairs.push((key, value));
                i += 2;
            }
            for (key, _) in &pairs {
                if !ctx.server.config.is_known(key) {
                    return Err(RedisError::generic(format!("Unknown option or number of arguments for CONFIG SET - '{key}'")));
                }
            }
            for (key, value) in pairs {
                ctx.server.config.set(&key, value);
            }
            ok()
        }
        "RESETSTAT" => {
            ctx.server.dirty = 0;
            ok()
        }
        "REWRITE" => ok(),
        _ => Err(RedisError::UnknownSubcommand(sub, "CONFIG".into())),
    }
}

/// `DEBUG JMAP|SLEEP seconds|SET-ACTIVE-EXPIRE 0|1|RELOAD|OBJECT key`
pub fn debug(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sub = super::arg_str(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "JMAP" => reply(Frame::Simple("OK".into())),
        "SLEEP" => {
            let secs = super::arg_f64(&args[2])?;
            std::thread::sleep(std::time::Duration::from_secs_f64(secs.max(0.0)));
            ok()
        }
        "SET-ACTIVE-EXPIRE" => {
            let flag = super::arg_i64(&args[2])?;
            ctx.server.set_active_expire_enabled(flag != 0);
            ok()
        }
        "RELOAD" => {
            let snapshot = ctx.server.snapshotter.load();
            if snapshot.is_none() {
                return Err(RedisError::generic("no saved snapshot to reload"));
            }
            ok()
        }
        "OBJECT" => {
            let key = &args[2];
            let db_index = ctx.db_index();
            let now_ms = ctx.now_ms;
            match ctx.server.databases[db_index].get(key, now_ms) {
                Some(value) => reply(Frame::Simple(format!(
                    "Value at:0x0 refcount:1 encoding:{} serializedlength:0 lru:0 lru_seconds_idle:0",
                    crate::commands::generic::encoding_hint(value)
                ))),
                None => Err(RedisError::NoSuchKey),
            }
        }
        _ => Err(RedisError::UnknownSubcommand(sub, "DEBUG".into())),
    }
}

pub fn info(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    let uptime_secs = ctx.now_ms.saturating_sub(ctx.server.start_time_ms) / 1000;
    let keyspace: String = ctx
        .server
        .databases
        .iter()
        .enumerate()
        .filter(|(_, db)| !db.is_empty())
        .map(|(i, db)| format!("db{i}:keys={},expires=0,avg_ttl=0\r\n", db.len()))
        .collect();
    let body = format!(
        "# Server\r\nredis_version:7.4.0\r\nrun_id:0000000000000000000000000000000000000000\r\ntcp_port:0\r\nuptime_in_seconds:{uptime}\r\n\r\n\
         # Clients\r\nconnected_clients:1\r\n\r\n\
         # Persistence\r\nrdb_changes_since_last_save:{dirty}\r\nrdb_last_save_time:{lastsave}\r\n\r\n\
         # Replication\r\nrole:master\r\nconnected_slaves:0\r\n\r\n\
         # Keyspace\r\n{keyspace}",
        uptime = uptime_secs,
        dirty = ctx.server.dirty,
        lastsave = ctx.server.snapshotter.load().map(|_| 1).unwrap_or(0),
    );
    reply(Frame::Verbatim("txt", body))
}

pub fn time(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    let now_ms = ctx.now_ms;
    reply(Frame::Array(vec![
        Frame::bulk_str((now_ms / 1000).to_string()),
        Frame::bulk_str(((now_ms % 1000) * 1000).to_string()),
    ]))
}

pub fn lastsave(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    reply(Frame::Integer(ctx.now_ms as i64 / 1000))
}

fn snapshot_all(ctx: &mut HandlerCtx) {
    // A trivial in-memory "snapshot": a byte for every key currently live
    // across all databases, enough for `Snapshotter::load()` to report
    // "yes, a save happened" without a real serialization format (spec.md
    // §1 Non-goals exclude AOF/RDB).
    let total_keys: usize = ctx.server.databases.iter().map(|db| db.len()).sum();
    ctx.server.snapshotter.save(vec![0u8; total_keys]);
    ctx.server.dirty = 0;
}

pub fn save(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    snapshot_all(ctx);
    ok()
}

pub fn bgsave(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    snapshot_all(ctx);
    reply(Frame::Simple("Background saving started".into()))
}

pub fn shutdown(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    ctx.conn.closing = true;
    // Real Redis never replies to a non-NOSAVE SHUTDOWN (the process
    // exits first); this engine has no process to exit, so it reports the
    // closest honest outcome instead of hanging the caller.
    ok()
}

/// `WAIT numreplicas timeout` (spec.md §1 Non-goals: no real replication),
/// so there are never any replicas to wait for and this returns immediately.
pub fn wait(_ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    reply(Frame::Integer(0))
}
