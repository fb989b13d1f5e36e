//! Transaction commands (spec.md §4.6): `MULTI EXEC DISCARD WATCH
//! UNWATCH`. These carry the `TRANSACTION` dispatch flag so the dispatcher
//! runs them immediately even while `QUEUING` (spec.md §4.4 step 4); the
//! actual queueing/replay machinery lives in `Server::execute` and
//! `transaction::Transaction`.

use bytes::Bytes;

use crate::dispatch::{ok, reply, HandlerCtx, HandlerResult};
use crate::error::RedisError;
use crate::resp::Frame;
use crate::transaction::TxState;

pub fn multi(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    if ctx.conn.transaction.is_active() {
        return Err(RedisError::NestedMulti);
    }
    ctx.conn.transaction.begin();
    ctx.conn.transaction.state_flag = Some(TxState::Queuing);
    ok()
}

pub fn discard(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    if !ctx.conn.transaction.is_active() {
        return Err(RedisError::DiscardWithoutMulti);
    }
    ctx.conn.transaction.reset();
    ok()
}

pub fn watch(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    if ctx.conn.transaction.is_active() {
        return Err(RedisError::WatchInsideMulti);
    }
    let db_index = ctx.db_index();
    let now_ms = ctx.now_ms;
    for key in &args[1..] {
        let version = ctx.server.databases[db_index].version(key).unwrap_or_else(|| {
            let _ = ctx.server.databases[db_index].contains(key, now_ms);
            0
        });
        ctx.conn.transaction.watch(key.clone(), db_index, version);
    }
    ok()
}

pub fn unwatch(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    ctx.conn.transaction.clear_watches();
    ok()
}

/// `EXEC` itself is handled specially by `Server::execute` (it needs to
/// replay the queue through the ordinary dispatch path and check
/// watches), so this handler is only reached if the dispatcher is ever
/// asked to run `EXEC` directly without that special-case — which should
/// not happen in practice, but a clear error beats a silent no-op.
pub fn exec(ctx: &mut HandlerCtx, _args: &[Bytes]) -> HandlerResult {
    if !ctx.conn.transaction.is_active() {
        return Err(RedisError::ExecWithoutMulti);
    }
    reply(Frame::NilArray)
}
