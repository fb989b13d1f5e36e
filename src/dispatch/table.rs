//! The command table (spec.md §4.4): one row per command, built once via
//! `once_cell::sync::Lazy` the way the teacher never needed to (its
//! `CMD_TABLE` was a dozen entries built eagerly in `redis/cmd.rs`); a
//! complete Redis surface is large enough that a lazily-built lookup map
//! over a static array reads better than a hand-nested match.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use super::{Arity, CommandFlags, CommandSpec, KeySpec};
use crate::commands::{
    admin, bitmaps, generic, geo, hashes, hyperloglog, lists, pubsub, scripting, sets, streams, strings, transactions, zsets,
};

const RO: CommandFlags = CommandFlags::READONLY;
const WR: CommandFlags = CommandFlags::WRITE;
const AD: CommandFlags = CommandFlags::ADMIN;
const PS: CommandFlags = CommandFlags::PUBSUB;
const BL: CommandFlags = CommandFlags::BLOCKING;
const TX: CommandFlags = CommandFlags::TRANSACTION;
const NS: CommandFlags = CommandFlags::NOSCRIPT;

const NOKEYS: KeySpec = KeySpec::None;
const KEY1: KeySpec = KeySpec::Range(1, 1, 1);
const KEY1_2: KeySpec = KeySpec::Range(1, 2, 1);
const ALLKEYS: KeySpec = KeySpec::Range(1, -1, 1);
/// Interleaved `key value [key value ...]` commands (`MSET`/`MSETNX`):
/// every other argument starting at 1 is a key, never the values between.
const KEYS_STEP2: KeySpec = KeySpec::Range(1, -1, 2);

macro_rules! spec {
    ($name:expr, $arity:expr, $flags:expr, $keys:expr, $handler:expr) => {
        CommandSpec {
            name: $name,
            arity: $arity,
            flags: $flags,
            keys: $keys,
            handler: $handler,
        }
    };
}

static COMMAND_SPECS: &[CommandSpec] = &[
    // Strings (spec.md §4.5)
    spec!("get", Arity::Fixed(2), RO, KEY1, strings::get),
    spec!("strlen", Arity::Fixed(2), RO, KEY1, strings::strlen),
    spec!("substr", Arity::Fixed(4), RO, KEY1, strings::substr),
    spec!("getrange", Arity::Fixed(4), RO, KEY1, strings::getrange),
    spec!("set", Arity::AtLeast(3), WR, KEY1, strings::set),
    spec!("setnx", Arity::Fixed(3), WR, KEY1, strings::setnx),
    spec!("setex", Arity::Fixed(4), WR, KEY1, strings::setex),
    spec!("psetex", Arity::Fixed(4), WR, KEY1, strings::psetex),
    spec!("getset", Arity::Fixed(3), WR, KEY1, strings::getset),
    spec!("getdel", Arity::Fixed(2), WR, KEY1, strings::getdel),
    spec!("getex", Arity::AtLeast(2), WR, KEY1, strings::getex),
    spec!("append", Arity::Fixed(3), WR, KEY1, strings::append),
    spec!("setrange", Arity::Fixed(4), WR, KEY1, strings::setrange),
    spec!("incr", Arity::Fixed(2), WR, KEY1, strings::incr),
    spec!("decr", Arity::Fixed(2), WR, KEY1, strings::decr),
    spec!("incrby", Arity::Fixed(3), WR, KEY1, strings::incrby),
    spec!("decrby", Arity::Fixed(3), WR, KEY1, strings::decrby),
    spec!("incrbyfloat", Arity::Fixed(3), WR, KEY1, strings::incrbyfloat),
    spec!("mget", Arity::AtLeast(2), RO, ALLKEYS, strings::mget),
    spec!("mset", Arity::AtLeast(3), WR, KEYS_STEP2, strings::mset),
    spec!("msetnx", Arity::AtLeast(3), WR, KEYS_STEP2, strings::msetnx),
    // Lists
    spec!("lpush", Arity::AtLeast(3), WR | BL, KEY1, lists::lpush),
    spec!("rpush", Arity::AtLeast(3), WR | BL, KEY1, lists::rpush),
    spec!("lpushx", Arity::AtLeast(3), WR, KEY1, lists::lpushx),
    spec!("rpushx", Arity::AtLeast(3), WR, KEY1, lists::rpushx),
    spec!("lpop", Arity::AtLeast(2), WR, KEY1, lists::lpop),
    spec!("rpop", Arity::AtLeast(2), WR, KEY1, lists::rpop),
    spec!("llen", Arity::Fixed(2), RO, KEY1, lists::llen),
    spec!("lrange", Arity::Fixed(4), RO, KEY1, lists::lrange),
    spec!("lindex", Arity::Fixed(3), RO, KEY1, lists::lindex),
    spec!("lset", Arity::Fixed(4), WR, KEY1, lists::lset),
    spec!("linsert", Arity::Fixed(5), WR, KEY1, lists::linsert),
    spec!("lrem", Arity::Fixed(4), WR, KEY1, lists::lrem),
    spec!("ltrim", Arity::Fixed(4), WR, KEY1, lists::ltrim),
    spec!("lpos", Arity::AtLeast(3), RO, KEY1, lists::lpos),
    spec!("rpoplpush", Arity::Fixed(3), WR, KEY1_2, lists::rpoplpush),
    spec!("lmove", Arity::Fixed(5), WR, KEY1_2, lists::lmove),
    spec!("blpop", Arity::AtLeast(3), WR | BL, ALLKEYS, lists::blpop),
    spec!("brpop", Arity::AtLeast(3), WR | BL, ALLKEYS, lists::brpop),
    spec!("brpoplpush", Arity::Fixed(4), WR | BL, KEY1_2, lists::brpoplpush),
    spec!("blmove", Arity::Fixed(6), WR | BL, KEY1_2, lists::blmove),
    // Hashes
    spec!("hset", Arity::AtLeast(4), WR, KEY1, hashes::hset),
    spec!("hmset", Arity::AtLeast(4), WR, KEY1, hashes::hmset),
    spec!("hsetnx", Arity::Fixed(4), WR, KEY1, hashes::hsetnx),
    spec!("hget", Arity::Fixed(3), RO, KEY1, hashes::hget),
    spec!("hmget", Arity::AtLeast(3), RO, KEY1, hashes::hmget),
    spec!("hdel", Arity::AtLeast(3), WR, KEY1, hashes::hdel),
    spec!("hlen", Arity::Fixed(2), RO, KEY1, hashes::hlen),
    spec!("hexists", Arity::Fixed(3), RO, KEY1, hashes::hexists),
    spec!("hgetall", Arity::Fixed(2), RO, KEY1, hashes::hgetall),
    spec!("hkeys", Arity::Fixed(2), RO, KEY1, hashes::hkeys),
    spec!("hvals", Arity::Fixed(2), RO, KEY1, hashes::hvals),
    spec!("hincrby", Arity::Fixed(4), WR, KEY1, hashes::hincrby),
    spec!("hincrbyfloat", Arity::Fixed(4), WR, KEY1, hashes::hincrbyfloat),
    spec!("hrandfield", Arity::AtLeast(2), RO, KEY1, hashes::hrandfield),
    spec!("hscan", Arity::AtLeast(3), RO, KEY1, hashes::hscan),
    // Sets
    spec!("sadd", Arity::AtLeast(3), WR, KEY1, sets::sadd),
    spec!("srem", Arity::AtLeast(3), WR, KEY1, sets::srem),
    spec!("sismember", Arity::Fixed(3), RO, KEY1, sets::sismember),
    spec!("smismember", Arity::AtLeast(3), RO, KEY1, sets::smismember),
    spec!("scard", Arity::Fixed(2), RO, KEY1, sets::scard),
    spec!("smembers", Arity::Fixed(2), RO, KEY1, sets::smembers),
    spec!("spop", Arity::AtLeast(2), WR, KEY1, sets::spop),
    spec!("srandmember", Arity::AtLeast(2), RO, KEY1, sets::srandmember),
    spec!("smove", Arity::Fixed(4), WR, KEY1_2, sets::smove),
    spec!("sunion", Arity::AtLeast(2), RO, ALLKEYS, sets::sunion),
    spec!("sinter", Arity::AtLeast(2), RO, ALLKEYS, sets::sinter),
    spec!("sdiff", Arity::AtLeast(2), RO, ALLKEYS, sets::sdiff),
    spec!("sunionstore", Arity::AtLeast(3), WR, ALLKEYS, sets::sunionstore),
    spec!("sinterstore", Arity::AtLeast(3), WR, ALLKEYS, sets::sinterstore),
    spec!("sdiffstore", Arity::AtLeast(3), WR, ALLKEYS, sets::sdiffstore),
    spec!("sintercard", Arity::AtLeast(3), RO, ALLKEYS, sets::sintercard),
    spec!("sscan", Arity::AtLeast(3), RO, KEY1, sets::sscan),
    // Sorted sets
    spec!("zadd", Arity::AtLeast(4), WR, KEY1, zsets::zadd),
    spec!("zscore", Arity::Fixed(3), RO, KEY1, zsets::zscore),
    spec!("zmscore", Arity::AtLeast(3), RO, KEY1, zsets::zmscore),
    spec!("zincrby", Arity::Fixed(4), WR, KEY1, zsets::zincrby),
    spec!("zcard", Arity::Fixed(2), RO, KEY1, zsets::zcard),
    spec!("zcount", Arity::Fixed(4), RO, KEY1, zsets::zcount),
    spec!("zlexcount", Arity::Fixed(4), RO, KEY1, zsets::zlexcount),
    spec!("zrank", Arity::AtLeast(3), RO, KEY1, zsets::zrank),
    spec!("zrevrank", Arity::AtLeast(3), RO, KEY1, zsets::zrevrank),
    spec!("zrange", Arity::AtLeast(4), RO, KEY1, zsets::zrange),
    spec!("zrevrange", Arity::AtLeast(4), RO, KEY1, zsets::zrevrange),
    spec!("zrangebyscore", Arity::AtLeast(4), RO, KEY1, zsets::zrangebyscore),
    spec!("zrevrangebyscore", Arity::AtLeast(4), RO, KEY1, zsets::zrevrangebyscore),
    spec!("zrangebylex", Arity::AtLeast(4), RO, KEY1, zsets::zrangebylex),
    spec!("zrevrangebylex", Arity::AtLeast(4), RO, KEY1, zsets::zrevrangebylex),
    spec!("zrangestore", Arity::AtLeast(5), WR, KEY1_2, zsets::zrangestore),
    spec!("zrem", Arity::AtLeast(3), WR, KEY1, zsets::zrem),
    spec!("zremrangebyrank", Arity::Fixed(4), WR, KEY1, zsets::zremrangebyrank),
    spec!("zremrangebyscore", Arity::Fixed(4), WR, KEY1, zsets::zremrangebyscore),
    spec!("zremrangebylex", Arity::Fixed(4), WR, KEY1, zsets::zremrangebylex),
    spec!("zpopmin", Arity::AtLeast(2), WR, KEY1, zsets::zpopmin),
    spec!("zpopmax", Arity::AtLeast(2), WR, KEY1, zsets::zpopmax),
    spec!("bzpopmin", Arity::AtLeast(3), WR | BL, ALLKEYS, zsets::bzpopmin),
    spec!("bzpopmax", Arity::AtLeast(3), WR | BL, ALLKEYS, zsets::bzpopmax),
    spec!("zrandmember", Arity::AtLeast(2), RO, KEY1, zsets::zrandmember),
    spec!("zunionstore", Arity::AtLeast(4), WR, ALLKEYS, zsets::zunionstore),
    spec!("zinterstore", Arity::AtLeast(4), WR, ALLKEYS, zsets::zinterstore),
    spec!("zunion", Arity::AtLeast(3), RO, ALLKEYS, zsets::zunion),
    spec!("zinter", Arity::AtLeast(3), RO, ALLKEYS, zsets::zinter),
    spec!("zdiff", Arity::AtLeast(3), RO, ALLKEYS, zsets::zdiff),
    spec!("zdiffstore", Arity::AtLeast(4), WR, ALLKEYS, zsets::zdiffstore),
    spec!("zscan", Arity::AtLeast(3), RO, KEY1, zsets::zscan),
    // Bitmaps
    spec!("setbit", Arity::Fixed(4), WR, KEY1, bitmaps::setbit),
    spec!("getbit", Arity::Fixed(3), RO, KEY1, bitmaps::getbit),
    spec!("bitcount", Arity::AtLeast(2), RO, KEY1, bitmaps::bitcount),
    spec!("bitpos", Arity::AtLeast(3), RO, KEY1, bitmaps::bitpos),
    spec!("bitop", Arity::AtLeast(4), WR, ALLKEYS, bitmaps::bitop),
    spec!("bitfield", Arity::AtLeast(2), WR, KEY1, bitmaps::bitfield),
    // HyperLogLog
    spec!("pfadd", Arity::AtLeast(2), WR, KEY1, hyperloglog::pfadd),
    spec!("pfcount", Arity::AtLeast(2), RO, ALLKEYS, hyperloglog::pfcount),
    spec!("pfmerge", Arity::AtLeast(2), WR, ALLKEYS, hyperloglog::pfmerge),
    // Geo
    spec!("geoadd", Arity::AtLeast(5), WR, KEY1, geo::geoadd),
    spec!("geopos", Arity::AtLeast(2), RO, KEY1, geo::geopos),
    spec!("geodist", Arity::AtLeast(4), RO, KEY1, geo::geodist),
    spec!("geohash", Arity::AtLeast(2), RO, KEY1, geo::geohash),
    spec!("geosearch", Arity::AtLeast(7), RO, KEY1, geo::geosearch),
    spec!("geosearchstore", Arity::AtLeast(8), WR, KEY1_2, geo::geosearchstore),
    // Generic keyspace
    spec!("del", Arity::AtLeast(2), WR, ALLKEYS, generic::del),
    spec!("unlink", Arity::AtLeast(2), WR, ALLKEYS, generic::unlink),
    spec!("exists", Arity::AtLeast(2), RO, ALLKEYS, generic::exists),
    spec!("type", Arity::Fixed(2), RO, KEY1, generic::key_type),
    spec!("touch", Arity::AtLeast(2), RO, ALLKEYS, generic::touch),
    spec!("expire", Arity::AtLeast(3), WR, KEY1, generic::expire),
    spec!("pexpire", Arity::AtLeast(3), WR, KEY1, generic::pexpire),
    spec!("expireat", Arity::AtLeast(3), WR, KEY1, generic::expireat),
    spec!("pexpireat", Arity::AtLeast(3), WR, KEY1, generic::pexpireat),
    spec!("ttl", Arity::Fixed(2), RO, KEY1, generic::ttl),
    spec!("pttl", Arity::Fixed(2), RO, KEY1, generic::pttl),
    spec!("persist", Arity::Fixed(2), WR, KEY1, generic::persist),
    spec!("rename", Arity::Fixed(3), WR, KEY1_2, generic::rename),
    spec!("renamenx", Arity::Fixed(3), WR, KEY1_2, generic::renamenx),
    spec!("copy", Arity::AtLeast(3), WR, KEY1_2, generic::copy),
    spec!("move", Arity::Fixed(3), WR, KEY1, generic::mv),
    spec!("randomkey", Arity::Fixed(1), RO, NOKEYS, generic::randomkey),
    spec!("keys", Arity::Fixed(2), RO, NOKEYS, generic::keys),
    spec!("scan", Arity::AtLeast(2), RO, NOKEYS, generic::scan),
    spec!("dbsize", Arity::Fixed(1), RO, NOKEYS, generic::dbsize),
    spec!("flushdb", Arity::AtLeast(1), WR | AD, NOKEYS, generic::flushdb),
    spec!("flushall", Arity::AtLeast(1), WR | AD, NOKEYS, generic::flushall),
    spec!("object", Arity::AtLeast(2), RO, KEY1, generic::object),
    // Transactions
    spec!("multi", Arity::Fixed(1), TX, NOKEYS, transactions::multi),
    spec!("exec", Arity::Fixed(1), TX, NOKEYS, transactions::exec),
    spec!("discard", Arity::Fixed(1), TX, NOKEYS, transactions::discard),
    spec!("watch", Arity::AtLeast(2), TX, ALLKEYS, transactions::watch),
    spec!("unwatch", Arity::Fixed(1), TX, NOKEYS, transactions::unwatch),
    // Pub/Sub
    spec!("subscribe", Arity::AtLeast(2), PS, NOKEYS, pubsub::subscribe),
    spec!("unsubscribe", Arity::AtLeast(1), PS, NOKEYS, pubsub::unsubscribe),
    spec!("psubscribe", Arity::AtLeast(2), PS, NOKEYS, pubsub::psubscribe),
    spec!("punsubscribe", Arity::AtLeast(1), PS, NOKEYS, pubsub::punsubscribe),
    spec!("publish", Arity::Fixed(3), PS, NOKEYS, pubsub::publish),
    spec!("pubsub", Arity::AtLeast(2), PS, NOKEYS, pubsub::pubsub_cmd),
    // Connection / server administration
    spec!("ping", Arity::AtLeast(1), RO, NOKEYS, admin::ping),
    spec!("echo", Arity::Fixed(2), RO, NOKEYS, admin::echo),
    spec!("select", Arity::Fixed(2), RO, NOKEYS, admin::select),
    spec!("swapdb", Arity::Fixed(3), WR | AD, NOKEYS, admin::swapdb),
    spec!("auth", Arity::AtLeast(2), NS, NOKEYS, admin::auth),
    spec!("hello", Arity::AtLeast(1), NS, NOKEYS, admin::hello),
    spec!("quit", Arity::Fixed(1), CommandFlags::empty(), NOKEYS, admin::quit),
    spec!("reset", Arity::Fixed(1), NS | TX, NOKEYS, admin::reset),
    spec!("client", Arity::AtLeast(2), AD, NOKEYS, admin::client),
    spec!("command", Arity::AtLeast(1), RO, NOKEYS, admin::command),
    spec!("config", Arity::AtLeast(2), AD, NOKEYS, admin::config),
    spec!("debug", Arity::AtLeast(2), AD, NOKEYS, admin::debug),
    spec!("info", Arity::AtLeast(1), RO, NOKEYS, admin::info),
    spec!("time", Arity::Fixed(1), RO, NOKEYS, admin::time),
    spec!("lastsave", Arity::Fixed(1), AD, NOKEYS, admin::lastsave),
    spec!("save", Arity::Fixed(1), AD, NOKEYS, admin::save),
    spec!("bgsave", Arity::AtLeast(1), AD, NOKEYS, admin::bgsave),
    spec!("shutdown", Arity::AtLeast(1), AD, NOKEYS, admin::shutdown),
    spec!("wait", Arity::Fixed(3), BL, NOKEYS, admin::wait),
    // Scripting
    spec!("eval", Arity::AtLeast(3), NS, NOKEYS, scripting::eval),
    spec!("evalsha", Arity::AtLeast(3), NS, NOKEYS, scripting::evalsha),
    spec!("script", Arity::AtLeast(2), NS, NOKEYS, scripting::script_cmd),
    spec!("function", Arity::AtLeast(2), NS, NOKEYS, scripting::function),
    spec!("fcall", Arity::AtLeast(3), NS, NOKEYS, scripting::fcall),
    // Streams
    spec!("xadd", Arity::AtLeast(5), WR | BL, KEY1, streams::xadd),
    spec!("xlen", Arity::Fixed(2), RO, KEY1, streams::xlen),
    spec!("xrange", Arity::AtLeast(4), RO, KEY1, streams::xrange),
    spec!("xrevrange", Arity::AtLeast(4), RO, KEY1, streams::xrevrange),
    spec!("xdel", Arity::AtLeast(3), WR, KEY1, streams::xdel),
    spec!("xtrim", Arity::AtLeast(4), WR, KEY1, streams::xtrim),
    spec!("xread", Arity::AtLeast(4), RO | BL, NOKEYS, streams::xread),
    spec!("xgroup", Arity::AtLeast(2), AD, KEY1_2, streams::xgroup),
    spec!("xreadgroup", Arity::AtLeast(7), WR | BL, NOKEYS, streams::xreadgroup),
    spec!("xack", Arity::AtLeast(4), WR, KEY1, streams::xack),
    spec!("xpending", Arity::AtLeast(3), RO, KEY1, streams::xpending),
    spec!("xclaim", Arity::AtLeast(6), WR, KEY1, streams::xclaim),
    spec!("xautoclaim", Arity::AtLeast(7), WR, KEY1, streams::xautoclaim),
    spec!("xinfo", Arity::AtLeast(3), RO, KEY1, streams::xinfo),
];

pub static COMMAND_TABLE: Lazy<HashMap<&'static str, &'static CommandSpec>> =
    Lazy::new(|| COMMAND_SPECS.iter().map(|spec| (spec.name, spec)).collect());
