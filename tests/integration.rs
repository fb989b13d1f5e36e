//! End-to-end scenarios driven straight through `Server::execute`, the way
//! a test harness embedding this crate would use it — no socket, no RESP
//! bytes on the wire, just argument vectors in and `Frame`s out.

use bytes::Bytes;
use redis_emu::clock::TestClock;
use redis_emu::resp::Frame;
use redis_emu::Server;

fn cmd(parts: &[&str]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::from(p.as_bytes().to_vec())).collect()
}

fn new_server() -> (Server, std::sync::Arc<TestClock>) {
    let clock = TestClock::new(1_000_000);
    let server = Server::with_clock(clock.clone());
    (server, clock)
}

fn bulk(s: &str) -> Frame {
    Frame::bulk_str(s)
}

#[test]
fn set_get_round_trip() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    let (reply, _) = server.execute(&mut conn, cmd(&["SET", "k", "v"]));
    assert_eq!(reply, Frame::ok());
    let (reply, _) = server.execute(&mut conn, cmd(&["GET", "k"]));
    assert_eq!(reply, bulk("v"));
}

#[test]
fn lpush_lrange_reverses_insertion_order() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    server.execute(&mut conn, cmd(&["LPUSH", "k", "a", "b", "c"]));
    let (reply, _) = server.execute(&mut conn, cmd(&["LRANGE", "k", "0", "-1"]));
    assert_eq!(reply, Frame::Array(vec![bulk("c"), bulk("b"), bulk("a")]));
}

#[test]
fn zadd_gt_prevents_score_decrease() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    server.execute(&mut conn, cmd(&["ZADD", "k", "1", "a", "2", "b"]));
    server.execute(&mut conn, cmd(&["ZADD", "k", "XX", "GT", "0", "a"]));
    let (reply, _) = server.execute(&mut conn, cmd(&["ZSCORE", "k", "a"]));
    assert_eq!(reply, Frame::Double(1.0));
}

#[test]
fn sadd_is_idempotent() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    let (first, _) = server.execute(&mut conn, cmd(&["SADD", "k", "x"]));
    assert_eq!(first, Frame::Integer(1));
    let (second, _) = server.execute(&mut conn, cmd(&["SADD", "k", "x"]));
    assert_eq!(second, Frame::Integer(0));
    let (card, _) = server.execute(&mut conn, cmd(&["SCARD", "k"]));
    assert_eq!(card, Frame::Integer(1));
}

#[test]
fn multi_exec_on_absent_key_runs_both_incr() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    server.execute(&mut conn, cmd(&["MULTI"]));
    let (queued1, _) = server.execute(&mut conn, cmd(&["INCR", "x"]));
    assert_eq!(queued1, Frame::Simple("QUEUED".into()));
    server.execute(&mut conn, cmd(&["INCR", "x"]));
    let (reply, _) = server.execute(&mut conn, cmd(&["EXEC"]));
    assert_eq!(reply, Frame::Array(vec![Frame::Integer(1), Frame::Integer(2)]));
}

#[test]
fn incr_on_max_i64_overflows_without_mutating() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    server.execute(&mut conn, cmd(&["SET", "x", "9223372036854775807"]));
    let (reply, _) = server.execute(&mut conn, cmd(&["INCR", "x"]));
    assert!(matches!(reply, Frame::Error(_)));
    let (value, _) = server.execute(&mut conn, cmd(&["GET", "x"]));
    assert_eq!(value, bulk("9223372036854775807"));
}

#[test]
fn hset_with_no_pairs_is_wrong_arity() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    let (reply, _) = server.execute(&mut conn, cmd(&["HSET", "k"]));
    assert!(matches!(reply, Frame::Error(ref msg) if msg.contains("wrong number of arguments")));
}

#[test]
fn expire_zero_deletes_key_immediately() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    server.execute(&mut conn, cmd(&["SET", "k", "v"]));
    let (reply, _) = server.execute(&mut conn, cmd(&["EXPIRE", "k", "0"]));
    assert_eq!(reply, Frame::Integer(1));
    let (exists, _) = server.execute(&mut conn, cmd(&["EXISTS", "k"]));
    assert_eq!(exists, Frame::Integer(0));

    let (missing, _) = server.execute(&mut conn, cmd(&["EXPIRE", "missing", "10"]));
    assert_eq!(missing, Frame::Integer(0));
}

#[test]
fn setrange_past_end_pads_with_nuls() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    server.execute(&mut conn, cmd(&["SETRANGE", "k", "5", "x"]));
    let (reply, _) = server.execute(&mut conn, cmd(&["GET", "k"]));
    match reply {
        Frame::Bulk(bytes) => assert_eq!(&bytes[..], b"\0\0\0\0\0x"),
        other => panic!("expected bulk reply, got {other:?}"),
    }
}

#[test]
fn zadd_rejects_nan_score() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    let (reply, _) = server.execute(&mut conn, cmd(&["ZADD", "k", "nan", "m"]));
    assert!(matches!(reply, Frame::Error(ref msg) if msg.contains("not a valid float")));
}

/// End-to-end scenario 1: a blocking `BLPOP` on one connection is satisfied
/// by an `RPUSH` on another, and the list is gone afterward.
#[test]
fn blocking_pop_is_satisfied_by_a_concurrent_push() {
    let (server, _clock) = new_server();
    let mut conn_a = server.connect();
    let server_a = server.clone();
    let popper = std::thread::spawn(move || server_a.execute(&mut conn_a, cmd(&["BLPOP", "q", "0"])));

    // Give the popper a moment to register as a waiter before the push.
    std::thread::sleep(std::time::Duration::from_millis(50));
    let mut conn_b = server.connect();
    server.execute(&mut conn_b, cmd(&["RPUSH", "q", "v"]));

    let (reply, _) = popper.join().expect("blpop thread panicked");
    assert_eq!(reply, Frame::Array(vec![bulk("q"), bulk("v")]));

    let (len, _) = server.execute(&mut conn_b, cmd(&["LLEN", "q"]));
    assert_eq!(len, Frame::Integer(0));
    let (exists, _) = server.execute(&mut conn_b, cmd(&["EXISTS", "q"]));
    assert_eq!(exists, Frame::Integer(0));
}

/// End-to-end scenario 2: `WATCH` invalidation aborts `EXEC` when another
/// connection committed a write to the watched key in between.
#[test]
fn watch_invalidated_by_concurrent_write_aborts_exec() {
    let (server, _clock) = new_server();
    let mut conn_a = server.connect();
    let mut conn_b = server.connect();

    server.execute(&mut conn_a, cmd(&["WATCH", "x"]));
    server.execute(&mut conn_b, cmd(&["SET", "x", "1"]));

    server.execute(&mut conn_a, cmd(&["MULTI"]));
    server.execute(&mut conn_a, cmd(&["GET", "x"]));
    let (reply, _) = server.execute(&mut conn_a, cmd(&["EXEC"]));
    assert_eq!(reply, Frame::NilArray);

    let (value, _) = server.execute(&mut conn_a, cmd(&["GET", "x"]));
    assert_eq!(value, bulk("1"));
}

/// End-to-end scenario 3: a stream consumer group's pending entries list
/// shrinks as entries are acknowledged.
#[test]
fn stream_consumer_group_pel_tracks_delivery_and_ack() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let (reply, _) = server.execute(&mut conn, cmd(&["XADD", "s", "*", "f", "v"]));
        match reply {
            Frame::Bulk(id) => ids.push(String::from_utf8(id.to_vec()).unwrap()),
            other => panic!("expected stream id bulk reply, got {other:?}"),
        }
    }

    server.execute(&mut conn, cmd(&["XGROUP", "CREATE", "s", "g", "0"]));
    let (reply, _) = server.execute(&mut conn, cmd(&["XREADGROUP", "GROUP", "g", "c", "COUNT", "2", "STREAMS", "s", ">"]));
    let entries = match reply {
        Frame::Array(streams) => match &streams[0] {
            Frame::Array(pair) => match &pair[1] {
                Frame::Array(entries) => entries.len(),
                other => panic!("unexpected entries shape {other:?}"),
            },
            other => panic!("unexpected stream pair shape {other:?}"),
        },
        other => panic!("unexpected XREADGROUP reply shape {other:?}"),
    };
    assert_eq!(entries, 2);

    let (pending, _) = server.execute(&mut conn, cmd(&["XPENDING", "s", "g"]));
    match pending {
        Frame::Array(fields) => assert_eq!(fields[0], Frame::Integer(2)),
        other => panic!("unexpected XPENDING reply shape {other:?}"),
    }

    let (acked, _) = server.execute(&mut conn, cmd(&["XACK", "s", "g", &ids[0]]));
    assert_eq!(acked, Frame::Integer(1));

    let (pending, _) = server.execute(&mut conn, cmd(&["XPENDING", "s", "g"]));
    match pending {
        Frame::Array(fields) => assert_eq!(fields[0], Frame::Integer(1)),
        other => panic!("unexpected XPENDING reply shape {other:?}"),
    }
}

/// End-to-end scenario 4: a pattern subscriber receives a `pmessage` for a
/// channel published by a different connection.
#[test]
fn pattern_subscriber_receives_matching_publish() {
    let (server, _clock) = new_server();
    let mut conn_a = server.connect();
    let mut conn_b = server.connect();

    server.execute(&mut conn_a, cmd(&["PSUBSCRIBE", "news.*"]));
    let (reply, outbox) = server.execute(&mut conn_b, cmd(&["PUBLISH", "news.sport", "hello"]));
    assert_eq!(reply, Frame::Integer(1));

    let delivered = outbox
        .into_iter()
        .find(|o| o.client_id == conn_a.client_id)
        .expect("subscriber should have received a pmessage push");
    assert_eq!(
        delivered.frame,
        Frame::Push(vec![bulk("pmessage"), bulk("news.*"), bulk("news.sport"), bulk("hello")])
    );
}

/// End-to-end scenario 5: a key set with a short TTL is reported as
/// `expired` to a keyspace-notification subscriber once that TTL has
/// passed and the key is next touched.
#[test]
fn ttl_expiry_emits_keyspace_notification() {
    let (server, clock) = new_server();
    let mut conn = server.connect();

    server.execute(&mut conn, cmd(&["CONFIG", "SET", "notify-keyspace-events", "Ex"]));
    server.execute(&mut conn, cmd(&["SET", "k", "v", "PX", "50"]));
    clock.advance(60);

    let mut conn_sub = server.connect();
    server.execute(&mut conn_sub, cmd(&["SUBSCRIBE", "__keyevent@0__:expired"]));

    let (reply, outbox) = server.execute(&mut conn, cmd(&["GET", "k"]));
    assert_eq!(reply, Frame::Nil);

    let delivered = outbox
        .into_iter()
        .find(|o| o.client_id == conn_sub.client_id)
        .expect("subscriber should have received the expired event");
    assert_eq!(delivered.frame, Frame::Push(vec![bulk("message"), bulk("__keyevent@0__:expired"), bulk("k")]));
}

/// End-to-end scenario 6: writing a list to a key that holds a string
/// fails with `WRONGTYPE` and leaves the original value intact.
#[test]
fn cross_type_write_is_rejected_without_mutating() {
    let (server, _clock) = new_server();
    let mut conn = server.connect();
    server.execute(&mut conn, cmd(&["SET", "k", "s"]));
    let (reply, _) = server.execute(&mut conn, cmd(&["LPUSH", "k", "v"]));
    assert!(matches!(reply, Frame::Error(ref msg) if msg.starts_with("WRONGTYPE")));
    let (value, _) = server.execute(&mut conn, cmd(&["GET", "k"]));
    assert_eq!(value, bulk("s"));
}
