//! Keyspace notification emission (spec.md §4.8): mutating handlers call
//! `notify_keyspace_event` after a successful write; this is the single
//! place that knows how to turn `(class, event, key)` into
//! `__keyspace@<db>__:<key>` / `__keyevent@<db>__:<event>` publishes.

use bytes::Bytes;

use crate::config::Config;
use crate::pubsub::PubSubRegistry;
use crate::resp::Frame;

/// A message destined for some other connection's socket; the embedding
/// I/O loop (an external collaborator per spec.md §1) routes these by
/// `client_id` after draining a command's outbox.
pub struct Outbound {
    pub client_id: u64,
    pub frame: Frame,
}

/// Emit `event` for `key` in database `db_index`, if the server's
/// `notify-keyspace-events` configuration enables `class` and the
/// corresponding channel class.
pub fn notify_keyspace_event(
    config: &Config,
    pubsub: &PubSubRegistry,
    outbox: &mut Vec<Outbound>,
    db_index: usize,
    class: char,
    event: &str,
    key: &[u8],
) {
    let flags = config.notify_flags();
    if !flags.class_enabled(class) {
        return;
    }
    if flags.keyspace_enabled() {
        let channel = format!("__keyspace@{}__:{}", db_index, String::from_utf8_lossy(key));
        publish_to(pubsub, outbox, channel.as_bytes(), event.as_bytes());
    }
    if flags.keyevent_enabled() {
        let channel = format!("__keyevent@{}__:{}", db_index, event);
        publish_to(pubsub, outbox, channel.as_bytes(), key);
    }
}

fn publish_to(pubsub: &PubSubRegistry, outbox: &mut Vec<Outbound>, channel: &[u8], payload: &[u8]) {
    let (direct, pattern_hits) = pubsub.matching_subscribers(channel);
    for client_id in direct {
        outbox.push(Outbound {
            client_id,
            frame: message_frame(channel, payload),
        });
    }
    for (pattern, client_id) in pattern_hits {
        outbox.push(Outbound {
            client_id,
            frame: pmessage_frame(&pattern, channel, payload),
        });
    }
}

pub fn message_frame(channel: &[u8], payload: &[u8]) -> Frame {
    Frame::Push(vec![
        Frame::bulk_str("message"),
        Frame::bulk(Bytes::copy_from_slice(channel)),
        Frame::bulk(Bytes::copy_from_slice(payload)),
    ])
}

pub fn pmessage_frame(pattern: &[u8], channel: &[u8], payload: &[u8]) -> Frame {
    Frame::Push(vec![
        Frame::bulk_str("pmessage"),
        Frame::bulk(Bytes::copy_from_slice(pattern)),
        Frame::bulk(Bytes::copy_from_slice(channel)),
        Frame::bulk(Bytes::copy_from_slice(payload)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_nothing_when_class_is_disabled() {
        let config = Config::new();
        let pubsub = PubSubRegistry::default();
        let mut outbox = Vec::new();
        notify_keyspace_event(&config, &pubsub, &mut outbox, 0, 'x', "expired", b"k");
        assert!(outbox.is_empty());
    }

    #[test]
    fn publishes_keyevent_channel_when_enabled() {
        let mut config = Config::new();
        config.set("notify-keyspace-events", "Ex".into());
        let mut pubsub = PubSubRegistry::default();
        pubsub.subscribe_channel(1, Bytes::from("__keyevent@0__:expired"));
        let mut outbox = Vec::new();
        notify_keyspace_event(&config, &pubsub, &mut outbox, 0, 'x', "expired", b"k");
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].client_id, 1);
    }
}
