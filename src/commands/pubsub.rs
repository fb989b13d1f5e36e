//! Pub/Sub commands (spec.md §4.8): `SUBSCRIBE UNSUBSCRIBE PSUBSCRIBE
//! PUNSUBSCRIBE PUBLISH PUBSUB CHANNELS/NUMSUB/NUMPAT`.

use bytes::Bytes;

use crate::dispatch::{reply, HandlerCtx, HandlerResult};
use crate::error::RedisError;
use crate::notify::{message_frame, pmessage_frame};
use crate::resp::Frame;

fn sub_ack(kind: &str, channel: &Bytes, count: usize) -> Frame {
    Frame::Push(vec![
        Frame::bulk_str(kind),
        Frame::Bulk(channel.clone()),
        Frame::Integer(count as i64),
    ])
}

/// Pushes one ack per item to the caller's own outbox except the last,
/// which becomes this command's direct reply — every (p)subscribe and
/// (p)unsubscribe ack is delivered the same way, whether there was one
/// channel/pattern or many.
fn ack_sequence(ctx: &mut HandlerCtx, mut acks: Vec<Frame>) -> HandlerResult {
    let last = acks.pop().expect("at least one ack");
    for frame in acks {
        ctx.outbox.push(crate::notify::Outbound {
            client_id: ctx.conn.client_id,
            frame,
        });
    }
    reply(last)
}

pub fn subscribe(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let mut acks = Vec::with_capacity(args.len() - 1);
    for channel in &args[1..] {
        ctx.conn.subscribed_channels.insert(channel.clone());
        ctx.server.pubsub.subscribe_channel(ctx.conn.client_id, channel.clone());
        let count = ctx.conn.subscribed_channels.len() + ctx.conn.subscribed_patterns.len();
        acks.push(sub_ack("subscribe", channel, count));
    }
    ack_sequence(ctx, acks)
}

pub fn unsubscribe(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let channels: Vec<Bytes> = if args.len() > 1 {
        args[1..].to_vec()
    } else {
        ctx.conn.subscribed_channels.iter().cloned().collect()
    };
    if channels.is_empty() {
        let count = ctx.conn.subscribed_patterns.len();
        return ack_sequence(ctx, vec![sub_ack("unsubscribe", &Bytes::new(), count)]);
    }
    let mut acks = Vec::with_capacity(channels.len());
    for channel in &channels {
        ctx.conn.subscribed_channels.remove(channel);
        ctx.server.pubsub.unsubscribe_channel(ctx.conn.client_id, channel);
        let count = ctx.conn.subscribed_channels.len() + ctx.conn.subscribed_patterns.len();
        acks.push(sub_ack("unsubscribe", channel, count));
    }
    ack_sequence(ctx, acks)
}

pub fn psubscribe(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let mut acks = Vec::with_capacity(args.len() - 1);
    for pattern in &args[1..] {
        ctx.conn.subscribed_patterns.insert(pattern.clone());
        ctx.server.pubsub.subscribe_pattern(ctx.conn.client_id, pattern.clone());
        let count = ctx.conn.subscribed_channels.len() + ctx.conn.subscribed_patterns.len();
        acks.push(sub_ack("psubscribe", pattern, count));
    }
    ack_sequence(ctx, acks)
}

pub fn punsubscribe(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let patterns: Vec<Bytes> = if args.len() > 1 {
        args[1..].to_vec()
    } else {
        ctx.conn.subscribed_patterns.iter().cloned().collect()
    };
    if patterns.is_empty() {
        let count = ctx.conn.subscribed_channels.len();
        return ack_sequence(ctx, vec![sub_ack("punsubscribe", &Bytes::new(), count)]);
    }
    let mut acks = Vec::with_capacity(patterns.len());
    for pattern in &patterns {
        ctx.conn.subscribed_patterns.remove(pattern);
        ctx.server.pubsub.unsubscribe_pattern(ctx.conn.client_id, pattern);
        let count = ctx.conn.subscribed_channels.len() + ctx.conn.subscribed_patterns.len();
        acks.push(sub_ack("punsubscribe", pattern, count));
    }
    ack_sequence(ctx, acks)
}

pub fn publish(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let channel = &args[1];
    let payload = &args[2];
    let (direct, pattern_hits) = ctx.server.pubsub.matching_subscribers(channel);
    let mut delivered = 0i64;
    for client_id in direct {
        ctx.outbox.push(crate::notify::Outbound {
            client_id,
            frame: message_frame(channel, payload),
        });
        delivered += 1;
    }
    for (pattern, client_id) in pattern_hits {
        ctx.outbox.push(crate::notify::Outbound {
            client_id,
            frame: pmessage_frame(&pattern, channel, payload),
        });
        delivered += 1;
    }
    reply(Frame::Integer(delivered))
}

/// `PUBSUB CHANNELS [pattern] | NUMSUB [channel ...] | NUMPAT`
pub fn pubsub_cmd(ctx: &mut HandlerCtx, args: &[Bytes]) -> HandlerResult {
    let sub = super::arg_str(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "CHANNELS" => {
            let pattern = args.get(2).map(|p| p.as_ref());
            let channels = ctx.server.pubsub.channels_matching(pattern);
            reply(Frame::array_of_bulks(channels))
        }
        "NUMSUB" => {
            let mut out = Vec::new();
            for channel in &args[2..] {
                out.push(Frame::Bulk(channel.clone()));
                out.push(Frame::Integer(ctx.server.pubsub.numsub(channel) as i64));
            }
            reply(Frame::Array(out))
        }
        "NUMPAT" => reply(Frame::Integer(ctx.server.pubsub.numpat() as i64)),
        _ => Err(RedisError::UnknownSubcommand(sub, "PUBSUB".into())),
    }
}
