//! RESP Codec (spec.md §4.1): bidirectional serializer for the Redis
//! Serialization Protocol, versions 2 and 3, over a byte stream.
//!
//! The teacher (`redis/client.rs`) hand-formatted replies as pre-rendered
//! `"+OK\r\n"`-style static strings, which cannot express RESP3's extra
//! types or be chosen per-connection. This module replaces that approach
//! with a typed `Frame` the dispatcher builds once and the encoder renders
//! according to the connection's negotiated protocol version.

mod decode;
mod encode;

pub use decode::{decode_request, Decoded};
pub use encode::{encode_frame, format_double};

use bytes::Bytes;

/// Maximum size of a single bulk string/array element (spec.md §4.1, §6).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Maximum nesting depth of a multi-bulk request (spec.md §6).
pub const MAX_MULTIBULK_DEPTH: usize = 7;

/// Protocol version negotiated via `HELLO`. RESP2 is the default on
/// connect; RESP3 is entered only after a successful `HELLO 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoVer {
    Resp2,
    Resp3,
}

/// A response value the command layer produces; shape-agnostic with
/// respect to protocol version. The encoder chooses RESP2 or RESP3 wire
/// bytes for the ambiguous cases (nil, map, set, double, boolean,
/// big-number, verbatim string, push) based on `ProtoVer`.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Nil,
    NilArray,
    Array(Vec<Frame>),
    /// RESP3 map; encoded as a flat array of alternating key/value on RESP2.
    Map(Vec<(Frame, Frame)>),
    /// RESP3 set; encoded as an array on RESP2.
    Set(Vec<Frame>),
    /// RESP3 double; encoded as a bulk string on RESP2.
    Double(f64),
    /// RESP3 boolean; encoded as `:1`/`:0` on RESP2.
    Boolean(bool),
    /// RESP3 big number; encoded as a bulk string on RESP2.
    BigNumber(String),
    /// RESP3 verbatim string with a 3-byte format marker (e.g. `txt`, `mkd`);
    /// encoded as a plain bulk string on RESP2.
    Verbatim(&'static str, String),
    /// RESP3 out-of-band push message; encoded as a plain array on RESP2
    /// (spec.md §9 RESP3 push-frame note).
    Push(Vec<Frame>),
}

impl Frame {
    pub fn ok() -> Frame {
        Frame::Simple("OK".into())
    }

    pub fn from_error(err: &crate::error::RedisError) -> Frame {
        Frame::Error(err.to_string())
    }

    pub fn bulk(bytes: impl Into<Bytes>) -> Frame {
        Frame::Bulk(bytes.into())
    }

    pub fn bulk_str(s: impl Into<String>) -> Frame {
        Frame::Bulk(Bytes::from(s.into()))
    }

    pub fn array_of_bulks<I, B>(items: I) -> Frame
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Frame::Array(items.into_iter().map(|b| Frame::Bulk(b.into())).collect())
    }
}
