//! Response encoding for both RESP2 and RESP3, chosen per `ProtoVer`.

use bytes::{BufMut, BytesMut};

use super::{Frame, ProtoVer};

pub fn encode_frame(frame: &Frame, proto: ProtoVer, out: &mut BytesMut) {
    match frame {
        Frame::Simple(s) => {
            out.put_u8(b'+');
            out.put_slice(s.as_bytes());
            out.put_slice(b"\r\n");
        }
        Frame::Error(s) => {
            out.put_u8(b'-');
            out.put_slice(s.as_bytes());
            out.put_slice(b"\r\n");
        }
        Frame::Integer(n) => {
            out.put_u8(b':');
            out.put_slice(n.to_string().as_bytes());
            out.put_slice(b"\r\n");
        }
        Frame::Bulk(b) => {
            out.put_u8(b'$');
            out.put_slice(b.len().to_string().as_bytes());
            out.put_slice(b"\r\n");
            out.put_slice(b);
            out.put_slice(b"\r\n");
        }
        Frame::Nil => match proto {
            ProtoVer::Resp2 => out.put_slice(b"$-1\r\n"),
            ProtoVer::Resp3 => out.put_slice(b"_\r\n"),
        },
        Frame::NilArray => match proto {
            ProtoVer::Resp2 => out.put_slice(b"*-1\r\n"),
            ProtoVer::Resp3 => out.put_slice(b"_\r\n"),
        },
        Frame::Array(items) => {
            out.put_u8(b'*');
            out.put_slice(items.len().to_string().as_bytes());
            out.put_slice(b"\r\n");
            for item in items {
                encode_frame(item, proto, out);
            }
        }
        Frame::Map(pairs) => match proto {
            ProtoVer::Resp3 => {
                out.put_u8(b'%');
                out.put_slice(pairs.len().to_string().as_bytes());
                out.put_slice(b"\r\n");
                for (k, v) in pairs {
                    encode_frame(k, proto, out);
                    encode_frame(v, proto, out);
                }
            }
            ProtoVer::Resp2 => {
                out.put_u8(b'*');
                out.put_slice((pairs.len() * 2).to_string().as_bytes());
                out.put_slice(b"\r\n");
                for (k, v) in pairs {
                    encode_frame(k, proto, out);
                    encode_frame(v, proto, out);
                }
            }
        },
        Frame::Set(items) => {
            let tag = if proto == ProtoVer::Resp3 { b'~' } else { b'*' };
            out.put_u8(tag);
            out.put_slice(items.len().to_string().as_bytes());
            out.put_slice(b"\r\n");
            for item in items {
                encode_frame(item, proto, out);
            }
        }
        Frame::Double(d) => match proto {
            ProtoVer::Resp3 => {
                out.put_u8(b',');
                out.put_slice(format_double(*d).as_bytes());
                out.put_slice(b"\r\n");
            }
            ProtoVer::Resp2 => {
                encode_frame(&Frame::bulk_str(format_double(*d)), proto, out);
            }
        },
        Frame::Boolean(b) => match proto {
            ProtoVer::Resp3 => {
                out.put_u8(b'#');
                out.put_u8(if *b { b't' } else { b'f' });
                out.put_slice(b"\r\n");
            }
            ProtoVer::Resp2 => {
                encode_frame(&Frame::Integer(if *b { 1 } else { 0 }), proto, out);
            }
        },
        Frame::BigNumber(s) => match proto {
            ProtoVer::Resp3 => {
                out.put_u8(b'(');
                out.put_slice(s.as_bytes());
                out.put_slice(b"\r\n");
            }
            ProtoVer::Resp2 => {
                encode_frame(&Frame::bulk_str(s.clone()), proto, out);
            }
        },
        Frame::Verbatim(format, s) => match proto {
            ProtoVer::Resp3 => {
                let payload = format!("{}:{}", format, s);
                out.put_u8(b'=');
                out.put_slice(payload.len().to_string().as_bytes());
                out.put_slice(b"\r\n");
                out.put_slice(payload.as_bytes());
                out.put_slice(b"\r\n");
            }
            ProtoVer::Resp2 => {
                encode_frame(&Frame::bulk_str(s.clone()), proto, out);
            }
        },
        Frame::Push(items) => match proto {
            ProtoVer::Resp3 => {
                out.put_u8(b'>');
                out.put_slice(items.len().to_string().as_bytes());
                out.put_slice(b"\r\n");
                for item in items {
                    encode_frame(item, proto, out);
                }
            }
            ProtoVer::Resp2 => {
                encode_frame(&Frame::Array(items.clone()), proto, out);
            }
        },
    }
}

/// Redis float formatting: strip trailing zeros and the trailing dot,
/// preserve `inf`/`-inf` spelling (spec.md §4.2).
pub fn format_double(d: f64) -> String {
    if d.is_infinite() {
        return if d > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if d.is_nan() {
        return "nan".to_string();
    }
    if d == d.trunc() && d.abs() < 1e17 {
        return format!("{}", d as i64);
    }
    let mut s = format!("{:.17}", d);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(frame: &Frame, proto: ProtoVer) -> Vec<u8> {
        let mut out = BytesMut::new();
        encode_frame(frame, proto, &mut out);
        out.to_vec()
    }

    #[test]
    fn encodes_simple_and_bulk() {
        assert_eq!(render(&Frame::ok(), ProtoVer::Resp2), b"+OK\r\n");
        assert_eq!(
            render(&Frame::bulk_str("hi"), ProtoVer::Resp2),
            b"$2\r\nhi\r\n"
        );
    }

    #[test]
    fn nil_differs_between_resp2_and_resp3() {
        assert_eq!(render(&Frame::Nil, ProtoVer::Resp2), b"$-1\r\n");
        assert_eq!(render(&Frame::Nil, ProtoVer::Resp3), b"_\r\n");
    }

    #[test]
    fn double_formatting_strips_trailing_zeros() {
        assert_eq!(format_double(1.0), "1");
        assert_eq!(format_double(1.5), "1.5");
        assert_eq!(format_double(f64::INFINITY), "inf");
        assert_eq!(format_double(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn map_flattens_to_array_on_resp2() {
        let frame = Frame::Map(vec![(Frame::bulk_str("a"), Frame::Integer(1))]);
        assert_eq!(render(&frame, ProtoVer::Resp2), b"*2\r\n$1\r\na\r\n:1\r\n");
        assert_eq!(
            render(&frame, ProtoVer::Resp3),
            b"%1\r\n$1\r\na\r\n:1\r\n"
        );
    }
}
