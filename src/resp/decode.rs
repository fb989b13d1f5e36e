//! Request decoding. A client-to-server frame is always an array of bulk
//! strings (spec.md §4.1); inline commands (space-separated ASCII
//! terminated by CRLF) are accepted for compatibility.

use bytes::Bytes;

use super::{MAX_BULK_LEN, MAX_MULTIBULK_DEPTH};

/// Result of attempting to decode one request from the front of a buffer.
pub enum Decoded {
    /// A full request was parsed; `consumed` bytes should be dropped from
    /// the front of the buffer.
    Complete { args: Vec<Bytes>, consumed: usize },
    /// The buffer does not yet contain a full request.
    Incomplete,
    /// Framing itself is broken: oversized bulk, bad multi-bulk depth, or
    /// an unrecognized leading byte. Per spec.md §4.1 this is fatal and the
    /// connection must be closed; the message is what to log/report.
    ProtocolError(String),
}

/// Decode one request from `buf`. Never panics on malformed input.
pub fn decode_request(buf: &[u8]) -> Decoded {
    if buf.is_empty() {
        return Decoded::Incomplete;
    }
    match buf[0] {
        b'*' => decode_multibulk(buf),
        _ => decode_inline(buf),
    }
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|p| from + p)
    }

fn decode_multibulk(buf: &[u8]) -> Decoded {
    let Some(line_end) = find_crlf(buf, 0) else {
        return Decoded::Incomplete;
    };
    let header = &buf[1..line_end];
    let count: i64 = match std::str::from_utf8(header).ok().and_then(|s| s.parse().ok()) {
        Some(n) => n,
        None => return Decoded::ProtocolError("invalid multibulk length".into()),
    };
    if count > (MAX_MULTIBULK_DEPTH as i64 * 1_000_000) {
        return Decoded::ProtocolError("invalid multibulk length".into());
    }
    let mut pos = line_end + 2;
    if count <= 0 {
        return Decoded::Complete {
            args: Vec::new(),
            consumed: pos,
        };
    }

    let mut args = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if pos >= buf.len() || buf[pos] != b'$' {
            if pos >= buf.len() {
                return Decoded::Incomplete;
            }
            return Decoded::ProtocolError(format!(
                "expected '$', got '{}'",
                buf[pos] as char
            ));
        }
        let Some(len_end) = find_crlf(buf, pos) else {
            return Decoded::Incomplete;
        };
        let len_str = &buf[pos + 1..len_end];
        let blen: i64 = match std::str::from_utf8(len_str).ok().and_then(|s| s.parse().ok()) {
            Some(n) => n,
            None => return Decoded::ProtocolError("invalid bulk length".into()),
        };
        if blen < 0 || blen as usize > MAX_BULK_LEN {
            return Decoded::ProtocolError("invalid bulk length".into());
        }
        let data_start = len_end + 2;
        let data_end = data_start + blen as usize;
        if data_end + 2 > buf.len() {
            return Decoded::Incomplete;
        }
        if &buf[data_end..data_end + 2] != b"\r\n" {
            return Decoded::ProtocolError("expected CRLF after bulk data".into());
        }
        args.push(Bytes::copy_from_slice(&buf[data_start..data_end]));
        pos = data_end + 2;
    }

    Decoded::Complete {
        args,
        consumed: pos,
    }
}

/// Inline commands: whitespace-separated tokens terminated by a single
/// CRLF (or bare LF), accepted for compatibility with tools like `nc`.
fn decode_inline(buf: &[u8]) -> Decoded {
    let nl = match buf.iter().position(|&b| b == b'\n') {
        Some(p) => p,
        None => {
            if buf.len() > MAX_BULK_LEN {
                return Decoded::ProtocolError("too big inline request".into());
            }
            return Decoded::Incomplete;
        }
    };
    let consumed = nl + 1;
    let mut line = &buf[..nl];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    let args = match split_inline_args(line) {
        Ok(args) => args,
        Err(e) => return Decoded::ProtocolError(e),
    };
    Decoded::Complete { args, consumed }
}

fn split_inline_args(line: &[u8]) -> Result<Vec<Bytes>, String> {
    let mut args = Vec::new();
    let mut i = 0;
    while i < line.len() {
        while i < line.len() && line[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= line.len() {
            break;
        }
        let mut token = Vec::new();
        if line[i] == b'"' {
            i += 1;
            while i < line.len() && line[i] != b'"' {
                if line[i] == b'\\' && i + 1 < line.len() {
                    i += 1;
                }
                token.push(line[i]);
                i += 1;
            }
            if i >= line.len() {
                return Err("unbalanced quotes in request".into());
            }
            i += 1; // closing quote
        } else {
            while i < line.len() && !line[i].is_ascii_whitespace() {
                token.push(line[i]);
                i += 1;
            }
        }
        args.push(Bytes::from(token));
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_complete_multibulk() {
        let buf = b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n";
        match decode_request(buf) {
            Decoded::Complete { args, consumed } => {
                assert_eq!(args, vec![Bytes::from("GET"), Bytes::from("k")]);
                assert_eq!(consumed, buf.len());
            }
            _ => panic!("expected Complete"),
        }
    }

    #[test]
    fn reports_incomplete_for_a_partial_buffer() {
        let buf = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo";
        assert!(matches!(decode_request(buf), Decoded::Incomplete));
    }

    #[test]
    fn decodes_inline_commands() {
        let buf = b"PING\r\n";
        match decode_request(buf) {
            Decoded::Complete { args, consumed } => {
                assert_eq!(args, vec![Bytes::from("PING")]);
                assert_eq!(consumed, buf.len());
            }
            _ => panic!("expected Complete"),
        }
    }

    #[test]
    fn rejects_oversized_bulk_as_protocol_error() {
        let buf = format!("*1\r\n${}\r\n", MAX_BULK_LEN + 1);
        assert!(matches!(
            decode_request(buf.as_bytes()),
            Decoded::ProtocolError(_)
        ));
    }
}
