//! Bitmap operations over a String value, stored with a structural overlay
//! per spec.md §3 (`SETBIT`/`GETBIT`/`BITCOUNT`/`BITPOS`/`BITOP`).

use bytes::{Bytes, BytesMut};

pub fn get_bit(data: &[u8], offset: usize) -> bool {
    let byte_idx = offset / 8;
    if byte_idx >= data.len() {
        return false;
    }
    let bit_idx = 7 - (offset % 8);
    (data[byte_idx] >> bit_idx) & 1 == 1
}

/// Set `offset` to `value`, growing the string with leading NUL bytes as
/// needed (spec.md §8 `SETRANGE` boundary case generalizes here too).
/// Returns the previous bit value.
pub fn set_bit(data: &mut BytesMut, offset: usize, value: bool) -> bool {
    let byte_idx = offset / 8;
    if byte_idx >= data.len() {
        data.resize(byte_idx + 1, 0);
    }
    let bit_idx = 7 - (offset % 8);
    let mask = 1u8 << bit_idx;
    let prev = (data[byte_idx] & mask) != 0;
    if value {
        data[byte_idx] |= mask;
    } else {
        data[byte_idx] &= !mask;
    }
    prev
}

pub fn bit_count(data: &[u8], start: usize, end_inclusive: usize) -> u64 {
    if data.is_empty() || start > end_inclusive {
        return 0;
    }
    let end = end_inclusive.min(data.len().saturating_sub(1));
    data[start..=end]
        .iter()
        .map(|b| b.count_ones() as u64)
        .sum()
}

/// First set (or clear) bit at or after `start_byte`, within `end_byte`
/// inclusive. Returns `None` when not found.
pub fn bit_pos(data: &[u8], target: bool, start_byte: usize, end_byte: usize) -> Option<usize> {
    let end = end_byte.min(data.len().saturating_sub(1));
    if start_byte > end || data.is_empty() {
        return None;
    }
    for byte_idx in start_byte..=end {
        let byte = data[byte_idx];
        for bit in 0..8 {
            let mask = 1u8 << (7 - bit);
            let set = (byte & mask) != 0;
            if set == target {
                return Some(byte_idx * 8 + bit);
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

pub fn bit_op(op: BitOp, sources: &[Bytes]) -> Bytes {
    if sources.is_empty() {
        return Bytes::new();
    }
    if matches!(op, BitOp::Not) {
        return sources[0].iter().map(|b| !b).collect::<Vec<u8>>().into();
    }
    let max_len = sources.iter().map(|s| s.len()).max().unwrap_or(0);
    let mut result = vec![0u8; max_len];
    for i in 0..max_len {
        let mut acc: Option<u8> = None;
        for src in sources {
            let byte = src.get(i).copied().unwrap_or(0);
            acc = Some(match (acc, op) {
                (None, _) => byte,
                (Some(a), BitOp::And) => a & byte,
                (Some(a), BitOp::Or) => a | byte,
                (Some(a), BitOp::Xor) => a ^ byte,
                (Some(_), BitOp::Not) => unreachable!(),
            });
        }
        result[i] = acc.unwrap_or(0);
    }
    // AND of differing lengths treats the missing bytes as zero for every
    // source, which already zeroes the result for the non-overlapping tail.
    if matches!(op, BitOp::And) {
        let min_len = sources.iter().map(|s| s.len()).min().unwrap_or(0);
        for byte in result.iter_mut().skip(min_len) {
            *byte = 0;
        }
    }
    result.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bit_grows_string_with_leading_nuls() {
        let mut data = BytesMut::new();
        set_bit(&mut data, 7, true);
        assert_eq!(&data[..], &[0b0000_0001]);
    }

    #[test]
    fn bit_count_sums_set_bits_in_range() {
        assert_eq!(bit_count(&[0xff, 0x00], 0, 1), 8);
        assert_eq!(bit_count(&[0xff, 0xff], 0, 0), 8);
    }

    #[test]
    fn bit_pos_finds_first_set_bit() {
        assert_eq!(bit_pos(&[0x00, 0x0f], true, 0, 1), Some(12));
    }
}
