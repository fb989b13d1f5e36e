//! String value helpers: on-demand integer/float interpretation of a raw
//! byte string (spec.md §4.2).

use bytes::Bytes;

use crate::error::RedisError;

/// Parse `s` as a canonical base-10 `i64`. Canonical means: no leading
/// zeros (other than "0" itself), no leading `+`, re-rendering the parsed
/// value reproduces `s` exactly. This is what `INCR`/`DECR`/`GETRANGE`-style
/// commands require; a non-canonical numeral (e.g. `"007"`, `"+5"`) is
/// rejected with the same error as genuinely non-numeric input.
pub fn parse_canonical_i64(s: &[u8]) -> Result<i64, RedisError> {
    let text = std::str::from_utf8(s).map_err(|_| RedisError::NotAnInteger)?;
    let n: i64 = text.parse().map_err(|_| RedisError::NotAnInteger)?;
    if n.to_string() != text {
        return Err(RedisError::NotAnInteger);
    }
    Ok(n)
}

/// Parse `s` as an IEEE-754 double. NaN is rejected; `inf`/`-inf`/`+inf`
/// are accepted (spec.md §3 sorted-set invariant, §4.2 float ops).
pub fn parse_float(s: &[u8]) -> Result<f64, RedisError> {
    let text = std::str::from_utf8(s).map_err(|_| RedisError::NotAFloat)?;
    let trimmed = text.trim();
    let value: f64 = match trimmed.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        _ => trimmed.parse().map_err(|_| RedisError::NotAFloat)?,
    };
    if value.is_nan() {
        return Err(RedisError::NotAFloat);
    }
    Ok(value)
}

/// Format a double the way `INCRBYFLOAT`/`HINCRBYFLOAT` do: strip trailing
/// zeros and the trailing dot.
pub fn format_float(d: f64) -> String {
    crate::resp::format_double(d)
}

pub fn bytes_to_i64(b: &Bytes) -> Result<i64, RedisError> {
    parse_canonical_i64(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_canonical_integers() {
        assert!(parse_canonical_i64(b"007").is_err());
        assert!(parse_canonical_i64(b"+5").is_err());
        assert!(parse_canonical_i64(b" 5").is_err());
        assert_eq!(parse_canonical_i64(b"-5").unwrap(), -5);
        assert_eq!(parse_canonical_i64(b"0").unwrap(), 0);
    }

    #[test]
    fn rejects_nan_floats_but_allows_infinity() {
        assert!(parse_float(b"nan").is_err());
        assert_eq!(parse_float(b"inf").unwrap(), f64::INFINITY);
        assert_eq!(parse_float(b"-inf").unwrap(), f64::NEG_INFINITY);
        assert_eq!(parse_float(b"3.14").unwrap(), 3.14);
    }
}
