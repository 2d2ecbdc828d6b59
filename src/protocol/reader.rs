//! Streaming RESP Reader
//!
//! The reader pulls typed values straight off an async byte stream. Unlike
//! a buffer-and-reparse design, command handlers consume arguments lazily:
//! each call reads exactly one wire value, so after a handler returns the
//! next unread byte is the start of the next value.
//!
//! ## Buffering
//!
//! Incoming bytes accumulate in a `BytesMut` that is refilled from the
//! socket only when a read runs dry. No lookahead beyond the bytes already
//! buffered is ever required.
//!
//! ## Framing discipline
//!
//! CRLF boundaries are strictly validated: a bare LF, or a CR followed by
//! anything other than LF, is a protocol violation and ends the session.
//! Semantic rejections (an over-long integer, an over-long simple string)
//! drain the offending token through its CRLF first, so the stream stays
//! framed and the caller can reply with an error and continue.

use crate::protocol::types::{
    Kind, RespError, DEFAULT_SIMPLE_STRING_LIMIT, MAX_BULK_SIZE, MAX_DISCARD_DEPTH, MAX_INT_DIGITS,
};
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Initial capacity of the framing buffer
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Trait for command argument enums resolved by case-insensitive name.
///
/// Implementors map a raw argument (e.g. `b"SETNAME"`) to a variant;
/// `read_enum` turns a failed lookup into a recoverable `InvalidValue`.
pub trait EnumArg: Sized {
    fn from_name(name: &[u8]) -> Option<Self>;
}

/// A streaming RESP value reader over any async byte source.
pub struct RespReader<R> {
    inner: R,
    buf: BytesMut,
    simple_string_limit: usize,
}

impl<R: AsyncRead + Unpin> RespReader<R> {
    /// Creates a reader with the default simple string limit.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            simple_string_limit: DEFAULT_SIMPLE_STRING_LIMIT,
        }
    }

    /// Overrides the simple string length cap.
    pub fn with_simple_string_limit(mut self, limit: usize) -> Self {
        self.simple_string_limit = limit;
        self
    }

    /// Refills the buffer from the source. `Closed` means the peer shut
    /// the stream down; callers at a value boundary treat that as a clean
    /// disconnect, callers mid-value as a truncated stream.
    async fn fill(&mut self) -> Result<(), RespError> {
        let n = self.inner.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Err(RespError::Closed);
        }
        Ok(())
    }

    async fn read_byte(&mut self) -> Result<u8, RespError> {
        while self.buf.is_empty() {
            self.fill().await?;
        }
        Ok(self.buf.get_u8())
    }

    /// Consumes exactly `n` payload bytes.
    async fn read_exact_bytes(&mut self, n: usize) -> Result<Bytes, RespError> {
        while self.buf.len() < n {
            self.fill().await?;
        }
        Ok(self.buf.split_to(n).freeze())
    }

    /// Skips `n` payload bytes without retaining them.
    async fn skip_bytes(&mut self, mut n: usize) -> Result<(), RespError> {
        while n > 0 {
            if self.buf.is_empty() {
                self.fill().await?;
            }
            let take = self.buf.len().min(n);
            self.buf.advance(take);
            n -= take;
        }
        Ok(())
    }

    async fn expect_lf(&mut self) -> Result<(), RespError> {
        match self.read_byte().await? {
            b'\n' => Ok(()),
            _ => Err(RespError::Protocol("expected LF after CR")),
        }
    }

    async fn expect_crlf(&mut self) -> Result<(), RespError> {
        match self.read_byte().await? {
            b'\r' => self.expect_lf().await,
            _ => Err(RespError::Protocol("expected CRLF terminator")),
        }
    }

    /// Drains the remainder of the current line through its CRLF so the
    /// stream stays framed after a semantic rejection.
    async fn drain_line(&mut self) -> Result<(), RespError> {
        loop {
            match self.read_byte().await? {
                b'\r' => return self.expect_lf().await,
                b'\n' => return Err(RespError::Protocol("LF without preceding CR")),
                _ => {}
            }
        }
    }

    /// Reads the type prefix of the next value.
    pub async fn read_type_prefix(&mut self) -> Result<Kind, RespError> {
        let byte = self.read_byte().await?;
        Kind::from_prefix(byte).ok_or(RespError::Protocol("unknown type prefix"))
    }

    /// Parses a signed integer line up to the CRLF.
    ///
    /// At most 18 digits are accepted; a longer run of digits is drained
    /// and rejected as outside of the int64 range. A leading `+` is
    /// skipped, a leading `-` negates. Any other byte before the CR is a
    /// protocol violation.
    pub(crate) async fn read_integer_body(&mut self) -> Result<i64, RespError> {
        let mut byte = self.read_byte().await?;
        let mut negative = false;
        if byte == b'+' {
            byte = self.read_byte().await?;
        } else if byte == b'-' {
            negative = true;
            byte = self.read_byte().await?;
        }

        let mut digits = 0usize;
        let mut value: i64 = 0;
        loop {
            match byte {
                b'0'..=b'9' => {
                    digits += 1;
                    if digits > MAX_INT_DIGITS {
                        self.drain_line().await?;
                        return Err(RespError::InvalidValue(
                            "int is outside of int64 range".to_string(),
                        ));
                    }
                    // 18 digits fit in an i64 with room to spare
                    value = value * 10 + i64::from(byte - b'0');
                }
                b'\r' => {
                    if digits == 0 {
                        return Err(RespError::Protocol("integer with no digits"));
                    }
                    self.expect_lf().await?;
                    return Ok(if negative { -value } else { value });
                }
                _ => return Err(RespError::Protocol("unexpected byte in integer")),
            }
            byte = self.read_byte().await?;
        }
    }

    /// Reads a simple string body (the bytes after `+`, up to CRLF).
    pub(crate) async fn read_simple_body(&mut self) -> Result<Bytes, RespError> {
        let mut out = Vec::new();
        loop {
            match self.read_byte().await? {
                b'\r' => {
                    self.expect_lf().await?;
                    return Ok(Bytes::from(out));
                }
                b'\n' => return Err(RespError::Protocol("LF without preceding CR")),
                byte => {
                    if out.len() == self.simple_string_limit {
                        self.drain_line().await?;
                        return Err(RespError::InvalidValue(
                            "simple string exceeds maximum length".to_string(),
                        ));
                    }
                    out.push(byte);
                }
            }
        }
    }

    /// Reads the length line of a bulk string or array. An over-long
    /// length is promoted to a fatal error: the payload it announced is
    /// still in the stream, so framing cannot be recovered.
    async fn read_length_line(&mut self) -> Result<i64, RespError> {
        match self.read_integer_body().await {
            Err(RespError::InvalidValue(_)) => {
                Err(RespError::Protocol("length is outside of int64 range"))
            }
            other => other,
        }
    }

    /// Reads a bulk string body (length line, payload, CRLF). A negative
    /// length is the null bulk string and carries no payload.
    pub(crate) async fn read_bulk_body(&mut self) -> Result<Option<Bytes>, RespError> {
        let len = self.read_length_line().await?;
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        if len > MAX_BULK_SIZE {
            return Err(RespError::Protocol("bulk string length exceeds limit"));
        }
        let body = self.read_exact_bytes(len).await?;
        self.expect_crlf().await?;
        Ok(Some(body))
    }

    /// Reads an array header: `*` prefix, signed length, CRLF.
    ///
    /// `-1` (and any smaller value) is normalized to `-1`, the null array.
    pub async fn read_array_header(&mut self) -> Result<i64, RespError> {
        match self.read_type_prefix().await? {
            Kind::Array => {}
            _ => return Err(RespError::Protocol("expected array")),
        }
        let len = self.read_length_line().await?;
        Ok(len.max(-1))
    }

    /// Reads a string value: either a simple string or a (nullable) bulk
    /// string. Error values are legal on the wire but rejected as input.
    pub async fn read_string(&mut self) -> Result<Option<Bytes>, RespError> {
        match self.read_type_prefix().await? {
            Kind::SimpleString => Ok(Some(self.read_simple_body().await?)),
            Kind::BulkString => self.read_bulk_body().await,
            Kind::Error => Err(RespError::Protocol("error value not accepted as input")),
            _ => Err(RespError::Protocol("expected string value")),
        }
    }

    /// Reads a native integer value (`:` prefix only).
    pub async fn read_i64(&mut self) -> Result<i64, RespError> {
        match self.read_type_prefix().await? {
            Kind::Integer => self.read_integer_body().await,
            _ => Err(RespError::Protocol("expected integer value")),
        }
    }

    /// Reads an integer in either native (`:`) or string (`+` / `$`)
    /// form. The string form is parsed with the same digit rules as the
    /// native one.
    pub async fn read_i64_string(&mut self) -> Result<i64, RespError> {
        match self.read_type_prefix().await? {
            Kind::Integer => self.read_integer_body().await,
            Kind::SimpleString => {
                let body = self.read_simple_body().await?;
                parse_i64_bytes(&body)
            }
            Kind::BulkString => match self.read_bulk_body().await? {
                Some(body) => parse_i64_bytes(&body),
                None => Err(RespError::InvalidValue(
                    "null where non-null value is required".to_string(),
                )),
            },
            _ => Err(RespError::Protocol("expected integer value")),
        }
    }

    /// Reads one string and resolves it to an enum variant by
    /// case-insensitive name.
    pub async fn read_enum<T: EnumArg>(&mut self) -> Result<T, RespError> {
        let name = match self.read_string().await? {
            Some(name) => name,
            None => {
                return Err(RespError::InvalidValue(
                    "null where non-null value is required".to_string(),
                ))
            }
        };
        T::from_name(&name).ok_or_else(|| {
            RespError::InvalidValue(format!(
                "unrecognized value '{}'",
                String::from_utf8_lossy(&name)
            ))
        })
    }

    /// Discards one complete value of any kind.
    pub async fn discard_value(&mut self) -> Result<(), RespError> {
        self.discard_at_depth(1).await
    }

    /// Discards `n` complete values.
    pub async fn discard_n_values(&mut self, n: usize) -> Result<(), RespError> {
        for _ in 0..n {
            self.discard_value().await?;
        }
        Ok(())
    }

    async fn discard_at_depth(&mut self, depth: u32) -> Result<(), RespError> {
        match self.read_type_prefix().await? {
            Kind::SimpleString | Kind::Error | Kind::Integer => self.drain_line().await,
            Kind::BulkString => {
                let len = self.read_length_line().await?;
                if len < 0 {
                    return Ok(());
                }
                let len = len as usize;
                if len > MAX_BULK_SIZE {
                    return Err(RespError::Protocol("bulk string length exceeds limit"));
                }
                self.skip_bytes(len).await?;
                self.expect_crlf().await
            }
            Kind::Array => {
                if depth > MAX_DISCARD_DEPTH {
                    return Err(RespError::RecursionLimitExceeded);
                }
                let len = self.read_length_line().await?;
                for _ in 0..len.max(0) {
                    Box::pin(self.discard_at_depth(depth + 1)).await?;
                }
                Ok(())
            }
        }
    }
}

/// Parses an integer from the string form of an argument, with the same
/// sign and 18-digit rules as the native form. Rejections are recoverable
/// because the value has already been consumed from the stream.
pub(crate) fn parse_i64_bytes(input: &[u8]) -> Result<i64, RespError> {
    let (negative, digits) = match input.first() {
        Some(b'+') => (false, &input[1..]),
        Some(b'-') => (true, &input[1..]),
        _ => (false, input),
    };
    if digits.is_empty() {
        return Err(RespError::InvalidValue(
            "value is not an integer".to_string(),
        ));
    }
    if digits.len() > MAX_INT_DIGITS {
        if digits.iter().all(u8::is_ascii_digit) {
            return Err(RespError::InvalidValue(
                "int is outside of int64 range".to_string(),
            ));
        }
        return Err(RespError::InvalidValue(
            "value is not an integer".to_string(),
        ));
    }
    let mut value: i64 = 0;
    for &byte in digits {
        if !byte.is_ascii_digit() {
            return Err(RespError::InvalidValue(
                "value is not an integer".to_string(),
            ));
        }
        value = value * 10 + i64::from(byte - b'0');
    }
    Ok(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(input: &[u8]) -> RespReader<&[u8]> {
        RespReader::new(input)
    }

    #[tokio::test]
    async fn test_read_simple_string() {
        let mut r = reader(b"+PONG\r\n");
        assert_eq!(r.read_string().await.unwrap(), Some(Bytes::from("PONG")));
    }

    #[tokio::test]
    async fn test_read_bulk_string() {
        let mut r = reader(b"$5\r\nhello\r\n");
        assert_eq!(r.read_string().await.unwrap(), Some(Bytes::from("hello")));
    }

    #[tokio::test]
    async fn test_read_null_bulk_string() {
        let mut r = reader(b"$-1\r\n");
        assert_eq!(r.read_string().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_empty_bulk_string() {
        let mut r = reader(b"$0\r\n\r\n");
        assert_eq!(r.read_string().await.unwrap(), Some(Bytes::new()));
    }

    #[tokio::test]
    async fn test_binary_safe_bulk_string() {
        let mut r = reader(b"$5\r\nhe\x00lo\r\n");
        assert_eq!(
            r.read_string().await.unwrap(),
            Some(Bytes::from(&b"he\x00lo"[..]))
        );
    }

    #[tokio::test]
    async fn test_bulk_string_missing_trailing_crlf() {
        let mut r = reader(b"$5\r\nhelloXY");
        assert!(matches!(
            r.read_string().await,
            Err(RespError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_read_integer() {
        let mut r = reader(b":1000\r\n");
        assert_eq!(r.read_i64().await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_read_negative_integer() {
        let mut r = reader(b":-42\r\n");
        assert_eq!(r.read_i64().await.unwrap(), -42);
    }

    #[tokio::test]
    async fn test_read_integer_with_plus_sign() {
        let mut r = reader(b":+7\r\n");
        assert_eq!(r.read_i64().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_integer_eighteen_digits_accepted() {
        let mut r = reader(b":999999999999999999\r\n");
        assert_eq!(r.read_i64().await.unwrap(), 999_999_999_999_999_999);
    }

    #[tokio::test]
    async fn test_integer_nineteen_digits_rejected_and_framed() {
        let mut r = reader(b":1234567890123456789\r\n:5\r\n");
        let err = r.read_i64().await.unwrap_err();
        assert!(matches!(err, RespError::InvalidValue(_)));
        assert_eq!(err.to_string(), "int is outside of int64 range");
        // The over-long token was drained; the stream is still framed.
        assert_eq!(r.read_i64().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_integer_with_garbage_is_protocol_error() {
        let mut r = reader(b":12x4\r\n");
        assert!(matches!(r.read_i64().await, Err(RespError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_integer_with_no_digits_is_protocol_error() {
        let mut r = reader(b":\r\n");
        assert!(matches!(r.read_i64().await, Err(RespError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_lf_without_cr_is_protocol_error() {
        let mut r = reader(b"+OK\nmore\r\n");
        assert!(matches!(
            r.read_string().await,
            Err(RespError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_cr_without_lf_is_protocol_error() {
        let mut r = reader(b":12\rX\n");
        assert!(matches!(r.read_i64().await, Err(RespError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_simple_string_over_limit_stays_framed() {
        let long = vec![b'a'; 1025];
        let mut input = Vec::from(&b"+"[..]);
        input.extend_from_slice(&long);
        input.extend_from_slice(b"\r\n:3\r\n");
        let mut r = reader(&input);
        let err = r.read_string().await.unwrap_err();
        assert!(matches!(err, RespError::InvalidValue(_)));
        assert_eq!(r.read_i64().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_simple_string_at_limit_accepted() {
        let body = vec![b'a'; 1024];
        let mut input = Vec::from(&b"+"[..]);
        input.extend_from_slice(&body);
        input.extend_from_slice(b"\r\n");
        let mut r = reader(&input);
        assert_eq!(r.read_string().await.unwrap().unwrap().len(), 1024);
    }

    #[tokio::test]
    async fn test_overlong_bulk_length_is_fatal() {
        // The announced payload cannot be skipped, so this is not a
        // recoverable rejection.
        let mut r = reader(b"$1234567890123456789\r\nbody\r\n");
        assert!(matches!(
            r.read_string().await,
            Err(RespError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_read_array_header() {
        let mut r = reader(b"*3\r\n");
        assert_eq!(r.read_array_header().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_array_header_normalizes_negative_lengths() {
        let mut r = reader(b"*-1\r\n*-7\r\n");
        assert_eq!(r.read_array_header().await.unwrap(), -1);
        assert_eq!(r.read_array_header().await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_error_value_rejected_as_input() {
        let mut r = reader(b"-boom\r\n");
        assert!(matches!(
            r.read_string().await,
            Err(RespError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_read_i64_string_from_bulk() {
        let mut r = reader(b"$3\r\n-42\r\n");
        assert_eq!(r.read_i64_string().await.unwrap(), -42);
    }

    #[tokio::test]
    async fn test_read_i64_string_from_native() {
        let mut r = reader(b":17\r\n");
        assert_eq!(r.read_i64_string().await.unwrap(), 17);
    }

    #[tokio::test]
    async fn test_read_i64_string_rejects_text() {
        let mut r = reader(b"$3\r\nabc\r\n:9\r\n");
        let err = r.read_i64_string().await.unwrap_err();
        assert!(matches!(err, RespError::InvalidValue(_)));
        // Value was consumed; the stream is still framed.
        assert_eq!(r.read_i64().await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_read_i64_string_rejects_null() {
        let mut r = reader(b"$-1\r\n");
        assert!(matches!(
            r.read_i64_string().await,
            Err(RespError::InvalidValue(_))
        ));
    }

    #[derive(Debug, PartialEq)]
    enum Fruit {
        Apple,
        Pear,
    }

    impl EnumArg for Fruit {
        fn from_name(name: &[u8]) -> Option<Self> {
            if name.eq_ignore_ascii_case(b"apple") {
                Some(Fruit::Apple)
            } else if name.eq_ignore_ascii_case(b"pear") {
                Some(Fruit::Pear)
            } else {
                None
            }
        }
    }

    #[tokio::test]
    async fn test_read_enum_case_insensitive() {
        let mut r = reader(b"$5\r\nApPlE\r\n+PEAR\r\n");
        assert_eq!(r.read_enum::<Fruit>().await.unwrap(), Fruit::Apple);
        assert_eq!(r.read_enum::<Fruit>().await.unwrap(), Fruit::Pear);
    }

    #[tokio::test]
    async fn test_read_enum_unknown_is_invalid_value() {
        let mut r = reader(b"$4\r\nkiwi\r\n:1\r\n");
        assert!(matches!(
            r.read_enum::<Fruit>().await,
            Err(RespError::InvalidValue(_))
        ));
        assert_eq!(r.read_i64().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_discard_scalar_values() {
        let mut r = reader(b"+ok\r\n:12\r\n$3\r\nfoo\r\n$-1\r\n-err\r\n:1\r\n");
        for _ in 0..5 {
            r.discard_value().await.unwrap();
        }
        assert_eq!(r.read_i64().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_discard_nested_array_within_bound() {
        // Depth 4: *1 -> *1 -> *1 -> *1 -> :5
        let mut r = reader(b"*1\r\n*1\r\n*1\r\n*1\r\n:5\r\n:6\r\n");
        r.discard_value().await.unwrap();
        assert_eq!(r.read_i64().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_discard_depth_five_exceeds_limit() {
        let mut r = reader(b"*1\r\n*1\r\n*1\r\n*1\r\n*1\r\n:5\r\n");
        assert!(matches!(
            r.discard_value().await,
            Err(RespError::RecursionLimitExceeded)
        ));
    }

    #[tokio::test]
    async fn test_discard_n_values() {
        let mut r = reader(b":1\r\n:2\r\n:3\r\n:4\r\n");
        r.discard_n_values(3).await.unwrap();
        assert_eq!(r.read_i64().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_eof_at_value_boundary_is_closed() {
        let mut r = reader(b"");
        assert!(matches!(
            r.read_type_prefix().await,
            Err(RespError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_unknown_prefix_is_protocol_error() {
        let mut r = reader(b"@oops\r\n");
        assert!(matches!(
            r.read_type_prefix().await,
            Err(RespError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_i64_bytes() {
        assert_eq!(parse_i64_bytes(b"0").unwrap(), 0);
        assert_eq!(parse_i64_bytes(b"123").unwrap(), 123);
        assert_eq!(parse_i64_bytes(b"-9").unwrap(), -9);
        assert_eq!(parse_i64_bytes(b"+9").unwrap(), 9);
        assert!(parse_i64_bytes(b"").is_err());
        assert!(parse_i64_bytes(b"-").is_err());
        assert!(parse_i64_bytes(b"12a").is_err());
        assert!(parse_i64_bytes(b"1234567890123456789").is_err());
    }
}
