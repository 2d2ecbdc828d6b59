//! RESP Wire Format Constants and Errors
//!
//! RESP is a line-oriented, binary-safe protocol. Every value starts with
//! a one-byte type prefix and every token is terminated by CRLF:
//!
//! - `+` Simple String: `+OK\r\n`
//! - `-` Error: `-err message\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n` (null form: `$-1\r\n`)
//! - `*` Array: `*2\r\n<element><element>` (null form: `*-1\r\n`)

use thiserror::Error;

/// The CRLF terminator used by the RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// Maximum accepted body length for a bulk string (500 MiB)
pub const MAX_BULK_SIZE: usize = 500 * 1024 * 1024;

/// Maximum ASCII digits accepted when parsing an integer token.
/// Anything longer is rejected as outside of the int64 range.
pub const MAX_INT_DIGITS: usize = 18;

/// Default length cap for simple strings
pub const DEFAULT_SIMPLE_STRING_LIMIT: usize = 1024;

/// Maximum array nesting accepted while discarding unread values
pub const MAX_DISCARD_DEPTH: u32 = 4;

/// The kind of RESP value announced by a type prefix byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    SimpleString,
    Error,
    Integer,
    BulkString,
    Array,
}

impl Kind {
    /// Maps a prefix byte to its value kind.
    pub fn from_prefix(byte: u8) -> Option<Kind> {
        match byte {
            prefix::SIMPLE_STRING => Some(Kind::SimpleString),
            prefix::ERROR => Some(Kind::Error),
            prefix::INTEGER => Some(Kind::Integer),
            prefix::BULK_STRING => Some(Kind::BulkString),
            prefix::ARRAY => Some(Kind::Array),
            _ => None,
        }
    }
}

/// Errors produced by the RESP reader and writer.
///
/// `InvalidValue` and `InvalidParameters` are recoverable: the offending
/// value has been fully consumed (or drained to CRLF), so the stream is
/// still framed and the session may reply with an error and continue.
/// Everything else ends the session.
#[derive(Debug, Error)]
pub enum RespError {
    /// Underlying socket failure while reading or writing
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Wire format violation; the stream can no longer be framed
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// Grammatically valid value rejected on semantic grounds.
    /// The message doubles as the error reply sent to the client.
    #[error("{0}")]
    InvalidValue(String),

    /// Array nesting exceeded the discard bound
    #[error("recursion limit exceeded")]
    RecursionLimitExceeded,

    /// A `read_parameters` specification was violated by the input
    #[error("{0}")]
    InvalidParameters(String),

    /// The peer closed the connection at a value boundary
    #[error("connection closed")]
    Closed,
}

impl RespError {
    /// True when the stream is still framed and the session can write an
    /// error reply and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RespError::InvalidValue(_) | RespError::InvalidParameters(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_prefix() {
        assert_eq!(Kind::from_prefix(b'+'), Some(Kind::SimpleString));
        assert_eq!(Kind::from_prefix(b'-'), Some(Kind::Error));
        assert_eq!(Kind::from_prefix(b':'), Some(Kind::Integer));
        assert_eq!(Kind::from_prefix(b'$'), Some(Kind::BulkString));
        assert_eq!(Kind::from_prefix(b'*'), Some(Kind::Array));
        assert_eq!(Kind::from_prefix(b'@'), None);
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(RespError::InvalidValue("x".to_string()).is_recoverable());
        assert!(RespError::InvalidParameters("x".to_string()).is_recoverable());
        assert!(!RespError::Protocol("bad").is_recoverable());
        assert!(!RespError::RecursionLimitExceeded.is_recoverable());
        assert!(!RespError::Closed.is_recoverable());
    }
}
