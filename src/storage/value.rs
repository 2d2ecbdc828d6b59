//! Stored Value Representation
//!
//! A stored value is either a 64-bit signed integer or an owned byte
//! string. The tagged enum keeps dispatch exhaustive; future shapes
//! (floats, booleans) slot in as new variants.

use thiserror::Error;

/// Reported size of an integer value. Integers have no byte buffer, so
/// size queries answer with this fixed constant.
pub const INT_VALUE_SIZE: usize = 4;

/// A value held by an entry: integer or binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
}

/// Arithmetic failures surfaced to the client verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("cannot perform incr or decr operation on non-integer value")]
    NotAnInteger,

    #[error("operation resulted in integer overflow")]
    Overflow,
}

impl Value {
    /// Deep-copies raw bytes into a binary value.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }

    /// Size in bytes as reported to clients: buffer length for binary,
    /// a fixed constant for integers.
    pub fn len_bytes(&self) -> usize {
        match self {
            Value::Int(_) => INT_VALUE_SIZE,
            Value::Bytes(buffer) => buffer.len(),
        }
    }

    /// Rewrites an integer value as its decimal byte string. Binary
    /// values are left untouched; the inverse conversion does not exist.
    pub fn coerce_to_bytes(&mut self) {
        if let Value::Int(n) = self {
            *self = Value::Bytes(n.to_string().into_bytes());
        }
    }

    /// Appends raw bytes, coercing an integer value to binary first.
    /// Returns the new length.
    pub fn append(&mut self, suffix: &[u8]) -> usize {
        self.coerce_to_bytes();
        match self {
            Value::Bytes(buffer) => {
                buffer.extend_from_slice(suffix);
                buffer.len()
            }
            Value::Int(_) => unreachable!(),
        }
    }

    /// Overflow-checked add on an integer value.
    pub fn checked_add(&mut self, delta: i64) -> Result<i64, ValueError> {
        match self {
            Value::Int(current) => {
                let next = current.checked_add(delta).ok_or(ValueError::Overflow)?;
                *current = next;
                Ok(next)
            }
            Value::Bytes(_) => Err(ValueError::NotAnInteger),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_bytes() {
        assert_eq!(Value::Int(1234).len_bytes(), INT_VALUE_SIZE);
        assert_eq!(Value::Bytes(b"hello".to_vec()).len_bytes(), 5);
        assert_eq!(Value::Bytes(Vec::new()).len_bytes(), 0);
    }

    #[test]
    fn test_coerce_int_to_bytes() {
        let mut value = Value::Int(-42);
        value.coerce_to_bytes();
        assert_eq!(value, Value::Bytes(b"-42".to_vec()));
        // Binary values stay as they are.
        value.coerce_to_bytes();
        assert_eq!(value, Value::Bytes(b"-42".to_vec()));
    }

    #[test]
    fn test_append_to_binary() {
        let mut value = Value::from_bytes(b"foo");
        assert_eq!(value.append(b"bar"), 6);
        assert_eq!(value, Value::Bytes(b"foobar".to_vec()));
    }

    #[test]
    fn test_append_coerces_integer() {
        let mut value = Value::Int(7);
        assert_eq!(value.append(b"!"), 2);
        assert_eq!(value, Value::Bytes(b"7!".to_vec()));
    }

    #[test]
    fn test_checked_add() {
        let mut value = Value::Int(10);
        assert_eq!(value.checked_add(5), Ok(15));
        assert_eq!(value.checked_add(-20), Ok(-5));
        assert_eq!(value, Value::Int(-5));
    }

    #[test]
    fn test_checked_add_overflow() {
        let mut value = Value::Int(i64::MAX);
        assert_eq!(value.checked_add(1), Err(ValueError::Overflow));
        // The value is unchanged after a failed add.
        assert_eq!(value, Value::Int(i64::MAX));

        let mut value = Value::Int(i64::MIN);
        assert_eq!(value.checked_add(-1), Err(ValueError::Overflow));
    }

    #[test]
    fn test_checked_add_on_binary() {
        let mut value = Value::from_bytes(b"abc");
        assert_eq!(value.checked_add(1), Err(ValueError::NotAnInteger));
    }
}
