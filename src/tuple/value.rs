//! Typed column values.
//!
//! [`Value`] is a closed sum over the kinds a column can hold. Operators
//! never coerce between kinds: comparing an `Int` with a `BigInt` is a
//! [`Error::TypeMismatch`], and any operator applied to `Null` is a
//! [`Error::NullValue`].
//!
//! # Encoding
//! Each value is self-describing: a one-byte tag followed by its payload.
//!
//! | Tag | Kind    | Payload                          |
//! |-----|---------|----------------------------------|
//! | 0   | Null    | -                                |
//! | 1   | Char    | 1 byte                           |
//! | 2   | Int     | i32 LE                           |
//! | 3   | UInt    | u32 LE                           |
//! | 4   | BigInt  | i64 LE                           |
//! | 5   | List    | count u32 LE, then each value    |
//! | 6   | Varchar | length u32 LE, then UTF-8 bytes  |

use std::cmp::Ordering;
use std::fmt;

use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::{Error, Result};

pub(crate) const TAG_NULL: u8 = 0;
pub(crate) const TAG_CHAR: u8 = 1;
pub(crate) const TAG_INT: u8 = 2;
pub(crate) const TAG_UINT: u8 = 3;
pub(crate) const TAG_BIGINT: u8 = 4;
pub(crate) const TAG_LIST: u8 = 5;
pub(crate) const TAG_VARCHAR: u8 = 6;

/// Nested lists deeper than this are rejected on decode.
const MAX_DEPTH: usize = 8;

/// One column value.
///
/// The derived `Ord` is a total order (kind first, then payload). Index
/// keys rely on it; within one key column every value has the same kind,
/// so it agrees with [`Value::try_cmp`] wherever the latter succeeds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Null,
    Char(u8),
    Int(i32),
    UInt(u32),
    BigInt(i64),
    List(Vec<Value>),
    Varchar(String),
}

impl Value {
    pub fn tag(&self) -> u8 {
        match self {
            Value::Null => TAG_NULL,
            Value::Char(_) => TAG_CHAR,
            Value::Int(_) => TAG_INT,
            Value::UInt(_) => TAG_UINT,
            Value::BigInt(_) => TAG_BIGINT,
            Value::List(_) => TAG_LIST,
            Value::Varchar(_) => TAG_VARCHAR,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Char(_) => "char",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::BigInt(_) => "bigint",
            Value::List(_) => "list",
            Value::Varchar(_) => "varchar",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<u8> {
        match self {
            Value::Char(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    /// Compare two values of the same kind.
    ///
    /// Lists compare element-wise, then by length.
    pub fn try_cmp(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Err(Error::NullValue { op: "compare" }),
            (Value::Char(a), Value::Char(b)) => Ok(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::UInt(a), Value::UInt(b)) => Ok(a.cmp(b)),
            (Value::BigInt(a), Value::BigInt(b)) => Ok(a.cmp(b)),
            (Value::Varchar(a), Value::Varchar(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.try_cmp(y)? {
                        Ordering::Equal => continue,
                        unequal => return Ok(unequal),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(self.mismatch("<=>", other)),
        }
    }

    pub fn checked_add(&self, other: &Value) -> Result<Value> {
        self.arith(other, "+", i32::checked_add, u32::checked_add, i64::checked_add)
    }

    pub fn checked_sub(&self, other: &Value) -> Result<Value> {
        self.arith(other, "-", i32::checked_sub, u32::checked_sub, i64::checked_sub)
    }

    pub fn checked_mul(&self, other: &Value) -> Result<Value> {
        self.arith(other, "*", i32::checked_mul, u32::checked_mul, i64::checked_mul)
    }

    pub fn checked_div(&self, other: &Value) -> Result<Value> {
        let divisor_is_zero = matches!(
            other,
            Value::Int(0) | Value::UInt(0) | Value::BigInt(0)
        );
        if divisor_is_zero && self.tag() == other.tag() {
            return Err(Error::DivisionByZero);
        }
        self.arith(other, "/", i32::checked_div, u32::checked_div, i64::checked_div)
    }

    fn arith(
        &self,
        other: &Value,
        op: &'static str,
        int: fn(i32, i32) -> Option<i32>,
        uint: fn(u32, u32) -> Option<u32>,
        bigint: fn(i64, i64) -> Option<i64>,
    ) -> Result<Value> {
        let overflow = || Error::Overflow { op };
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Err(Error::NullValue { op }),
            (Value::Int(a), Value::Int(b)) => int(*a, *b).map(Value::Int).ok_or_else(overflow),
            (Value::UInt(a), Value::UInt(b)) => {
                uint(*a, *b).map(Value::UInt).ok_or_else(overflow)
            }
            (Value::BigInt(a), Value::BigInt(b)) => {
                bigint(*a, *b).map(Value::BigInt).ok_or_else(overflow)
            }
            _ => Err(self.mismatch(op, other)),
        }
    }

    fn mismatch(&self, op: &'static str, other: &Value) -> Error {
        Error::TypeMismatch {
            left: self.type_name(),
            op,
            right: other.type_name(),
        }
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    pub fn encode(&self, w: &mut ByteWriter) {
        w.put_u8(self.tag());
        match self {
            Value::Null => {}
            Value::Char(c) => w.put_u8(*c),
            Value::Int(v) => w.put_i32(*v),
            Value::UInt(v) => w.put_u32(*v),
            Value::BigInt(v) => w.put_i64(*v),
            Value::List(items) => {
                w.put_u32(items.len() as u32);
                for item in items {
                    item.encode(w);
                }
            }
            Value::Varchar(s) => w.put_len_prefixed(s.as_bytes()),
        }
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Value> {
        Self::decode_nested(r, 0)
    }

    fn decode_nested(r: &mut ByteReader<'_>, depth: usize) -> Result<Value> {
        let tag = r.get_u8()?;
        Ok(match tag {
            TAG_NULL => Value::Null,
            TAG_CHAR => Value::Char(r.get_u8()?),
            TAG_INT => Value::Int(r.get_i32()?),
            TAG_UINT => Value::UInt(r.get_u32()?),
            TAG_BIGINT => Value::BigInt(r.get_i64()?),
            TAG_LIST => {
                if depth >= MAX_DEPTH {
                    return Err(Error::malformed("list nested too deeply"));
                }
                let count = r.get_u32()? as usize;
                // Every element takes at least one byte.
                if count > r.remaining() {
                    return Err(Error::malformed(format!("list count {count} exceeds input")));
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Self::decode_nested(r, depth + 1)?);
                }
                Value::List(items)
            }
            TAG_VARCHAR => Value::Varchar(r.get_string()?),
            other => return Err(Error::malformed(format!("unknown value tag {other}"))),
        })
    }

    /// Size of [`Value::encode`]'s output.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Value::Null => 0,
            Value::Char(_) => 1,
            Value::Int(_) | Value::UInt(_) => 4,
            Value::BigInt(_) => 8,
            Value::List(items) => 4 + items.iter().map(Value::encoded_len).sum::<usize>(),
            Value::Varchar(s) => 4 + s.len(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Char(c) => write!(f, "'{}'", *c as char),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Varchar(s) => write!(f, "'{s}'"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_bytes(bytes: &[u8]) -> Result<Value> {
        Value::decode(&mut ByteReader::new(bytes))
    }

    fn encode_bytes(value: &Value) -> Vec<u8> {
        let mut w = ByteWriter::new();
        value.encode(&mut w);
        w.into_inner()
    }

    #[test]
    fn test_compare_same_kind() {
        assert_eq!(
            Value::Int(1).try_cmp(&Value::Int(2)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::from("b").try_cmp(&Value::from("a")).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_mismatched_kinds() {
        let err = Value::Int(1).try_cmp(&Value::BigInt(1)).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                left: "int",
                right: "bigint",
                ..
            }
        ));
        assert!(err.is_type_error());
    }

    #[test]
    fn test_null_operand() {
        assert!(matches!(
            Value::Null.try_cmp(&Value::Int(1)),
            Err(Error::NullValue { .. })
        ));
        assert!(matches!(
            Value::Int(1).checked_add(&Value::Null),
            Err(Error::NullValue { op: "+" })
        ));
    }

    #[test]
    fn test_list_compare_prefix_then_length() {
        let short = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let long = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(0)]);
        let bigger = Value::List(vec![Value::Int(1), Value::Int(3)]);

        assert_eq!(short.try_cmp(&long).unwrap(), Ordering::Less);
        assert_eq!(bigger.try_cmp(&long).unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            Value::Int(6).checked_mul(&Value::Int(7)).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            Value::BigInt(10).checked_sub(&Value::BigInt(11)).unwrap(),
            Value::BigInt(-1)
        );
        assert_eq!(
            Value::UInt(9).checked_div(&Value::UInt(2)).unwrap(),
            Value::UInt(4)
        );
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert!(matches!(
            Value::Int(i32::MAX).checked_add(&Value::Int(1)),
            Err(Error::Overflow { op: "+" })
        ));
        assert!(matches!(
            Value::UInt(0).checked_sub(&Value::UInt(1)),
            Err(Error::Overflow { op: "-" })
        ));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            Value::Int(1).checked_div(&Value::Int(0)),
            Err(Error::DivisionByZero)
        ));
        // Kind mismatch wins over a zero divisor of the wrong kind.
        assert!(matches!(
            Value::Int(1).checked_div(&Value::BigInt(0)),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_encoding_layout() {
        assert_eq!(encode_bytes(&Value::Int(1)), vec![TAG_INT, 1, 0, 0, 0]);
        assert_eq!(
            encode_bytes(&Value::from("hi")),
            vec![TAG_VARCHAR, 2, 0, 0, 0, b'h', b'i']
        );
        assert_eq!(encode_bytes(&Value::Null), vec![TAG_NULL]);
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        assert!(matches!(decode_bytes(&[42]), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        assert!(decode_bytes(&[TAG_BIGINT, 1, 2]).is_err());
        assert!(decode_bytes(&[TAG_LIST, 200, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_display() {
        let list = Value::List(vec![Value::Int(1), Value::Char(b'x')]);
        assert_eq!(list.to_string(), "[1, 'x']");
        assert_eq!(Value::from("abc").to_string(), "'abc'");
        assert_eq!(Value::Null.to_string(), "null");
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<u8>().prop_map(Value::Char),
            any::<i32>().prop_map(Value::Int),
            any::<u32>().prop_map(Value::UInt),
            any::<i64>().prop_map(Value::BigInt),
            "[a-z]{0,12}".prop_map(Value::Varchar),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            proptest::collection::vec(inner, 0..4).prop_map(Value::List)
        })
    }

    proptest! {
        /// The total order used for keys agrees with the checked comparison.
        #[test]
        fn prop_int_ordering_matches_try_cmp(a in any::<i32>(), b in any::<i32>()) {
            let (x, y) = (Value::Int(a), Value::Int(b));
            prop_assert_eq!(x.try_cmp(&y).unwrap(), a.cmp(&b));
            prop_assert_eq!(x.cmp(&y), a.cmp(&b));
        }

        #[test]
        fn prop_varchar_ordering_matches_try_cmp(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
            let (x, y) = (Value::from(a.as_str()), Value::from(b.as_str()));
            prop_assert_eq!(x.try_cmp(&y).unwrap(), x.cmp(&y));
        }

        #[test]
        fn prop_encoded_len_matches_encoding(value in arb_value()) {
            let bytes = encode_bytes(&value);
            prop_assert_eq!(bytes.len(), value.encoded_len());
            prop_assert_eq!(decode_bytes(&bytes).unwrap(), value);
        }
    }
}
