//! Column types and their catalog encoding.

use std::fmt;

use super::value::{TAG_BIGINT, TAG_CHAR, TAG_INT, TAG_LIST, TAG_UINT, TAG_VARCHAR};
use super::Value;
use crate::common::{Error, Result};

/// The declared type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Char,
    Int,
    UInt,
    BigInt,
    Varchar { max_len: usize },
    List { elem: Box<ColumnType>, max_len: usize },
}

impl ColumnType {
    pub fn varchar(max_len: usize) -> Self {
        ColumnType::Varchar { max_len }
    }

    pub fn list(elem: ColumnType, max_len: usize) -> Self {
        ColumnType::List {
            elem: Box::new(elem),
            max_len,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            ColumnType::Char => TAG_CHAR,
            ColumnType::Int => TAG_INT,
            ColumnType::UInt => TAG_UINT,
            ColumnType::BigInt => TAG_BIGINT,
            ColumnType::List { .. } => TAG_LIST,
            ColumnType::Varchar { .. } => TAG_VARCHAR,
        }
    }

    /// Check that `value` may be stored in a column of this type.
    ///
    /// `Null` is accepted here; nullability is a column property.
    pub fn check(&self, value: &Value) -> Result<()> {
        match (self, value) {
            (_, Value::Null)
            | (ColumnType::Char, Value::Char(_))
            | (ColumnType::Int, Value::Int(_))
            | (ColumnType::UInt, Value::UInt(_))
            | (ColumnType::BigInt, Value::BigInt(_)) => Ok(()),
            (ColumnType::Varchar { max_len }, Value::Varchar(s)) => {
                if s.len() > *max_len {
                    return Err(Error::ValueTooLong {
                        len: s.len(),
                        max: *max_len,
                    });
                }
                Ok(())
            }
            (ColumnType::List { elem, max_len }, Value::List(items)) => {
                if items.len() > *max_len {
                    return Err(Error::ValueTooLong {
                        len: items.len(),
                        max: *max_len,
                    });
                }
                items.iter().try_for_each(|item| elem.check(item))
            }
            _ => Err(Error::TypeMismatch {
                left: self.name(),
                op: "store",
                right: value.type_name(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Char => "char",
            ColumnType::Int => "int",
            ColumnType::UInt => "uint",
            ColumnType::BigInt => "bigint",
            ColumnType::List { .. } => "list",
            ColumnType::Varchar { .. } => "varchar",
        }
    }

    /// Catalog form: `[tag]`, `[tag, max_len]` for varchar, and
    /// `[tag, max_len, elem...]` for lists.
    pub fn to_info(&self) -> Vec<i32> {
        let mut info = vec![self.tag() as i32];
        match self {
            ColumnType::Varchar { max_len } => info.push(*max_len as i32),
            ColumnType::List { elem, max_len } => {
                info.push(*max_len as i32);
                info.extend(elem.to_info());
            }
            _ => {}
        }
        info
    }

    pub fn from_info(info: &[i32]) -> Result<Self> {
        let (ty, rest) = Self::parse_info(info)?;
        if !rest.is_empty() {
            return Err(Error::malformed("trailing type info"));
        }
        Ok(ty)
    }

    fn parse_info(info: &[i32]) -> Result<(Self, &[i32])> {
        let (&tag, rest) = info
            .split_first()
            .ok_or_else(|| Error::malformed("empty type info"))?;
        let max_len = |rest: &[i32]| -> Result<usize> {
            rest.first()
                .and_then(|&n| usize::try_from(n).ok())
                .ok_or_else(|| Error::malformed("missing type length"))
        };

        match u8::try_from(tag).unwrap_or(u8::MAX) {
            TAG_CHAR => Ok((ColumnType::Char, rest)),
            TAG_INT => Ok((ColumnType::Int, rest)),
            TAG_UINT => Ok((ColumnType::UInt, rest)),
            TAG_BIGINT => Ok((ColumnType::BigInt, rest)),
            TAG_VARCHAR => Ok((
                ColumnType::Varchar {
                    max_len: max_len(rest)?,
                },
                &rest[1..],
            )),
            TAG_LIST => {
                let len = max_len(rest)?;
                let (elem, rest) = Self::parse_info(&rest[1..])?;
                Ok((
                    ColumnType::List {
                        elem: Box::new(elem),
                        max_len: len,
                    },
                    rest,
                ))
            }
            _ => Err(Error::malformed(format!("unknown type tag {tag}"))),
        }
    }

    /// The catalog form wrapped as a value.
    pub fn to_value(&self) -> Value {
        Value::List(self.to_info().into_iter().map(Value::Int).collect())
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let items = value
            .as_list()
            .ok_or_else(|| Error::malformed("type info is not a list"))?;
        let info = items
            .iter()
            .map(|v| {
                v.as_int()
                    .ok_or_else(|| Error::malformed("type info element is not an int"))
            })
            .collect::<Result<Vec<i32>>>()?;
        Self::from_info(&info)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Varchar { max_len } => write!(f, "varchar({max_len})"),
            ColumnType::List { elem, max_len } => write!(f, "list({elem}, {max_len})"),
            other => write!(f, "{}", other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_accepts_matching_kind() {
        assert!(ColumnType::Int.check(&Value::Int(5)).is_ok());
        assert!(ColumnType::varchar(3).check(&Value::from("abc")).is_ok());
        assert!(ColumnType::BigInt.check(&Value::Null).is_ok());
    }

    #[test]
    fn test_check_rejects_wrong_kind() {
        let err = ColumnType::Int.check(&Value::from("5")).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                left: "int",
                right: "varchar",
                ..
            }
        ));
    }

    #[test]
    fn test_check_length_limits() {
        assert!(matches!(
            ColumnType::varchar(2).check(&Value::from("abc")),
            Err(Error::ValueTooLong { len: 3, max: 2 })
        ));

        let list = ColumnType::list(ColumnType::Int, 2);
        let ok = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let wrong_elem = Value::List(vec![Value::Int(1), Value::Char(b'x')]);
        assert!(list.check(&ok).is_ok());
        assert!(list.check(&wrong_elem).is_err());
    }

    #[test]
    fn test_info_layout() {
        assert_eq!(ColumnType::Int.to_info(), vec![2]);
        assert_eq!(ColumnType::varchar(64).to_info(), vec![6, 64]);
        assert_eq!(
            ColumnType::list(ColumnType::varchar(8), 4).to_info(),
            vec![5, 4, 6, 8]
        );
    }

    #[test]
    fn test_nested_info_parses_back() {
        let ty = ColumnType::list(ColumnType::list(ColumnType::Char, 3), 16);
        assert_eq!(ColumnType::from_value(&ty.to_value()).unwrap(), ty);
    }

    #[test]
    fn test_bad_info_rejected() {
        assert!(ColumnType::from_info(&[]).is_err());
        assert!(ColumnType::from_info(&[6]).is_err());
        assert!(ColumnType::from_info(&[2, 9]).is_err());
        assert!(ColumnType::from_info(&[99]).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ColumnType::varchar(8).to_string(), "varchar(8)");
        assert_eq!(
            ColumnType::list(ColumnType::Int, 16).to_string(),
            "list(int, 16)"
        );
    }
}
