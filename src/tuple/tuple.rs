//! Tuples - ordered rows of values.

use std::fmt;

use super::Value;
use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::{Error, Result};

/// A row, or a key projected from one.
///
/// Tuples order lexicographically by value (see [`Value`]'s `Ord`), which
/// is the key order of every index.
///
/// Encoded as `[count: u32 LE][value...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tuple(pub Vec<Value>);

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// The sub-tuple at `columns`, in that order.
    ///
    /// # Panics
    /// Panics if a column index is out of range; callers index with
    /// positions taken from the tuple's own schema.
    pub fn project(&self, columns: &[usize]) -> Tuple {
        Tuple(columns.iter().map(|&i| self.0[i].clone()).collect())
    }

    pub fn encode(&self, w: &mut ByteWriter) {
        w.put_u32(self.0.len() as u32);
        for value in &self.0 {
            value.encode(w);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(self.encoded_len());
        self.encode(&mut w);
        w.into_inner()
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Tuple> {
        let count = r.get_u32()? as usize;
        if count > r.remaining() {
            return Err(Error::malformed(format!("tuple width {count} exceeds input")));
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(Value::decode(r)?);
        }
        Ok(Tuple(values))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Tuple> {
        Self::decode(&mut ByteReader::new(bytes))
    }

    pub fn encoded_len(&self) -> usize {
        4 + self.0.iter().map(Value::encoded_len).sum::<usize>()
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple(values)
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Tuple(iter.into_iter().collect())
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

/// Build a [`Tuple`] from anything convertible into [`Value`].
///
/// ```
/// use blinkdb::{tuple, Value};
///
/// let row = tuple![1, "a"];
/// assert_eq!(row.values(), &[Value::Int(1), Value::from("a")]);
/// ```
#[macro_export]
macro_rules! tuple {
    ($($value:expr),* $(,)?) => {
        $crate::tuple::Tuple::new(vec![$($crate::tuple::Value::from($value)),*])
    };
}
