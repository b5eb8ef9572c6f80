//! Typed values and tuples.
//!
//! - [`Value`] - A closed enum over the column value kinds
//! - [`ColumnType`] - A column's declared type
//! - [`Tuple`] - An ordered row of values; also used for keys

mod column_type;
#[allow(clippy::module_inception)]
mod tuple;
mod value;

pub use column_type::ColumnType;
pub use tuple::Tuple;
pub use value::Value;
