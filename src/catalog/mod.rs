//! Schemas and the catalog tables that persist them.
//!
//! - [`TableSchema`] / [`ColumnProperty`] - What `create_table` takes
//! - [`TableProperty`] - A schema plus its record and index roots
//! - [`system_tables`] - `.table_list` and `.col_list`

mod property;
pub mod system_tables;

pub use property::{ColumnProperty, TableProperty, TableSchema, MAX_NAME_LEN};
