//! Table and column properties.

use std::collections::BTreeMap;
use std::fmt;

use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::{BlockNum, Error, Result};
use crate::tuple::{ColumnType, Tuple};

/// Longest table or column name.
pub const MAX_NAME_LEN: usize = 64;

/// Definition of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnProperty {
    pub name: String,
    pub col_type: ColumnType,
    /// Part of the primary key. Key columns are implicitly not null.
    pub is_key: bool,
    pub not_null: bool,
    /// Table whose (single-column) key this column refers to.
    pub references: Option<String>,
}

impl ColumnProperty {
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            col_type,
            is_key: false,
            not_null: false,
            references: None,
        }
    }

    /// Mark this column as part of the primary key.
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self.not_null = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Require every non-null value to be a key of `table`.
    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.references = Some(table.into());
        self
    }

    fn encode(&self, w: &mut ByteWriter) {
        w.put_len_prefixed(self.name.as_bytes());
        let info = self.col_type.to_info();
        w.put_u32(info.len() as u32);
        for part in info {
            w.put_i32(part);
        }
        w.put_u8(self.is_key as u8);
        w.put_u8(self.not_null as u8);
        match &self.references {
            Some(table) => {
                w.put_u8(1);
                w.put_len_prefixed(table.as_bytes());
            }
            None => w.put_u8(0),
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let name = r.get_string()?;
        let info_len = r.get_u32()? as usize;
        if info_len > r.remaining() {
            return Err(Error::malformed("type info length exceeds input"));
        }
        let info = (0..info_len)
            .map(|_| r.get_i32())
            .collect::<Result<Vec<_>>>()?;
        let col_type = ColumnType::from_info(&info)?;
        let is_key = r.get_u8()? != 0;
        let not_null = r.get_u8()? != 0;
        let references = match r.get_u8()? {
            0 => None,
            _ => Some(r.get_string()?),
        };
        Ok(Self {
            name,
            col_type,
            is_key,
            not_null,
            references,
        })
    }
}

impl fmt::Display for ColumnProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.col_type)?;
        if self.is_key {
            write!(f, " key")?;
        } else if self.not_null {
            write!(f, " not null")?;
        }
        if let Some(table) = &self.references {
            write!(f, " references {table}")?;
        }
        Ok(())
    }
}

/// What a caller supplies to create a table.
///
/// # Example
/// ```
/// use blinkdb::catalog::{ColumnProperty, TableSchema};
/// use blinkdb::tuple::ColumnType;
///
/// let schema = TableSchema::new(
///     "users",
///     vec![
///         ColumnProperty::new("id", ColumnType::Int).key(),
///         ColumnProperty::new("name", ColumnType::varchar(32)).not_null(),
///     ],
/// );
/// assert!(schema.validate().is_ok());
/// assert_eq!(schema.key_columns(), vec![0]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnProperty>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnProperty>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Positions of the key columns, in column order.
    pub fn key_columns(&self) -> Vec<usize> {
        key_columns(&self.columns)
    }

    /// Check names, key presence and reference shape.
    ///
    /// Whether referenced tables exist is checked by the database.
    pub fn validate(&self) -> Result<()> {
        check_name("table", &self.name)?;
        if self.name.starts_with('.') {
            return Err(Error::InvalidSchema(format!(
                "table name {} is reserved",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(Error::InvalidSchema(format!("{} has no columns", self.name)));
        }
        if self.key_columns().is_empty() {
            return Err(Error::InvalidSchema(format!("{} has no key column", self.name)));
        }

        let mut seen = std::collections::BTreeSet::new();
        for col in &self.columns {
            check_name("column", &col.name)?;
            if !seen.insert(col.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate column {} in {}",
                    col.name, self.name
                )));
            }
            if col.is_key && !col.not_null {
                return Err(Error::InvalidSchema(format!(
                    "key column {} must be not null",
                    col.name
                )));
            }
            if let Some(target) = &col.references {
                check_name("referenced table", target)?;
            }
        }
        Ok(())
    }

    pub fn encode(&self, w: &mut ByteWriter) {
        w.put_len_prefixed(self.name.as_bytes());
        w.put_u32(self.columns.len() as u32);
        for col in &self.columns {
            col.encode(w);
        }
    }

    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let name = r.get_string()?;
        let count = r.get_u32()? as usize;
        if count > r.remaining() {
            return Err(Error::malformed("column count exceeds input"));
        }
        let columns = (0..count)
            .map(|_| ColumnProperty::decode(r))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { name, columns })
    }
}

/// A table as recorded in the catalog: its schema plus where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableProperty {
    pub name: String,
    pub record_root: BlockNum,
    pub index_root: BlockNum,
    pub columns: Vec<ColumnProperty>,
    /// Column name to the table it references.
    pub referencing: BTreeMap<String, String>,
}

impl TableProperty {
    pub fn new(
        schema: TableSchema,
        record_root: BlockNum,
        index_root: BlockNum,
    ) -> Self {
        let referencing = schema
            .columns
            .iter()
            .filter_map(|c| c.references.clone().map(|t| (c.name.clone(), t)))
            .collect();
        Self {
            name: schema.name,
            record_root,
            index_root,
            columns: schema.columns,
            referencing,
        }
    }

    pub fn schema(&self) -> TableSchema {
        TableSchema::new(self.name.clone(), self.columns.clone())
    }

    pub fn key_columns(&self) -> Vec<usize> {
        key_columns(&self.columns)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn key_of(&self, tuple: &Tuple) -> Tuple {
        tuple.project(&self.key_columns())
    }

    /// Check a tuple's width, types and null constraints.
    pub fn check_tuple(&self, tuple: &Tuple) -> Result<()> {
        if tuple.len() != self.columns.len() {
            return Err(Error::ArityMismatch {
                expected: self.columns.len(),
                found: tuple.len(),
            });
        }
        for (col, value) in self.columns.iter().zip(tuple.values()) {
            if value.is_null() && col.not_null {
                return Err(Error::NotNullViolation {
                    table: self.name.clone(),
                    column: col.name.clone(),
                });
            }
            col.col_type.check(value)?;
        }
        Ok(())
    }

    /// Check that `key` has the shape of this table's key.
    pub fn check_key(&self, key: &Tuple) -> Result<()> {
        let columns = self.key_columns();
        if key.len() != columns.len() {
            return Err(Error::ArityMismatch {
                expected: columns.len(),
                found: key.len(),
            });
        }
        for (&i, value) in columns.iter().zip(key.values()) {
            let col = &self.columns[i];
            if value.is_null() {
                return Err(Error::NotNullViolation {
                    table: self.name.clone(),
                    column: col.name.clone(),
                });
            }
            col.col_type.check(value)?;
        }
        Ok(())
    }

    /// Check a range bound: a prefix of the key, each value typed like the
    /// key column at its position.
    ///
    /// Unlike [`check_key`](Self::check_key), a bound may be shorter than
    /// the key and may exceed a varchar's length.
    pub fn check_bound(&self, bound: &Tuple) -> Result<()> {
        let columns = self.key_columns();
        if bound.len() > columns.len() {
            return Err(Error::ArityMismatch {
                expected: columns.len(),
                found: bound.len(),
            });
        }
        for (&i, value) in columns.iter().zip(bound.values()) {
            let col = &self.columns[i];
            if value.is_null() {
                return Err(Error::NotNullViolation {
                    table: self.name.clone(),
                    column: col.name.clone(),
                });
            }
            match col.col_type.check(value) {
                Ok(()) | Err(Error::ValueTooLong { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

fn key_columns(columns: &[ColumnProperty]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_key)
        .map(|(i, _)| i)
        .collect()
}

fn check_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidSchema(format!(
            "{what} name must be 1 to {MAX_NAME_LEN} bytes, got {:?}",
            name
        )));
    }
    Ok(())
}
