//! The fixed catalog tables.
//!
//! `.table_list` maps each table name to its record and index roots;
//! `.col_list` holds one row per column. Both live at reserved blocks so
//! they can be opened before anything else is known.

use super::{ColumnProperty, TableProperty, TableSchema};
use crate::common::{BlockNum, Error, Result};
use crate::tuple::{ColumnType, Tuple, Value};

pub const TABLE_LIST: &str = ".table_list";
pub const COL_LIST: &str = ".col_list";

pub const TABLE_LIST_RECORD_ROOT: BlockNum = BlockNum(0);
pub const TABLE_LIST_INDEX_ROOT: BlockNum = BlockNum(1);
pub const COL_LIST_RECORD_ROOT: BlockNum = BlockNum(2);
pub const COL_LIST_INDEX_ROOT: BlockNum = BlockNum(3);

const NAME_TYPE: ColumnType = ColumnType::Varchar { max_len: 64 };
const TYPE_INFO_LEN: usize = 16;

pub fn is_system_table(name: &str) -> bool {
    name == TABLE_LIST || name == COL_LIST
}

/// `.table_list(table_name varchar(64) key, record_root bigint, index_root bigint)`
pub fn table_list() -> TableProperty {
    TableProperty::new(
        TableSchema::new(
            TABLE_LIST,
            vec![
                ColumnProperty::new("table_name", NAME_TYPE).key(),
                ColumnProperty::new("record_root", ColumnType::BigInt).not_null(),
                ColumnProperty::new("index_root", ColumnType::BigInt).not_null(),
            ],
        ),
        TABLE_LIST_RECORD_ROOT,
        TABLE_LIST_INDEX_ROOT,
    )
}

/// `.col_list(table_name key, order_num key, col_name, type_info, is_key,
/// not_null, ref_table)`
pub fn col_list() -> TableProperty {
    TableProperty::new(
        TableSchema::new(
            COL_LIST,
            vec![
                ColumnProperty::new("table_name", NAME_TYPE).key(),
                ColumnProperty::new("order_num", ColumnType::Int).key(),
                ColumnProperty::new("col_name", NAME_TYPE).not_null(),
                ColumnProperty::new("type_info", ColumnType::list(ColumnType::Int, TYPE_INFO_LEN))
                    .not_null(),
                ColumnProperty::new("is_key", ColumnType::Char).not_null(),
                ColumnProperty::new("not_null", ColumnType::Char).not_null(),
                ColumnProperty::new("ref_table", NAME_TYPE),
            ],
        ),
        COL_LIST_RECORD_ROOT,
        COL_LIST_INDEX_ROOT,
    )
}

/// The `.table_list` row for `prop`.
pub fn table_row(prop: &TableProperty) -> Tuple {
    Tuple::new(vec![
        Value::from(prop.name.as_str()),
        Value::BigInt(prop.record_root.0 as i64),
        Value::BigInt(prop.index_root.0 as i64),
    ])
}

/// The `.col_list` rows for `prop`, in column order.
pub fn column_rows(prop: &TableProperty) -> Vec<Tuple> {
    prop.columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            Tuple::new(vec![
                Value::from(prop.name.as_str()),
                Value::Int(i as i32),
                Value::from(col.name.as_str()),
                col.col_type.to_value(),
                flag(col.is_key),
                flag(col.not_null),
                col.references
                    .as_deref()
                    .map_or(Value::Null, Value::from),
            ])
        })
        .collect()
}

/// Rebuild a property from its catalog rows. `columns` must be sorted by
/// `order_num`.
pub fn property_from_rows(table: &Tuple, columns: &[Tuple]) -> Result<TableProperty> {
    let name = text(table, 0)?.to_string();
    let record_root = root(table, 1)?;
    let index_root = root(table, 2)?;

    let columns = columns
        .iter()
        .map(|row| {
            Ok(ColumnProperty {
                name: text(row, 2)?.to_string(),
                col_type: ColumnType::from_value(field(row, 3)?)?,
                is_key: field(row, 4)?.as_char() == Some(1),
                not_null: field(row, 5)?.as_char() == Some(1),
                references: field(row, 6)?.as_str().map(str::to_string),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TableProperty::new(
        TableSchema::new(name, columns),
        record_root,
        index_root,
    ))
}

fn flag(set: bool) -> Value {
    Value::Char(set as u8)
}

fn field(row: &Tuple, i: usize) -> Result<&Value> {
    row.get(i)
        .ok_or_else(|| Error::malformed(format!("catalog row {row} has no column {i}")))
}

fn text(row: &Tuple, i: usize) -> Result<&str> {
    field(row, i)?
        .as_str()
        .ok_or_else(|| Error::malformed(format!("catalog row {row}: column {i} is not text")))
}

fn root(row: &Tuple, i: usize) -> Result<BlockNum> {
    field(row, i)?
        .as_bigint()
        .and_then(|raw| u32::try_from(raw).ok())
        .map(BlockNum::new)
        .ok_or_else(|| Error::malformed(format!("catalog row {row}: bad root in column {i}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_tables_are_valid() {
        for prop in [table_list(), col_list()] {
            assert!(prop.columns.iter().all(|c| c.name.len() <= 64));
            assert!(!prop.key_columns().is_empty());
        }
        assert_eq!(col_list().key_columns(), vec![0, 1]);
        assert!(is_system_table(".col_list"));
        assert!(!is_system_table("users"));
    }

    #[test]
    fn test_rows_round_trip() {
        let prop = TableProperty::new(
            TableSchema::new(
                "orders",
                vec![
                    ColumnProperty::new("id", ColumnType::BigInt).key(),
                    ColumnProperty::new("tags", ColumnType::list(ColumnType::varchar(4), 3)),
                    ColumnProperty::new("user", ColumnType::Int).references("users"),
                ],
            ),
            BlockNum::new(12),
            BlockNum::new(13),
        );

        let table = table_row(&prop);
        let columns = column_rows(&prop);
        table_list().check_tuple(&table).unwrap();
        for row in &columns {
            col_list().check_tuple(row).unwrap();
        }

        assert_eq!(property_from_rows(&table, &columns).unwrap(), prop);
    }

    #[test]
    fn test_bad_row_is_malformed() {
        let row = Tuple::new(vec![Value::Int(1)]);
        assert!(matches!(
            property_from_rows(&row, &[]),
            Err(Error::Malformed(_))
        ));
    }
}
