//! Tables through the database API: splits, lookups and schema checks.

use std::ops::Bound;

use blinkdb::catalog::{ColumnProperty, TableSchema};
use blinkdb::common::config::MAX_TUPLE_SIZE;
use blinkdb::tuple::ColumnType;
use blinkdb::{tuple, Database, DbConfig, Error, IsolationLevel, Tuple, Value};
use tempfile::tempdir;

fn small_blocks() -> DbConfig {
    DbConfig::new().with_cache_capacity(16).with_fill_limit(128)
}

fn create_numbers(db: &Database) {
    let txn = db.begin(IsolationLevel::Read).unwrap();
    db.create_table(
        txn,
        TableSchema::new(
            "numbers",
            vec![
                ColumnProperty::new("n", ColumnType::Int).key(),
                ColumnProperty::new("label", ColumnType::varchar(24)),
            ],
        ),
    )
    .unwrap();
    db.commit(txn).unwrap();
}

fn keys(rows: &[Tuple]) -> Vec<i32> {
    rows.iter().filter_map(|r| r.values()[0].as_int()).collect()
}

/// Enough inserts to split record blocks and then index nodes; every key
/// stays findable and the scan stays ordered.
#[test]
fn test_splits_keep_every_key() {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path(), small_blocks()).unwrap();
    create_numbers(&db);

    let mut order: Vec<i32> = (0..400).collect();
    // A fixed shuffle: interleave from both ends.
    order.sort_by_key(|n| if n % 2 == 0 { *n } else { 1000 - n });

    let txn = db.begin(IsolationLevel::Read).unwrap();
    for n in &order {
        db.insert(txn, "numbers", tuple![*n, format!("label-{n}")])
            .unwrap();
    }
    db.commit(txn).unwrap();

    let txn = db.begin(IsolationLevel::Read).unwrap();
    for n in 0..400 {
        assert_eq!(
            db.find(txn, "numbers", &tuple![n]).unwrap(),
            Some(tuple![n, format!("label-{n}")]),
            "key {n}"
        );
    }
    let all = db.scan(txn, "numbers").unwrap();
    assert_eq!(keys(&all), (0..400).collect::<Vec<_>>());
    db.commit(txn).unwrap();

    // The tree outgrew the cache.
    assert!(db.cache_stats().evictions > 0);
}

#[test]
fn test_ordered_lookups() {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path(), small_blocks()).unwrap();
    create_numbers(&db);

    let txn = db.begin(IsolationLevel::Read).unwrap();
    for n in (0..100).step_by(5) {
        db.insert(txn, "numbers", tuple![n, Value::Null]).unwrap();
    }

    let less = db.find_less(txn, "numbers", &tuple![20], false).unwrap();
    assert_eq!(keys(&less), vec![0, 5, 10, 15]);
    let less = db.find_less(txn, "numbers", &tuple![20], true).unwrap();
    assert_eq!(keys(&less), vec![0, 5, 10, 15, 20]);

    let greater = db.find_greater(txn, "numbers", &tuple![83], true).unwrap();
    assert_eq!(keys(&greater), vec![85, 90, 95]);

    let range = db
        .find_range(
            txn,
            "numbers",
            Bound::Excluded(&tuple![40]),
            Bound::Included(&tuple![60]),
        )
        .unwrap();
    assert_eq!(keys(&range), vec![45, 50, 55, 60]);

    let empty = db
        .find_range(
            txn,
            "numbers",
            Bound::Included(&tuple![60]),
            Bound::Included(&tuple![40]),
        )
        .unwrap();
    assert!(empty.is_empty());

    let odd = db
        .find_where(txn, "numbers", |t| {
            Ok(t.values()[0].as_int().map_or(false, |n| n % 2 == 1))
        })
        .unwrap();
    assert_eq!(keys(&odd), vec![5, 15, 25, 35, 45, 55, 65, 75, 85, 95]);
    db.commit(txn).unwrap();
}

/// A bound of the wrong type fails like a point lookup does instead of
/// comparing across types.
#[test]
fn test_range_bounds_are_type_checked() {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path(), small_blocks()).unwrap();
    create_numbers(&db);

    let txn = db.begin(IsolationLevel::Read).unwrap();
    for n in 1..=5 {
        db.insert(txn, "numbers", tuple![n, Value::Null]).unwrap();
    }

    let wide = tuple![Value::BigInt(3)];
    assert!(db.find(txn, "numbers", &wide).unwrap_err().is_type_error());
    assert!(matches!(
        db.find_greater(txn, "numbers", &wide, false),
        Err(Error::TypeMismatch { left: "int", right: "bigint", .. })
    ));
    assert!(matches!(
        db.find_less(txn, "numbers", &wide, true),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(db
        .find_range(txn, "numbers", Bound::Included(&tuple![1]), Bound::Excluded(&wide))
        .unwrap_err()
        .is_type_error());
    assert!(db
        .find_range(txn, "numbers", Bound::Excluded(&tuple!["1"]), Bound::Unbounded)
        .unwrap_err()
        .is_type_error());
    assert!(matches!(
        db.find_greater(txn, "numbers", &tuple![1, 2], true),
        Err(Error::ArityMismatch { expected: 1, found: 2 })
    ));

    // The transaction survives the refused reads.
    let greater = db.find_greater(txn, "numbers", &tuple![3], false).unwrap();
    assert_eq!(keys(&greater), vec![4, 5]);
    db.commit(txn).unwrap();
}

#[test]
fn test_remove_and_update_where() {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path(), small_blocks()).unwrap();
    create_numbers(&db);

    let txn = db.begin(IsolationLevel::Read).unwrap();
    for n in 0..60 {
        db.insert(txn, "numbers", tuple![n, "x"]).unwrap();
    }
    let removed = db
        .remove_where(txn, "numbers", |t| Ok(t.values()[0] >= Value::Int(30)))
        .unwrap();
    assert_eq!(removed, 30);

    let changed = db
        .update_where(
            txn,
            "numbers",
            |t| Ok(t.values()[0] < Value::Int(10)),
            |t| Ok(Tuple::new(vec![t.values()[0].clone(), Value::from("small")])),
        )
        .unwrap();
    assert_eq!(changed, 10);
    db.commit(txn).unwrap();

    let txn = db.begin(IsolationLevel::Read).unwrap();
    let rows = db.scan(txn, "numbers").unwrap();
    assert_eq!(rows.len(), 30);
    assert_eq!(rows[3], tuple![3, "small"]);
    assert_eq!(rows[20], tuple![20, "x"]);
    db.commit(txn).unwrap();
}

#[test]
fn test_integrity_errors_leave_table_unchanged() {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path(), small_blocks()).unwrap();
    create_numbers(&db);

    let txn = db.begin(IsolationLevel::Read).unwrap();
    db.insert(txn, "numbers", tuple![1, "one"]).unwrap();

    let err = db.insert(txn, "numbers", tuple![1, "again"]).unwrap_err();
    assert!(matches!(err, Error::DuplicateKey { .. }));
    assert!(err.is_integrity());

    let err = db.update(txn, "numbers", tuple![2, "two"]).unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { .. }));

    let err = db.remove(txn, "numbers", &tuple![2]).unwrap_err();
    assert!(matches!(err, Error::KeyNotFound { .. }));

    let err = db.insert(txn, "numbers", tuple!["1", "one"]).unwrap_err();
    assert!(err.is_type_error());

    let err = db
        .insert(txn, "numbers", tuple![3, "a label that is far too long"])
        .unwrap_err();
    assert!(matches!(err, Error::ValueTooLong { .. }));

    assert!(matches!(
        db.insert(txn, "missing", tuple![1]),
        Err(Error::TableNotFound(_))
    ));

    assert_eq!(db.scan(txn, "numbers").unwrap(), vec![tuple![1, "one"]]);
    db.commit(txn).unwrap();
}

#[test]
fn test_oversized_tuple_is_refused() {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path(), DbConfig::new()).unwrap();

    let txn = db.begin(IsolationLevel::Read).unwrap();
    db.create_table(
        txn,
        TableSchema::new(
            "docs",
            vec![
                ColumnProperty::new("id", ColumnType::Int).key(),
                ColumnProperty::new("body", ColumnType::varchar(4000)),
            ],
        ),
    )
    .unwrap();
    let body = "x".repeat(MAX_TUPLE_SIZE);
    assert!(matches!(
        db.insert(txn, "docs", tuple![1, body]),
        Err(Error::TupleTooLarge { .. })
    ));
    db.insert(txn, "docs", tuple![2, "x".repeat(MAX_TUPLE_SIZE / 2)])
        .unwrap();
    db.commit(txn).unwrap();
}

#[test]
fn test_composite_keys() {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path(), small_blocks()).unwrap();

    let txn = db.begin(IsolationLevel::Read).unwrap();
    db.create_table(
        txn,
        TableSchema::new(
            "grid",
            vec![
                ColumnProperty::new("x", ColumnType::Int).key(),
                ColumnProperty::new("y", ColumnType::Int).key(),
                ColumnProperty::new("v", ColumnType::BigInt),
            ],
        ),
    )
    .unwrap();
    for x in 0..6 {
        for y in (0..6).rev() {
            db.insert(txn, "grid", tuple![x, y, (x * 10 + y) as i64])
                .unwrap();
        }
    }

    assert_eq!(
        db.find(txn, "grid", &tuple![3, 4]).unwrap(),
        Some(tuple![3, 4, 34i64])
    );
    let row_two = db
        .find_range(
            txn,
            "grid",
            Bound::Included(&tuple![2]),
            Bound::Excluded(&tuple![3]),
        )
        .unwrap();
    assert_eq!(row_two.len(), 6);
    assert!(row_two.iter().all(|t| t.values()[0] == Value::Int(2)));
    assert!(db
        .find_greater(txn, "grid", &tuple![2, "4"], true)
        .unwrap_err()
        .is_type_error());
    db.commit(txn).unwrap();
}

#[test]
fn test_table_names_and_properties() {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path(), small_blocks()).unwrap();
    create_numbers(&db);

    assert_eq!(db.table_names().unwrap(), vec!["numbers"]);
    let prop = db.table_property("numbers").unwrap();
    assert_eq!(prop.key_columns(), vec![0]);
    assert_eq!(prop.columns[1].col_type, ColumnType::varchar(24));
    assert!(matches!(
        db.table_property("nope"),
        Err(Error::TableNotFound(_))
    ));

    let txn = db.begin(IsolationLevel::Read).unwrap();
    assert!(matches!(
        db.create_table(
            txn,
            TableSchema::new(
                "numbers",
                vec![ColumnProperty::new("n", ColumnType::Int).key()]
            )
        ),
        Err(Error::TableExists(_))
    ));
    assert!(matches!(
        db.create_table(
            txn,
            TableSchema::new("nokey", vec![ColumnProperty::new("n", ColumnType::Int)])
        ),
        Err(Error::InvalidSchema(_))
    ));
    db.drop_table(txn, "numbers").unwrap();
    db.commit(txn).unwrap();
    assert!(db.table_names().unwrap().is_empty());
}
