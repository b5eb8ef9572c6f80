//! Snapshot isolation, rollback and commit-time conflicts.

use blinkdb::catalog::{ColumnProperty, TableSchema};
use blinkdb::tuple::ColumnType;
use blinkdb::{tuple, Database, DbConfig, Error, IsolationLevel};
use tempfile::{tempdir, TempDir};

fn setup() -> (Database, TempDir) {
    let dir = tempdir().unwrap();
    let db = Database::create(dir.path(), DbConfig::new().with_cache_capacity(32)).unwrap();
    let txn = db.begin(IsolationLevel::Read).unwrap();
    db.create_table(
        txn,
        TableSchema::new(
            "accounts",
            vec![
                ColumnProperty::new("id", ColumnType::Int).key(),
                ColumnProperty::new("balance", ColumnType::BigInt).not_null(),
            ],
        ),
    )
    .unwrap();
    for id in 1..=3 {
        db.insert(txn, "accounts", tuple![id, 100i64]).unwrap();
    }
    db.commit(txn).unwrap();
    (db, dir)
}

#[test]
fn test_uncommitted_writes_are_invisible() {
    let (db, _dir) = setup();

    let writer = db.begin(IsolationLevel::Read).unwrap();
    db.insert(writer, "accounts", tuple![4, 50i64]).unwrap();
    db.update(writer, "accounts", tuple![1, 0i64]).unwrap();

    let reader = db.begin(IsolationLevel::Read).unwrap();
    assert_eq!(db.find(reader, "accounts", &tuple![4]).unwrap(), None);
    assert_eq!(
        db.find(reader, "accounts", &tuple![1]).unwrap(),
        Some(tuple![1, 100i64])
    );
    // The writer sees its own changes.
    assert_eq!(db.scan(writer, "accounts").unwrap().len(), 4);

    db.commit(writer).unwrap();

    // A read-level transaction sees the commit on its next read.
    assert_eq!(
        db.find(reader, "accounts", &tuple![1]).unwrap(),
        Some(tuple![1, 0i64])
    );
    db.commit(reader).unwrap();

    let fresh = db.begin(IsolationLevel::RepeatableRead).unwrap();
    assert_eq!(db.scan(fresh, "accounts").unwrap().len(), 4);
    db.commit(fresh).unwrap();
}

#[test]
fn test_rollback_discards_writes() {
    let (db, _dir) = setup();

    let txn = db.begin(IsolationLevel::Read).unwrap();
    for id in 10..60 {
        db.insert(txn, "accounts", tuple![id, 1i64]).unwrap();
    }
    db.remove(txn, "accounts", &tuple![2]).unwrap();
    db.rollback(txn).unwrap();

    let check = db.begin(IsolationLevel::Read).unwrap();
    let rows = db.scan(check, "accounts").unwrap();
    assert_eq!(
        rows,
        vec![tuple![1, 100i64], tuple![2, 100i64], tuple![3, 100i64]]
    );
    db.commit(check).unwrap();
    assert_eq!(db.active_transactions(), 0);
}

#[test]
fn test_repeatable_read_keeps_its_view() {
    let (db, _dir) = setup();

    let rr = db.begin(IsolationLevel::RepeatableRead).unwrap();
    assert_eq!(
        db.find(rr, "accounts", &tuple![1]).unwrap(),
        Some(tuple![1, 100i64])
    );

    let writer = db.begin(IsolationLevel::Read).unwrap();
    db.update(writer, "accounts", tuple![1, 75i64]).unwrap();
    db.commit(writer).unwrap();

    assert_eq!(
        db.find(rr, "accounts", &tuple![1]).unwrap(),
        Some(tuple![1, 100i64])
    );
    db.commit(rr).unwrap();

    let after = db.begin(IsolationLevel::RepeatableRead).unwrap();
    assert_eq!(
        db.find(after, "accounts", &tuple![1]).unwrap(),
        Some(tuple![1, 75i64])
    );
    db.commit(after).unwrap();
}

#[test]
fn test_repeatable_read_write_conflict() {
    let (db, _dir) = setup();

    let rr = db.begin(IsolationLevel::RepeatableRead).unwrap();
    db.find(rr, "accounts", &tuple![1]).unwrap();

    let writer = db.begin(IsolationLevel::Read).unwrap();
    db.update(writer, "accounts", tuple![1, 10i64]).unwrap();
    db.commit(writer).unwrap();

    // Same block as the row the other transaction changed.
    db.update(rr, "accounts", tuple![2, 20i64]).unwrap();
    let err = db.commit(rr).unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(err, Error::WriteConflict { txn, .. } if txn == rr));

    // The conflicting transaction was rolled back.
    assert!(matches!(
        db.rollback(rr),
        Err(Error::TransactionNotFound(_))
    ));
    let check = db.begin(IsolationLevel::Read).unwrap();
    assert_eq!(
        db.scan(check, "accounts").unwrap(),
        vec![tuple![1, 10i64], tuple![2, 100i64], tuple![3, 100i64]]
    );
    db.commit(check).unwrap();
}

/// A repeatable-read transaction that began before another commit split
/// its blocks either reads exactly the rows that existed when it began or
/// gets a conflict. It never sees a mixture of the two states.
#[test]
fn test_repeatable_read_never_mixes_states_across_splits() {
    let dir = tempdir().unwrap();
    let db = Database::create(
        dir.path(),
        DbConfig::new().with_cache_capacity(64).with_fill_limit(128),
    )
    .unwrap();
    let txn = db.begin(IsolationLevel::Read).unwrap();
    db.create_table(
        txn,
        TableSchema::new(
            "events",
            vec![
                ColumnProperty::new("id", ColumnType::Int).key(),
                ColumnProperty::new("tag", ColumnType::varchar(16)),
            ],
        ),
    )
    .unwrap();
    for id in (0..40).step_by(2) {
        db.insert(txn, "events", tuple![id, format!("even-{id}")]).unwrap();
    }
    db.commit(txn).unwrap();

    let rr = db.begin(IsolationLevel::RepeatableRead).unwrap();
    assert_eq!(
        db.find(rr, "events", &tuple![0]).unwrap(),
        Some(tuple![0, "even-0"])
    );

    let writer = db.begin(IsolationLevel::Read).unwrap();
    for id in (1..40).step_by(2) {
        db.insert(writer, "events", tuple![id, format!("odd-{id}")]).unwrap();
    }
    db.commit(writer).unwrap();

    // Blocks read before the other commit stay pinned.
    assert_eq!(
        db.find(rr, "events", &tuple![0]).unwrap(),
        Some(tuple![0, "even-0"])
    );
    for id in 0..40 {
        match db.find(rr, "events", &tuple![id]) {
            Ok(Some(row)) => {
                assert_eq!(id % 2, 0, "saw row {id} committed after start");
                assert_eq!(row, tuple![id, format!("even-{id}")]);
            }
            Ok(None) => assert_eq!(id % 2, 1, "row {id} vanished"),
            Err(e) => assert!(e.is_conflict(), "{e}"),
        }
    }
    match db.scan(rr, "events") {
        Ok(rows) => {
            assert_eq!(rows.len(), 20);
            assert!(rows.iter().all(|r| r.values()[0].as_int().unwrap() % 2 == 0));
        }
        Err(e) => assert!(e.is_conflict(), "{e}"),
    }
    db.rollback(rr).unwrap();

    let fresh = db.begin(IsolationLevel::RepeatableRead).unwrap();
    assert_eq!(db.scan(fresh, "events").unwrap().len(), 40);
    db.commit(fresh).unwrap();
}

#[test]
fn test_read_level_last_writer_wins() {
    let (db, _dir) = setup();

    let slow = db.begin(IsolationLevel::Read).unwrap();
    db.find(slow, "accounts", &tuple![1]).unwrap();

    let writer = db.begin(IsolationLevel::Read).unwrap();
    db.update(writer, "accounts", tuple![1, 10i64]).unwrap();
    db.commit(writer).unwrap();

    db.update(slow, "accounts", tuple![2, 20i64]).unwrap();
    db.commit(slow).unwrap();

    let check = db.begin(IsolationLevel::Read).unwrap();
    assert_eq!(
        db.scan(check, "accounts").unwrap(),
        vec![tuple![1, 10i64], tuple![2, 20i64], tuple![3, 100i64]]
    );
    db.commit(check).unwrap();
}

#[test]
fn test_rolled_back_ddl_leaves_no_table() {
    let (db, _dir) = setup();

    let txn = db.begin(IsolationLevel::Read).unwrap();
    db.create_table(
        txn,
        TableSchema::new(
            "ledger",
            vec![
                ColumnProperty::new("id", ColumnType::BigInt).key(),
                ColumnProperty::new("account", ColumnType::Int).references("accounts"),
            ],
        ),
    )
    .unwrap();
    db.insert(txn, "ledger", tuple![1i64, 3]).unwrap();
    assert!(matches!(
        db.remove(txn, "accounts", &tuple![3]),
        Err(Error::ReferencedKeyInUse { .. })
    ));
    db.rollback(txn).unwrap();

    assert_eq!(db.table_names().unwrap(), vec!["accounts"]);
    let txn = db.begin(IsolationLevel::Read).unwrap();
    db.remove(txn, "accounts", &tuple![3]).unwrap();
    db.commit(txn).unwrap();
}

#[test]
fn test_unknown_transaction() {
    let (db, _dir) = setup();
    let bogus = blinkdb::TxnId::new(9999);
    assert!(matches!(
        db.insert(bogus, "accounts", tuple![9, 9i64]),
        Err(Error::TransactionNotFound(_))
    ));
    assert!(matches!(
        db.commit(bogus),
        Err(Error::TransactionNotFound(_))
    ));
}
