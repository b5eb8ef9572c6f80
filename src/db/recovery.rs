//! Crash recovery.
//!
//! Recovery rebuilds the committed state from the last checkpoint:
//!
//! 1. Restore `data.bak` over the data file and forget cached pages.
//! 2. Return every temp block to the free set; no snapshot survives.
//! 3. Replay the log. Operations are buffered per transaction and redone
//!    against shared pages when the transaction's commit record is
//!    reached. Transactions with no commit or rollback record are undone
//!    by simply not redoing them, and get a rollback record appended.
//! 4. Free any block that no table can reach.
//! 5. Checkpoint, so the next recovery starts from here.
//!
//! Redo is idempotent: inserts and updates upsert, removes and drops
//! skip what is already gone, creates skip what already exists.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use super::database::BACKUP_FILE;
use super::Database;
use crate::catalog::system_tables;
use crate::common::{Result, TxnId};
use crate::txn::{LogEntry, LogRecord};

/// What one recovery run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Log entries read.
    pub entries: usize,
    /// Committed transactions whose operations were redone.
    pub redone: Vec<TxnId>,
    /// Transactions that never finished.
    pub undone: Vec<TxnId>,
    /// Temp blocks returned to the free set.
    pub reclaimed_temp: usize,
    /// Allocated blocks that nothing referenced.
    pub leaked: usize,
}

impl Database {
    /// Recover with the promotion latch held for writing and no active
    /// transactions.
    pub(super) fn recover_locked(&self) -> Result<RecoveryReport> {
        self.cache.restore_from(self.dir().join(BACKUP_FILE))?;
        *self.committed.write() = None;
        self.retired.lock().clear();

        let reclaimed_temp = self.allocator.reclaim_temp_blocks()?;
        let entries = self.log.read_all()?;
        let (redone, undone) = self.replay(&entries)?;
        for txn in &undone {
            self.log.append(*txn, LogRecord::Rollback)?;
        }

        let leaked = self.release_unreachable()?;
        if leaked > 0 {
            warn!(blocks = leaked, "reclaimed unreachable blocks");
        }
        self.checkpoint_locked()?;

        info!(
            entries = entries.len(),
            redone = redone.len(),
            undone = undone.len(),
            reclaimed_temp,
            "recovery complete"
        );
        Ok(RecoveryReport {
            entries: entries.len(),
            redone,
            undone,
            reclaimed_temp,
            leaked,
        })
    }

    /// Redo every committed transaction in `entries`, in commit order.
    ///
    /// Returns the redone and the unfinished transactions.
    fn replay(&self, entries: &[LogEntry]) -> Result<(Vec<TxnId>, Vec<TxnId>)> {
        let mut pending: BTreeMap<TxnId, Vec<LogRecord>> = BTreeMap::new();
        let mut redone = Vec::new();

        for entry in entries {
            match &entry.kind {
                LogRecord::Begin => {
                    pending.entry(entry.txn_id).or_default();
                }
                LogRecord::Commit => {
                    let ops = pending.remove(&entry.txn_id).unwrap_or_default();
                    for op in ops {
                        self.redo(op)?;
                    }
                    redone.push(entry.txn_id);
                }
                LogRecord::Rollback => {
                    pending.remove(&entry.txn_id);
                }
                op => pending.entry(entry.txn_id).or_default().push(op.clone()),
            }
        }
        Ok((redone, pending.into_keys().collect()))
    }

    fn redo(&self, op: LogRecord) -> Result<()> {
        let mut store = self.direct();
        match op {
            LogRecord::Insert { table, tuple } | LogRecord::Update { table, tuple } => {
                match self.lookup_table(&mut store, &table)? {
                    Some(prop) => {
                        self.table(prop).upsert(&mut store, tuple)?;
                    }
                    None => warn!(table = %table, "redo skipped: table is gone"),
                }
            }
            LogRecord::Remove { table, key } => {
                if let Some(prop) = self.lookup_table(&mut store, &table)? {
                    let target = self.table(prop);
                    if target.find(&mut store, &key)?.is_some() {
                        target.remove(&mut store, &key)?;
                    }
                }
            }
            LogRecord::CreateTable { schema } => {
                if self.lookup_table(&mut store, &schema.name)?.is_none() {
                    self.write_new_table(&mut store, schema)?;
                }
            }
            LogRecord::DropTable { table } => {
                if let Some(prop) = self.lookup_table(&mut store, &table)? {
                    self.remove_catalog_rows(&mut store, &prop)?;
                }
            }
            LogRecord::Begin | LogRecord::Commit | LogRecord::Rollback => {}
        }
        Ok(())
    }

    /// Free every allocated block that no table reaches. Returns how many.
    fn release_unreachable(&self) -> Result<usize> {
        let mut store = self.direct();
        let mut live = BTreeSet::new();
        for prop in [system_tables::table_list(), system_tables::col_list()] {
            live.extend(self.table(prop).reachable_blocks(&mut store)?);
        }
        let view = self.load_view(&mut store)?;
        for prop in view.tables() {
            live.extend(self.table(prop.clone()).reachable_blocks(&mut store)?);
        }
        Ok(self.allocator.release_unreachable(&live)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnProperty, TableSchema};
    use crate::common::DbConfig;
    use crate::tuple;
    use crate::tuple::{ColumnType, Tuple};
    use crate::txn::IsolationLevel;
    use tempfile::tempdir;

    fn config() -> DbConfig {
        DbConfig::new().with_cache_capacity(32).with_fill_limit(120)
    }

    fn schema() -> TableSchema {
        TableSchema::new(
            "items",
            vec![
                ColumnProperty::new("id", ColumnType::Int).key(),
                ColumnProperty::new("qty", ColumnType::Int),
            ],
        )
    }

    fn scan_all(db: &Database) -> Vec<Tuple> {
        let txn = db.begin(IsolationLevel::Read).unwrap();
        let rows = db.scan(txn, "items").unwrap();
        db.commit(txn).unwrap();
        rows
    }

    #[test]
    fn test_replay_is_idempotent() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path(), config()).unwrap();

        let txn = db.begin(IsolationLevel::Read).unwrap();
        db.create_table(txn, schema()).unwrap();
        for id in 0..40 {
            db.insert(txn, "items", tuple![id, id * 2]).unwrap();
        }
        db.commit(txn).unwrap();

        let txn = db.begin(IsolationLevel::Read).unwrap();
        db.update(txn, "items", tuple![3, 0]).unwrap();
        db.remove(txn, "items", &tuple![5]).unwrap();
        db.commit(txn).unwrap();

        let entries = db.log.read_all().unwrap();
        let before = scan_all(&db);
        assert_eq!(before.len(), 39);

        let (redone, undone) = db.replay(&entries).unwrap();
        assert_eq!(redone.len(), 2);
        assert!(undone.is_empty());
        assert_eq!(scan_all(&db), before);

        db.replay(&entries).unwrap();
        assert_eq!(scan_all(&db), before);
    }

    #[test]
    fn test_recover_drops_unfinished_work() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path(), config()).unwrap();

        let txn = db.begin(IsolationLevel::Read).unwrap();
        db.create_table(txn, schema()).unwrap();
        db.insert(txn, "items", tuple![1, 1]).unwrap();
        db.commit(txn).unwrap();

        let open = db.begin(IsolationLevel::Read).unwrap();
        for id in 2..30 {
            db.insert(open, "items", tuple![id, id]).unwrap();
        }
        assert!(db.allocator.temp_count() > 0);
        drop(db);

        let db = Database::open(dir.path(), config()).unwrap();
        assert!(db.log.is_empty());
        assert_eq!(db.allocator.temp_count(), 0);
        assert_eq!(scan_all(&db), vec![tuple![1, 1]]);
    }

    #[test]
    fn test_recover_report() {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path(), config()).unwrap();

        let committed = db.begin(IsolationLevel::Read).unwrap();
        db.create_table(committed, schema()).unwrap();
        db.commit(committed).unwrap();
        let unfinished = db.begin(IsolationLevel::Read).unwrap();
        db.insert(unfinished, "items", tuple![1, 1]).unwrap();
        drop(db);

        let db = Database::open(dir.path(), config()).unwrap();
        let txn = db.begin(IsolationLevel::Read).unwrap();
        assert!(db.scan(txn, "items").unwrap().is_empty());
        db.rollback(txn).unwrap();

        // Open checkpointed the old log away; only the read-only
        // transaction above is left, and it rolled back.
        let report = db.recover().unwrap();
        assert_eq!(report.entries, 2);
        assert!(report.redone.is_empty());
        assert!(report.undone.is_empty());
        assert_eq!(report.leaked, 0);
        assert_eq!(report.reclaimed_temp, 0);
    }
}
