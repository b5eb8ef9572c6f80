//! The database handle.
//!
//! A [`Database`] owns everything under one directory: the data file and
//! its checkpoint backup, the allocator, the page cache and the
//! transaction log. Every table operation runs inside a transaction.
//!
//! # Concurrency
//! ```text
//!   table locks  ──►  promotion latch  ──►  node latches  ──►  cache  ──►  allocator
//!   (txn scoped)      (read: every op,      (per block)
//!                      write: commit,
//!                      checkpoint)
//! ```
//! A writer resolves the tables it needs under a short read latch, drops
//! the latch, waits for its table locks, then takes the latch again and
//! re-checks. Nothing ever waits for a table lock while holding the
//! latch, so a committer blocked on the write latch can never be waited
//! on by a reader that holds it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::catalog_view::CatalogView;
use super::recovery::RecoveryReport;
use crate::alloc::BlockAllocator;
use crate::buffer::{PageCache, StatsSnapshot};
use crate::catalog::system_tables::{self, COL_LIST, TABLE_LIST};
use crate::catalog::{TableProperty, TableSchema};
use crate::common::config::MAX_TUPLE_SIZE;
use crate::common::{BlockNum, DbConfig, Error, Result, TxnId};
use crate::index::NodeLatches;
use crate::storage::DiskManager;
use crate::table::Table;
use crate::tuple::{Tuple, Value};
use crate::txn::{
    CommitClock, DirectStore, IsolationLevel, LockTable, LogRecord, PageStore, Snapshot,
    TransactionInfo, TransactionLog,
};

/// The data file.
pub const DATA_FILE: &str = "data.db";

/// Copy of the data file taken at the last checkpoint.
pub const BACKUP_FILE: &str = "data.bak";

type TxnHandle = Arc<Mutex<TransactionInfo>>;

/// An open database.
///
/// `Database` is `Send + Sync`; share it between threads with `Arc`.
/// Dropping it without [`close`](Database::close) leaves the directory as
/// a crash would, and the next [`open`](Database::open) recovers.
///
/// # Example
/// ```no_run
/// use blinkdb::catalog::{ColumnProperty, TableSchema};
/// use blinkdb::tuple::ColumnType;
/// use blinkdb::{tuple, Database, DbConfig, IsolationLevel};
///
/// let db = Database::create("/tmp/blinkdb-demo", DbConfig::default()).unwrap();
/// let txn = db.begin(IsolationLevel::Read).unwrap();
/// db.create_table(
///     txn,
///     TableSchema::new(
///         "users",
///         vec![
///             ColumnProperty::new("id", ColumnType::Int).key(),
///             ColumnProperty::new("name", ColumnType::varchar(32)),
///         ],
///     ),
/// )
/// .unwrap();
/// db.insert(txn, "users", tuple![1, "ann"]).unwrap();
/// db.commit(txn).unwrap();
/// db.close().unwrap();
/// ```
pub struct Database {
    dir: PathBuf,
    config: DbConfig,
    pub(super) cache: Arc<PageCache>,
    pub(super) allocator: Arc<BlockAllocator>,
    pub(super) log: TransactionLog,
    locks: LockTable,
    latches: Arc<NodeLatches>,
    /// Read mode for every operation, write mode while a commit promotes
    /// or a checkpoint runs.
    pub(super) promotion: RwLock<()>,
    /// Stamps promoted blocks so repeatable-read snapshots can tell which
    /// blocks changed after they began.
    clock: Arc<CommitClock>,
    txns: Mutex<HashMap<TxnId, TxnHandle>>,
    /// The committed catalog, loaded on first use after each DDL commit.
    pub(super) committed: RwLock<Option<Arc<CatalogView>>>,
    /// Blocks of dropped tables, freed by the next checkpoint.
    pub(super) retired: Mutex<Vec<BlockNum>>,
}

impl Database {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create a new database in `dir`.
    ///
    /// # Errors
    /// Fails if `dir` already holds a data file.
    pub fn create<P: AsRef<Path>>(dir: P, config: DbConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let disk = DiskManager::create(dir.join(DATA_FILE))?;
        let allocator = Arc::new(BlockAllocator::create(&dir, config.alloc_backup_interval)?);
        let log = TransactionLog::open(&dir)?;
        let db = Self::assemble(dir, config, disk, allocator, log);

        let mut store = db.direct();
        db.table(system_tables::table_list()).create(&mut store)?;
        db.table(system_tables::col_list()).create(&mut store)?;
        db.checkpoint()?;

        info!(dir = %db.dir.display(), "database created");
        Ok(db)
    }

    /// Open an existing database, recovering from the last checkpoint.
    pub fn open<P: AsRef<Path>>(dir: P, config: DbConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();

        let disk = DiskManager::open(dir.join(DATA_FILE))?;
        let allocator = Arc::new(BlockAllocator::open(&dir, config.alloc_backup_interval)?);
        let log = TransactionLog::open(&dir)?;
        let db = Self::assemble(dir, config, disk, allocator, log);

        let report = db.recover()?;
        info!(
            dir = %db.dir.display(),
            redone = report.redone.len(),
            undone = report.undone.len(),
            "database opened"
        );
        Ok(db)
    }

    /// Delete the database directory and everything in it.
    pub fn destroy<P: AsRef<Path>>(dir: P) -> Result<()> {
        match fs::remove_dir_all(dir.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Roll back any active transactions and checkpoint.
    pub fn close(self) -> Result<()> {
        let active: Vec<TxnId> = self.txns.lock().keys().copied().collect();
        for txn in active {
            self.rollback(txn)?;
        }
        self.checkpoint()?;
        info!(dir = %self.dir.display(), "database closed");
        Ok(())
    }

    fn assemble(
        dir: PathBuf,
        config: DbConfig,
        disk: DiskManager,
        allocator: Arc<BlockAllocator>,
        log: TransactionLog,
    ) -> Self {
        let cache = Arc::new(PageCache::new(config.cache_capacity, disk).with_hook(allocator.clone()));
        Self {
            dir,
            config,
            cache,
            allocator,
            log,
            locks: LockTable::new(),
            latches: Arc::new(NodeLatches::new()),
            promotion: RwLock::new(()),
            clock: Arc::new(CommitClock::new()),
            txns: Mutex::new(HashMap::new()),
            committed: RwLock::new(None),
            retired: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub fn begin(&self, level: IsolationLevel) -> Result<TxnId> {
        let _latch = self.promotion.read();
        let txn = self.log.next_txn_id();
        self.log.append(txn, LogRecord::Begin)?;
        let mut info = TransactionInfo::new(txn, level);
        if level == IsolationLevel::RepeatableRead {
            info.snapshot = Snapshot::new(txn, level).with_horizon(self.clock.clone());
        }
        self.txns.lock().insert(txn, Arc::new(Mutex::new(info)));
        debug!(txn = %txn, level = %level, "transaction started");
        Ok(txn)
    }

    /// Make `txn`'s writes visible to everyone.
    ///
    /// # Errors
    /// `WriteConflict` if `txn` is repeatable-read and another transaction
    /// committed a change to a block `txn` wrote. `txn` is rolled back
    /// before the error is returned.
    pub fn commit(&self, txn: TxnId) -> Result<()> {
        let handle = self.handle(txn)?;
        let mut info = handle.lock();
        let latch = self.promotion.write();
        if self.txns.lock().remove(&txn).is_none() {
            return Err(Error::TransactionNotFound(txn));
        }
        let level = info.level;
        let snapshot = std::mem::replace(&mut info.snapshot, Snapshot::new(txn, level));
        let ddl = info.ddl;
        let mut retired = std::mem::take(&mut info.retired);
        drop(info);

        if let Err(e) = snapshot.validate(&self.cache) {
            self.abort(txn, snapshot)?;
            return Err(e);
        }
        retired.extend(snapshot.retired());

        if self.config.sync_on_commit {
            self.log.append_sync(txn, LogRecord::Commit)?;
        } else {
            self.log.append(txn, LogRecord::Commit)?;
        }
        let promoted = snapshot.promote(&self.cache)?;
        self.clock.stamp(snapshot.changed_blocks());
        if self.txns.lock().is_empty() {
            self.clock.forget();
        }
        if ddl {
            *self.committed.write() = None;
        }
        snapshot.finish_commit(&self.allocator)?;
        self.retired.lock().extend(retired);
        self.locks.release_all(txn);
        drop(latch);

        debug!(txn = %txn, blocks = promoted, "transaction committed");
        self.maybe_checkpoint()
    }

    /// Discard `txn`'s writes.
    pub fn rollback(&self, txn: TxnId) -> Result<()> {
        let handle = self.handle(txn)?;
        let mut info = handle.lock();
        let latch = self.promotion.read();
        if self.txns.lock().remove(&txn).is_none() {
            return Err(Error::TransactionNotFound(txn));
        }
        let level = info.level;
        let snapshot = std::mem::replace(&mut info.snapshot, Snapshot::new(txn, level));
        drop(info);

        self.abort(txn, snapshot)?;
        drop(latch);
        self.maybe_checkpoint()
    }

    fn abort(&self, txn: TxnId, snapshot: Snapshot) -> Result<()> {
        self.log.append(txn, LogRecord::Rollback)?;
        snapshot.rollback(&self.allocator)?;
        self.locks.release_all(txn);
        debug!(txn = %txn, "transaction rolled back");
        Ok(())
    }

    /// Number of transactions begun and not yet finished.
    pub fn active_transactions(&self) -> usize {
        self.txns.lock().len()
    }

    // ========================================================================
    // Schema
    // ========================================================================

    /// Create a table. Referenced tables must exist and have a single key
    /// column of the referencing column's type.
    pub fn create_table(&self, txn: TxnId, schema: TableSchema) -> Result<()> {
        schema.validate()?;
        let name = schema.name.clone();
        let mut wanted: BTreeSet<String> =
            [TABLE_LIST, COL_LIST, name.as_str()].map(String::from).into();
        wanted.extend(schema.columns.iter().filter_map(|c| c.references.clone()));

        self.with_write(txn, |_| wanted.clone(), |info, view| {
            if view.get(&name).is_some() {
                return Err(Error::TableExists(name.clone()));
            }
            check_foreign_keys(&schema, view)?;

            self.log.append(
                txn,
                LogRecord::CreateTable {
                    schema: schema.clone(),
                },
            )?;
            let mut store = info.snapshot.store(&self.cache, &self.allocator);
            let prop = self.write_new_table(&mut store, schema.clone())?;
            info.ddl = true;
            debug!(txn = %txn, table = %name, root = %prop.index_root, "table created");
            Ok(())
        })
    }

    /// Drop a table. It must not be referenced by another table.
    ///
    /// Its blocks are freed by the first checkpoint after commit.
    pub fn drop_table(&self, txn: TxnId, name: &str) -> Result<()> {
        check_writable(name)?;
        let wanted = |view: &CatalogView| {
            let mut set = view.related(name);
            set.insert(TABLE_LIST.to_string());
            set.insert(COL_LIST.to_string());
            set
        };

        self.with_write(txn, wanted, |info, view| {
            let prop = resolve(view, name)?;
            if let Some((other, _)) = view.referencing(name).find(|(p, _)| p.name != name) {
                return Err(Error::InvalidSchema(format!(
                    "table {name} is referenced by {}",
                    other.name
                )));
            }

            self.log.append(
                txn,
                LogRecord::DropTable {
                    table: name.to_string(),
                },
            )?;
            let mut store = info.snapshot.store(&self.cache, &self.allocator);
            let blocks = self.table(prop.clone()).reachable_blocks(&mut store)?;
            self.remove_catalog_rows(&mut store, &prop)?;
            info.retired.extend(blocks);
            info.ddl = true;
            debug!(txn = %txn, table = %name, "table dropped");
            Ok(())
        })
    }

    /// The committed property of `name`. System tables are included.
    pub fn table_property(&self, name: &str) -> Result<TableProperty> {
        let _latch = self.promotion.read();
        resolve(&*self.committed_view()?, name)
    }

    /// Names of the committed user tables, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let _latch = self.promotion.read();
        Ok(self.committed_view()?.names())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub fn insert(&self, txn: TxnId, table: &str, tuple: Tuple) -> Result<()> {
        check_writable(table)?;
        self.with_write(txn, |view| view.related(table), |info, view| {
            let target = self.table(resolve(view, table)?);
            target.property().check_tuple(&tuple)?;
            check_fits(&tuple)?;
            let mut store = info.snapshot.store(&self.cache, &self.allocator);

            let key = target.key_of(&tuple);
            if target.find(&mut store, &key)?.is_some() {
                return Err(Error::DuplicateKey {
                    table: table.to_string(),
                    key: key.to_string(),
                });
            }
            self.check_references(&mut store, view, target.property(), &tuple)?;

            self.log.append(
                txn,
                LogRecord::Insert {
                    table: table.to_string(),
                    tuple: tuple.clone(),
                },
            )?;
            target.insert(&mut store, tuple)
        })
    }

    /// Replace the row with `tuple`'s key.
    pub fn update(&self, txn: TxnId, table: &str, tuple: Tuple) -> Result<()> {
        check_writable(table)?;
        self.with_write(txn, |view| view.related(table), |info, view| {
            let target = self.table(resolve(view, table)?);
            target.property().check_tuple(&tuple)?;
            check_fits(&tuple)?;
            let mut store = info.snapshot.store(&self.cache, &self.allocator);

            let key = target.key_of(&tuple);
            if target.find(&mut store, &key)?.is_none() {
                return Err(Error::KeyNotFound {
                    table: table.to_string(),
                    key: key.to_string(),
                });
            }
            self.check_references(&mut store, view, target.property(), &tuple)?;

            self.log.append(
                txn,
                LogRecord::Update {
                    table: table.to_string(),
                    tuple: tuple.clone(),
                },
            )?;
            target.update(&mut store, tuple)
        })
    }

    /// Remove the row with `key`, returning it.
    pub fn remove(&self, txn: TxnId, table: &str, key: &Tuple) -> Result<Tuple> {
        check_writable(table)?;
        self.with_write(txn, |view| view.related(table), |info, view| {
            let target = self.table(resolve(view, table)?);
            let mut store = info.snapshot.store(&self.cache, &self.allocator);

            if target.find(&mut store, key)?.is_none() {
                return Err(Error::KeyNotFound {
                    table: table.to_string(),
                    key: key.to_string(),
                });
            }
            let removing = BTreeSet::from([key.clone()]);
            self.check_unreferenced(&mut store, view, target.property(), key, &removing)?;

            self.log.append(
                txn,
                LogRecord::Remove {
                    table: table.to_string(),
                    key: key.clone(),
                },
            )?;
            target.remove(&mut store, key)
        })
    }

    /// Remove every row for which `pred` holds. Returns how many.
    ///
    /// Either every matching row is removed or, if one of them is still
    /// referenced, none is.
    pub fn remove_where<P>(&self, txn: TxnId, table: &str, pred: P) -> Result<usize>
    where
        P: Fn(&Tuple) -> Result<bool>,
    {
        check_writable(table)?;
        self.with_write(txn, |view| view.related(table), |info, view| {
            let target = self.table(resolve(view, table)?);
            let mut store = info.snapshot.store(&self.cache, &self.allocator);

            let keys: BTreeSet<Tuple> = target
                .find_where(&mut store, pred)?
                .iter()
                .map(|row| target.key_of(row))
                .collect();
            for key in &keys {
                self.check_unreferenced(&mut store, view, target.property(), key, &keys)?;
            }

            for key in &keys {
                self.log.append(
                    txn,
                    LogRecord::Remove {
                        table: table.to_string(),
                        key: key.clone(),
                    },
                )?;
                target.remove(&mut store, key)?;
            }
            Ok(keys.len())
        })
    }

    /// Replace every row for which `pred` holds with `op(row)`. Returns
    /// how many rows changed.
    ///
    /// A row whose key changes is moved: its old key must not be
    /// referenced and its new key must be free.
    pub fn update_where<P, O>(&self, txn: TxnId, table: &str, pred: P, op: O) -> Result<usize>
    where
        P: Fn(&Tuple) -> Result<bool>,
        O: Fn(&Tuple) -> Result<Tuple>,
    {
        check_writable(table)?;
        self.with_write(txn, |view| view.related(table), |info, view| {
            let target = self.table(resolve(view, table)?);
            let prop = target.property();
            let mut store = info.snapshot.store(&self.cache, &self.allocator);

            let rows = target.find_where(&mut store, pred)?;
            let mut in_place = Vec::new();
            let mut moved_from = BTreeSet::new();
            let mut moved_to = Vec::new();
            for row in &rows {
                let new = op(row)?;
                prop.check_tuple(&new)?;
                check_fits(&new)?;
                self.check_references(&mut store, view, prop, &new)?;
                let old_key = prop.key_of(row);
                if prop.key_of(&new) == old_key {
                    in_place.push(new);
                } else {
                    moved_from.insert(old_key);
                    moved_to.push(new);
                }
            }

            for key in &moved_from {
                self.check_unreferenced(&mut store, view, prop, key, &moved_from)?;
            }
            let mut claimed = BTreeSet::new();
            for new in &moved_to {
                let key = prop.key_of(new);
                let taken = !claimed.insert(key.clone())
                    || (!moved_from.contains(&key) && target.find(&mut store, &key)?.is_some());
                if taken {
                    return Err(Error::DuplicateKey {
                        table: table.to_string(),
                        key: key.to_string(),
                    });
                }
            }

            for new in in_place {
                self.log.append(
                    txn,
                    LogRecord::Update {
                        table: table.to_string(),
                        tuple: new.clone(),
                    },
                )?;
                target.update(&mut store, new)?;
            }
            for key in &moved_from {
                self.log.append(
                    txn,
                    LogRecord::Remove {
                        table: table.to_string(),
                        key: key.clone(),
                    },
                )?;
                target.remove(&mut store, key)?;
            }
            for new in moved_to {
                self.log.append(
                    txn,
                    LogRecord::Insert {
                        table: table.to_string(),
                        tuple: new.clone(),
                    },
                )?;
                target.insert(&mut store, new)?;
            }
            Ok(rows.len())
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn find(&self, txn: TxnId, table: &str, key: &Tuple) -> Result<Option<Tuple>> {
        self.with_read(txn, table, |t, store| t.find(store, key))
    }

    /// Rows with keys below `key` (or equal, if `inclusive`), in key order.
    pub fn find_less(
        &self,
        txn: TxnId,
        table: &str,
        key: &Tuple,
        inclusive: bool,
    ) -> Result<Vec<Tuple>> {
        self.with_read(txn, table, |t, store| t.find_less(store, key, inclusive))
    }

    /// Rows with keys above `key` (or equal, if `inclusive`), in key order.
    pub fn find_greater(
        &self,
        txn: TxnId,
        table: &str,
        key: &Tuple,
        inclusive: bool,
    ) -> Result<Vec<Tuple>> {
        self.with_read(txn, table, |t, store| t.find_greater(store, key, inclusive))
    }

    pub fn find_range(
        &self,
        txn: TxnId,
        table: &str,
        lo: Bound<&Tuple>,
        hi: Bound<&Tuple>,
    ) -> Result<Vec<Tuple>> {
        self.with_read(txn, table, |t, store| t.find_range(store, lo, hi))
    }

    pub fn scan(&self, txn: TxnId, table: &str) -> Result<Vec<Tuple>> {
        self.with_read(txn, table, |t, store| t.scan(store))
    }

    pub fn find_where<P>(&self, txn: TxnId, table: &str, pred: P) -> Result<Vec<Tuple>>
    where
        P: Fn(&Tuple) -> Result<bool>,
    {
        self.with_read(txn, table, |t, store| t.find_where(store, pred))
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Restore the last checkpoint and replay committed transactions from
    /// the log. Needs a database with no active transactions.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let _latch = self.promotion.write();
        let active = self.txns.lock().len();
        if active > 0 {
            return Err(Error::ActiveTransactions(active));
        }
        self.recover_locked()
    }

    /// Write everything back, back up the data file and allocator, free
    /// blocks of dropped tables and truncate the log.
    ///
    /// # Errors
    /// `ActiveTransactions` if any transaction is still open.
    pub fn checkpoint(&self) -> Result<()> {
        let _latch = self.promotion.write();
        let active = self.txns.lock().len();
        if active > 0 {
            return Err(Error::ActiveTransactions(active));
        }
        self.checkpoint_locked()
    }

    /// Checkpoint with the promotion latch already held for writing.
    pub(super) fn checkpoint_locked(&self) -> Result<()> {
        self.cache.backup_to(self.dir.join(BACKUP_FILE))?;
        let retired = std::mem::take(&mut *self.retired.lock());
        for block in &retired {
            self.allocator.free_block(*block)?;
        }
        self.allocator.backup()?;
        self.log.truncate()?;
        self.clock.forget();
        info!(freed = retired.len(), "checkpoint complete");
        Ok(())
    }

    fn maybe_checkpoint(&self) -> Result<()> {
        if self.log.len() < self.config.checkpoint_log_bytes || !self.txns.lock().is_empty() {
            return Ok(());
        }
        match self.checkpoint() {
            Err(Error::ActiveTransactions(_)) => Ok(()),
            other => other,
        }
    }

    pub fn cache_stats(&self) -> StatsSnapshot {
        self.cache.stats().snapshot()
    }

    // ========================================================================
    // Internals shared with recovery
    // ========================================================================

    pub(super) fn direct(&self) -> DirectStore {
        DirectStore::new(self.cache.clone(), self.allocator.clone())
    }

    pub(super) fn table(&self, prop: TableProperty) -> Table {
        Table::new(prop, self.config.fill_limit, self.latches.clone())
    }

    /// Allocate roots for `schema`, write its empty tree and its catalog
    /// rows.
    pub(super) fn write_new_table(
        &self,
        store: &mut dyn PageStore,
        schema: TableSchema,
    ) -> Result<TableProperty> {
        let record_root = store.allocate()?;
        let index_root = store.allocate()?;
        let prop = TableProperty::new(schema, record_root, index_root);
        self.table(prop.clone()).create(store)?;

        self.table(system_tables::table_list())
            .upsert(store, system_tables::table_row(&prop))?;
        let col_list = self.table(system_tables::col_list());
        for row in system_tables::column_rows(&prop) {
            col_list.upsert(store, row)?;
        }
        Ok(prop)
    }

    pub(super) fn remove_catalog_rows(
        &self,
        store: &mut dyn PageStore,
        prop: &TableProperty,
    ) -> Result<()> {
        let name = Value::from(prop.name.as_str());
        self.table(system_tables::table_list())
            .remove(store, &Tuple::new(vec![name.clone()]))?;
        let col_list = self.table(system_tables::col_list());
        for i in 0..prop.columns.len() {
            col_list.remove(store, &Tuple::new(vec![name.clone(), Value::Int(i as i32)]))?;
        }
        Ok(())
    }

    /// Read one table's property straight from the catalog tables.
    pub(super) fn lookup_table(
        &self,
        store: &mut dyn PageStore,
        name: &str,
    ) -> Result<Option<TableProperty>> {
        let key = Tuple::new(vec![Value::from(name)]);
        let Some(row) = self.table(system_tables::table_list()).find(store, &key)? else {
            return Ok(None);
        };
        let columns: Vec<Tuple> = self
            .table(system_tables::col_list())
            .find_greater(store, &key, true)?
            .into_iter()
            .take_while(|col| col.get(0) == key.get(0))
            .collect();
        system_tables::property_from_rows(&row, &columns).map(Some)
    }

    /// Every user table in the catalog as `store` sees it.
    pub(super) fn load_view(&self, store: &mut dyn PageStore) -> Result<CatalogView> {
        let tables = self.table(system_tables::table_list()).scan(store)?;
        let mut columns: BTreeMap<String, Vec<Tuple>> = BTreeMap::new();
        for row in self.table(system_tables::col_list()).scan(store)? {
            let name = row
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::malformed(format!("catalog row {row} has no table name")))?
                .to_string();
            columns.entry(name).or_default().push(row);
        }

        let mut view = CatalogView::default();
        for row in &tables {
            let name = row.get(0).and_then(Value::as_str).unwrap_or_default();
            let cols = columns.remove(name).unwrap_or_default();
            view.insert(system_tables::property_from_rows(row, &cols)?);
        }
        Ok(view)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn handle(&self, txn: TxnId) -> Result<TxnHandle> {
        self.txns
            .lock()
            .get(&txn)
            .cloned()
            .ok_or(Error::TransactionNotFound(txn))
    }

    fn ensure_active(&self, txn: TxnId) -> Result<()> {
        if self.txns.lock().contains_key(&txn) {
            Ok(())
        } else {
            Err(Error::TransactionNotFound(txn))
        }
    }

    fn committed_view(&self) -> Result<Arc<CatalogView>> {
        if let Some(view) = self.committed.read().clone() {
            return Ok(view);
        }
        let view = Arc::new(self.load_view(&mut self.direct())?);
        *self.committed.write() = Some(view.clone());
        Ok(view)
    }

    /// The catalog as `info` sees it: its own snapshot once it has run
    /// DDL, the committed catalog otherwise.
    fn view(&self, info: &mut TransactionInfo) -> Result<Arc<CatalogView>> {
        if info.ddl {
            let mut store = info.snapshot.store(&self.cache, &self.allocator);
            return Ok(Arc::new(self.load_view(&mut store)?));
        }
        self.committed_view()
    }

    fn with_read<F, R>(&self, txn: TxnId, table: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Table, &mut dyn PageStore) -> Result<R>,
    {
        let handle = self.handle(txn)?;
        let mut info = handle.lock();
        self.ensure_active(txn)?;
        let _latch = self.promotion.read();

        let view = self.view(&mut info)?;
        let target = self.table(resolve(&view, table)?);
        let mut store = info.snapshot.store(&self.cache, &self.allocator);
        f(&target, &mut store as &mut dyn PageStore)
    }

    /// Run `op` holding the table locks `wanted` names.
    ///
    /// The set is computed under the latch, locked without it, then
    /// computed again: a DDL commit in between may have added tables.
    fn with_write<W, F, R>(&self, txn: TxnId, wanted: W, op: F) -> Result<R>
    where
        W: Fn(&CatalogView) -> BTreeSet<String>,
        F: FnOnce(&mut TransactionInfo, &CatalogView) -> Result<R>,
    {
        let handle = self.handle(txn)?;
        let mut info = handle.lock();
        self.ensure_active(txn)?;

        loop {
            let tables = {
                let _latch = self.promotion.read();
                wanted(&*self.view(&mut info)?)
            };
            for table in &tables {
                self.locks.lock(txn, table);
            }

            let _latch = self.promotion.read();
            let view = self.view(&mut info)?;
            if wanted(&*view)
                .iter()
                .all(|t| self.locks.holder(t) == Some(txn))
            {
                return op(&mut *info, &*view);
            }
        }
    }

    fn check_references(
        &self,
        store: &mut dyn PageStore,
        view: &CatalogView,
        prop: &TableProperty,
        tuple: &Tuple,
    ) -> Result<()> {
        for (i, col) in prop.columns.iter().enumerate() {
            let Some(target) = col.references.as_deref() else {
                continue;
            };
            let Some(value) = tuple.get(i).filter(|v| !v.is_null()) else {
                continue;
            };
            let key = Tuple::new(vec![value.clone()]);
            if target == prop.name && key == prop.key_of(tuple) {
                continue;
            }

            let referenced = self.table(resolve(view, target)?);
            if referenced.find(store, &key)?.is_none() {
                return Err(Error::MissingReference {
                    table: prop.name.clone(),
                    column: col.name.clone(),
                    referenced: target.to_string(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Fail if any row outside `removing` references `key` of `prop`.
    fn check_unreferenced(
        &self,
        store: &mut dyn PageStore,
        view: &CatalogView,
        prop: &TableProperty,
        key: &Tuple,
        removing: &BTreeSet<Tuple>,
    ) -> Result<()> {
        for (other, column) in view.referencing(&prop.name) {
            let rows = self.table(other.clone()).find_by_column(store, column, key)?;
            let in_use = rows
                .iter()
                .any(|row| other.name != prop.name || !removing.contains(&other.key_of(row)));
            if in_use {
                return Err(Error::ReferencedKeyInUse {
                    table: prop.name.clone(),
                    key: key.to_string(),
                    referencing: other.name.clone(),
                });
            }
        }
        Ok(())
    }
}

fn resolve(view: &CatalogView, name: &str) -> Result<TableProperty> {
    match name {
        TABLE_LIST => Ok(system_tables::table_list()),
        COL_LIST => Ok(system_tables::col_list()),
        _ => view
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_string())),
    }
}

fn check_writable(table: &str) -> Result<()> {
    if system_tables::is_system_table(table) {
        return Err(Error::InvalidSchema(format!(
            "{table} is maintained by the database"
        )));
    }
    Ok(())
}

/// Oversized tuples are refused before they reach the log.
fn check_fits(tuple: &Tuple) -> Result<()> {
    let size = tuple.encoded_len();
    if size > MAX_TUPLE_SIZE {
        return Err(Error::TupleTooLarge {
            size,
            max: MAX_TUPLE_SIZE,
        });
    }
    Ok(())
}

/// Each referenced table must exist and have one key column whose type
/// matches the referencing column.
fn check_foreign_keys(schema: &TableSchema, view: &CatalogView) -> Result<()> {
    for col in &schema.columns {
        let Some(target) = col.references.as_deref() else {
            continue;
        };
        let target_columns = if target == schema.name {
            schema.columns.clone()
        } else {
            resolve(view, target)?.columns
        };
        let keys: Vec<_> = target_columns.iter().filter(|c| c.is_key).collect();
        match keys.as_slice() {
            [key] if key.col_type == col.col_type => {}
            [_] => {
                return Err(Error::InvalidSchema(format!(
                    "{}.{} has type {} but the key of {target} does not",
                    schema.name, col.name, col.col_type
                )))
            }
            _ => {
                return Err(Error::InvalidSchema(format!(
                    "{}.{} references {target}, which has a composite key",
                    schema.name, col.name
                )))
            }
        }
    }
    Ok(())
}
