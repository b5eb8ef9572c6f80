//! Transaction-scoped exclusive table locks.

use std::collections::HashMap;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::common::TxnId;

/// Exclusive table locks held until commit or rollback.
///
/// A transaction that writes a table (or checks another table for
/// references) locks it first; a second transaction asking for the same
/// table waits until the holder finishes. Locking a table already held by
/// the same transaction returns immediately.
///
/// There is no deadlock detection: two transactions that lock the same
/// pair of tables in opposite orders wait forever.
#[derive(Default)]
pub struct LockTable {
    owners: Mutex<HashMap<String, TxnId>>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `txn` holds the lock on `table`.
    pub fn lock(&self, txn: TxnId, table: &str) {
        let mut owners = self.owners.lock();
        loop {
            match owners.get(table) {
                Some(&owner) if owner == txn => return,
                Some(&owner) => {
                    trace!(%txn, %owner, table, "waiting for table lock");
                    self.released.wait(&mut owners);
                }
                None => {
                    owners.insert(table.to_string(), txn);
                    return;
                }
            }
        }
    }

    /// Release every lock held by `txn`.
    pub fn release_all(&self, txn: TxnId) {
        let mut owners = self.owners.lock();
        let before = owners.len();
        owners.retain(|_, owner| *owner != txn);
        if owners.len() != before {
            self.released.notify_all();
        }
    }

    pub fn holder(&self, table: &str) -> Option<TxnId> {
        self.owners.lock().get(table).copied()
    }
}
