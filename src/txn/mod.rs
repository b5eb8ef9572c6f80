//! Transactions: snapshots, the transaction log and table locks.
//!
//! - [`PageStore`] - Block access seam used by the index and record layers
//! - [`Snapshot`] / [`SnapshotStore`] - Per-transaction block redirection
//! - [`TransactionLog`] - Write-ahead log for redo/undo recovery
//! - [`LockTable`] - Exclusive table locks held until commit or rollback
//! - [`CommitClock`] - Commit sequence bounding repeatable-read snapshots

mod commit_clock;
mod lock_table;
mod log;
mod log_entry;
pub mod page_store;
mod snapshot;
mod transaction;

pub use commit_clock::CommitClock;
pub use lock_table::LockTable;
pub use log::{TransactionLog, LOG_FILE};
pub use log_entry::{LogEntry, LogRecord};
pub use page_store::{DirectStore, PageStore};
pub use snapshot::{Snapshot, SnapshotEntry, SnapshotStore};
pub use transaction::{IsolationLevel, TransactionInfo};
