//! blinkdb - An embedded storage engine with a B-link tree index and
//! snapshot transactions.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            blinkdb                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Database (db/)                             │   │
//! │  │   catalog view · integrity checks · commit · recovery    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │        Transactions (txn/)                               │   │
//! │  │   Snapshot + SnapshotStore · TransactionLog · LockTable  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │   Tables (table/, catalog/) over the PageStore seam      │   │
//! │  │      BLinkTree (index/)  →  RecordStore (record/)        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │   PageCache (buffer/)  ·  BlockAllocator (alloc/)        │   │
//! │  │      LRU frames, write-back hook, free/temp sets         │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │          DiskManager + Page + PageHeader                 │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockNum, TxnId, Error, config, codec)
//! - [`storage`] - Disk I/O and page formats
//! - [`alloc`] - Block allocation with its own log
//! - [`buffer`] - The page cache
//! - [`tuple`] - Values, column types and tuples
//! - [`record`] - Sorted record blocks
//! - [`index`] - The B-link tree
//! - [`txn`] - Snapshots, the transaction log and table locks
//! - [`catalog`] - Schemas and the system tables
//! - [`table`] - A table over its tree
//! - [`db`] - The database handle
//!
//! # Quick Start
//! ```no_run
//! use blinkdb::catalog::{ColumnProperty, TableSchema};
//! use blinkdb::tuple::ColumnType;
//! use blinkdb::{tuple, Database, DbConfig, IsolationLevel};
//!
//! let db = Database::create("my_database", DbConfig::default()).unwrap();
//!
//! let txn = db.begin(IsolationLevel::RepeatableRead).unwrap();
//! db.create_table(
//!     txn,
//!     TableSchema::new(
//!         "users",
//!         vec![
//!             ColumnProperty::new("id", ColumnType::Int).key(),
//!             ColumnProperty::new("name", ColumnType::varchar(32)).not_null(),
//!         ],
//!     ),
//! )
//! .unwrap();
//! db.insert(txn, "users", tuple![1, "ann"]).unwrap();
//! db.commit(txn).unwrap();
//! ```

pub mod alloc;
pub mod buffer;
pub mod catalog;
pub mod common;
pub mod db;
pub mod index;
pub mod record;
pub mod storage;
pub mod table;
pub mod tuple;
pub mod txn;

// Re-export commonly used items at crate root for convenience
pub use common::config::{BLOCK_SIZE, PAGE_SIZE};
pub use common::{BlockNum, DbConfig, Error, Result, TxnId};

pub use buffer::{CacheStats, StatsSnapshot};
pub use catalog::{ColumnProperty, TableSchema};
pub use db::{Database, RecoveryReport};
pub use tuple::{ColumnType, Tuple, Value};
pub use txn::IsolationLevel;
