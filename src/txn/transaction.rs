//! Per-transaction state.

use std::fmt;

use super::Snapshot;
use crate::common::{BlockNum, TxnId};

/// How a transaction sees blocks other transactions commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Every read sees the latest committed block.
    #[default]
    Read,
    /// Reads see the committed state as of `begin`. The first read of a
    /// block pins its contents; a block committed by someone else after
    /// `begin` cannot be read at all (`WriteConflict`). Commit fails if
    /// another transaction changed a block this one wrote.
    RepeatableRead,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::Read => write!(f, "READ"),
            IsolationLevel::RepeatableRead => write!(f, "REPEATABLE_READ"),
        }
    }
}

/// An active transaction.
#[derive(Debug)]
pub struct TransactionInfo {
    pub id: TxnId,
    pub level: IsolationLevel,
    pub snapshot: Snapshot,
    /// Whether this transaction changed the catalog.
    pub ddl: bool,
    /// Blocks of tables this transaction dropped. They are freed at the
    /// first checkpoint after commit.
    pub retired: Vec<BlockNum>,
}

impl TransactionInfo {
    pub fn new(id: TxnId, level: IsolationLevel) -> Self {
        Self {
            id,
            level,
            snapshot: Snapshot::new(id, level),
            ddl: false,
            retired: Vec::new(),
        }
    }
}
