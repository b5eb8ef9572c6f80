//! Transaction and log identifiers.

use std::fmt;

/// Identifies a transaction.
///
/// Ids are handed out by the database in strictly increasing order and
/// keep increasing across restarts (the next id is persisted in the
/// transaction log header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(pub u64);

impl TxnId {
    /// Id used for work the engine performs on its own behalf
    /// (bootstrap and recovery redo).
    pub const SYSTEM: TxnId = TxnId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        TxnId(id)
    }

    /// The id following this one.
    #[inline]
    pub fn next(&self) -> Self {
        TxnId(self.0 + 1)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn({})", self.0)
    }
}

/// Position of an entry in the transaction log.
pub type LogId = u64;
