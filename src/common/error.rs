//! Error types for blinkdb.

use thiserror::Error;

use super::{BlockNum, TxnId};

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in blinkdb.
///
/// Variants fall into five groups: storage, type, integrity, concurrency
/// and usage. The `is_*` helpers classify an error without matching on
/// every variant.
#[derive(Debug, Error)]
pub enum Error {
    // ------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist on disk.
    #[error("{0} not found")]
    PageNotFound(BlockNum),

    /// Page cache has no free frames and cannot evict any pages.
    ///
    /// This happens when all frames are pinned.
    #[error("No free frames available in page cache")]
    NoFreeFrames,

    /// A page failed its checksum or could not be decoded.
    #[error("{block} is corrupted: {reason}")]
    Corrupted { block: BlockNum, reason: String },

    /// A log file contains an unreadable record.
    #[error("{file} is corrupted at offset {offset}: {reason}")]
    LogCorrupted {
        file: &'static str,
        offset: u64,
        reason: String,
    },

    /// Bytes that do not decode as a value, tuple or schema.
    #[error("malformed encoding: {0}")]
    Malformed(String),

    /// A tuple or key too large to share a block with its neighbours.
    #[error("tuple of {size} bytes exceeds the {max} byte limit")]
    TupleTooLarge { size: usize, max: usize },

    // ------------------------------------------------------------------
    // Type errors
    // ------------------------------------------------------------------
    /// Comparison or arithmetic between incompatible value kinds.
    #[error("type mismatch: {left} {op} {right}")]
    TypeMismatch {
        left: &'static str,
        op: &'static str,
        right: &'static str,
    },

    /// Fixed-width arithmetic overflowed.
    #[error("{op} overflow")]
    Overflow { op: &'static str },

    #[error("division by zero")]
    DivisionByZero,

    /// A null operand reached an operator that needs a value.
    #[error("null value in {op}")]
    NullValue { op: &'static str },

    /// A string or list longer than its column allows.
    #[error("value of length {len} exceeds maximum {max}")]
    ValueTooLong { len: usize, max: usize },

    /// Tuple width does not match the schema.
    #[error("expected {expected} values, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("column {column} of {table} cannot be null")]
    NotNullViolation { table: String, column: String },

    // ------------------------------------------------------------------
    // Integrity errors
    // ------------------------------------------------------------------
    #[error("duplicate key {key} in {table}")]
    DuplicateKey { table: String, key: String },

    #[error("key {key} not found in {table}")]
    KeyNotFound { table: String, key: String },

    /// Insert or update references a key that does not exist.
    #[error("{table}.{column} references missing key {key} in {referenced}")]
    MissingReference {
        table: String,
        column: String,
        referenced: String,
        key: String,
    },

    /// Delete of a key that another table still references.
    #[error("key {key} in {table} is still referenced by {referencing}")]
    ReferencedKeyInUse {
        table: String,
        key: String,
        referencing: String,
    },

    #[error("table {0} not found")]
    TableNotFound(String),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    // ------------------------------------------------------------------
    // Concurrency
    // ------------------------------------------------------------------
    /// Repeatable-read commit found a block changed by another transaction.
    ///
    /// The transaction has been rolled back; the caller should retry it.
    #[error("{txn} conflicts with a concurrent commit{}", .key.as_ref().map(|k| format!(" on key {k}")).unwrap_or_default())]
    WriteConflict { txn: TxnId, key: Option<String> },

    // ------------------------------------------------------------------
    // Usage
    // ------------------------------------------------------------------
    #[error("{0} is not active")]
    TransactionNotFound(TxnId),

    /// An operation that needs a quiescent database found live transactions.
    #[error("{0} transactions are still active")]
    ActiveTransactions(usize),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create a corruption error for a block.
    pub fn corrupted(block: BlockNum, reason: impl Into<String>) -> Self {
        Error::Corrupted {
            block,
            reason: reason.into(),
        }
    }

    /// Create a malformed-encoding error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Error::Malformed(reason.into())
    }

    /// Whether this is a type error (mismatch, overflow, null, ...).
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            Error::TypeMismatch { .. }
                | Error::Overflow { .. }
                | Error::DivisionByZero
                | Error::NullValue { .. }
                | Error::ValueTooLong { .. }
                | Error::ArityMismatch { .. }
                | Error::NotNullViolation { .. }
        )
    }

    /// Whether this is an integrity violation. Table state is unchanged.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Error::DuplicateKey { .. }
                | Error::KeyNotFound { .. }
                | Error::MissingReference { .. }
                | Error::ReferencedKeyInUse { .. }
                | Error::TableNotFound(_)
                | Error::TableExists(_)
                | Error::InvalidSchema(_)
        )
    }

    /// Whether the caller should retry the whole transaction.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::WriteConflict { .. })
    }
}
