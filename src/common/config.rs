//! Configuration constants and tunables for blinkdb.

use super::{Error, Result};
use crate::storage::page::PageHeader;

/// Size of a page in bytes (4KB).
///
/// This value is chosen to match:
/// - OS page size on most systems (4096 bytes)
/// - Common database page sizes
///
/// # Alignment
/// Pages are aligned to 4096 bytes for efficient Direct I/O (O_DIRECT).
pub const PAGE_SIZE: usize = 4096;

/// A block is one page of the data file.
pub const BLOCK_SIZE: usize = PAGE_SIZE;

/// Bytes of a block available after the page header.
pub const BLOCK_BODY_SIZE: usize = BLOCK_SIZE - PageHeader::SIZE;

/// Largest encoded tuple (or key) accepted by a table.
///
/// A quarter of the body, so a block that overflowed by one tuple always
/// splits into two halves that fit.
pub const MAX_TUPLE_SIZE: usize = BLOCK_BODY_SIZE / 4;

/// Smallest fill limit a configuration may ask for.
pub const MIN_FILL_LIMIT: usize = 48;

/// Blocks reserved for the system tables' record and index roots.
pub const RESERVED_BLOCKS: u32 = 4;

/// Maximum number of blocks with a u32 BlockNum.
pub const MAX_BLOCKS: u64 = (u32::MAX as u64) + 1;

/// Maximum theoretical database size in bytes.
pub const MAX_DB_SIZE_BYTES: u64 = MAX_BLOCKS * BLOCK_SIZE as u64;

/// Tunables for one open database.
///
/// # Example
/// ```
/// use blinkdb::DbConfig;
///
/// let config = DbConfig::new()
///     .with_cache_capacity(64)
///     .with_fill_limit(128);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Number of frames in the page cache.
    pub cache_capacity: usize,

    /// Encoded bytes a node or record block may hold before it splits.
    pub fill_limit: usize,

    /// Allocator log operations between allocator backups.
    pub alloc_backup_interval: usize,

    /// Transaction log size that triggers a checkpoint once no
    /// transaction is active.
    pub checkpoint_log_bytes: u64,

    /// Whether commit waits for the log to reach stable storage.
    pub sync_on_commit: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 256,
            fill_limit: BLOCK_BODY_SIZE,
            alloc_backup_interval: 1024,
            checkpoint_log_bytes: 4 * 1024 * 1024,
            sync_on_commit: true,
        }
    }
}

impl DbConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page cache capacity in frames.
    pub fn with_cache_capacity(mut self, frames: usize) -> Self {
        self.cache_capacity = frames;
        self
    }

    /// Set the split threshold for nodes and record blocks.
    pub fn with_fill_limit(mut self, bytes: usize) -> Self {
        self.fill_limit = bytes;
        self
    }

    /// Set how many allocator operations happen between backups.
    pub fn with_alloc_backup_interval(mut self, ops: usize) -> Self {
        self.alloc_backup_interval = ops;
        self
    }

    /// Set the log size that triggers an automatic checkpoint.
    pub fn with_checkpoint_log_bytes(mut self, bytes: u64) -> Self {
        self.checkpoint_log_bytes = bytes;
        self
    }

    /// Set whether commit syncs the transaction log.
    pub fn with_sync_on_commit(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    /// Check that every field is in range.
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity < 8 {
            return Err(Error::Config("cache_capacity must be at least 8".into()));
        }
        if self.fill_limit < MIN_FILL_LIMIT || self.fill_limit > BLOCK_BODY_SIZE {
            return Err(Error::Config(format!(
                "fill_limit must be between {} and {}",
                MIN_FILL_LIMIT, BLOCK_BODY_SIZE
            )));
        }
        if self.alloc_backup_interval == 0 {
            return Err(Error::Config("alloc_backup_interval must be > 0".into()));
        }
        Ok(())
    }
}
