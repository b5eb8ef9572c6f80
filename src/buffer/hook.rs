//! Write-back hook between the page cache and the block allocator.

use crate::common::{BlockNum, Result};

/// What the cache should do with a dirty page it is about to write back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBack {
    /// Write the page to disk.
    Write,
    /// Drop the page; its block no longer holds live data.
    Skip,
}

/// Consulted by the page cache before every write-back (eviction or sync).
///
/// The block allocator implements this to make its own log durable before
/// a page that depends on an allocation reaches disk, and to skip writing
/// blocks that have already been freed.
pub trait WriteBackHook: Send + Sync {
    fn before_write_back(&self, block: BlockNum) -> Result<WriteBack>;
}
