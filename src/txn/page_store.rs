//! The block access seam used by the index and record layers.
//!
//! [`BLinkTree`](crate::index::BLinkTree) and
//! [`RecordStore`](crate::record::RecordStore) never touch the cache or the
//! allocator directly; they go through a [`PageStore`]. Inside a
//! transaction that is a [`SnapshotStore`](super::SnapshotStore), which
//! redirects writes to private copies. Bootstrap, recovery and tests use
//! [`DirectStore`], which reads and writes shared pages in place.

use std::sync::Arc;

use crate::alloc::BlockAllocator;
use crate::buffer::PageCache;
use crate::common::{BlockNum, Result};
use crate::storage::page::Page;
use crate::tuple::Tuple;

/// Block-granular storage addressed by block number.
pub trait PageStore {
    /// A copy of `block` as this store sees it.
    fn read(&mut self, block: BlockNum) -> Result<Box<Page>>;

    fn write(&mut self, block: BlockNum, page: &Page) -> Result<()>;

    /// A new block for live structure.
    fn allocate(&mut self) -> Result<BlockNum>;

    /// Note that `key` stored in `block` was changed.
    fn note_modified(&mut self, _block: BlockNum, _key: &Tuple) {}

    /// `block` was unlinked from live structure. It may be reused once no
    /// transaction can still read it.
    ///
    /// The default leaves it allocated; recovery reclaims unreachable
    /// blocks.
    fn retire(&mut self, _block: BlockNum) {}
}

/// Reads and writes shared pages in place.
pub struct DirectStore {
    cache: Arc<PageCache>,
    allocator: Arc<BlockAllocator>,
}

impl DirectStore {
    pub fn new(cache: Arc<PageCache>, allocator: Arc<BlockAllocator>) -> Self {
        Self { cache, allocator }
    }
}

impl PageStore for DirectStore {
    fn read(&mut self, block: BlockNum) -> Result<Box<Page>> {
        self.cache.get(block)
    }

    fn write(&mut self, block: BlockNum, page: &Page) -> Result<()> {
        self.cache.put(block, page)
    }

    fn allocate(&mut self) -> Result<BlockNum> {
        self.allocator.new_block()
    }
}
