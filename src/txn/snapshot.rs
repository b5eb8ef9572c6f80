//! Per-transaction block redirection.
//!
//! A [`Snapshot`] maps original block numbers to private temp copies. All
//! writes of a transaction land in those copies (or in blocks the
//! transaction allocated itself), so nothing it does is visible to others
//! until [`Snapshot::promote`] copies the temp blocks over the originals.
//!
//! A repeatable-read snapshot also carries a horizon: the commit sequence
//! current when it began. Copying a block that a later commit stamped
//! fails with `WriteConflict`, so every block it reads reflects the same
//! committed state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{CommitClock, IsolationLevel, PageStore};
use crate::alloc::BlockAllocator;
use crate::buffer::PageCache;
use crate::common::{BlockNum, Error, Result, TxnId};
use crate::storage::page::Page;
use crate::tuple::Tuple;

/// A redirected block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Private copy holding this transaction's view of the block.
    pub temp: BlockNum,
    /// Version of the original when the copy was taken.
    pub base_version: u64,
    /// Whether this transaction wrote the copy.
    pub dirty: bool,
    /// Keys whose tuples changed in this block.
    pub modified_keys: BTreeSet<Tuple>,
}

/// Redirection table of one transaction.
#[derive(Debug)]
pub struct Snapshot {
    txn: TxnId,
    level: IsolationLevel,
    entries: BTreeMap<BlockNum, SnapshotEntry>,
    /// Blocks allocated by this transaction. Written in place; they are
    /// unreachable to others until an original pointing at them is
    /// promoted.
    fresh: BTreeSet<BlockNum>,
    /// Blocks this transaction unlinked; freed at a checkpoint after it
    /// commits.
    retired: BTreeSet<BlockNum>,
    horizon: Option<(Arc<CommitClock>, u64)>,
}

impl Snapshot {
    pub fn new(txn: TxnId, level: IsolationLevel) -> Self {
        Self {
            txn,
            level,
            entries: BTreeMap::new(),
            fresh: BTreeSet::new(),
            retired: BTreeSet::new(),
            horizon: None,
        }
    }

    /// Refuse to copy blocks committed after this point of `clock`.
    pub fn with_horizon(mut self, clock: Arc<CommitClock>) -> Self {
        let seq = clock.now();
        self.horizon = Some((clock, seq));
        self
    }

    /// Commit sequence this snapshot started from, if it has a horizon.
    pub fn horizon(&self) -> Option<u64> {
        self.horizon.as_ref().map(|(_, seq)| *seq)
    }

    pub fn txn(&self) -> TxnId {
        self.txn
    }

    pub fn level(&self) -> IsolationLevel {
        self.level
    }

    pub fn entry(&self, block: BlockNum) -> Option<&SnapshotEntry> {
        self.entries.get(&block)
    }

    pub fn is_fresh(&self, block: BlockNum) -> bool {
        self.fresh.contains(&block)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.fresh.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.entries.values().filter(|e| e.dirty).count()
    }

    /// Originals this snapshot will overwrite plus the blocks it allocated.
    pub fn changed_blocks(&self) -> impl Iterator<Item = BlockNum> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(&block, _)| block)
            .chain(self.fresh.iter().copied())
    }

    pub fn retired(&self) -> impl Iterator<Item = BlockNum> + '_ {
        self.retired.iter().copied()
    }

    /// A [`PageStore`] view of the database through this snapshot.
    pub fn store<'a>(
        &'a mut self,
        cache: &'a PageCache,
        allocator: &'a BlockAllocator,
    ) -> SnapshotStore<'a> {
        SnapshotStore {
            snapshot: self,
            cache,
            allocator,
        }
    }

    /// Check that no block this transaction wrote was changed by another
    /// commit since it was copied. Only repeatable-read transactions are
    /// checked; read-level writers are serialized by table locks.
    ///
    /// Must run under the promotion latch, together with [`promote`].
    ///
    /// [`promote`]: Snapshot::promote
    pub fn validate(&self, cache: &PageCache) -> Result<()> {
        if self.level != IsolationLevel::RepeatableRead {
            return Ok(());
        }
        for (&original, entry) in self.entries.iter().filter(|(_, e)| e.dirty) {
            let current = cache.get(original)?.version();
            if current != entry.base_version {
                let key = entry.modified_keys.iter().next().map(Tuple::to_string);
                warn!(
                    txn = %self.txn,
                    block = %original,
                    base = entry.base_version,
                    current,
                    "write conflict"
                );
                return Err(Error::WriteConflict { txn: self.txn, key });
            }
        }
        Ok(())
    }

    /// Copy every dirty temp block over its original, bumping the
    /// original's version. Returns how many blocks were promoted.
    pub fn promote(&self, cache: &PageCache) -> Result<usize> {
        let mut promoted = 0;
        for (&original, entry) in self.entries.iter().filter(|(_, e)| e.dirty) {
            let version = cache.get(original)?.version();
            let mut page = cache.get(entry.temp)?;
            page.set_version(version + 1);
            cache.put(original, &page)?;
            promoted += 1;
        }
        debug!(txn = %self.txn, promoted, fresh = self.fresh.len(), "snapshot promoted");
        Ok(promoted)
    }

    /// Release bookkeeping after a successful promotion: temp copies go
    /// back to the free set and fresh blocks become live.
    pub fn finish_commit(self, allocator: &BlockAllocator) -> Result<()> {
        for entry in self.entries.values() {
            allocator.free_temp_block(entry.temp)?;
        }
        for &block in &self.fresh {
            allocator.sync_block(block)?;
        }
        Ok(())
    }

    /// Discard everything this transaction wrote or allocated.
    pub fn rollback(self, allocator: &BlockAllocator) -> Result<()> {
        for entry in self.entries.values() {
            allocator.free_temp_block(entry.temp)?;
        }
        for &block in &self.fresh {
            allocator.free_temp_block(block)?;
        }
        debug!(txn = %self.txn, "snapshot rolled back");
        Ok(())
    }
}

/// Reads and writes through a [`Snapshot`].
pub struct SnapshotStore<'a> {
    snapshot: &'a mut Snapshot,
    cache: &'a PageCache,
    allocator: &'a BlockAllocator,
}

impl SnapshotStore<'_> {
    /// Create the temp copy of `original`, recording the version it was
    /// taken from.
    fn materialize(&mut self, original: BlockNum, page: &Page) -> Result<BlockNum> {
        if let Some((clock, seq)) = &self.snapshot.horizon {
            if clock.changed_since(original, *seq) {
                warn!(
                    txn = %self.snapshot.txn,
                    block = %original,
                    horizon = seq,
                    "block committed after snapshot start"
                );
                return Err(Error::WriteConflict {
                    txn: self.snapshot.txn,
                    key: None,
                });
            }
        }
        let temp = self.allocator.new_temp_block()?;
        self.cache.put(temp, page)?;
        self.snapshot.entries.insert(
            original,
            SnapshotEntry {
                temp,
                base_version: page.version(),
                dirty: false,
                modified_keys: BTreeSet::new(),
            },
        );
        Ok(temp)
    }
}

impl PageStore for SnapshotStore<'_> {
    fn read(&mut self, block: BlockNum) -> Result<Box<Page>> {
        if let Some(entry) = self.snapshot.entries.get(&block) {
            return self.cache.get(entry.temp);
        }
        let page = self.cache.get(block)?;
        if self.snapshot.fresh.contains(&block) || self.snapshot.level == IsolationLevel::Read {
            return Ok(page);
        }
        self.materialize(block, &page)?;
        Ok(page)
    }

    fn write(&mut self, block: BlockNum, page: &Page) -> Result<()> {
        if self.snapshot.fresh.contains(&block) {
            return self.cache.put(block, page);
        }
        let existing = self.snapshot.entries.get(&block).map(|e| e.temp);
        let temp = match existing {
            Some(temp) => temp,
            None => {
                let shared = self.cache.get(block)?;
                self.materialize(block, &shared)?
            }
        };
        self.cache.put(temp, page)?;
        if let Some(entry) = self.snapshot.entries.get_mut(&block) {
            entry.dirty = true;
        }
        Ok(())
    }

    fn allocate(&mut self) -> Result<BlockNum> {
        let block = self.allocator.new_temp_block()?;
        self.snapshot.fresh.insert(block);
        Ok(block)
    }

    fn note_modified(&mut self, block: BlockNum, key: &Tuple) {
        if let Some(entry) = self.snapshot.entries.get_mut(&block) {
            entry.modified_keys.insert(key.clone());
        }
    }

    fn retire(&mut self, block: BlockNum) {
        self.snapshot.retired.insert(block);
    }
}
