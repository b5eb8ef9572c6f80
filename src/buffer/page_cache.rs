//! Page cache - the block caching layer.
//!
//! The [`PageCache`] provides:
//! - Block caching between disk and memory, with LRU eviction
//! - Pin-based reference counting
//! - Dirty page write-back, vetted by a [`WriteBackHook`]
//! - Copy-out access (`get`/`put`) and zero-copy guards

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use super::hook::{WriteBack, WriteBackHook};
use super::replacer::LruReplacer;
use super::stats::CacheEvent;
use super::{CacheStats, Frame, FrameId, PageReadGuard, PageWriteGuard};
use crate::common::{BlockNum, Error, Result};
use crate::storage::page::Page;
use crate::storage::DiskManager;

/// Bookkeeping guarded by the cache's state lock.
struct CacheState {
    /// Maps resident blocks to their frames.
    page_table: HashMap<BlockNum, FrameId>,
    /// Frames holding no block (LIFO for locality).
    free_list: Vec<FrameId>,
    replacer: LruReplacer,
}

/// A bounded cache of blocks for one data file.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                         PageCache                           │
/// │  ┌──────────────────────────────┐  ┌──────────────────────┐ │
/// │  │ state: Mutex<CacheState>     │  │ frames: Vec<Frame>   │ │
/// │  │  page_table  BlockNum → Fid  │─▶│ [F0] [F1] [F2] ...   │ │
/// │  │  free_list   Vec<FrameId>    │  └──────────────────────┘ │
/// │  │  replacer    LruReplacer     │  ┌──────────────────────┐ │
/// │  └──────────────────────────────┘  │ hook ─▶ allocator    │ │
/// │  ┌──────────────────────────────┐  └──────────────────────┘ │
/// │  │ disk: Mutex<DiskManager>     │                           │
/// │  └──────────────────────────────┘                           │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `state`: one `Mutex` over the page table, free list and replacer;
///   pin counts only change while it is held
/// - `frames`: fixed size, each frame has its own page `RwLock`
/// - `disk`: `Mutex`, single-threaded I/O
/// - `stats`: atomic counters
///
/// Lock order is state, then frame, then the hook (allocator), then disk.
/// The state lock is never requested while holding a frame lock, which is
/// why guards release their frame lock before unpinning.
///
/// # Usage
/// ```ignore
/// let cache = PageCache::new(64, DiskManager::create("data.db")?);
///
/// let mut page = Page::with_type(PageType::Record);
/// page.body_mut()[0] = 0xAB;
/// cache.put(BlockNum::new(4), &page)?;
///
/// let copy = cache.get(BlockNum::new(4))?;
/// assert_eq!(copy.body()[0], 0xAB);
/// ```
pub struct PageCache {
    frames: Vec<Frame>,
    state: Mutex<CacheState>,
    disk: Mutex<DiskManager>,
    hook: Option<Arc<dyn WriteBackHook>>,
    stats: CacheStats,
    capacity: usize,
}

impl PageCache {
    /// Create a cache of `capacity` frames over `disk`.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, disk: DiskManager) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        Self {
            frames: (0..capacity).map(|_| Frame::new()).collect(),
            state: Mutex::new(CacheState {
                page_table: HashMap::with_capacity(capacity),
                free_list: (0..capacity).rev().map(FrameId::new).collect(),
                replacer: LruReplacer::new(),
            }),
            disk: Mutex::new(disk),
            hook: None,
            stats: CacheStats::new(),
            capacity,
        }
    }

    /// Consult `hook` before every write-back.
    pub fn with_hook(mut self, hook: Arc<dyn WriteBackHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    // ========================================================================
    // Public API: Copy-out access
    // ========================================================================

    /// Return a copy of `block`, reading it from disk on a miss.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the block is not cached and lies past the
    ///   end of the file
    /// - `Error::NoFreeFrames` if every frame is pinned
    /// - I/O errors from reading, or from writing back a dirty victim
    pub fn get(&self, block: BlockNum) -> Result<Box<Page>> {
        let frame_id = self.pin_resident(block)?;
        let copy = self.frames[frame_id.0].page().boxed_copy();
        self.unpin(frame_id);
        Ok(copy)
    }

    /// Install `page` as the contents of `block` and mark it dirty.
    ///
    /// Never reads the disk; the old contents of `block` are irrelevant.
    pub fn put(&self, block: BlockNum, page: &Page) -> Result<()> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&block) {
            self.stats.record(CacheEvent::Hit);
            self.pin_locked(&mut state, frame_id);
            drop(state);

            let frame = &self.frames[frame_id.0];
            {
                let mut cached = frame.page_mut();
                cached.copy_from(page);
                frame.mark_dirty();
            }
            self.unpin(frame_id);
            return Ok(());
        }

        self.stats.record(CacheEvent::Miss);
        let frame_id = self.take_frame(&mut state)?;
        let frame = &self.frames[frame_id.0];
        frame.page_mut().copy_from(page);
        frame.mark_dirty();
        Self::install(&mut state, frame, frame_id, block);
        Ok(())
    }

    // ========================================================================
    // Public API: Zero-copy guards
    // ========================================================================

    /// Pin `block` and lock it for shared reading.
    pub fn fetch_page_read(&self, block: BlockNum) -> Result<PageReadGuard<'_>> {
        let frame_id = self.pin_resident(block)?;
        let lock = self.frames[frame_id.0].page();
        Ok(PageReadGuard::new(self, frame_id, block, lock))
    }

    /// Pin `block` and lock it exclusively. The page is marked dirty.
    pub fn fetch_page_write(&self, block: BlockNum) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.pin_resident(block)?;
        let frame = &self.frames[frame_id.0];
        let lock = frame.page_mut();
        frame.mark_dirty();
        Ok(PageWriteGuard::new(self, frame_id, block, lock))
    }

    // ========================================================================
    // Public API: Write-back
    // ========================================================================

    /// Write back every dirty page, then sync the data file.
    pub fn sync(&self) -> Result<()> {
        let resident: Vec<(BlockNum, FrameId)> = {
            let state = self.state.lock();
            state.page_table.iter().map(|(&b, &f)| (b, f)).collect()
        };

        for (block, frame_id) in resident {
            self.flush_frame(frame_id, block)?;
        }

        self.disk.lock().sync()
    }

    /// Write back `block` if it is cached and dirty.
    pub fn sync_page(&self, block: BlockNum) -> Result<()> {
        let frame_id = match self.state.lock().page_table.get(&block) {
            Some(&frame_id) => frame_id,
            None => return Ok(()),
        };
        self.flush_frame(frame_id, block)
    }

    /// Drop every cached page without writing anything back.
    ///
    /// Used when the data file is rewound underneath the cache. No page
    /// may be pinned.
    pub fn discard_all(&self) {
        let mut state = self.state.lock();
        let resident: Vec<FrameId> = state.page_table.drain().map(|(_, f)| f).collect();

        for frame_id in resident {
            let frame = &self.frames[frame_id.0];
            debug_assert!(!frame.is_pinned(), "discarding pinned {}", frame_id);
            frame.clear();
            state.replacer.remove(frame_id);
            state.free_list.push(frame_id);
        }
    }

    /// Sync, then copy the data file to `dest`.
    pub fn backup_to<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        self.sync()?;
        self.disk.lock().backup_to(dest)
    }

    /// Discard the cache and replace the data file with the backup at `src`.
    pub fn restore_from<P: AsRef<Path>>(&self, src: P) -> Result<()> {
        self.discard_all();
        self.disk.lock().restore_from(src)
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of resident blocks.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Pin count of `block`, or `None` if it is not cached.
    pub fn pin_count(&self, block: BlockNum) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&block)
            .map(|f| self.frames[f.0].pin_count())
    }

    /// Number of blocks in the underlying data file.
    pub fn block_count(&self) -> u32 {
        self.disk.lock().block_count()
    }

    // ========================================================================
    // Internal: pinning
    // ========================================================================

    /// Unpin a frame. Called by `get` and by guards on drop.
    pub(crate) fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if self.frames[frame_id.0].unpin() == 0 {
            state.replacer.set_evictable(frame_id, true);
        }
    }

    fn pin_locked(&self, state: &mut CacheState, frame_id: FrameId) {
        self.frames[frame_id.0].pin();
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);
    }

    /// Make `block` resident and pinned, returning its frame.
    fn pin_resident(&self, block: BlockNum) -> Result<FrameId> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&block) {
            self.stats.record(CacheEvent::Hit);
            self.pin_locked(&mut state, frame_id);
            return Ok(frame_id);
        }

        self.stats.record(CacheEvent::Miss);
        let frame_id = self.take_frame(&mut state)?;
        let frame = &self.frames[frame_id.0];

        let loaded = {
            let mut page = frame.page_mut();
            self.disk.lock().read_page(block, &mut **page)
        };
        if let Err(e) = loaded {
            state.free_list.push(frame_id);
            return Err(e);
        }
        self.stats.record(CacheEvent::Read);

        Self::install(&mut state, frame, frame_id, block);
        self.pin_locked(&mut state, frame_id);
        Ok(frame_id)
    }

    /// Map a filled, unpinned frame to `block`.
    fn install(state: &mut CacheState, frame: &Frame, frame_id: FrameId, block: BlockNum) {
        frame.set_block(Some(block));
        state.page_table.insert(block, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, true);
    }

    // ========================================================================
    // Internal: frame allocation and eviction
    // ========================================================================

    /// Get an empty frame, evicting the LRU victim if needed.
    fn take_frame(&self, state: &mut MutexGuard<'_, CacheState>) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = state.replacer.evict().ok_or(Error::NoFreeFrames)?;
        let frame = &self.frames[frame_id.0];

        if let Some(victim) = frame.block() {
            if frame.is_dirty() {
                let written = {
                    let page = frame.page();
                    self.write_back(victim, &page)
                };
                if let Err(e) = written {
                    // Keep the victim resident; its data has not reached disk.
                    state.replacer.record_access(frame_id);
                    state.replacer.set_evictable(frame_id, true);
                    return Err(e);
                }
            }
            state.page_table.remove(&victim);
            trace!(block = %victim, frame = %frame_id, "evicted");
        }

        frame.clear();
        self.stats.record(CacheEvent::Eviction);
        Ok(frame_id)
    }

    /// Write a frame back if it still holds `block` and is dirty.
    fn flush_frame(&self, frame_id: FrameId, block: BlockNum) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        let page = frame.page();

        if frame.block() != Some(block) || !frame.is_dirty() {
            return Ok(());
        }
        self.write_back(block, &page)?;
        frame.clear_dirty();
        Ok(())
    }

    fn write_back(&self, block: BlockNum, page: &Page) -> Result<()> {
        let verdict = match &self.hook {
            Some(hook) => hook.before_write_back(block)?,
            None => WriteBack::Write,
        };

        match verdict {
            WriteBack::Write => {
                self.disk.lock().write_page(block, page)?;
                self.stats.record(CacheEvent::Write);
                trace!(%block, "page written back");
            }
            WriteBack::Skip => {
                self.stats.record(CacheEvent::SkippedWrite);
                trace!(%block, "write-back skipped, block is free");
            }
        }
        Ok(())
    }
}
