//! Frame - a slot in the page cache.
//!
//! A [`Frame`] holds a [`Page`] plus the metadata the cache needs:
//! - Which block is loaded (if any)
//! - Pin count for reference counting
//! - Dirty flag for write-back tracking

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::BlockNum;
use crate::storage::page::Page;

/// Index of a frame in the cache's frame table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub usize);

impl FrameId {
    #[inline]
    pub fn new(index: usize) -> Self {
        FrameId(index)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// A frame in the page cache.
///
/// # Thread Safety
/// - `page`: `RwLock`, held while reading or writing page bytes
/// - `block`: `Mutex`, changed only under the cache state lock
/// - `pin_count` / `is_dirty`: atomics
///
/// The cache changes `pin_count` only while holding its state lock, so a
/// frame seen unpinned under that lock stays unpinned until it is released.
pub struct Frame {
    page: RwLock<Box<Page>>,
    block: Mutex<Option<BlockNum>>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl Frame {
    /// Create a new empty frame.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::boxed()),
            block: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Page access (RwLock)
    // ========================================================================

    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Box<Page>> {
        self.page.read()
    }

    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Box<Page>> {
        self.page.write()
    }

    // ========================================================================
    // Block mapping
    // ========================================================================

    /// The block currently loaded, if any.
    #[inline]
    pub fn block(&self) -> Option<BlockNum> {
        *self.block.lock()
    }

    #[inline]
    pub fn set_block(&self, block: Option<BlockNum>) {
        *self.block.lock() = block;
    }

    // ========================================================================
    // Pin count operations (Atomic)
    // ========================================================================

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the pin count. Returns the new pin count.
    ///
    /// # Panics
    /// Panics if pin count is already 0.
    #[inline]
    pub fn unpin(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        assert!(old > 0, "pin count underflow");
        old - 1
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    // ========================================================================
    // Dirty flag operations (Atomic)
    // ========================================================================

    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    // ========================================================================
    // Frame state queries
    // ========================================================================

    /// Check if the frame is empty (no block loaded).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.block().is_none()
    }

    /// Check if the frame can be evicted.
    #[inline]
    pub fn is_evictable(&self) -> bool {
        self.block().is_some() && !self.is_pinned()
    }

    /// Return the frame to its empty state without touching the page bytes.
    pub fn clear(&self) {
        self.set_block(None);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
