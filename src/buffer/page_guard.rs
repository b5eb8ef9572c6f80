//! RAII guards for zero-copy page access.
//!
//! - [`PageReadGuard`] - Shared read access (multiple allowed)
//! - [`PageWriteGuard`] - Exclusive write access (marks the page dirty)
//!
//! Both guards unpin the frame when dropped. A guard holds the frame lock,
//! so do not call back into the cache for the same block while holding one.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::page_cache::PageCache;
use super::FrameId;
use crate::common::BlockNum;
use crate::storage::page::Page;

pub struct PageReadGuard<'a> {
    cache: &'a PageCache,
    frame_id: FrameId,
    block: BlockNum,
    lock: Option<RwLockReadGuard<'a, Box<Page>>>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        cache: &'a PageCache,
        frame_id: FrameId,
        block: BlockNum,
        lock: RwLockReadGuard<'a, Box<Page>>,
    ) -> Self {
        Self {
            cache,
            frame_id,
            block,
            lock: Some(lock),
        }
    }

    #[inline]
    pub fn block(&self) -> BlockNum {
        self.block
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        match &self.lock {
            Some(lock) => &***lock,
            None => unreachable!("guard used after release"),
        }
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        // Release the frame lock before the cache state lock is taken.
        self.lock.take();
        self.cache.unpin(self.frame_id);
    }
}

/// Exclusive access to a cached page.
///
/// The page is marked dirty when the guard is created, since the holder
/// may write to it at any time.
pub struct PageWriteGuard<'a> {
    cache: &'a PageCache,
    frame_id: FrameId,
    block: BlockNum,
    lock: Option<RwLockWriteGuard<'a, Box<Page>>>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        cache: &'a PageCache,
        frame_id: FrameId,
        block: BlockNum,
        lock: RwLockWriteGuard<'a, Box<Page>>,
    ) -> Self {
        Self {
            cache,
            frame_id,
            block,
            lock: Some(lock),
        }
    }

    #[inline]
    pub fn block(&self) -> BlockNum {
        self.block
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        match &self.lock {
            Some(lock) => &***lock,
            None => unreachable!("guard used after release"),
        }
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        match &mut self.lock {
            Some(lock) => &mut ***lock,
            None => unreachable!("guard used after release"),
        }
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.take();
        self.cache.unpin(self.frame_id);
    }
}
