//! Page - the fundamental 4KB unit of storage.
//!
//! A [`Page`] is a raw 4KB byte array that serves as the unit of I/O
//! between disk and memory. Pages are stored in frames within the page
//! cache and handed to callers as boxed copies.

use crate::common::config::PAGE_SIZE;

use super::page_header::{PageHeader, PageType};

/// A page of data (4KB, 4KB-aligned).
///
/// # Memory Layout
/// - Size: 4096 bytes (4KB)
/// - Alignment: 4096 bytes (for efficient Direct I/O with O_DIRECT)
/// - Bytes `0..PageHeader::SIZE` hold the header, the rest is the body
///
/// # Copying
/// `Page` does NOT implement `Clone` in production code: copying 4KB
/// should be explicit. Use [`Page::boxed_copy`] or [`Page::copy_from`].
/// A `#[cfg(test)]` Clone is provided for tests.
///
/// # Example
/// ```
/// use blinkdb::storage::page::Page;
///
/// let mut page = Page::new();
/// page.as_mut_slice()[0] = 0xFF;
/// assert_eq!(page.as_slice()[0], 0xFF);
/// ```
#[derive(Debug)]
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Allocate a zeroed page on the heap.
    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }

    /// Create a zeroed page whose header carries `page_type`.
    pub fn with_type(page_type: PageType) -> Box<Self> {
        let mut page = Self::boxed();
        page.set_header(&PageHeader::new(page_type));
        page
    }

    /// Explicit heap copy of this page.
    pub fn boxed_copy(&self) -> Box<Self> {
        let mut copy = Self::boxed();
        copy.copy_from(self);
        copy
    }

    /// Overwrite this page with the bytes of `other`.
    #[inline]
    pub fn copy_from(&mut self, other: &Page) {
        self.data.copy_from_slice(&other.data);
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes after the header.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.data[PageHeader::SIZE..]
    }

    /// Mutable bytes after the header.
    #[inline]
    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut self.data[PageHeader::SIZE..]
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Get the size of a page.
    #[inline]
    pub const fn size() -> usize {
        PAGE_SIZE
    }

    /// Read the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    /// Write a page header.
    pub fn set_header(&mut self, header: &PageHeader) {
        header.write_to(&mut self.data);
    }

    /// Commit version stored in the header.
    pub fn version(&self) -> u64 {
        self.header().version
    }

    /// Replace the commit version, keeping the rest of the header.
    pub fn set_version(&mut self, version: u64) {
        let mut header = self.header();
        header.version = version;
        self.set_header(&header);
    }

    /// Compute and store checksum in the header.
    ///
    /// Call this after all modifications to the page are complete.
    pub fn update_checksum(&mut self) {
        let checksum = PageHeader::compute_checksum(&self.data);
        let checksum_bytes = checksum.to_le_bytes();
        self.data[PageHeader::OFFSET_CHECKSUM..PageHeader::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&checksum_bytes);
    }

    /// Verify the page checksum is valid.
    ///
    /// A page that was never written (all zeros) has no checksum and is
    /// accepted.
    pub fn verify_checksum(&self) -> bool {
        let header = self.header();
        if header.page_type == PageType::Invalid && header.checksum == 0 {
            return true;
        }
        header.verify_checksum(&self.data)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

// Clone only available in tests - forces explicit copying in production
#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.data.copy_from_slice(&self.data);
        new_page
    }
}

// ============================================================================
// TESTS
// ============================================================================
