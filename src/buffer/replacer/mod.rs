//! Eviction policy for the page cache.
//!
//! - [`LruReplacer`] - Least recently used, skipping pinned frames

mod lru;

pub use lru::LruReplacer;
