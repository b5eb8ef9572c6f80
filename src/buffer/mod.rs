//! Page cache.
//!
//! The cache sits between the index/record layers and disk. It manages a
//! fixed pool of frames, each holding one block.
//!
//! # Components
//! - [`PageCache`] - The block cache
//! - [`Frame`] - A slot in the cache holding a page + metadata
//! - [`PageReadGuard`] / [`PageWriteGuard`] - RAII guards for page access
//! - [`WriteBackHook`] - Consulted before any dirty page reaches disk
//! - [`CacheStats`] - Performance statistics
//! - [`replacer`] - Eviction policy

mod frame;
mod hook;
mod page_cache;
mod page_guard;
pub mod replacer;
mod stats;

pub use frame::{Frame, FrameId};
pub use hook::{WriteBack, WriteBackHook};
pub use page_cache::PageCache;
pub use page_guard::{PageReadGuard, PageWriteGuard};
pub use stats::{CacheEvent, CacheStats, StatsSnapshot};
