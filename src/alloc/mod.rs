//! Block allocation.
//!
//! - [`BlockAllocator`] - Free/temp bookkeeping with its own log and backup
//! - [`AllocLog`] / [`AllocOp`] - The allocator's write-ahead log

mod alloc_log;
mod block_allocator;

pub use alloc_log::{AllocLog, AllocOp};
pub use block_allocator::{AllocatorState, BlockAllocator};
