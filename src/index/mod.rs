//! Primary-key index.
//!
//! - [`BLinkTree`] - B-link tree whose leaves point at record blocks
//! - [`Node`] - Decoded index node
//! - [`NodeLatches`] - Per-node latches taken while splits propagate

mod blink_tree;
mod latch;
mod node;

pub use blink_tree::BLinkTree;
pub use latch::{NodeLatch, NodeLatches};
pub use node::Node;
