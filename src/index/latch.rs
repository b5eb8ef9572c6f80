//! Per-node latches for split propagation.

use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};

use crate::common::BlockNum;

/// Exclusive latches keyed by node block number.
///
/// A split bubbling up holds at most two latches at a time: it acquires
/// the next node's latch (the parent, or a right sibling on the same
/// level) before releasing the current one. Latches are therefore only
/// ever requested upward or rightward, which keeps two bubbling writers
/// from waiting on each other in a cycle.
#[derive(Default)]
pub struct NodeLatches {
    held: Mutex<HashSet<BlockNum>>,
    released: Condvar,
}

/// A held latch. Released on drop.
pub struct NodeLatch<'a> {
    latches: &'a NodeLatches,
    block: BlockNum,
}

impl NodeLatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the latch on `block` is free, then take it.
    pub fn lock(&self, block: BlockNum) -> NodeLatch<'_> {
        let mut held = self.held.lock();
        while held.contains(&block) {
            self.released.wait(&mut held);
        }
        held.insert(block);
        NodeLatch {
            latches: self,
            block,
        }
    }

    pub fn is_locked(&self, block: BlockNum) -> bool {
        self.held.lock().contains(&block)
    }
}

impl NodeLatch<'_> {
    pub fn block(&self) -> BlockNum {
        self.block
    }
}

impl Drop for NodeLatch<'_> {
    fn drop(&mut self) {
        self.latches.held.lock().remove(&self.block);
        self.latches.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_latch_released_on_drop() {
        let latches = NodeLatches::new();
        let latch = latches.lock(BlockNum::new(4));
        assert!(latches.is_locked(BlockNum::new(4)));
        assert!(!latches.is_locked(BlockNum::new(5)));

        drop(latch);
        assert!(!latches.is_locked(BlockNum::new(4)));
    }

    #[test]
    fn test_coupling_holds_two_latches() {
        let latches = NodeLatches::new();
        let child = latches.lock(BlockNum::new(7));
        let parent = latches.lock(BlockNum::new(4));
        drop(child);

        assert!(latches.is_locked(BlockNum::new(4)));
        assert!(!latches.is_locked(BlockNum::new(7)));
        assert_eq!(parent.block(), BlockNum::new(4));
    }

    #[test]
    fn test_second_locker_waits() {
        let latches = Arc::new(NodeLatches::new());
        let entered = Arc::new(AtomicBool::new(false));
        let held = latches.lock(BlockNum::new(9));

        let handle = {
            let latches = Arc::clone(&latches);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                let _latch = latches.lock(BlockNum::new(9));
                entered.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));

        drop(held);
        handle.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }
}
