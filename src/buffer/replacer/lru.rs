//! LRU (Least Recently Used) replacement policy.

use std::collections::{BTreeMap, HashMap};

use crate::buffer::FrameId;

struct LruNode {
    /// Logical timestamp of the last access.
    stamp: u64,
    evictable: bool,
}

/// Evicts the evictable frame whose last access is oldest.
///
/// Every access stamps the frame with a fresh logical time; `order` keeps
/// frames sorted by that stamp so the victim search walks from the cold
/// end and stops at the first unpinned frame.
pub struct LruReplacer {
    nodes: HashMap<FrameId, LruNode>,
    order: BTreeMap<u64, FrameId>,
    clock: u64,
    evictable_count: usize,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: BTreeMap::new(),
            clock: 0,
            evictable_count: 0,
        }
    }

    /// Record that a frame was accessed, making it the most recent.
    pub fn record_access(&mut self, frame_id: FrameId) {
        self.clock += 1;
        let stamp = self.clock;

        match self.nodes.get_mut(&frame_id) {
            Some(node) => {
                self.order.remove(&node.stamp);
                node.stamp = stamp;
            }
            None => {
                self.nodes.insert(
                    frame_id,
                    LruNode {
                        stamp,
                        evictable: false,
                    },
                );
            }
        }
        self.order.insert(stamp, frame_id);
    }

    /// Mark a frame as evictable (pin count dropped to 0) or not.
    ///
    /// Unknown frames are ignored.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if let Some(node) = self.nodes.get_mut(&frame_id) {
            if node.evictable != evictable {
                node.evictable = evictable;
                if evictable {
                    self.evictable_count += 1;
                } else {
                    self.evictable_count -= 1;
                }
            }
        }
    }

    /// Select and forget the least recently used evictable frame.
    pub fn evict(&mut self) -> Option<FrameId> {
        let (stamp, frame_id) = self
            .order
            .iter()
            .find(|(_, fid)| self.nodes.get(fid).is_some_and(|n| n.evictable))
            .map(|(&stamp, &fid)| (stamp, fid))?;

        self.order.remove(&stamp);
        self.nodes.remove(&frame_id);
        self.evictable_count -= 1;
        Some(frame_id)
    }

    /// Forget a frame entirely.
    pub fn remove(&mut self, frame_id: FrameId) {
        if let Some(node) = self.nodes.remove(&frame_id) {
            self.order.remove(&node.stamp);
            if node.evictable {
                self.evictable_count -= 1;
            }
        }
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.evictable_count
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}
