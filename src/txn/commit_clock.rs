//! Commit sequence and per-block commit stamps.
//!
//! Every commit takes the next sequence number and stamps each block it
//! promoted or allocated with it. A repeatable-read transaction remembers
//! the sequence current at its start; a block stamped later holds a state
//! it must not see, and since only the latest version of a block is kept,
//! reading it is a conflict rather than a silently mixed view.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::common::BlockNum;

#[derive(Debug, Default)]
struct ClockState {
    seq: u64,
    stamps: HashMap<BlockNum, u64>,
}

/// Monotonic commit counter of one open database.
///
/// Stamps are only needed while some transaction may have started before
/// them, so [`CommitClock::forget`] drops them whenever no transaction is
/// active. The counter itself never goes back.
#[derive(Debug, Default)]
pub struct CommitClock {
    state: Mutex<ClockState>,
}

impl CommitClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sequence number of the latest commit.
    pub fn now(&self) -> u64 {
        self.state.lock().seq
    }

    /// Record a commit that changed `blocks`. Returns its sequence number.
    pub fn stamp<I>(&self, blocks: I) -> u64
    where
        I: IntoIterator<Item = BlockNum>,
    {
        let mut state = self.state.lock();
        state.seq += 1;
        let seq = state.seq;
        state.stamps.extend(blocks.into_iter().map(|block| (block, seq)));
        seq
    }

    /// Whether a commit after `seq` changed `block`.
    pub fn changed_since(&self, block: BlockNum, seq: u64) -> bool {
        self.state
            .lock()
            .stamps
            .get(&block)
            .is_some_and(|&stamp| stamp > seq)
    }

    /// Drop every stamp. Only valid while no transaction is active.
    pub fn forget(&self) {
        self.state.lock().stamps.clear();
    }

    pub fn stamped_blocks(&self) -> usize {
        self.state.lock().stamps.len()
    }
}
