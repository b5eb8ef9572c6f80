//! Block allocator - hands out and reclaims block numbers.
//!
//! The [`BlockAllocator`] tracks three kinds of block numbers:
//! - the *free set*: reclaimed blocks, reused lowest-first
//! - the *temp set*: blocks reserved by in-flight transactions
//! - everything below the counter that is in neither set is live
//!
//! State survives crashes through a backup snapshot (`alloc.bak`) plus the
//! allocator log (`alloc.log`). Every mutation is appended to the log
//! before the in-memory sets change.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::alloc_log::{AllocLog, AllocOp};
use crate::buffer::{WriteBack, WriteBackHook};
use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::config::RESERVED_BLOCKS;
use crate::common::{BlockNum, Error, Result};

const BACKUP_FILE: &str = "alloc.bak";
const LOG_FILE: &str = "alloc.log";
const BACKUP_MAGIC: u32 = 0x424C_4B41; // "AKLB"

/// Point-in-time copy of the allocator's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorState {
    /// First block number never handed out.
    pub next: u32,
    pub free: BTreeSet<BlockNum>,
    pub temp: BTreeSet<BlockNum>,
}

impl AllocatorState {
    fn fresh() -> Self {
        Self {
            next: RESERVED_BLOCKS,
            free: BTreeSet::new(),
            temp: BTreeSet::new(),
        }
    }

    /// Apply one logged op. Idempotent.
    fn apply(&mut self, op: AllocOp) {
        match op {
            AllocOp::Advance(n) => self.next = self.next.max(n),
            AllocOp::FreeInsert(b) => {
                self.free.insert(b);
            }
            AllocOp::FreeRemove(b) => {
                self.free.remove(&b);
            }
            AllocOp::TempInsert(b) => {
                self.temp.insert(b);
            }
            AllocOp::TempRemove(b) => {
                self.temp.remove(&b);
            }
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(16 + 4 * (self.free.len() + self.temp.len()));
        w.put_u32(BACKUP_MAGIC);
        w.put_u32(self.next);
        w.put_u32(self.free.len() as u32);
        for block in &self.free {
            w.put_u32(block.0);
        }
        w.put_u32(self.temp.len() as u32);
        for block in &self.temp {
            w.put_u32(block.0);
        }
        let crc = crc32fast::hash(w.as_slice());
        w.put_u32(crc);
        w.into_inner()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let corrupt = |reason: &str| Error::LogCorrupted {
            file: BACKUP_FILE,
            offset: 0,
            reason: reason.to_string(),
        };

        if bytes.len() < 4 {
            return Err(corrupt("file too short"));
        }
        let (body, crc) = bytes.split_at(bytes.len() - 4);
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(crc);
        if crc32fast::hash(body) != u32::from_le_bytes(crc_bytes) {
            return Err(corrupt("checksum mismatch"));
        }

        let mut r = ByteReader::new(body);
        if r.get_u32()? != BACKUP_MAGIC {
            return Err(corrupt("bad magic"));
        }
        let next = r.get_u32()?;
        let mut free = BTreeSet::new();
        for _ in 0..r.get_u32()? {
            free.insert(BlockNum::new(r.get_u32()?));
        }
        let mut temp = BTreeSet::new();
        for _ in 0..r.get_u32()? {
            temp.insert(BlockNum::new(r.get_u32()?));
        }
        Ok(Self { next, free, temp })
    }
}

struct Inner {
    state: AllocatorState,
    log: AllocLog,
    ops_since_backup: usize,
}

/// Hands out block numbers for one database.
///
/// # Thread Safety
/// All state sits behind a single `Mutex`; every call is short and
/// never calls back into other components.
///
/// # Invariants
/// The free and temp sets are disjoint, and neither contains a block that
/// is still referenced by live structure. A call that would break this
/// (double free, freeing a temp block as live, ...) is a bug in the
/// caller and panics.
pub struct BlockAllocator {
    inner: Mutex<Inner>,
    dir: PathBuf,
    backup_interval: usize,
}

impl BlockAllocator {
    /// Create allocator files for a new database in `dir`.
    ///
    /// Blocks below `RESERVED_BLOCKS` are never handed out.
    pub fn create<P: AsRef<Path>>(dir: P, backup_interval: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut log = AllocLog::open(dir.join(LOG_FILE))?;
        log.truncate()?;

        let state = AllocatorState::fresh();
        write_backup(&dir, &state)?;

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                log,
                ops_since_backup: 0,
            }),
            dir,
            backup_interval: backup_interval.max(1),
        })
    }

    /// Reconstruct the allocator from its backup plus log replay.
    pub fn open<P: AsRef<Path>>(dir: P, backup_interval: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        let mut state = match fs::read(dir.join(BACKUP_FILE)) {
            Ok(bytes) => AllocatorState::decode(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AllocatorState::fresh(),
            Err(e) => return Err(e.into()),
        };

        let mut log = AllocLog::open(dir.join(LOG_FILE))?;
        let ops = log.replay()?;
        for op in &ops {
            state.apply(*op);
        }
        debug!(
            replayed = ops.len(),
            next = state.next,
            free = state.free.len(),
            temp = state.temp.len(),
            "allocator opened"
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                log,
                ops_since_backup: ops.len(),
            }),
            dir,
            backup_interval: backup_interval.max(1),
        })
    }

    // ========================================================================
    // Public API: Allocation
    // ========================================================================

    /// Allocate a block for live structure.
    ///
    /// Reuses the lowest free block if there is one, otherwise advances
    /// the counter.
    pub fn new_block(&self) -> Result<BlockNum> {
        let mut inner = self.inner.lock();
        let block = self.take_block(&mut inner)?;
        self.after_ops(&mut inner)?;
        Ok(block)
    }

    /// Return a live block to the free set.
    ///
    /// # Panics
    /// Panics on a double free, a reserved block, or a block that was never
    /// handed out.
    pub fn free_block(&self, block: BlockNum) -> Result<()> {
        let mut inner = self.inner.lock();
        assert!(
            block.0 >= RESERVED_BLOCKS && block.0 < inner.state.next,
            "free of unallocated {}",
            block
        );
        assert!(!inner.state.free.contains(&block), "double free of {}", block);
        assert!(
            !inner.state.temp.contains(&block),
            "free_block on temp {}",
            block
        );
        self.record(&mut inner, AllocOp::FreeInsert(block))?;
        self.after_ops(&mut inner)
    }

    /// Allocate a block reserved by an in-flight transaction.
    pub fn new_temp_block(&self) -> Result<BlockNum> {
        let mut inner = self.inner.lock();
        let block = self.take_block(&mut inner)?;
        self.record(&mut inner, AllocOp::TempInsert(block))?;
        self.after_ops(&mut inner)?;
        Ok(block)
    }

    /// Release a temp block back to the free set.
    ///
    /// # Panics
    /// Panics if `block` is not in the temp set.
    pub fn free_temp_block(&self, block: BlockNum) -> Result<()> {
        let mut inner = self.inner.lock();
        assert!(
            inner.state.temp.contains(&block),
            "free_temp_block on non-temp {}",
            block
        );
        self.record(&mut inner, AllocOp::TempRemove(block))?;
        self.record(&mut inner, AllocOp::FreeInsert(block))?;
        self.after_ops(&mut inner)
    }

    /// Stop tracking a temp block: its contents now belong to live
    /// structure.
    ///
    /// # Panics
    /// Panics if `block` is not in the temp set.
    pub fn sync_block(&self, block: BlockNum) -> Result<()> {
        let mut inner = self.inner.lock();
        assert!(
            inner.state.temp.contains(&block),
            "sync_block on non-temp {}",
            block
        );
        self.record(&mut inner, AllocOp::TempRemove(block))?;
        self.after_ops(&mut inner)
    }

    // ========================================================================
    // Public API: Recovery
    // ========================================================================

    /// Move every temp block to the free set. Returns how many there were.
    ///
    /// Used at recovery: no transaction survives a restart.
    pub fn reclaim_temp_blocks(&self) -> Result<usize> {
        let mut inner = self.inner.lock();
        let temps: Vec<BlockNum> = inner.state.temp.iter().copied().collect();
        for &block in &temps {
            self.record(&mut inner, AllocOp::TempRemove(block))?;
            self.record(&mut inner, AllocOp::FreeInsert(block))?;
        }
        self.after_ops(&mut inner)?;
        Ok(temps.len())
    }

    /// Free every handed-out block not in `live` and not already free.
    ///
    /// Returns the blocks that were reclaimed.
    ///
    /// # Panics
    /// Panics if a block in `live` is in the free or temp set.
    pub fn release_unreachable(&self, live: &BTreeSet<BlockNum>) -> Result<Vec<BlockNum>> {
        let mut inner = self.inner.lock();

        for block in live {
            assert!(
                !inner.state.free.contains(block),
                "live {} is in the free set",
                block
            );
            assert!(
                !inner.state.temp.contains(block),
                "live {} is in the temp set",
                block
            );
        }

        let leaked: Vec<BlockNum> = (RESERVED_BLOCKS..inner.state.next)
            .map(BlockNum::new)
            .filter(|b| {
                !live.contains(b) && !inner.state.free.contains(b) && !inner.state.temp.contains(b)
            })
            .collect();

        for &block in &leaked {
            self.record(&mut inner, AllocOp::FreeInsert(block))?;
        }
        if !leaked.is_empty() {
            warn!(count = leaked.len(), "reclaimed unreachable blocks");
        }
        self.after_ops(&mut inner)?;
        Ok(leaked)
    }

    /// Write a backup snapshot and truncate the log.
    pub fn backup(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.backup_locked(&mut inner)
    }

    // ========================================================================
    // Public API: Inspection
    // ========================================================================

    /// Copy of the current bookkeeping.
    pub fn state(&self) -> AllocatorState {
        self.inner.lock().state.clone()
    }

    pub fn is_free(&self, block: BlockNum) -> bool {
        self.inner.lock().state.free.contains(&block)
    }

    pub fn is_temp(&self, block: BlockNum) -> bool {
        self.inner.lock().state.temp.contains(&block)
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().state.free.len()
    }

    pub fn temp_count(&self) -> usize {
        self.inner.lock().state.temp.len()
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Pick the next block and log its removal from the free pool.
    fn take_block(&self, inner: &mut Inner) -> Result<BlockNum> {
        if let Some(&block) = inner.state.free.first() {
            self.record(inner, AllocOp::FreeRemove(block))?;
            return Ok(block);
        }
        let block = BlockNum::new(inner.state.next);
        self.record(inner, AllocOp::Advance(block.0 + 1))?;
        Ok(block)
    }

    /// Log first, then mutate.
    fn record(&self, inner: &mut Inner, op: AllocOp) -> Result<()> {
        inner.log.append(op)?;
        inner.state.apply(op);
        inner.ops_since_backup += 1;
        Ok(())
    }

    fn after_ops(&self, inner: &mut Inner) -> Result<()> {
        if inner.ops_since_backup >= self.backup_interval {
            self.backup_locked(inner)?;
        }
        Ok(())
    }

    fn backup_locked(&self, inner: &mut Inner) -> Result<()> {
        write_backup(&self.dir, &inner.state)?;
        inner.log.truncate()?;
        inner.ops_since_backup = 0;
        debug!(
            next = inner.state.next,
            free = inner.state.free.len(),
            "allocator backup written"
        );
        Ok(())
    }
}

impl WriteBackHook for BlockAllocator {
    fn before_write_back(&self, block: BlockNum) -> Result<WriteBack> {
        let mut inner = self.inner.lock();
        inner.log.sync()?;
        if inner.state.free.contains(&block) {
            Ok(WriteBack::Skip)
        } else {
            Ok(WriteBack::Write)
        }
    }
}

/// Atomically replace `alloc.bak` (tmp file + rename).
fn write_backup(dir: &Path, state: &AllocatorState) -> Result<()> {
    let path = dir.join(BACKUP_FILE);
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&state.encode())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, &path)?;
    Ok(())
}
