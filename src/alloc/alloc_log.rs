//! The allocator's write-ahead log.
//!
//! Each mutation of the allocator is a single fixed-size record:
//!
//! ```text
//! ┌────────┬──────────────┬─────────────┐
//! │ op (1) │ block (4 LE) │ crc32 (4 LE)│
//! └────────┴──────────────┴─────────────┘
//! ```
//!
//! Every op fully determines one set mutation or counter update, so
//! replaying a log any number of times over the state it started from
//! yields the same result.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::warn;

use crate::common::{BlockNum, Error, Result};

/// A minimal allocator mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocOp {
    /// Raise the next-block counter to at least this value.
    Advance(u32),
    FreeInsert(BlockNum),
    FreeRemove(BlockNum),
    TempInsert(BlockNum),
    TempRemove(BlockNum),
}

impl AllocOp {
    /// Size of one encoded record.
    pub const RECORD_SIZE: usize = 9;

    fn tag(&self) -> u8 {
        match self {
            AllocOp::Advance(_) => 1,
            AllocOp::FreeInsert(_) => 2,
            AllocOp::FreeRemove(_) => 3,
            AllocOp::TempInsert(_) => 4,
            AllocOp::TempRemove(_) => 5,
        }
    }

    fn operand(&self) -> u32 {
        match *self {
            AllocOp::Advance(n) => n,
            AllocOp::FreeInsert(b)
            | AllocOp::FreeRemove(b)
            | AllocOp::TempInsert(b)
            | AllocOp::TempRemove(b) => b.0,
        }
    }

    pub fn encode(&self) -> [u8; Self::RECORD_SIZE] {
        let mut out = [0u8; Self::RECORD_SIZE];
        out[0] = self.tag();
        out[1..5].copy_from_slice(&self.operand().to_le_bytes());
        let crc = crc32fast::hash(&out[..5]);
        out[5..9].copy_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode one record, or `None` if it is torn or corrupt.
    pub fn decode(record: &[u8]) -> Option<Self> {
        if record.len() < Self::RECORD_SIZE {
            return None;
        }
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&record[5..9]);
        if crc32fast::hash(&record[..5]) != u32::from_le_bytes(crc) {
            return None;
        }

        let mut operand = [0u8; 4];
        operand.copy_from_slice(&record[1..5]);
        let n = u32::from_le_bytes(operand);
        let block = BlockNum::new(n);

        match record[0] {
            1 => Some(AllocOp::Advance(n)),
            2 => Some(AllocOp::FreeInsert(block)),
            3 => Some(AllocOp::FreeRemove(block)),
            4 => Some(AllocOp::TempInsert(block)),
            5 => Some(AllocOp::TempRemove(block)),
            _ => None,
        }
    }
}

/// Append-only file of [`AllocOp`] records.
pub struct AllocLog {
    file: File,
}

impl AllocLog {
    /// Open (or create) the log for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Read every intact record.
    ///
    /// Reading stops at the first torn or corrupt record; the file is
    /// truncated there so later appends follow the last good record.
    pub fn replay(&mut self) -> Result<Vec<AllocOp>> {
        let mut bytes = Vec::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut bytes)?;

        let mut ops = Vec::with_capacity(bytes.len() / AllocOp::RECORD_SIZE);
        for record in bytes.chunks(AllocOp::RECORD_SIZE) {
            match AllocOp::decode(record) {
                Some(op) => ops.push(op),
                None => break,
            }
        }

        let valid_len = (ops.len() * AllocOp::RECORD_SIZE) as u64;
        if valid_len < bytes.len() as u64 {
            warn!(
                valid = valid_len,
                total = bytes.len(),
                "allocator log has a torn tail, truncating"
            );
            self.file.set_len(valid_len)?;
        }
        Ok(ops)
    }

    pub fn append(&mut self, op: AllocOp) -> Result<()> {
        self.file.write_all(&op.encode())?;
        Ok(())
    }

    /// Make appended records durable.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data().map_err(Error::from)
    }

    /// Drop every record (after a backup captured them).
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
