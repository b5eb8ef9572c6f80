//! Block number type.

use std::fmt;

/// Identifies a block in a database file.
///
/// Block numbers are opaque indices into the page store. Every cross-block
/// reference (child pointers, record chains, right siblings) is a
/// `BlockNum` resolved through the page cache, never a memory pointer.
///
/// Using `u32` allows for 4 billion blocks:
/// - 4,294,967,296 blocks × 4KB = 16TB maximum database size
///
/// # On-disk form
/// Pointers that may be absent are stored as an 8-byte signed integer
/// with `-1` meaning "none" (see [`BlockNum::encode_link`]).
///
/// # Example
/// ```
/// use blinkdb::BlockNum;
///
/// let block = BlockNum::new(42);
/// assert!(block.is_valid());
/// assert_eq!(block.0, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockNum(pub u32);

impl BlockNum {
    /// Invalid/sentinel block number.
    pub const INVALID: BlockNum = BlockNum(u32::MAX);

    /// Create a new BlockNum.
    #[inline]
    pub fn new(num: u32) -> Self {
        BlockNum(num)
    }

    /// Check if this block number is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Byte offset of this block in the data file.
    #[inline]
    pub fn offset(&self, block_size: usize) -> u64 {
        self.0 as u64 * block_size as u64
    }

    /// Encode an optional link as the on-disk `i64` (`-1` = none).
    #[inline]
    pub fn encode_link(link: Option<BlockNum>) -> i64 {
        match link {
            Some(block) => block.0 as i64,
            None => -1,
        }
    }

    /// Decode an on-disk link. Negative values mean "none".
    #[inline]
    pub fn decode_link(raw: i64) -> Option<BlockNum> {
        if raw < 0 || raw >= u32::MAX as i64 {
            None
        } else {
            Some(BlockNum(raw as u32))
        }
    }
}

impl fmt::Display for BlockNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Block(INVALID)")
        } else {
            write!(f, "Block({})", self.0)
        }
    }
}
