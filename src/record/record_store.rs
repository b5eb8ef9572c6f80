//! Record store - sorted tuples in chained heap blocks.

use tracing::debug;

use super::RecordBlock;
use crate::common::config::MAX_TUPLE_SIZE;
use crate::common::{BlockNum, Error, Result};
use crate::tuple::Tuple;
use crate::txn::PageStore;

/// Result of an insert or update that split its block: the first key of
/// the new block and its number.
pub type RecordSplit = Option<(Tuple, BlockNum)>;

/// Operations on one table's record blocks.
///
/// Each block keeps its tuples sorted by key; blocks are chained through
/// `next` in key order, so walking the chain from the first block yields
/// every tuple of the table in ascending key order.
///
/// A block is *full* once its encoded size exceeds `fill_limit`; it is then
/// split in two by encoded bytes. The new (right) block is written before
/// the old one is relinked to it.
pub struct RecordStore {
    table: String,
    key_columns: Vec<usize>,
    fill_limit: usize,
}

impl RecordStore {
    pub fn new(table: impl Into<String>, key_columns: Vec<usize>, fill_limit: usize) -> Self {
        Self {
            table: table.into(),
            key_columns,
            fill_limit,
        }
    }

    pub fn key_of(&self, tuple: &Tuple) -> Tuple {
        tuple.project(&self.key_columns)
    }

    /// Allocate an empty, unlinked record block.
    pub fn create(&self, store: &mut dyn PageStore) -> Result<BlockNum> {
        let block = store.allocate()?;
        self.init(store, block)?;
        Ok(block)
    }

    /// Write an empty record block at `block`.
    pub fn init(&self, store: &mut dyn PageStore, block: BlockNum) -> Result<()> {
        self.write(store, block, &RecordBlock::new())
    }

    pub fn read(&self, store: &mut dyn PageStore, block: BlockNum) -> Result<RecordBlock> {
        let page = store.read(block)?;
        RecordBlock::from_page(block, &page)
    }

    fn write(&self, store: &mut dyn PageStore, block: BlockNum, rb: &RecordBlock) -> Result<()> {
        store.write(block, &*rb.to_page()?)
    }

    /// Insert `tuple` in key order.
    ///
    /// # Errors
    /// - `Error::DuplicateKey` if a tuple with `key` is already stored
    /// - `Error::TupleTooLarge` if the tuple exceeds `MAX_TUPLE_SIZE`
    pub fn insert(
        &self,
        store: &mut dyn PageStore,
        block: BlockNum,
        key: &Tuple,
        tuple: Tuple,
    ) -> Result<RecordSplit> {
        check_size(&tuple)?;
        let mut rb = self.read(store, block)?;

        match self.position(&rb, key) {
            Ok(_) => Err(Error::DuplicateKey {
                table: self.table.clone(),
                key: key.to_string(),
            }),
            Err(pos) => {
                rb.tuples.insert(pos, tuple);
                let split = self.store_maybe_split(store, block, rb)?;
                store.note_modified(block, key);
                Ok(split)
            }
        }
    }

    /// Replace the tuple stored under `key`.
    ///
    /// # Errors
    /// `Error::KeyNotFound` if no tuple has `key`.
    pub fn update(
        &self,
        store: &mut dyn PageStore,
        block: BlockNum,
        key: &Tuple,
        tuple: Tuple,
    ) -> Result<RecordSplit> {
        check_size(&tuple)?;
        let mut rb = self.read(store, block)?;

        let pos = self
            .position(&rb, key)
            .map_err(|_| self.not_found(key))?;
        rb.tuples[pos] = tuple;
        let split = self.store_maybe_split(store, block, rb)?;
        store.note_modified(block, key);
        Ok(split)
    }

    /// Remove and return the tuple stored under `key`.
    pub fn remove(&self, store: &mut dyn PageStore, block: BlockNum, key: &Tuple) -> Result<Tuple> {
        let mut rb = self.read(store, block)?;
        let pos = self
            .position(&rb, key)
            .map_err(|_| self.not_found(key))?;

        let removed = rb.tuples.remove(pos);
        self.write(store, block, &rb)?;
        store.note_modified(block, key);
        Ok(removed)
    }

    pub fn find(
        &self,
        store: &mut dyn PageStore,
        block: BlockNum,
        key: &Tuple,
    ) -> Result<Option<Tuple>> {
        let mut rb = self.read(store, block)?;
        Ok(match self.position(&rb, key) {
            Ok(pos) => Some(rb.tuples.swap_remove(pos)),
            Err(_) => None,
        })
    }

    /// Fold the next block into `block` when both fit together.
    ///
    /// Returns the block that was unlinked from the chain. It is rewritten
    /// empty and handed to [`PageStore::retire`].
    pub fn merge(&self, store: &mut dyn PageStore, block: BlockNum) -> Result<Option<BlockNum>> {
        let mut rb = self.read(store, block)?;
        let Some(next) = rb.next else {
            return Ok(None);
        };
        let next_rb = self.read(store, next)?;

        let combined = rb.encoded_len() + next_rb.encoded_len() - RecordBlock::HEADER_LEN;
        if self.is_full(combined) {
            return Ok(None);
        }

        rb.tuples.extend(next_rb.tuples);
        rb.next = next_rb.next;
        self.write(store, block, &rb)?;
        self.write(store, next, &RecordBlock::new())?;
        store.retire(next);
        debug!(table = %self.table, %block, merged = %next, "record blocks merged");
        Ok(Some(next))
    }

    pub fn is_full(&self, encoded_len: usize) -> bool {
        encoded_len > self.fill_limit
    }

    /// Underfull: less than half the fill limit.
    pub fn is_less(&self, encoded_len: usize) -> bool {
        encoded_len < self.fill_limit / 2
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Binary search by key over a block's sorted tuples.
    fn position(&self, rb: &RecordBlock, key: &Tuple) -> std::result::Result<usize, usize> {
        rb.tuples
            .binary_search_by(|t| self.key_of(t).cmp(key))
    }

    fn not_found(&self, key: &Tuple) -> Error {
        Error::KeyNotFound {
            table: self.table.clone(),
            key: key.to_string(),
        }
    }

    fn store_maybe_split(
        &self,
        store: &mut dyn PageStore,
        block: BlockNum,
        mut rb: RecordBlock,
    ) -> Result<RecordSplit> {
        if !self.is_full(rb.encoded_len()) || rb.tuples.len() < 2 {
            self.write(store, block, &rb)?;
            return Ok(None);
        }

        let at = split_point(&rb.tuples);
        let right = RecordBlock {
            next: rb.next,
            tuples: rb.tuples.split_off(at),
        };
        let first_key = self.key_of(&right.tuples[0]);

        let new_block = store.allocate()?;
        self.write(store, new_block, &right)?;
        rb.next = Some(new_block);
        self.write(store, block, &rb)?;

        debug!(
            table = %self.table,
            %block,
            %new_block,
            left = rb.tuples.len(),
            right = right.tuples.len(),
            "record block split"
        );
        Ok(Some((first_key, new_block)))
    }
}

/// First index of the tail half, by encoded bytes. Both halves are
/// non-empty when there are at least two tuples.
fn split_point(tuples: &[Tuple]) -> usize {
    let total: usize = tuples.iter().map(Tuple::encoded_len).sum();
    let mut acc = 0;
    for (i, tuple) in tuples.iter().enumerate() {
        acc += tuple.encoded_len();
        if acc * 2 >= total {
            return (i + 1).clamp(1, tuples.len() - 1);
        }
    }
    tuples.len() - 1
}

fn check_size(tuple: &Tuple) -> Result<()> {
    let size = tuple.encoded_len();
    if size > MAX_TUPLE_SIZE {
        return Err(Error::TupleTooLarge {
            size,
            max: MAX_TUPLE_SIZE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple;
    use crate::tuple::Value;
    use crate::txn::page_store::testing::TestStore;

    /// Three `(int, varchar)` rows of this size overflow a block.
    const SMALL_FILL: usize = 64;

    fn row(id: i32) -> Tuple {
        tuple![id, format!("v{id:05}")]
    }

    fn key(id: i32) -> Tuple {
        tuple![id]
    }

    fn setup(fill_limit: usize) -> (TestStore, RecordStore, BlockNum) {
        let mut ts = TestStore::new(32);
        let rs = RecordStore::new("t", vec![0], fill_limit);
        let block = rs.create(&mut ts.store).unwrap();
        (ts, rs, block)
    }

    /// Every tuple reachable from `first`, in chain order.
    fn chain(ts: &mut TestStore, rs: &RecordStore, first: BlockNum) -> Vec<Tuple> {
        let mut out = Vec::new();
        let mut next = Some(first);
        while let Some(block) = next {
            let rb = rs.read(&mut ts.store, block).unwrap();
            out.extend(rb.tuples);
            next = rb.next;
        }
        out
    }

    #[test]
    fn test_insert_keeps_key_order() {
        let (mut ts, rs, block) = setup(4000);
        for id in [5, 1, 3] {
            assert!(rs.insert(&mut ts.store, block, &key(id), row(id)).unwrap().is_none());
        }

        let rb = rs.read(&mut ts.store, block).unwrap();
        let ids: Vec<_> = rb.tuples.iter().map(|t| t.values()[0].clone()).collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(3), Value::Int(5)]);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let (mut ts, rs, block) = setup(4000);
        rs.insert(&mut ts.store, block, &key(1), row(1)).unwrap();

        let err = rs.insert(&mut ts.store, block, &key(1), row(1)).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));
        assert_eq!(err.to_string(), "duplicate key (1) in t");
    }

    #[test]
    fn test_third_tuple_splits_block() {
        let (mut ts, rs, block) = setup(SMALL_FILL);
        assert!(row(1).encoded_len() * 2 + 12 <= SMALL_FILL);
        assert!(row(1).encoded_len() * 3 + 12 > SMALL_FILL);

        rs.insert(&mut ts.store, block, &key(1), row(1)).unwrap();
        rs.insert(&mut ts.store, block, &key(2), row(2)).unwrap();
        let (first_key, new_block) = rs
            .insert(&mut ts.store, block, &key(3), row(3))
            .unwrap()
            .expect("third tuple overflows");

        let left = rs.read(&mut ts.store, block).unwrap();
        let right = rs.read(&mut ts.store, new_block).unwrap();
        assert_eq!(left.next, Some(new_block));
        assert_eq!(right.next, None);
        assert_eq!(first_key, rs.key_of(&right.tuples[0]));
        assert_eq!(left.tuples.len() + right.tuples.len(), 3);
        assert!(!left.tuples.is_empty() && !right.tuples.is_empty());

        assert_eq!(chain(&mut ts, &rs, block), vec![row(1), row(2), row(3)]);
    }

    #[test]
    fn test_split_preserves_chain_tail() {
        let (mut ts, rs, block) = setup(SMALL_FILL);
        let mut splits = Vec::new();
        // Always insert into the first block; splits relink into the chain.
        for id in (1..=6).rev() {
            if let Some(split) = rs.insert(&mut ts.store, block, &key(id), row(id)).unwrap() {
                splits.push(split);
            }
        }

        assert!(!splits.is_empty());
        let ids: Vec<Tuple> = chain(&mut ts, &rs, block);
        assert_eq!(ids, (1..=6).map(row).collect::<Vec<_>>());
    }

    #[test]
    fn test_update_and_remove() {
        let (mut ts, rs, block) = setup(4000);
        rs.insert(&mut ts.store, block, &key(1), row(1)).unwrap();

        let replaced = tuple![1, "new"];
        rs.update(&mut ts.store, block, &key(1), replaced.clone()).unwrap();
        assert_eq!(rs.find(&mut ts.store, block, &key(1)).unwrap(), Some(replaced.clone()));

        assert_eq!(rs.remove(&mut ts.store, block, &key(1)).unwrap(), replaced);
        assert_eq!(rs.find(&mut ts.store, block, &key(1)).unwrap(), None);
    }

    #[test]
    fn test_missing_key_errors() {
        let (mut ts, rs, block) = setup(4000);
        assert!(matches!(
            rs.remove(&mut ts.store, block, &key(7)),
            Err(Error::KeyNotFound { .. })
        ));
        assert!(matches!(
            rs.update(&mut ts.store, block, &key(7), row(7)),
            Err(Error::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_oversized_tuple_rejected() {
        let (mut ts, rs, block) = setup(4000);
        let huge = tuple![1, "x".repeat(MAX_TUPLE_SIZE)];
        assert!(matches!(
            rs.insert(&mut ts.store, block, &key(1), huge),
            Err(Error::TupleTooLarge { .. })
        ));
    }

    #[test]
    fn test_merge_folds_next_block() {
        let (mut ts, rs, block) = setup(SMALL_FILL);
        for id in 1..=3 {
            rs.insert(&mut ts.store, block, &key(id), row(id)).unwrap();
        }
        let next = rs.read(&mut ts.store, block).unwrap().next.unwrap();

        // Shrink the pair until it fits in one block.
        rs.remove(&mut ts.store, block, &key(1)).unwrap();
        let right_first = rs.read(&mut ts.store, next).unwrap().tuples[0].clone();
        let right_key = rs.key_of(&right_first);
        if rs.read(&mut ts.store, next).unwrap().tuples.len() > 1 {
            rs.remove(&mut ts.store, next, &right_key).unwrap();
        }

        let unlinked = rs.merge(&mut ts.store, block).unwrap();
        assert_eq!(unlinked, Some(next));
        assert_eq!(rs.read(&mut ts.store, block).unwrap().next, None);
        assert!(rs.read(&mut ts.store, next).unwrap().tuples.is_empty());
        ts.allocator.free_block(next).unwrap();
    }

    #[test]
    fn test_merge_refuses_when_too_big() {
        let (mut ts, rs, block) = setup(SMALL_FILL);
        for id in 1..=3 {
            rs.insert(&mut ts.store, block, &key(id), row(id)).unwrap();
        }
        // Two tuples on the left plus one on the right exceed the limit.
        assert_eq!(rs.merge(&mut ts.store, block).unwrap(), None);
    }

    #[test]
    fn test_fill_predicates() {
        let rs = RecordStore::new("t", vec![0], 100);
        assert!(rs.is_full(101));
        assert!(!rs.is_full(100));
        assert!(rs.is_less(49));
        assert!(!rs.is_less(50));
    }
}
