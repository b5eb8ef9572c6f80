//! B-link tree over a table's record blocks.

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use tracing::debug;

use super::latch::{NodeLatch, NodeLatches};
use super::node::Node;
use crate::common::{BlockNum, Error, Result};
use crate::record::RecordStore;
use crate::tuple::Tuple;
use crate::txn::PageStore;

/// Primary-key index of one table.
///
/// Leaves point at record blocks rather than holding tuples, so the
/// record chain is the tree's bottom level. Every node carries a high key
/// and a right-sibling link: a reader that lands on a node whose range
/// ends below its key moves right instead of descending, which keeps keys
/// reachable while a split has not yet reached the parent.
///
/// The root block never moves. When the root splits, its halves are
/// copied into two new blocks and the root is rewritten in place as their
/// parent, so catalog entries stay valid.
///
/// # Locking
/// Node latches are taken only while a split travels upward, and on the
/// leaf while a removal merges two of its record blocks. A split acquires
/// the latch on the next node (parent, or a right sibling) before the
/// current one is released. Writers of one table are otherwise serialized
/// by the table lock, and lookups take no latches at all.
pub struct BLinkTree {
    root: BlockNum,
    records: RecordStore,
    fill_limit: usize,
    latches: Arc<NodeLatches>,
}

impl BLinkTree {
    pub fn new(
        root: BlockNum,
        records: RecordStore,
        fill_limit: usize,
        latches: Arc<NodeLatches>,
    ) -> Self {
        Self {
            root,
            records,
            fill_limit,
            latches,
        }
    }

    pub fn root(&self) -> BlockNum {
        self.root
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Write an empty tree: a root leaf over one empty record block.
    pub fn init(&self, store: &mut dyn PageStore, record_root: BlockNum) -> Result<()> {
        self.records.init(store, record_root)?;
        self.write_node(store, self.root, &Node::empty_leaf(record_root))
    }

    /// Blocks from the root down to the record block covering `key`.
    ///
    /// One node per level, root first, then the record block. Nodes that
    /// were passed by moving right are not included.
    pub fn search_path(&self, store: &mut dyn PageStore, key: &Tuple) -> Result<Vec<BlockNum>> {
        let mut path = Vec::new();
        let mut block = self.root;
        loop {
            let node = self.read_node(store, block)?;
            if !node.covers(key) {
                if let Some(sibling) = node.right_sibling {
                    block = sibling;
                    continue;
                }
            }

            path.push(block);
            let child = node.child_for(key);
            if node.is_leaf {
                path.push(child);
                return Ok(path);
            }
            block = child;
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// # Errors
    /// `Error::DuplicateKey` if `key` is already present.
    pub fn insert(&self, store: &mut dyn PageStore, key: &Tuple, tuple: Tuple) -> Result<()> {
        let path = self.search_path(store, key)?;
        let (record, nodes) = split_path(&path)?;
        let split = self.records.insert(store, record, key, tuple)?;
        self.finish_split(store, nodes, record, split)
    }

    /// Replace the tuple stored under `key`.
    ///
    /// # Errors
    /// `Error::KeyNotFound` if `key` is absent.
    pub fn update(&self, store: &mut dyn PageStore, key: &Tuple, tuple: Tuple) -> Result<()> {
        let path = self.search_path(store, key)?;
        let (record, nodes) = split_path(&path)?;
        let split = self.records.update(store, record, key, tuple)?;
        self.finish_split(store, nodes, record, split)
    }

    /// Insert or replace. Returns `true` if the key was new.
    pub fn upsert(&self, store: &mut dyn PageStore, key: &Tuple, tuple: Tuple) -> Result<bool> {
        let path = self.search_path(store, key)?;
        let (record, nodes) = split_path(&path)?;
        let inserted = self.records.find(store, record, key)?.is_none();
        let split = if inserted {
            self.records.insert(store, record, key, tuple)?
        } else {
            self.records.update(store, record, key, tuple)?
        };
        self.finish_split(store, nodes, record, split)?;
        Ok(inserted)
    }

    /// Remove and return the tuple stored under `key`.
    ///
    /// A record block left less than half full absorbs its right neighbour
    /// when both hang off the same leaf and fit together; the leaf drops
    /// the separator between them. Index nodes never shrink.
    pub fn remove(&self, store: &mut dyn PageStore, key: &Tuple) -> Result<Tuple> {
        let path = self.search_path(store, key)?;
        let (record, nodes) = split_path(&path)?;
        let removed = self.records.remove(store, record, key)?;
        if let Some(&leaf) = nodes.last() {
            self.absorb_right(store, leaf, record)?;
        }
        Ok(removed)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn find_key(&self, store: &mut dyn PageStore, key: &Tuple) -> Result<Option<Tuple>> {
        let path = self.search_path(store, key)?;
        let (record, _) = split_path(&path)?;
        self.records.find(store, record, key)
    }

    /// Tuples with keys below `key` (or equal, if `inclusive`).
    pub fn find_less(
        &self,
        store: &mut dyn PageStore,
        key: &Tuple,
        inclusive: bool,
    ) -> Result<Vec<Tuple>> {
        let hi = if inclusive {
            Bound::Included(key)
        } else {
            Bound::Excluded(key)
        };
        self.find_range(store, Bound::Unbounded, hi)
    }

    /// Tuples with keys above `key` (or equal, if `inclusive`).
    pub fn find_greater(
        &self,
        store: &mut dyn PageStore,
        key: &Tuple,
        inclusive: bool,
    ) -> Result<Vec<Tuple>> {
        let lo = if inclusive {
            Bound::Included(key)
        } else {
            Bound::Excluded(key)
        };
        self.find_range(store, lo, Bound::Unbounded)
    }

    /// Tuples whose keys lie between `lo` and `hi`, in key order.
    ///
    /// Starts at the record block covering `lo` and follows the record
    /// chain until a key passes `hi`. An inverted range is empty.
    pub fn find_range(
        &self,
        store: &mut dyn PageStore,
        lo: Bound<&Tuple>,
        hi: Bound<&Tuple>,
    ) -> Result<Vec<Tuple>> {
        if is_empty_range(lo, hi) {
            return Ok(Vec::new());
        }

        let mut next = Some(match lo {
            Bound::Included(key) | Bound::Excluded(key) => {
                let path = self.search_path(store, key)?;
                split_path(&path)?.0
            }
            Bound::Unbounded => self.first_record_block(store)?,
        });

        let mut out = Vec::new();
        while let Some(block) = next {
            let rb = self.records.read(store, block)?;
            for tuple in rb.tuples {
                let key = self.records.key_of(&tuple);
                if !above_lower(&key, lo) {
                    continue;
                }
                if !below_upper(&key, hi) {
                    return Ok(out);
                }
                out.push(tuple);
            }
            next = rb.next;
        }
        Ok(out)
    }

    /// Every tuple in key order.
    pub fn scan(&self, store: &mut dyn PageStore) -> Result<Vec<Tuple>> {
        self.find_range(store, Bound::Unbounded, Bound::Unbounded)
    }

    /// Every node and record block reachable from the root.
    pub fn reachable_blocks(&self, store: &mut dyn PageStore) -> Result<BTreeSet<BlockNum>> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![self.root];

        while let Some(block) = stack.pop() {
            if !seen.insert(block) {
                continue;
            }
            let node = self.read_node(store, block)?;
            if let Some(sibling) = node.right_sibling {
                stack.push(sibling);
            }
            if node.is_leaf {
                for &record in &node.children {
                    self.collect_chain(store, record, &mut seen)?;
                }
            } else {
                stack.extend(node.children.iter().copied());
            }
        }
        Ok(seen)
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn read_node(&self, store: &mut dyn PageStore, block: BlockNum) -> Result<Node> {
        let page = store.read(block)?;
        Node::from_page(block, &page)
    }

    fn write_node(&self, store: &mut dyn PageStore, block: BlockNum, node: &Node) -> Result<()> {
        store.write(block, &*node.to_page()?)
    }

    /// Full nodes split. A node always keeps at least three keys so that
    /// both halves of a split are non-empty.
    fn is_full(&self, node: &Node) -> bool {
        node.encoded_len() > self.fill_limit && node.keys.len() >= 3
    }

    fn first_record_block(&self, store: &mut dyn PageStore) -> Result<BlockNum> {
        let mut block = self.root;
        loop {
            let node = self.read_node(store, block)?;
            let first = node.children[0];
            if node.is_leaf {
                return Ok(first);
            }
            block = first;
        }
    }

    fn collect_chain(
        &self,
        store: &mut dyn PageStore,
        first: BlockNum,
        seen: &mut BTreeSet<BlockNum>,
    ) -> Result<()> {
        let mut next = Some(first);
        while let Some(block) = next {
            if !seen.insert(block) {
                return Ok(());
            }
            next = self.records.read(store, block)?.next;
        }
        Ok(())
    }

    fn finish_split(
        &self,
        store: &mut dyn PageStore,
        nodes: &[BlockNum],
        record: BlockNum,
        split: Option<(Tuple, BlockNum)>,
    ) -> Result<()> {
        match split {
            Some((separator, new_block)) => {
                self.bubble_split(store, nodes, record, separator, new_block)
            }
            None => Ok(()),
        }
    }

    /// Insert `(separator, right)` next to `left` one level up, splitting
    /// upward as long as nodes overflow.
    ///
    /// `path` holds the nodes visited on the way down, root first.
    fn bubble_split(
        &self,
        store: &mut dyn PageStore,
        path: &[BlockNum],
        mut left: BlockNum,
        mut separator: Tuple,
        mut right: BlockNum,
    ) -> Result<()> {
        let mut held: Option<NodeLatch<'_>> = None;

        for &start in path.iter().rev() {
            let (latch, block, mut node) = self.locate(store, start, left)?;
            held = Some(latch);

            node.insert_child(separator, right);
            if !self.is_full(&node) {
                return self.write_node(store, block, &node);
            }
            if block == self.root {
                return self.split_root(store, node);
            }

            let new_block = store.allocate()?;
            let (up, sibling) = node.split_off(new_block);
            self.write_node(store, new_block, &sibling)?;
            self.write_node(store, block, &node)?;
            debug!(
                %block,
                %new_block,
                leaf = node.is_leaf,
                "index node split"
            );

            left = block;
            separator = up;
            right = new_block;
        }

        drop(held);
        Err(Error::corrupted(self.root, "split propagated past the root"))
    }

    /// Merge an underfull `record` with the next record block under the
    /// same leaf.
    fn absorb_right(
        &self,
        store: &mut dyn PageStore,
        leaf: BlockNum,
        record: BlockNum,
    ) -> Result<()> {
        let rb = self.records.read(store, record)?;
        if !self.records.is_less(rb.encoded_len()) {
            return Ok(());
        }

        let (_latch, block, mut node) = self.locate(store, leaf, record)?;
        let Some(slot) = node.children.iter().position(|&c| c == record) else {
            return Ok(());
        };
        let Some(&neighbour) = node.children.get(slot + 1) else {
            return Ok(());
        };
        if rb.next != Some(neighbour) {
            return Err(Error::corrupted(
                record,
                format!("record chain skips leaf child {neighbour}"),
            ));
        }

        if self.records.merge(store, record)?.is_none() {
            return Ok(());
        }
        node.keys.remove(slot);
        node.children.remove(slot + 1);
        self.write_node(store, block, &node)
    }

    /// Latch the node on `start`'s level whose children include `left`,
    /// moving right from `start` as needed.
    fn locate(
        &self,
        store: &mut dyn PageStore,
        start: BlockNum,
        left: BlockNum,
    ) -> Result<(NodeLatch<'_>, BlockNum, Node)> {
        let mut block = start;
        let mut latch = self.latches.lock(block);
        loop {
            let node = self.read_node(store, block)?;
            if node.children.contains(&left) {
                return Ok((latch, block, node));
            }
            let Some(sibling) = node.right_sibling else {
                return Err(Error::corrupted(
                    start,
                    format!("no entry for child {left} on this level"),
                ));
            };
            latch = self.latches.lock(sibling);
            block = sibling;
        }
    }

    /// Split the root in place: both halves move to new blocks and the
    /// root becomes their parent.
    fn split_root(&self, store: &mut dyn PageStore, mut node: Node) -> Result<()> {
        let left_block = store.allocate()?;
        let right_block = store.allocate()?;
        let (separator, right) = node.split_off(right_block);

        self.write_node(store, right_block, &right)?;
        self.write_node(store, left_block, &node)?;
        self.write_node(
            store,
            self.root,
            &Node::new_root(separator, left_block, right_block),
        )?;
        debug!(
            root = %self.root,
            %left_block,
            %right_block,
            "index root split"
        );
        Ok(())
    }
}

/// Split a search path into its record block and the nodes above it.
fn split_path(path: &[BlockNum]) -> Result<(BlockNum, &[BlockNum])> {
    match path.split_last() {
        Some((&record, nodes)) => Ok((record, nodes)),
        None => Err(Error::malformed("empty search path")),
    }
}

fn above_lower(key: &Tuple, lo: Bound<&Tuple>) -> bool {
    match lo {
        Bound::Included(b) => key >= b,
        Bound::Excluded(b) => key > b,
        Bound::Unbounded => true,
    }
}

fn below_upper(key: &Tuple, hi: Bound<&Tuple>) -> bool {
    match hi {
        Bound::Included(b) => key <= b,
        Bound::Excluded(b) => key < b,
        Bound::Unbounded => true,
    }
}

fn is_empty_range(lo: Bound<&Tuple>, hi: Bound<&Tuple>) -> bool {
    match (lo, hi) {
        (Bound::Included(l), Bound::Included(h)) => l > h,
        (Bound::Included(l), Bound::Excluded(h))
        | (Bound::Excluded(l), Bound::Included(h))
        | (Bound::Excluded(l), Bound::Excluded(h)) => l >= h,
        _ => false,
    }
}
