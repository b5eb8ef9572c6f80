//! B-link tree nodes and their on-page layout.

use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::config::BLOCK_BODY_SIZE;
use crate::common::{BlockNum, Error, Result};
use crate::storage::page::{Page, PageType};
use crate::tuple::Tuple;

/// One index node.
///
/// `children[i]` covers keys in `[keys[i - 1], keys[i])`, where the outer
/// bounds are the node's low bound (the separator its parent holds for it)
/// and `high_key`. A leaf's children are record blocks; an internal node's
/// children are nodes one level down.
///
/// # Layout (after the page header)
/// ```text
/// ┌─────────┬───────────────┬───────────┬──────┬─────────────┬──────────┬──────────┬───────────┐
/// │ is_leaf │ right_sibling │ key_count │ keys │ child_count │ children │ has_high │ high_key? │
/// │   u8    │ i64 (-1=none) │    u32    │      │     u32     │ i64 each │    u8    │           │
/// └─────────┴───────────────┴───────────┴──────┴─────────────┴──────────┴──────────┴───────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub is_leaf: bool,
    pub right_sibling: Option<BlockNum>,
    /// Strictly increasing.
    pub keys: Vec<Tuple>,
    /// Always `keys.len() + 1` entries.
    pub children: Vec<BlockNum>,
    /// Exclusive upper bound; `None` on the rightmost node of a level.
    pub high_key: Option<Tuple>,
}

impl Node {
    const FIXED_LEN: usize = 1 + 8 + 4 + 4 + 1;

    /// A leaf with no keys over a single record block.
    pub fn empty_leaf(record: BlockNum) -> Self {
        Self {
            is_leaf: true,
            right_sibling: None,
            keys: Vec::new(),
            children: vec![record],
            high_key: None,
        }
    }

    /// A root over two halves of a split.
    pub fn new_root(separator: Tuple, left: BlockNum, right: BlockNum) -> Self {
        Self {
            is_leaf: false,
            right_sibling: None,
            keys: vec![separator],
            children: vec![left, right],
            high_key: None,
        }
    }

    /// Number of keys `<= key`; also the slot of the child covering `key`.
    ///
    /// For keys `|1 3 5 7 9|`, key 5 selects slot 3 and key 4 selects slot 2.
    pub fn search_less_or_eq_key(&self, key: &Tuple) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    /// The child covering `key`, ignoring the high key.
    pub fn child_for(&self, key: &Tuple) -> BlockNum {
        self.children[self.search_less_or_eq_key(key)]
    }

    /// Whether `key` is below this node's high key.
    pub fn covers(&self, key: &Tuple) -> bool {
        self.high_key.as_ref().map_or(true, |high| key < high)
    }

    /// Add the right half of a child split: `separator` and the new block
    /// to the right of the child that covered it.
    pub fn insert_child(&mut self, separator: Tuple, right: BlockNum) {
        let slot = self.search_less_or_eq_key(&separator);
        self.keys.insert(slot, separator);
        self.children.insert(slot + 1, right);
    }

    /// Move the upper half of this node into a new node stored at
    /// `new_block`, linked as this node's right sibling.
    ///
    /// Returns the separator (the new node's low bound) and the new node.
    /// The separator moves up; neither half keeps it as a key.
    pub fn split_off(&mut self, new_block: BlockNum) -> (Tuple, Node) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let separator = self.keys.pop().unwrap_or_default();

        let right = Node {
            is_leaf: self.is_leaf,
            right_sibling: self.right_sibling,
            keys: right_keys,
            children: right_children,
            high_key: self.high_key.take(),
        };
        self.right_sibling = Some(new_block);
        self.high_key = Some(separator.clone());
        (separator, right)
    }

    pub fn encoded_len(&self) -> usize {
        Self::FIXED_LEN
            + self.keys.iter().map(Tuple::encoded_len).sum::<usize>()
            + 8 * self.children.len()
            + self.high_key.as_ref().map_or(0, Tuple::encoded_len)
    }

    pub fn page_type(&self) -> PageType {
        if self.is_leaf {
            PageType::IndexLeaf
        } else {
            PageType::IndexInternal
        }
    }

    pub fn to_page(&self) -> Result<Box<Page>> {
        let len = self.encoded_len();
        if len > BLOCK_BODY_SIZE {
            return Err(Error::TupleTooLarge {
                size: len,
                max: BLOCK_BODY_SIZE,
            });
        }

        let mut w = ByteWriter::with_capacity(len);
        w.put_u8(self.is_leaf as u8);
        w.put_i64(BlockNum::encode_link(self.right_sibling));
        w.put_u32(self.keys.len() as u32);
        for key in &self.keys {
            key.encode(&mut w);
        }
        w.put_u32(self.children.len() as u32);
        for child in &self.children {
            w.put_i64(child.0 as i64);
        }
        match &self.high_key {
            Some(high) => {
                w.put_u8(1);
                high.encode(&mut w);
            }
            None => w.put_u8(0),
        }

        let mut page = Page::with_type(self.page_type());
        page.body_mut()[..len].copy_from_slice(w.as_slice());
        Ok(page)
    }

    pub fn from_page(block: BlockNum, page: &Page) -> Result<Self> {
        let page_type = page.header().page_type;
        if !matches!(page_type, PageType::IndexLeaf | PageType::IndexInternal) {
            return Err(Error::corrupted(
                block,
                format!("expected an index node, found {page_type:?}"),
            ));
        }

        let mut r = ByteReader::new(page.body());
        let is_leaf = r.get_u8()? != 0;
        if is_leaf != (page_type == PageType::IndexLeaf) {
            return Err(Error::corrupted(block, "leaf flag disagrees with page type"));
        }
        let right_sibling = BlockNum::decode_link(r.get_i64()?);

        let key_count = r.get_u32()? as usize;
        if key_count > r.remaining() {
            return Err(Error::corrupted(block, "key count exceeds block"));
        }
        let keys = (0..key_count)
            .map(|_| Tuple::decode(&mut r))
            .collect::<Result<Vec<_>>>()?;

        let child_count = r.get_u32()? as usize;
        if child_count != key_count + 1 {
            return Err(Error::corrupted(
                block,
                format!("{key_count} keys but {child_count} children"),
            ));
        }
        let children = (0..child_count)
            .map(|_| {
                BlockNum::decode_link(r.get_i64()?)
                    .ok_or_else(|| Error::corrupted(block, "negative child pointer"))
            })
            .collect::<Result<Vec<_>>>()?;

        let high_key = match r.get_u8()? {
            0 => None,
            _ => Some(Tuple::decode(&mut r)?),
        };

        Ok(Self {
            is_leaf,
            right_sibling,
            keys,
            children,
            high_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple;

    fn internal(keys: &[i32]) -> Node {
        Node {
            is_leaf: false,
            right_sibling: None,
            keys: keys.iter().map(|&k| tuple![k]).collect(),
            children: (0..=keys.len() as u32).map(|i| BlockNum::new(100 + i)).collect(),
            high_key: None,
        }
    }

    #[test]
    fn test_search_less_or_eq_key() {
        let node = internal(&[1, 3, 5, 7, 9]);
        assert_eq!(node.search_less_or_eq_key(&tuple![5]), 3);
        assert_eq!(node.search_less_or_eq_key(&tuple![4]), 2);
        assert_eq!(node.search_less_or_eq_key(&tuple![0]), 0);
        assert_eq!(node.search_less_or_eq_key(&tuple![9]), 5);
        assert_eq!(node.child_for(&tuple![5]), BlockNum::new(103));
    }

    #[test]
    fn test_insert_child_keeps_order() {
        let mut node = internal(&[10, 30]);
        node.insert_child(tuple![20], BlockNum::new(7));

        assert_eq!(node.keys, vec![tuple![10], tuple![20], tuple![30]]);
        assert_eq!(
            node.children,
            vec![
                BlockNum::new(100),
                BlockNum::new(101),
                BlockNum::new(7),
                BlockNum::new(102)
            ]
        );
    }

    #[test]
    fn test_split_off_links_halves() {
        let mut left = internal(&[1, 2, 3, 4, 5]);
        left.right_sibling = Some(BlockNum::new(50));
        left.high_key = Some(tuple![6]);

        let (separator, right) = left.split_off(BlockNum::new(60));

        assert_eq!(separator, tuple![3]);
        assert_eq!(left.keys, vec![tuple![1], tuple![2]]);
        assert_eq!(left.children.len(), 3);
        assert_eq!(left.high_key, Some(tuple![3]));
        assert_eq!(left.right_sibling, Some(BlockNum::new(60)));

        assert_eq!(right.keys, vec![tuple![4], tuple![5]]);
        assert_eq!(right.children, vec![BlockNum::new(103), BlockNum::new(104), BlockNum::new(105)]);
        assert_eq!(right.high_key, Some(tuple![6]));
        assert_eq!(right.right_sibling, Some(BlockNum::new(50)));
    }

    #[test]
    fn test_covers() {
        let mut node = internal(&[1]);
        assert!(node.covers(&tuple![1000]));
        node.high_key = Some(tuple![10]);
        assert!(node.covers(&tuple![9]));
        assert!(!node.covers(&tuple![10]));
    }

    #[test]
    fn test_page_layout() {
        let mut node = Node::empty_leaf(BlockNum::new(4));
        node.insert_child(tuple![8], BlockNum::new(9));
        node.high_key = Some(tuple![20]);
        node.right_sibling = Some(BlockNum::new(11));

        let page = node.to_page().unwrap();
        assert_eq!(page.header().page_type, PageType::IndexLeaf);
        assert_eq!(page.body()[0], 1);
        assert_eq!(&page.body()[1..9], &11i64.to_le_bytes());
        assert_eq!(Node::from_page(BlockNum::new(5), &page).unwrap(), node);

        // An int key is 9 bytes, a child 8.
        assert_eq!(Node::empty_leaf(BlockNum::new(4)).encoded_len(), 18 + 8);
        assert_eq!(internal(&[1, 2]).encoded_len(), 26 + 2 * 17);
    }

    #[test]
    fn test_record_page_is_not_a_node() {
        let page = Page::with_type(PageType::Record);
        assert!(matches!(
            Node::from_page(BlockNum::new(5), &page),
            Err(Error::Corrupted { .. })
        ));
    }
}
