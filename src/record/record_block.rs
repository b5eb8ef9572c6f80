//! On-page layout of a record block.

use crate::common::codec::{ByteReader, ByteWriter};
use crate::common::config::BLOCK_BODY_SIZE;
use crate::common::{BlockNum, Error, Result};
use crate::storage::page::{Page, PageType};
use crate::tuple::Tuple;

/// Decoded contents of one record block.
///
/// # Layout (after the page header)
/// ```text
/// ┌──────────────────────┬─────────────────┬──────────┬─────┐
/// │ next (i64, -1 = end) │ tuple_count u32 │ tuple 0  │ ... │
/// └──────────────────────┴─────────────────┴──────────┴─────┘
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBlock {
    pub next: Option<BlockNum>,
    /// Sorted by key.
    pub tuples: Vec<Tuple>,
}

impl RecordBlock {
    pub(crate) const HEADER_LEN: usize = 8 + 4;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn encoded_len(&self) -> usize {
        Self::HEADER_LEN + self.tuples.iter().map(Tuple::encoded_len).sum::<usize>()
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
        w.put_i64(BlockNum::encode_link(self.next));
        w.put_u32(self.tuples.len() as u32);
        for tuple in &self.tuples {
            tuple.encode(&mut w);
        }

        let mut page = Page::with_type(PageType::Record);
        page.body_mut()[..len].copy_from_slice(w.as_slice());
        Ok(page)
    }

    pub fn from_page(block: BlockNum, page: &Page) -> Result<Self> {
        let page_type = page.header().page_type;
        if page_type != PageType::Record {
            return Err(Error::corrupted(
                block,
                format!("expected a record block, found {page_type:?}"),
            ));
        }

        let mut r = ByteReader::new(page.body());
        let next = BlockNum::decode_link(r.get_i64()?);
        let count = r.get_u32()? as usize;
        if count > r.remaining() {
            return Err(Error::corrupted(block, "tuple count exceeds block"));
        }
        let tuples = (0..count)
            .map(|_| Tuple::decode(&mut r))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { next, tuples })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple;

    #[test]
    fn test_layout() {
        let block = RecordBlock {
            next: Some(BlockNum::new(9)),
            tuples: vec![tuple![1]],
        };
        let page = block.to_page().unwrap();

        assert_eq!(page.header().page_type, PageType::Record);
        assert_eq!(&page.body()[..8], &9i64.to_le_bytes());
        assert_eq!(&page.body()[8..12], &1u32.to_le_bytes());
        assert_eq!(RecordBlock::from_page(BlockNum::new(4), &page).unwrap(), block);
    }

    #[test]
    fn test_end_of_chain() {
        let page = RecordBlock::new().to_page().unwrap();
        assert_eq!(&page.body()[..8], &(-1i64).to_le_bytes());
        assert_eq!(
            RecordBlock::from_page(BlockNum::new(4), &page).unwrap().next,
            None
        );
    }

    #[test]
    fn test_wrong_page_type_is_corruption() {
        let page = Page::with_type(PageType::IndexLeaf);
        assert!(matches!(
            RecordBlock::from_page(BlockNum::new(4), &page),
            Err(Error::Corrupted { .. })
        ));
    }
}
