use std::sync::Arc;

use crate::core::cell::Cell;
use crate::core::layout::{GroupLayout, FIXED_KEY_SIZE_NONE};
use crate::storage::page::{Label, PageBuf, PageType, LABEL_SIZE};

use super::node::{to_u32, Child, CHILD_SIZE, HEADER_SIZE, OFFSET_SIZE};

/// Serializes a single B-tree index page.
///
/// Keys and children are buffered until `finish`, which lays the page out as
/// label, header, (offsets), key data, children. The writer knows nothing about tree
/// levels; the builder decides which keys and children go into which page.
#[derive(Debug)]
pub struct NodeWriter {
    layout: Arc<GroupLayout>,
    keys: Vec<Vec<u8>>,
    keys_size: usize,
    children: Vec<Child>,
}

impl NodeWriter {
    pub fn new(layout: Arc<GroupLayout>) -> Self {
        Self {
            layout,
            keys: Vec::new(),
            keys_size: 0,
            children: Vec::new(),
        }
    }

    pub fn layout(&self) -> &GroupLayout {
        &self.layout
    }

    pub fn is_fixed_format(&self) -> bool {
        self.layout.is_fixed_format()
    }

    pub fn keys_count(&self) -> usize {
        self.keys.len()
    }

    pub fn keys_size(&self) -> usize {
        self.keys_size
    }

    pub fn children_count(&self) -> usize {
        self.children.len()
    }

    pub fn add_key(&mut self, key: &[Cell<'_>]) {
        let bytes = self.serialize_key(key);
        self.add_key_bytes(bytes);
    }

    /// Append a key already produced by `serialize_key`.
    pub fn add_key_bytes(&mut self, key: Vec<u8>) {
        if let Some(fixed) = self.layout.fixed_key_size() {
            assert_eq!(key.len(), fixed, "fixed-format key has wrong size");
        }
        self.keys_size += key.len();
        self.keys.push(key);
    }

    pub fn add_child(&mut self, child: Child) {
        self.children.push(child);
    }

    /// Encode one key exactly as it will appear in the key data region.
    pub fn serialize_key(&self, key: &[Cell<'_>]) -> Vec<u8> {
        let mut buf = PageBuf::with_size(self.calc_key_size(key));
        if self.layout.is_fixed_format() {
            self.place_fixed_key(&mut buf, key);
        } else {
            self.place_variable_key(&mut buf, key);
        }
        buf.into_inner()
    }

    pub fn calc_key_size(&self, key: &[Cell<'_>]) -> usize {
        self.check_key_arity(key);
        if let Some(fixed) = self.layout.fixed_key_size() {
            return fixed;
        }
        let mut size = self.layout.null_bitmap_size();
        for (i, column) in self.layout.columns().iter().enumerate() {
            if let Some(bytes) = cell_at(key, i).as_bytes() {
                size += column.slot_size();
                if !column.is_fixed {
                    size += bytes.len();
                }
            }
        }
        size
    }

    /// Page growth caused by one more key: the key itself, its offset entry and the
    /// child that comes with it.
    pub fn calc_key_size_with_meta(&self, key: &[Cell<'_>]) -> usize {
        self.calc_key_size(key) + self.offset_entry_size() + CHILD_SIZE
    }

    pub fn calc_page_size(&self, keys_size: usize, keys_count: usize) -> usize {
        LABEL_SIZE
            + HEADER_SIZE
            + keys_count * self.offset_entry_size()
            + keys_size
            + (keys_count + 1) * CHILD_SIZE
    }

    pub fn current_page_size(&self) -> usize {
        self.calc_page_size(self.keys_size, self.keys.len())
    }

    /// Serialize the pending keys and children into a page and clear them.
    pub fn finish(&mut self) -> Vec<u8> {
        assert!(!self.keys.is_empty(), "index page must hold at least one key");
        assert_eq!(
            self.children.len(),
            self.keys.len() + 1,
            "index page needs exactly one more child than keys"
        );

        let page_size = self.current_page_size();
        let mut buf = PageBuf::with_size(page_size);
        Label::new(PageType::BTreeIndex, page_size).write(&mut buf);

        buf.put_u32(to_u32(self.keys.len(), "keys count"));
        buf.put_u32(to_u32(self.keys_size, "keys size"));
        match self.layout.fixed_key_size() {
            Some(fixed) => buf.put_u8(fixed as u8),
            None => {
                buf.put_u8(FIXED_KEY_SIZE_NONE);
                let mut offset = 0usize;
                for key in &self.keys {
                    buf.put_u32(to_u32(offset, "key offset"));
                    offset += key.len();
                }
            }
        }

        let keys_start = buf.position();
        for key in self.keys.drain(..) {
            buf.put_slice(&key);
        }
        assert_eq!(
            buf.position() - keys_start,
            self.keys_size,
            "written key bytes differ from accumulated key size"
        );
        for child in self.children.drain(..) {
            child.write(&mut buf);
        }
        self.keys_size = 0;

        buf.into_inner()
    }

    pub fn ensure_empty(&self) {
        assert!(self.keys.is_empty(), "node writer has pending keys");
        assert_eq!(self.keys_size, 0, "node writer has pending key bytes");
        assert!(self.children.is_empty(), "node writer has pending children");
    }

    pub fn reset(&mut self) {
        self.keys.clear();
        self.keys_size = 0;
        self.children.clear();
    }

    fn offset_entry_size(&self) -> usize {
        if self.layout.is_fixed_format() {
            0
        } else {
            OFFSET_SIZE
        }
    }

    fn check_key_arity(&self, key: &[Cell<'_>]) {
        assert!(
            key.len() <= self.layout.columns().len(),
            "key has {} cells but the group has {} key columns",
            key.len(),
            self.layout.columns().len()
        );
    }

    fn place_fixed_key(&self, buf: &mut PageBuf, key: &[Cell<'_>]) {
        for (i, column) in self.layout.columns().iter().enumerate() {
            let Some(bytes) = cell_at(key, i).as_bytes() else {
                panic!("null cell in fixed-format key at column {i}");
            };
            assert_eq!(
                bytes.len(),
                column.fixed_size as usize,
                "cell size mismatch at fixed column {i}"
            );
            buf.put_slice(bytes);
        }
    }

    // Variable format: null bitmap, one slot per present column, then the tails of the
    // variable columns. A variable slot holds (offset, size) with the offset counted from
    // the start of that slot.
    fn place_variable_key(&self, buf: &mut PageBuf, key: &[Cell<'_>]) {
        let columns = self.layout.columns();
        let bitmap = buf.reserve(self.layout.null_bitmap_size());
        for i in 0..columns.len() {
            if cell_at(key, i).is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }

        let slots_end = buf.position()
            + columns
                .iter()
                .enumerate()
                .filter(|(i, _)| !cell_at(key, *i).is_null())
                .map(|(_, c)| c.slot_size())
                .sum::<usize>();

        let mut tail = slots_end;
        for (i, column) in columns.iter().enumerate() {
            let Some(bytes) = cell_at(key, i).as_bytes() else {
                continue;
            };
            if column.is_fixed {
                assert_eq!(
                    bytes.len(),
                    column.fixed_size as usize,
                    "cell size mismatch at fixed column {i}"
                );
                buf.put_slice(bytes);
            } else {
                let slot = buf.position();
                buf.put_u32(to_u32(tail - slot, "data ref offset"));
                buf.put_u32(to_u32(bytes.len(), "data ref size"));
                tail += bytes.len();
            }
        }
        assert_eq!(buf.position(), slots_end, "key slots overran their region");

        for (i, column) in columns.iter().enumerate() {
            if column.is_fixed {
                continue;
            }
            if let Some(bytes) = cell_at(key, i).as_bytes() {
                buf.put_slice(bytes);
            }
        }
    }
}

fn cell_at<'a>(key: &[Cell<'a>], index: usize) -> Cell<'a> {
    key.get(index).copied().unwrap_or(Cell::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::layout::{ColumnLayout, GroupId};
    use crate::storage::page::PageId;

    fn fixed_writer() -> NodeWriter {
        NodeWriter::new(Arc::new(GroupLayout::new(
            GroupId::new(1),
            vec![ColumnLayout::fixed(4), ColumnLayout::fixed(2)],
        )))
    }

    fn variable_writer() -> NodeWriter {
        NodeWriter::new(Arc::new(GroupLayout::new(
            GroupId::MAIN,
            vec![
                ColumnLayout::fixed(4),
                ColumnLayout::variable(),
                ColumnLayout::variable(),
            ],
        )))
    }

    #[test]
    fn fixed_key_is_plain_concatenation() {
        let writer = fixed_writer();
        let key = [Cell::Bytes(&[1, 2, 3, 4]), Cell::Bytes(&[5, 6])];
        assert_eq!(writer.serialize_key(&key), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(writer.calc_key_size(&key), 6);
        assert_eq!(writer.calc_key_size_with_meta(&key), 6 + CHILD_SIZE);
    }

    #[test]
    fn variable_key_has_bitmap_slots_and_tail() {
        let writer = variable_writer();
        let key = [Cell::Bytes(&[1, 2, 3, 4]), Cell::from("ab"), Cell::Null];
        let bytes = writer.serialize_key(&key);
        assert_eq!(
            bytes,
            vec![0b100, 1, 2, 3, 4, 8, 0, 0, 0, 2, 0, 0, 0, b'a', b'b']
        );
        assert_eq!(
            writer.calc_key_size_with_meta(&key),
            bytes.len() + OFFSET_SIZE + CHILD_SIZE
        );
    }

    #[test]
    fn short_key_pads_with_nulls() {
        let writer = variable_writer();
        let bytes = writer.serialize_key(&[Cell::Bytes(&[9, 9, 9, 9])]);
        assert_eq!(bytes, vec![0b110, 9, 9, 9, 9]);
        assert_eq!(writer.serialize_key(&[]), vec![0b111]);
    }

    #[test]
    #[should_panic(expected = "null cell in fixed-format key")]
    fn null_in_fixed_format_is_fatal() {
        let writer = fixed_writer();
        writer.serialize_key(&[Cell::Bytes(&[1, 2, 3, 4]), Cell::Null]);
    }

    #[test]
    #[should_panic(expected = "cell size mismatch")]
    fn wrong_fixed_width_is_fatal() {
        let writer = fixed_writer();
        writer.serialize_key(&[Cell::Bytes(&[1, 2, 3]), Cell::Bytes(&[5, 6])]);
    }

    #[test]
    fn fixed_page_layout() {
        let mut writer = fixed_writer();
        writer.add_child(Child::new(PageId(10), 1, 0, 100));
        writer.add_key(&[Cell::Bytes(&[0, 0, 0, 1]), Cell::Bytes(&[0, 2])]);
        writer.add_child(Child::new(PageId(11), 2, 1, 200));

        let expected_size = writer.current_page_size();
        assert_eq!(expected_size, LABEL_SIZE + HEADER_SIZE + 6 + 2 * CHILD_SIZE);

        let page = writer.finish();
        assert_eq!(page.len(), expected_size);
        // label
        assert_eq!(&page[..2], &[13, 0]);
        assert_eq!(&page[4..8], &(expected_size as u32).to_le_bytes());
        // header
        assert_eq!(&page[8..12], &1u32.to_le_bytes());
        assert_eq!(&page[12..16], &6u32.to_le_bytes());
        assert_eq!(page[16], 6);
        // keys then children
        assert_eq!(&page[17..23], &[0, 0, 0, 1, 0, 2]);
        assert_eq!(&page[23..27], &10u32.to_le_bytes());
        assert_eq!(&page[51..55], &11u32.to_le_bytes());

        writer.ensure_empty();
    }

    #[test]
    fn variable_page_has_offset_table() {
        let mut writer = variable_writer();
        writer.add_child(Child::new(PageId(1), 1, 0, 1));
        writer.add_key(&[Cell::Bytes(&[0, 0, 0, 1])]);
        writer.add_child(Child::new(PageId(2), 2, 0, 2));
        writer.add_key(&[Cell::Bytes(&[0, 0, 0, 2]), Cell::from("xyz")]);
        writer.add_child(Child::new(PageId(3), 3, 0, 3));

        let keys_size = writer.keys_size();
        assert_eq!(keys_size, 5 + 16);
        let page = writer.finish();
        assert_eq!(page.len(), writer.calc_page_size(keys_size, 2));
        assert_eq!(page[16], FIXED_KEY_SIZE_NONE);
        assert_eq!(&page[17..21], &0u32.to_le_bytes());
        assert_eq!(&page[21..25], &5u32.to_le_bytes());
    }

    #[test]
    #[should_panic(expected = "exactly one more child than keys")]
    fn finish_requires_closing_child() {
        let mut writer = fixed_writer();
        writer.add_child(Child::default());
        writer.add_key(&[Cell::Bytes(&[0, 0, 0, 1]), Cell::Bytes(&[0, 2])]);
        writer.finish();
    }

    #[test]
    #[should_panic(expected = "pending keys")]
    fn ensure_empty_detects_leftovers() {
        let mut writer = fixed_writer();
        writer.add_key(&[Cell::Bytes(&[0, 0, 0, 1]), Cell::Bytes(&[0, 2])]);
        writer.ensure_empty();
    }

    #[test]
    fn reset_discards_pending_state() {
        let mut writer = variable_writer();
        writer.add_child(Child::default());
        writer.add_key(&[Cell::Bytes(&[0, 0, 0, 1]), Cell::from("k")]);
        writer.reset();
        writer.ensure_empty();
        assert_eq!(writer.current_page_size(), LABEL_SIZE + HEADER_SIZE + CHILD_SIZE);
    }
}
