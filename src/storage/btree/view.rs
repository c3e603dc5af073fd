use crate::core::cell::Cell;
use crate::core::errors::PageError;
use crate::core::layout::{GroupLayout, FIXED_KEY_SIZE_NONE};
use crate::storage::page::{read_u32, read_u8, slice_at, Label, PageType, LABEL_SIZE};

use super::node::{
    Child, CHILD_SIZE, HDR_FIXED_KEY_SIZE, HDR_KEYS_COUNT, HDR_KEYS_SIZE, HEADER_SIZE, OFFSET_SIZE,
};

/// Read-only view over a serialized index page.
///
/// `open` validates the whole layout up front, so accessors only fail on indices out of
/// range or on key bytes that do not match the layout they are decoded with.
#[derive(Debug, Clone, Copy)]
pub struct NodePage<'a> {
    buf: &'a [u8],
    keys_count: usize,
    keys_size: usize,
    fixed_key_size: Option<usize>,
    keys_start: usize,
    children_start: usize,
}

impl<'a> NodePage<'a> {
    pub fn open(buf: &'a [u8]) -> Result<Self, PageError> {
        let label = Label::read(buf)?;
        if label.page_type != PageType::BTreeIndex {
            return Err(PageError::Corrupt(format!(
                "unexpected page type: {:?}",
                label.page_type
            )));
        }
        if label.size as usize != buf.len() {
            return Err(PageError::Corrupt(format!(
                "label size mismatch: label={} buf_len={}",
                label.size,
                buf.len()
            )));
        }

        let keys_count = read_u32(buf, HDR_KEYS_COUNT)? as usize;
        let keys_size = read_u32(buf, HDR_KEYS_SIZE)? as usize;
        let fixed = read_u8(buf, HDR_FIXED_KEY_SIZE)?;
        let fixed_key_size = (fixed != FIXED_KEY_SIZE_NONE).then_some(fixed as usize);

        let offsets_len = match fixed_key_size {
            Some(size) => {
                if keys_count.checked_mul(size) != Some(keys_size) {
                    return Err(PageError::Corrupt(format!(
                        "fixed keys size mismatch: count={keys_count} size={size} total={keys_size}"
                    )));
                }
                0
            }
            None => checked_mul(keys_count, OFFSET_SIZE)?,
        };
        let keys_start = checked_add(LABEL_SIZE + HEADER_SIZE, offsets_len)?;
        let children_start = checked_add(keys_start, keys_size)?;
        let expected = checked_add(children_start, checked_mul(keys_count + 1, CHILD_SIZE)?)?;
        if expected != buf.len() {
            return Err(PageError::Corrupt(format!(
                "page length mismatch: expected={expected} actual={}",
                buf.len()
            )));
        }

        let page = Self {
            buf,
            keys_count,
            keys_size,
            fixed_key_size,
            keys_start,
            children_start,
        };
        page.validate_offsets()?;
        Ok(page)
    }

    pub fn keys_count(&self) -> usize {
        self.keys_count
    }

    pub fn keys_size(&self) -> usize {
        self.keys_size
    }

    pub fn children_count(&self) -> usize {
        self.keys_count + 1
    }

    pub fn fixed_key_size(&self) -> Option<usize> {
        self.fixed_key_size
    }

    pub fn is_fixed_format(&self) -> bool {
        self.fixed_key_size.is_some()
    }

    pub fn key_bytes(&self, index: usize) -> Result<&'a [u8], PageError> {
        let (start, end) = self.key_range(index)?;
        Ok(&self.buf[self.keys_start + start..self.keys_start + end])
    }

    /// Decode key `index` into one cell per key column of `layout`.
    pub fn key_cells(&self, index: usize, layout: &GroupLayout) -> Result<Vec<Cell<'a>>, PageError> {
        let key = self.key_bytes(index)?;
        if self.fixed_key_size != layout.fixed_key_size() {
            return Err(PageError::Corrupt(format!(
                "page fixed key size {:?} does not match layout {:?}",
                self.fixed_key_size,
                layout.fixed_key_size()
            )));
        }

        let mut cells = Vec::with_capacity(layout.columns().len());
        if self.is_fixed_format() {
            let mut pos = 0;
            for column in layout.columns() {
                let size = column.fixed_size as usize;
                cells.push(Cell::Bytes(slice_at(key, pos, size, "fixed cell")?));
                pos += size;
            }
            return Ok(cells);
        }

        let bitmap = slice_at(key, 0, layout.null_bitmap_size(), "null bitmap")?;
        let mut pos = bitmap.len();
        for (i, column) in layout.columns().iter().enumerate() {
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                cells.push(Cell::Null);
                continue;
            }
            if column.is_fixed {
                let size = column.fixed_size as usize;
                cells.push(Cell::Bytes(slice_at(key, pos, size, "fixed cell")?));
                pos += size;
            } else {
                let offset = read_u32(key, pos)? as usize;
                let size = read_u32(key, pos + 4)? as usize;
                let data_start = checked_add(pos, offset)?;
                cells.push(Cell::Bytes(slice_at(key, data_start, size, "variable cell")?));
                pos += column.slot_size();
            }
        }
        Ok(cells)
    }

    pub fn child(&self, index: usize) -> Result<Child, PageError> {
        if index > self.keys_count {
            return Err(PageError::Corrupt(format!(
                "child index out of bounds: {index} (children={})",
                self.children_count()
            )));
        }
        Child::read(self.buf, self.children_start + index * CHILD_SIZE)
    }

    pub fn children(&self) -> Result<Vec<Child>, PageError> {
        (0..self.children_count()).map(|i| self.child(i)).collect()
    }

    fn key_range(&self, index: usize) -> Result<(usize, usize), PageError> {
        if index >= self.keys_count {
            return Err(PageError::Corrupt(format!(
                "key index out of bounds: {index} (keys={})",
                self.keys_count
            )));
        }
        if let Some(size) = self.fixed_key_size {
            return Ok((index * size, (index + 1) * size));
        }
        let start = self.offset(index)?;
        let end = if index + 1 < self.keys_count {
            self.offset(index + 1)?
        } else {
            self.keys_size
        };
        Ok((start, end))
    }

    fn offset(&self, index: usize) -> Result<usize, PageError> {
        Ok(read_u32(self.buf, LABEL_SIZE + HEADER_SIZE + index * OFFSET_SIZE)? as usize)
    }

    fn validate_offsets(&self) -> Result<(), PageError> {
        if self.is_fixed_format() {
            return Ok(());
        }
        let mut prev = 0usize;
        for i in 0..self.keys_count {
            let off = self.offset(i)?;
            if (i == 0 && off != 0) || off < prev || off > self.keys_size {
                return Err(PageError::Corrupt(format!(
                    "key offset {i} out of order: off={off} prev={prev} keys_size={}",
                    self.keys_size
                )));
            }
            prev = off;
        }
        Ok(())
    }
}

fn checked_add(a: usize, b: usize) -> Result<usize, PageError> {
    a.checked_add(b)
        .ok_or_else(|| PageError::Corrupt("page size overflow".into()))
}

fn checked_mul(a: usize, b: usize) -> Result<usize, PageError> {
    a.checked_mul(b)
        .ok_or_else(|| PageError::Corrupt("page size overflow".into()))
}
