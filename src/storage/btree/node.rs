use serde::{Deserialize, Serialize};

use crate::core::errors::PageError;
use crate::storage::page::{read_u32, read_u64, PageBuf, PageId, LABEL_SIZE};

// Index page layout (little-endian, packed), following the 8-byte label:
//   header:   keys_count (u32), keys_size (u32), fixed_key_size (u8, 0xFF = not fixed)
//   offsets:  variable format only, keys_count x u32 offset into the key data region
//   keys:     keys_size bytes of serialized keys
//   children: (keys_count + 1) x child pointer
pub const HEADER_SIZE: usize = 4 + 4 + 1;
pub const OFFSET_SIZE: usize = 4;
pub const CHILD_SIZE: usize = 4 + 8 + 8 + 8;

pub(crate) const HDR_KEYS_COUNT: usize = LABEL_SIZE;
pub(crate) const HDR_KEYS_SIZE: usize = LABEL_SIZE + 4;
pub(crate) const HDR_FIXED_KEY_SIZE: usize = LABEL_SIZE + 8;

/// Pointer to a subtree, carrying cumulative counters.
///
/// Inside the tree every counter is a running total over all data pages reachable
/// through this child and all of its left siblings, so the last child of the root
/// holds the totals for the whole part. When handed to `IndexBuilder::add_child` the
/// counters are the data page's own values instead; the builder accumulates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Child {
    pub page_id: PageId,
    pub row_count: u64,
    pub erased_row_count: u64,
    pub data_size: u64,
}

impl Child {
    pub fn new(page_id: PageId, row_count: u64, erased_row_count: u64, data_size: u64) -> Self {
        Self {
            page_id,
            row_count,
            erased_row_count,
            data_size,
        }
    }

    pub(crate) fn write(&self, buf: &mut PageBuf) {
        buf.put_u32(self.page_id.0);
        buf.put_u64(self.row_count);
        buf.put_u64(self.erased_row_count);
        buf.put_u64(self.data_size);
    }

    pub(crate) fn read(buf: &[u8], off: usize) -> Result<Self, PageError> {
        Ok(Self {
            page_id: PageId(read_u32(buf, off)?),
            row_count: read_u64(buf, off + 4)?,
            erased_row_count: read_u64(buf, off + 12)?,
            data_size: read_u64(buf, off + 20)?,
        })
    }
}

pub(crate) fn to_u32(v: usize, what: &str) -> u32 {
    u32::try_from(v).unwrap_or_else(|_| panic!("{what} does not fit u32: {v}"))
}
