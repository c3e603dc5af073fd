mod buffer;

pub use buffer::PageBuf;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use crate::core::errors::PageError;

// Label layout (little-endian), offsets in bytes:
//   0: page_type (u16)
//   2: format (u16)     - layout revision of this page type
//   4: page_size (u32)  - total page length including the label
pub const LABEL_SIZE: usize = 8;
const LABEL_TYPE: usize = 0;
const LABEL_FORMAT: usize = 2;
const LABEL_SIZE_OFF: usize = 4;

pub const PAGE_FORMAT: u16 = 0;

/// Page identifier assigned by the sink when a page is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum PageType {
    Data = 1,
    BTreeIndex = 13,
}

impl PageType {
    pub fn from_u16(v: u16) -> Result<Self, PageError> {
        match v {
            1 => Ok(PageType::Data),
            13 => Ok(PageType::BTreeIndex),
            other => Err(PageError::Corrupt(format!("unknown page type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub page_type: PageType,
    pub format: u16,
    pub size: u32,
}

impl Label {
    pub fn new(page_type: PageType, size: usize) -> Self {
        let size = u32::try_from(size)
            .unwrap_or_else(|_| panic!("page size does not fit the label: {size}"));
        Self {
            page_type,
            format: PAGE_FORMAT,
            size,
        }
    }

    pub fn write(&self, buf: &mut PageBuf) {
        buf.put_u16(self.page_type as u16);
        buf.put_u16(self.format);
        buf.put_u32(self.size);
    }

    pub fn read(buf: &[u8]) -> Result<Self, PageError> {
        if buf.len() < LABEL_SIZE {
            return Err(PageError::Corrupt(format!(
                "page too small for label: {}",
                buf.len()
            )));
        }
        Ok(Self {
            page_type: PageType::from_u16(read_u16(buf, LABEL_TYPE)?)?,
            format: read_u16(buf, LABEL_FORMAT)?,
            size: read_u32(buf, LABEL_SIZE_OFF)?,
        })
    }
}

pub(crate) fn read_u8(buf: &[u8], off: usize) -> Result<u8, PageError> {
    buf.get(off)
        .copied()
        .ok_or_else(|| PageError::Corrupt("read_u8 out of bounds".into()))
}

pub(crate) fn read_u16(buf: &[u8], off: usize) -> Result<u16, PageError> {
    let mut rdr = std::io::Cursor::new(slice_at(buf, off, 2, "read_u16")?);
    rdr.read_u16::<LittleEndian>()
        .map_err(|e| PageError::Corrupt(e.to_string()))
}

pub(crate) fn read_u32(buf: &[u8], off: usize) -> Result<u32, PageError> {
    let mut rdr = std::io::Cursor::new(slice_at(buf, off, 4, "read_u32")?);
    rdr.read_u32::<LittleEndian>()
        .map_err(|e| PageError::Corrupt(e.to_string()))
}

pub(crate) fn read_u64(buf: &[u8], off: usize) -> Result<u64, PageError> {
    let mut rdr = std::io::Cursor::new(slice_at(buf, off, 8, "read_u64")?);
    rdr.read_u64::<LittleEndian>()
        .map_err(|e| PageError::Corrupt(e.to_string()))
}

pub(crate) fn slice_at<'a>(
    buf: &'a [u8],
    off: usize,
    len: usize,
    what: &str,
) -> Result<&'a [u8], PageError> {
    off.checked_add(len)
        .and_then(|end| buf.get(off..end))
        .ok_or_else(|| {
            PageError::Corrupt(format!(
                "{what} out of bounds: off={off} len={len} buf_len={}",
                buf.len()
            ))
        })
}
