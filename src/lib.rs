mod core;
mod storage;

pub use crate::core::cell::Cell;
pub use crate::core::errors::{IndexError, PageError};
pub use crate::core::layout::{ColumnLayout, GroupId, GroupLayout, DATA_REF_SIZE, FIXED_KEY_SIZE_NONE};
pub use crate::storage::btree::{
    Child, IndexBuilder, IndexBuilderConfig, IndexRoot, NodePage, NodeWriter, CHILD_SIZE,
    HEADER_SIZE, OFFSET_SIZE,
};
pub use crate::storage::page::{Label, PageBuf, PageId, PageType, LABEL_SIZE, PAGE_FORMAT};
pub use crate::storage::sink::{FilePageSink, MemoryPageSink, PageSink, StoredPage};
