pub mod file;

pub use file::FilePageSink;

use crate::core::errors::IndexError;
use crate::core::layout::GroupId;
use crate::storage::page::{PageId, PageType};

/// Destination for finished pages.
///
/// The returned id must be usable as a child pointer as soon as the call returns.
/// Failures are the sink's to report; the builder does not retry.
pub trait PageSink {
    fn write_page(
        &mut self,
        page: Vec<u8>,
        page_type: PageType,
        group: GroupId,
    ) -> Result<PageId, IndexError>;
}

impl<S: PageSink + ?Sized> PageSink for &mut S {
    fn write_page(
        &mut self,
        page: Vec<u8>,
        page_type: PageType,
        group: GroupId,
    ) -> Result<PageId, IndexError> {
        (**self).write_page(page, page_type, group)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPage {
    pub page_type: PageType,
    pub group: GroupId,
    pub bytes: Vec<u8>,
}

/// Keeps written pages in memory; page ids are positions in write order.
#[derive(Debug, Default)]
pub struct MemoryPageSink {
    pages: Vec<StoredPage>,
}

impl MemoryPageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, id: PageId) -> Option<&StoredPage> {
        self.pages.get(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PageId, &StoredPage)> {
        self.pages
            .iter()
            .enumerate()
            .map(|(i, p)| (PageId(i as u32), p))
    }

    /// Total bytes of all pages of `page_type`.
    pub fn bytes_of(&self, page_type: PageType) -> u64 {
        self.pages
            .iter()
            .filter(|p| p.page_type == page_type)
            .map(|p| p.bytes.len() as u64)
            .sum()
    }
}

impl PageSink for MemoryPageSink {
    fn write_page(
        &mut self,
        page: Vec<u8>,
        page_type: PageType,
        group: GroupId,
    ) -> Result<PageId, IndexError> {
        let id = u32::try_from(self.pages.len())
            .map_err(|_| IndexError::Sink("page id space exhausted".into()))?;
        self.pages.push(StoredPage {
            page_type,
            group,
            bytes: page,
        });
        Ok(PageId(id))
    }
}
