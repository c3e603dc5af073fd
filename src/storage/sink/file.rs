use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use tracing::debug;

use super::{PageSink, StoredPage};
use crate::core::errors::IndexError;
use crate::core::layout::GroupId;
use crate::storage::page::{PageId, PageType};

const MAGIC: [u8; 8] = *b"FLIX0001";
const VERSION: u16 = 1;
const FILE_HEADER_SIZE: usize = 8 + 2;

// Record layout (little-endian):
//   0: payload_len (u32)
//   4: page_type (u16)
//   6: group (u32)
//  10: crc32 (u32) of the payload
//  14: payload
const RECORD_HEADER_SIZE: usize = 4 + 2 + 4 + 4;

#[derive(Debug, Clone, Copy)]
struct RecordHeader {
    len: u32,
    page_type: PageType,
    group: GroupId,
    crc32: u32,
}

/// Append-only page file. Page ids are record ordinals.
#[derive(Debug)]
pub struct FilePageSink {
    path: PathBuf,
    file: File,
    offsets: Vec<u64>,
    end: u64,
}

impl FilePageSink {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if path.exists() && path.metadata()?.len() > 0 {
            return Err(IndexError::Sink(format!("file already exists: {path:?}")));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        let mut header = Vec::with_capacity(FILE_HEADER_SIZE);
        header.extend_from_slice(&MAGIC);
        header.write_u16::<LittleEndian>(VERSION)?;
        file.write_all(&header)?;
        file.sync_all()?;

        Ok(Self {
            path,
            file,
            offsets: Vec::new(),
            end: FILE_HEADER_SIZE as u64,
        })
    }

    /// Open an existing page file, validating every record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(IndexError::Sink(format!("file not found: {path:?}")));
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)
            .map_err(|_| IndexError::Corrupt("file too small to contain header".into()))?;
        if magic != MAGIC {
            return Err(IndexError::Corrupt("invalid file magic".into()));
        }
        let version = file.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(IndexError::Corrupt(format!("unsupported version: {version}")));
        }

        let mut offsets = Vec::new();
        let mut pos = FILE_HEADER_SIZE as u64;
        while pos < file_len {
            if file_len - pos < RECORD_HEADER_SIZE as u64 {
                return Err(IndexError::Corrupt(format!(
                    "truncated record header at offset {pos}"
                )));
            }
            let header = read_record_header(&mut file)?;
            let record_end = pos + RECORD_HEADER_SIZE as u64 + header.len as u64;
            if record_end > file_len {
                return Err(IndexError::Corrupt(format!(
                    "truncated record payload at offset {pos}"
                )));
            }
            let mut payload = vec![0u8; header.len as usize];
            file.read_exact(&mut payload)?;
            verify_checksum(&header, &payload, offsets.len())?;
            offsets.push(pos);
            pos = record_end;
        }

        debug!(path = ?path, pages = offsets.len(), "opened page file");
        Ok(Self {
            path,
            file,
            offsets,
            end: pos,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pages_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn read_page(&mut self, id: PageId) -> Result<StoredPage, IndexError> {
        let Some(&offset) = self.offsets.get(id.0 as usize) else {
            return Err(IndexError::Sink(format!("page {id} not found")));
        };
        self.file.seek(SeekFrom::Start(offset))?;
        let header = read_record_header(&mut self.file)?;
        let mut payload = vec![0u8; header.len as usize];
        self.file
            .read_exact(&mut payload)
            .map_err(|_| IndexError::Corrupt(format!("short read for page {id}")))?;
        verify_checksum(&header, &payload, id.0 as usize)?;
        Ok(StoredPage {
            page_type: header.page_type,
            group: header.group,
            bytes: payload,
        })
    }

    pub fn sync(&mut self) -> Result<(), IndexError> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn close(self) -> Result<(), IndexError> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl PageSink for FilePageSink {
    fn write_page(
        &mut self,
        page: Vec<u8>,
        page_type: PageType,
        group: GroupId,
    ) -> Result<PageId, IndexError> {
        let id = u32::try_from(self.offsets.len())
            .map_err(|_| IndexError::Sink("page id space exhausted".into()))?;
        let len = u32::try_from(page.len())
            .map_err(|_| IndexError::Sink(format!("page too large: {}", page.len())))?;

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + page.len());
        record.write_u32::<LittleEndian>(len)?;
        record.write_u16::<LittleEndian>(page_type as u16)?;
        record.write_u32::<LittleEndian>(group.index)?;
        record.write_u32::<LittleEndian>(crc32(&page))?;
        record.extend_from_slice(&page);

        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&record)?;
        self.offsets.push(self.end);
        self.end += record.len() as u64;
        Ok(PageId(id))
    }
}

fn read_record_header(file: &mut File) -> Result<RecordHeader, IndexError> {
    let mut buf = [0u8; RECORD_HEADER_SIZE];
    file.read_exact(&mut buf)?;
    let mut rdr = std::io::Cursor::new(&buf[..]);
    let len = rdr.read_u32::<LittleEndian>()?;
    let page_type = PageType::from_u16(rdr.read_u16::<LittleEndian>()?)
        .map_err(|e| IndexError::Corrupt(format!("bad record header: {e}")))?;
    let group = GroupId::new(rdr.read_u32::<LittleEndian>()?);
    let crc32 = rdr.read_u32::<LittleEndian>()?;
    Ok(RecordHeader {
        len,
        page_type,
        group,
        crc32,
    })
}

fn verify_checksum(header: &RecordHeader, payload: &[u8], index: usize) -> Result<(), IndexError> {
    if crc32(payload) != header.crc32 {
        return Err(IndexError::Corrupt(format!(
            "checksum mismatch for page {index}"
        )));
    }
    Ok(())
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pages_survive_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("part.flix");

        let mut sink = FilePageSink::create(&path).unwrap();
        let a = sink
            .write_page(b"first".to_vec(), PageType::Data, GroupId::MAIN)
            .unwrap();
        let b = sink
            .write_page(b"second".to_vec(), PageType::BTreeIndex, GroupId::new(3))
            .unwrap();
        assert_eq!((a, b), (PageId(0), PageId(1)));
        sink.close().unwrap();

        let mut sink = FilePageSink::open(&path).unwrap();
        assert_eq!(sink.pages_count(), 2);
        let page = sink.read_page(b).unwrap();
        assert_eq!(page.bytes, b"second".to_vec());
        assert_eq!(page.page_type, PageType::BTreeIndex);
        assert_eq!(page.group, GroupId::new(3));

        // Appends continue after the existing records.
        let c = sink
            .write_page(b"third".to_vec(), PageType::Data, GroupId::MAIN)
            .unwrap();
        assert_eq!(c, PageId(2));
        assert_eq!(sink.read_page(a).unwrap().bytes, b"first".to_vec());
    }

    #[test]
    fn create_refuses_existing_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("part.flix");
        FilePageSink::create(&path).unwrap().close().unwrap();
        let err = FilePageSink::create(&path).unwrap_err();
        assert!(matches!(err, IndexError::Sink(_)));
    }

    #[test]
    fn corrupted_payload_is_detected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("part.flix");
        let mut sink = FilePageSink::create(&path).unwrap();
        sink.write_page(vec![7u8; 32], PageType::Data, GroupId::MAIN)
            .unwrap();
        sink.close().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let err = FilePageSink::open(&path).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)));
    }

    #[test]
    fn unknown_page_type_is_corrupt() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("part.flix");
        let mut sink = FilePageSink::create(&path).unwrap();
        sink.write_page(vec![3u8; 8], PageType::Data, GroupId::MAIN)
            .unwrap();
        sink.close().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let type_at = FILE_HEADER_SIZE + 4;
        bytes[type_at..type_at + 2].copy_from_slice(&99u16.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            FilePageSink::open(&path).unwrap_err(),
            IndexError::Corrupt(_)
        ));
    }

    #[test]
    fn truncated_tail_is_detected() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("part.flix");
        let mut sink = FilePageSink::create(&path).unwrap();
        sink.write_page(vec![1u8; 16], PageType::Data, GroupId::MAIN)
            .unwrap();
        sink.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(
            FilePageSink::open(&path).unwrap_err(),
            IndexError::Corrupt(_)
        ));
    }
}
