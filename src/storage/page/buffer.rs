use byteorder::{ByteOrder, LittleEndian};

/// Fixed-capacity page buffer with a single forward write cursor.
///
/// The buffer is allocated at its final size up front. `reserve` is the only write
/// primitive: it hands out the next `n` bytes and advances the cursor. Writing past the
/// end, or finishing a buffer that was not filled exactly, is a fatal layout bug.
#[derive(Debug)]
pub struct PageBuf {
    bytes: Vec<u8>,
    pos: usize,
}

impl PageBuf {
    pub fn with_size(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size],
            pos: 0,
        }
    }

    pub fn reserve(&mut self, n: usize) -> &mut [u8] {
        let start = self.pos;
        let end = start
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .unwrap_or_else(|| {
                panic!(
                    "page buffer overflow: pos={start} need={n} capacity={}",
                    self.bytes.len()
                )
            });
        self.pos = end;
        &mut self.bytes[start..end]
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn put_u8(&mut self, v: u8) {
        self.reserve(1)[0] = v;
    }

    pub fn put_u16(&mut self, v: u16) {
        LittleEndian::write_u16(self.reserve(2), v);
    }

    pub fn put_u32(&mut self, v: u32) {
        LittleEndian::write_u32(self.reserve(4), v);
    }

    pub fn put_u64(&mut self, v: u64) {
        LittleEndian::write_u64(self.reserve(8), v);
    }

    pub fn put_slice(&mut self, src: &[u8]) {
        self.reserve(src.len()).copy_from_slice(src);
    }

    pub fn into_inner(self) -> Vec<u8> {
        assert_eq!(
            self.pos,
            self.bytes.len(),
            "page buffer not filled: written={} capacity={}",
            self.pos,
            self.bytes.len()
        );
        self.bytes
    }
}
