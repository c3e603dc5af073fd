/// One key column value as handed to the index writer.
///
/// Cells borrow their bytes; the writer copies them into the serialized key, so a key
/// only has to live for the duration of `add_key` / `serialize_key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell<'a> {
    Null,
    Bytes(&'a [u8]),
}

impl<'a> Cell<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            Cell::Null => None,
            Cell::Bytes(b) => Some(b),
        }
    }
}

impl<'a> From<&'a [u8]> for Cell<'a> {
    fn from(b: &'a [u8]) -> Self {
        Cell::Bytes(b)
    }
}

impl<'a> From<Option<&'a [u8]>> for Cell<'a> {
    fn from(b: Option<&'a [u8]>) -> Self {
        match b {
            Some(b) => Cell::Bytes(b),
            None => Cell::Null,
        }
    }
}

impl<'a> From<&'a str> for Cell<'a> {
    fn from(s: &'a str) -> Self {
        Cell::Bytes(s.as_bytes())
    }
}
