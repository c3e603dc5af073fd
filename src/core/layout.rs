//! Key column layout of a column group.
//!
//! The layout decides, once per group, whether index keys use the fixed format (plain
//! concatenation of fixed-width columns) or the variable format (null bitmap, per-column
//! slots, variable tail). Builders and writers share one layout through an `Arc`.

use serde::{Deserialize, Serialize};

/// Header value marking a page whose keys are not fixed size.
pub const FIXED_KEY_SIZE_NONE: u8 = u8::MAX;

/// Slot size of a variable-width column: `offset: u32` + `size: u32`.
pub const DATA_REF_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GroupId {
    pub index: u32,
}

impl GroupId {
    pub const MAIN: GroupId = GroupId { index: 0 };

    pub fn new(index: u32) -> Self {
        Self { index }
    }

    pub fn is_main(&self) -> bool {
        self.index == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub is_fixed: bool,
    /// Byte width of the column; meaningful only when `is_fixed`.
    pub fixed_size: u32,
}

impl ColumnLayout {
    pub fn fixed(size: u32) -> Self {
        Self {
            is_fixed: true,
            fixed_size: size,
        }
    }

    pub fn variable() -> Self {
        Self {
            is_fixed: false,
            fixed_size: 0,
        }
    }

    /// Bytes this column occupies in the fixed part of a variable-format key.
    pub fn slot_size(&self) -> usize {
        if self.is_fixed {
            self.fixed_size as usize
        } else {
            DATA_REF_SIZE
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLayout {
    group: GroupId,
    columns: Vec<ColumnLayout>,
    fixed_key_size: Option<usize>,
}

impl GroupLayout {
    pub fn new(group: GroupId, columns: Vec<ColumnLayout>) -> Self {
        let fixed_key_size = if group.is_main() || columns.iter().any(|c| !c.is_fixed) {
            None
        } else {
            let total: usize = columns.iter().map(|c| c.fixed_size as usize).sum();
            (total < FIXED_KEY_SIZE_NONE as usize).then_some(total)
        };
        Self {
            group,
            columns,
            fixed_key_size,
        }
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn columns(&self) -> &[ColumnLayout] {
        &self.columns
    }

    /// `Some(size)` when every key in this group serializes to exactly `size` bytes.
    pub fn fixed_key_size(&self) -> Option<usize> {
        self.fixed_key_size
    }

    pub fn is_fixed_format(&self) -> bool {
        self.fixed_key_size.is_some()
    }

    pub fn null_bitmap_size(&self) -> usize {
        self.columns.len().div_ceil(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_group_is_never_fixed() {
        let layout = GroupLayout::new(GroupId::MAIN, vec![ColumnLayout::fixed(8)]);
        assert_eq!(layout.fixed_key_size(), None);
    }

    #[test]
    fn all_fixed_columns_give_fixed_format() {
        let layout = GroupLayout::new(
            GroupId::new(1),
            vec![ColumnLayout::fixed(8), ColumnLayout::fixed(4)],
        );
        assert_eq!(layout.fixed_key_size(), Some(12));
        assert_eq!(layout.null_bitmap_size(), 1);
    }

    #[test]
    fn variable_column_or_oversized_key_is_not_fixed() {
        let var = GroupLayout::new(
            GroupId::new(1),
            vec![ColumnLayout::fixed(8), ColumnLayout::variable()],
        );
        assert!(!var.is_fixed_format());

        let wide = GroupLayout::new(
            GroupId::new(1),
            vec![ColumnLayout::fixed(200), ColumnLayout::fixed(55)],
        );
        assert!(!wide.is_fixed_format());
    }

    #[test]
    fn null_bitmap_rounds_up() {
        let cols = vec![ColumnLayout::fixed(1); 9];
        let layout = GroupLayout::new(GroupId::MAIN, cols);
        assert_eq!(layout.null_bitmap_size(), 2);
    }
}
