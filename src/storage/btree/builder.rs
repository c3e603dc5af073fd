use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::cell::Cell;
use crate::core::errors::IndexError;
use crate::core::layout::GroupLayout;
use crate::storage::page::PageType;
use crate::storage::sink::PageSink;

use super::config::IndexBuilderConfig;
use super::node::Child;
use super::writer::NodeWriter;

/// Root descriptor produced by the terminal flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRoot {
    /// Root child; its counters are the totals of the whole part.
    pub root: Child,
    /// Index levels above the data pages. 0 means the root is the single data page.
    pub level_count: u32,
    /// Total bytes of index pages written.
    pub index_size: u64,
}

/// Pending keys and children of one tree depth, consumed front to back.
#[derive(Debug, Default)]
struct Level {
    keys: VecDeque<Vec<u8>>,
    keys_size: usize,
    children: VecDeque<Child>,
}

impl Level {
    fn keys_count(&self) -> usize {
        self.keys.len()
    }

    fn children_count(&self) -> usize {
        self.children.len()
    }

    fn push_key(&mut self, key: Vec<u8>) {
        self.keys_size += key.len();
        self.keys.push_back(key);
    }

    fn pop_key(&mut self) -> Vec<u8> {
        let Some(key) = self.keys.pop_front() else {
            panic!("index level has no key to pop");
        };
        self.keys_size -= key.len();
        key
    }

    fn push_child(&mut self, child: Child) {
        self.children.push_back(child);
    }

    fn pop_child(&mut self) -> Child {
        let Some(child) = self.children.pop_front() else {
            panic!("index level has no child to pop");
        };
        child
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.keys_size == 0 && self.children.is_empty()
    }
}

/// Builds the B-tree index of one column group bottom-up.
///
/// Feed it `add_child`, then `add_key`/`add_child` pairs in ascending key order, calling
/// `flush(sink, false)` as often as convenient (typically once per data page). Finish
/// with `flush(sink, true)`, which drains every level and returns the root.
///
/// ```text
/// level 1:          [P0]      k3      [P1]  ...
///                  /    \             /
/// level 0:  c0 k1 c1 k2 c2        c3 k4 c4 k5 c5 ...
/// ```
///
/// Each non-terminal flush of a level cuts a page from its front, pushes the page as a
/// child to the level above and promotes the next key as the separator after it.
#[derive(Debug)]
pub struct IndexBuilder {
    layout: Arc<GroupLayout>,
    config: IndexBuilderConfig,
    writer: NodeWriter,
    levels: Vec<Level>,
    index_size: u64,
    row_count: u64,
    erased_row_count: u64,
    data_size: u64,
}

impl IndexBuilder {
    pub fn new(layout: Arc<GroupLayout>, config: IndexBuilderConfig) -> Result<Self, IndexError> {
        config.validate()?;
        Ok(Self {
            writer: NodeWriter::new(layout.clone()),
            layout,
            config,
            levels: vec![Level::default()],
            index_size: 0,
            row_count: 0,
            erased_row_count: 0,
            data_size: 0,
        })
    }

    pub fn layout(&self) -> &GroupLayout {
        &self.layout
    }

    pub fn config(&self) -> &IndexBuilderConfig {
        &self.config
    }

    /// Number of levels currently buffered, including the bottom one.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Bytes of index pages written so far.
    pub fn index_size(&self) -> u64 {
        self.index_size
    }

    pub fn add_key(&mut self, key: &[Cell<'_>]) {
        let bytes = self.writer.serialize_key(key);
        self.levels[0].push_key(bytes);
    }

    /// Push the next data page. Its counters are per-page values and get turned into
    /// running totals here.
    pub fn add_child(&mut self, child: Child) {
        self.row_count = accumulate(self.row_count, child.row_count, "row count");
        self.erased_row_count =
            accumulate(self.erased_row_count, child.erased_row_count, "erased row count");
        self.data_size = accumulate(self.data_size, child.data_size, "data size");
        self.levels[0].push_child(Child {
            page_id: child.page_id,
            row_count: self.row_count,
            erased_row_count: self.erased_row_count,
            data_size: self.data_size,
        });
    }

    /// Written bytes plus the page size every level would take if serialized now.
    /// Does not account for the children future flushes will add.
    pub fn estimate_bytes_used(&self) -> u64 {
        let pending: usize = self
            .levels
            .iter()
            .map(|level| self.writer.calc_page_size(level.keys_size, level.keys_count()))
            .sum();
        self.index_size + pending as u64
    }

    /// Flush levels bottom-up. Returns the root only when `last` is set.
    ///
    /// A sink error aborts the flush mid-way; the builder must then be discarded or
    /// `reset`, as the failed page is lost.
    pub fn flush<S: PageSink + ?Sized>(
        &mut self,
        sink: &mut S,
        last: bool,
    ) -> Result<Option<IndexRoot>, IndexError> {
        let mut level_index = 0;
        while level_index < self.levels.len() {
            if last && self.levels[level_index].keys_count() == 0 {
                let level = &mut self.levels[level_index];
                assert_eq!(
                    level.children_count(),
                    1,
                    "terminal flush must leave a single root child at level {level_index}"
                );
                let root = level.pop_child();
                let meta = IndexRoot {
                    root,
                    level_count: level_index as u32,
                    index_size: self.index_size,
                };
                debug!(
                    root = %root.page_id,
                    levels = level_index,
                    index_size = self.index_size,
                    rows = root.row_count,
                    "built btree index"
                );
                return Ok(Some(meta));
            }
            if !self.try_flush(level_index, sink, last)? {
                assert!(!last, "terminal flush skipped level {level_index}");
                break;
            }
            level_index += 1;
        }
        assert!(!last, "terminal flush did not reach a root");
        Ok(None)
    }

    pub fn reset(&mut self) {
        self.writer.reset();
        self.levels.clear();
        self.levels.push(Level::default());
        self.index_size = 0;
        self.row_count = 0;
        self.erased_row_count = 0;
        self.data_size = 0;
    }

    // Split once the level is past the key slack, or once it is big enough in both keys
    // and bytes to be cut into roughly page-sized halves. Approximate: the size gate may
    // still produce two pages below target.
    fn should_split(&self, level: &Level) -> bool {
        let cfg = &self.config;
        let keys = level.keys_count();
        if keys > cfg.split_keys_factor.saturating_mul(cfg.node_keys_max) {
            return true;
        }
        keys > cfg.split_keys_factor.saturating_mul(cfg.node_keys_min)
            && self.writer.calc_page_size(level.keys_size, keys)
                > cfg.split_size_factor.saturating_mul(cfg.node_target_size)
    }

    fn try_flush<S: PageSink + ?Sized>(
        &mut self,
        level_index: usize,
        sink: &mut S,
        last: bool,
    ) -> Result<bool, IndexError> {
        let level = &self.levels[level_index];
        if !last && !self.should_split(level) {
            trace!(
                level = level_index,
                keys = level.keys_count(),
                "index level below split threshold"
            );
            return Ok(false);
        }
        assert!(
            level.keys_count() > 0,
            "index level {level_index} must not be empty"
        );

        self.writer.ensure_empty();

        let (keys_min, keys_max, target) = (
            self.config.node_keys_min,
            self.config.node_keys_max,
            self.config.node_target_size,
        );
        let level = &mut self.levels[level_index];
        loop {
            if last {
                if level.keys_count() == 0 {
                    break;
                }
            } else {
                if self.writer.keys_count() >= keys_max {
                    break;
                }
                // Keep a separator plus at least one key behind.
                if level.keys_count() < 3 {
                    break;
                }
                if self.writer.keys_count() >= keys_min && self.writer.current_page_size() >= target {
                    break;
                }
            }
            self.writer.add_child(level.pop_child());
            self.writer.add_key_bytes(level.pop_key());
        }

        let closing = level.pop_child();
        self.writer.add_child(closing);
        let keys_in_page = self.writer.keys_count();
        let page = self.writer.finish();
        let page_len = page.len();
        let page_id = sink.write_page(page, PageType::BTreeIndex, self.layout.group())?;
        self.index_size += page_len as u64;
        debug!(
            level = level_index,
            keys = keys_in_page,
            bytes = page_len,
            page_id = %page_id,
            last,
            "wrote index page"
        );

        if level_index + 1 == self.levels.len() {
            self.levels.push(Level::default());
        }
        let separator = (!last).then(|| self.levels[level_index].pop_key());
        let parent = &mut self.levels[level_index + 1];
        parent.push_child(Child {
            page_id,
            ..closing
        });
        if let Some(key) = separator {
            parent.push_key(key);
        }

        let level = &self.levels[level_index];
        if last {
            assert!(level.is_empty(), "terminal flush left level {level_index} non-empty");
        } else {
            assert!(
                level.keys_count() > 0,
                "flush must not leave level {level_index} empty"
            );
        }
        Ok(true)
    }
}

fn accumulate(total: u64, delta: u64, what: &str) -> u64 {
    total
        .checked_add(delta)
        .unwrap_or_else(|| panic!("cumulative {what} overflows u64"))
}
