use std::sync::Arc;

use tempfile::tempdir;

use flatindex::{
    Cell, Child, ColumnLayout, FilePageSink, GroupId, GroupLayout, IndexBuilder,
    IndexBuilderConfig, IndexError, IndexRoot, NodePage, PageId, PageSink, PageType,
};

fn layout() -> Arc<GroupLayout> {
    Arc::new(GroupLayout::new(
        GroupId::new(2),
        vec![ColumnLayout::fixed(4), ColumnLayout::fixed(4)],
    ))
}

fn collect_leaves(
    sink: &mut FilePageSink,
    child: Child,
    depth: u32,
    out: &mut Vec<Child>,
) -> Result<(), IndexError> {
    if depth == 0 {
        out.push(child);
        return Ok(());
    }
    let stored = sink.read_page(child.page_id)?;
    assert_eq!(stored.page_type, PageType::BTreeIndex);
    assert_eq!(stored.group, GroupId::new(2));
    let page = NodePage::open(&stored.bytes)?;
    for pointer in page.children()? {
        collect_leaves(sink, pointer, depth - 1, out)?;
    }
    Ok(())
}

#[test]
fn index_pages_persist_next_to_data_pages() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("part.flix");

    let config = IndexBuilderConfig::new()
        .node_keys_min(3)
        .node_keys_max(6)
        .node_target_size(128);
    let mut builder = IndexBuilder::new(layout(), config).unwrap();
    let mut sink = FilePageSink::create(&path).unwrap();

    let mut data_pages = Vec::new();
    for i in 0..120u32 {
        if i > 0 {
            let (hi, lo) = (i.to_be_bytes(), 0u32.to_be_bytes());
            builder.add_key(&[Cell::Bytes(&hi), Cell::Bytes(&lo)]);
        }
        let payload = format!("rows of data page {i}").into_bytes();
        let id = sink
            .write_page(payload, PageType::Data, GroupId::new(2))
            .unwrap();
        data_pages.push(id);
        builder.add_child(Child::new(id, 10, (i % 2) as u64, 512));
        builder.flush(&mut sink, false).unwrap();
    }
    let root = builder.flush(&mut sink, true).unwrap().unwrap();
    sink.close().unwrap();

    // Part metadata would persist the root descriptor alongside the file.
    let meta = serde_json::to_string(&root).unwrap();
    let root: IndexRoot = serde_json::from_str(&meta).unwrap();
    assert_eq!(root.root.row_count, 1200);
    assert_eq!(root.root.erased_row_count, 60);
    assert_eq!(root.root.data_size, 120 * 512);

    let mut sink = FilePageSink::open(&path).unwrap();
    let mut leaves = Vec::new();
    collect_leaves(&mut sink, root.root, root.level_count, &mut leaves).unwrap();
    let ids: Vec<_> = leaves.iter().map(|c| c.page_id).collect();
    assert_eq!(ids, data_pages);

    let first = sink.read_page(leaves[0].page_id).unwrap();
    assert_eq!(first.page_type, PageType::Data);
    assert_eq!(first.bytes, b"rows of data page 0".to_vec());
}

#[test]
fn corrupt_index_page_is_reported_on_open() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("part.flix");

    let mut builder = IndexBuilder::new(layout(), IndexBuilderConfig::new()).unwrap();
    let mut sink = FilePageSink::create(&path).unwrap();
    builder.add_child(Child::new(PageId(0), 1, 0, 1));
    builder.add_key(&[Cell::Bytes(&[0, 0, 0, 1]), Cell::Bytes(&[0, 0, 0, 0])]);
    builder.add_child(Child::new(PageId(1), 1, 0, 1));
    let root = builder.flush(&mut sink, true).unwrap().unwrap();
    assert_eq!(root.level_count, 1);
    sink.close().unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() - 10;
    bytes[mid] ^= 0x55;
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        FilePageSink::open(&path),
        Err(IndexError::Corrupt(_))
    ));
}
