//! Integration tests for record files over the full storage stack.
//!
//! These drive RecordManager/RecordFile through the buffer pool against
//! both storage backends and check the on-page invariants directly: the
//! bitmap popcount always equals the page's record count, and a page is on
//! the free chain exactly when it has a free slot.

use std::sync::Arc;

use stratum::record::{
    FileHeader, NO_FREE_PAGE, RecordFile, RecordId, RecordManager, RecordPage,
};
use stratum::storage::{BufferPool, FileStorage, MemoryStorage, PAGE_SIZE, PageId, Storage};
use stratum::tx::Context;

async fn memory_manager() -> RecordManager<MemoryStorage> {
    RecordManager::new(Arc::new(BufferPool::new(MemoryStorage::new(), 64)))
}

/// Walks the free chain from the file header, panicking on a cycle.
async fn free_chain<S: Storage>(file: &RecordFile<S>) -> Vec<u32> {
    let mut chain = Vec::new();
    let mut current = file.header().first_free_page_no;
    while current != NO_FREE_PAGE {
        assert!(
            !chain.contains(&current),
            "free chain cycles through page {}",
            current
        );
        chain.push(current);
        let guard = file
            .pool()
            .fetch_page(PageId::new(file.file_id(), current))
            .await
            .unwrap();
        current = RecordPage::new(guard.data(), file.layout()).header().next_free_page_no;
    }
    chain
}

/// Checks the record-manager invariants on every data page.
async fn check_invariants<S: Storage>(file: &RecordFile<S>) {
    let header = file.header();
    let chain = free_chain(file).await;

    for page_no in 1..header.num_pages {
        let guard = file
            .pool()
            .fetch_page(PageId::new(file.file_id(), page_no))
            .await
            .unwrap();
        let page = RecordPage::new(guard.data(), file.layout());

        // popcount(bitmap) == num_records
        assert_eq!(
            page.occupied_count(),
            page.header().num_records as usize,
            "bitmap/count mismatch on page {}",
            page_no
        );

        // On the chain iff the page has at least one free slot
        let has_free_slot =
            (page.header().num_records as usize) < file.layout().records_per_page;
        assert_eq!(
            chain.contains(&page_no),
            has_free_slot,
            "free-chain membership wrong for page {}",
            page_no
        );
    }
}

#[tokio::test]
async fn test_insert_get_roundtrip_literal() {
    // New file with record_size = 8: the first insert lands at (1, 0)
    let record_mgr = memory_manager().await;
    record_mgr.create_file("t", 8).await.unwrap();
    let file = record_mgr.open_file("t").await.unwrap();
    let ctx = Context::none();

    let rid = file.insert(b"ABCDEFGH", &ctx).await.unwrap();
    assert_eq!(rid, RecordId::new(1, 0));
    assert_eq!(file.get(rid, &ctx).await.unwrap(), b"ABCDEFGH");

    // Page 1: bitmap bit 0 set, num_records = 1
    let guard = file
        .pool()
        .fetch_page(PageId::new(file.file_id(), 1))
        .await
        .unwrap();
    let page = RecordPage::new(guard.data(), file.layout());
    assert!(page.is_occupied(0));
    assert_eq!(page.header().num_records, 1);
}

#[tokio::test]
async fn test_exactly_one_page_allocated_when_chain_empty() {
    let record_mgr = memory_manager().await;
    record_mgr.create_file("t", 2048).await.unwrap();
    let file = record_mgr.open_file("t").await.unwrap();
    let ctx = Context::none();
    let per_page = file.layout().records_per_page;

    // Fill the only data page
    for i in 0..per_page {
        file.insert(&vec![i as u8; 2048], &ctx).await.unwrap();
    }
    let before = file.header();
    assert_eq!(before.first_free_page_no, NO_FREE_PAGE);

    // One insert into a chain-less file allocates exactly one page
    file.insert(&vec![0xFF; 2048], &ctx).await.unwrap();
    let after = file.header();
    assert_eq!(after.num_pages, before.num_pages + 1);
    assert_eq!(after.first_free_page_no, after.num_pages - 1);
}

#[tokio::test]
async fn test_deleting_sole_record_of_full_page_heads_chain() {
    let record_mgr = memory_manager().await;
    record_mgr.create_file("t", 2048).await.unwrap();
    let file = record_mgr.open_file("t").await.unwrap();
    let ctx = Context::none();
    let per_page = file.layout().records_per_page;

    for i in 0..per_page * 2 {
        file.insert(&vec![i as u8; 2048], &ctx).await.unwrap();
    }
    // Both data pages are full
    assert_eq!(file.header().first_free_page_no, NO_FREE_PAGE);

    file.delete(RecordId::new(2, 0), &ctx).await.unwrap();
    assert_eq!(file.header().first_free_page_no, 2);
    check_invariants(&file).await;
}

#[tokio::test]
async fn test_invariants_hold_through_mixed_workload() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let record_mgr = memory_manager().await;
    record_mgr.create_file("t", 2048).await.unwrap();
    let file = record_mgr.open_file("t").await.unwrap();
    let ctx = Context::none();
    let mut rng = StdRng::seed_from_u64(7);

    let mut live: Vec<RecordId> = Vec::new();
    for step in 0..200 {
        if live.is_empty() || rng.gen_bool(0.6) {
            let rid = file
                .insert(&vec![step as u8; 2048], &ctx)
                .await
                .unwrap();
            live.push(rid);
        } else {
            let idx = rng.gen_range(0..live.len());
            let rid = live.swap_remove(idx);
            file.delete(rid, &ctx).await.unwrap();
        }
    }

    check_invariants(&file).await;

    // Every live rid is still readable, every dead one is gone
    let mut scan = file.scan();
    let mut seen = Vec::new();
    while let Some(rid) = scan.next().await.unwrap() {
        seen.push(rid);
    }
    live.sort();
    seen.sort();
    assert_eq!(seen, live);
}

#[tokio::test]
async fn test_scan_spans_pages_in_order() {
    let record_mgr = memory_manager().await;
    record_mgr.create_file("t", 2048).await.unwrap();
    let file = record_mgr.open_file("t").await.unwrap();
    let ctx = Context::none();

    let mut inserted = Vec::new();
    for i in 0..8u8 {
        inserted.push(file.insert(&vec![i; 2048], &ctx).await.unwrap());
    }

    let mut scan = file.scan();
    let mut rids = Vec::new();
    while let Some(rid) = scan.next().await.unwrap() {
        rids.push(rid);
    }
    assert_eq!(rids, inserted);
}

#[tokio::test]
async fn test_file_storage_persistence_across_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let rids: Vec<RecordId>;
    {
        let storage = FileStorage::open(dir.path()).await.unwrap();
        let record_mgr = RecordManager::new(Arc::new(BufferPool::new(storage, 64)));
        record_mgr.create_file("orders", 16).await.unwrap();
        let file = record_mgr.open_file("orders").await.unwrap();
        let ctx = Context::none();

        rids = {
            let mut v = Vec::new();
            for i in 0..10u8 {
                v.push(file.insert(&[i; 16], &ctx).await.unwrap());
            }
            v
        };
        file.delete(rids[3], &ctx).await.unwrap();
        record_mgr.close_file("orders").await.unwrap();
    }

    {
        let storage = FileStorage::open(dir.path()).await.unwrap();
        let record_mgr = RecordManager::new(Arc::new(BufferPool::new(storage, 64)));
        let file = record_mgr.open_file("orders").await.unwrap();
        let ctx = Context::none();

        assert_eq!(file.record_size(), 16);
        for (i, &rid) in rids.iter().enumerate() {
            if i == 3 {
                assert!(file.get(rid, &ctx).await.is_err());
            } else {
                assert_eq!(file.get(rid, &ctx).await.unwrap(), vec![i as u8; 16]);
            }
        }
        check_invariants(&file).await;
    }
}

#[tokio::test]
async fn test_header_page_serialized_format() {
    // The header page holds the FileHeader fields little-endian, in order
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::open(dir.path()).await.unwrap();
    let record_mgr = RecordManager::new(Arc::new(BufferPool::new(storage, 64)));
    record_mgr.create_file("t", 8).await.unwrap();

    let raw = tokio::fs::read(dir.path().join("t")).await.unwrap();
    assert_eq!(raw.len(), PAGE_SIZE);

    let header = FileHeader::read_from(&raw);
    assert_eq!(header.record_size, 8);
    assert_eq!(header.records_per_page, 1007);
    assert_eq!(header.bitmap_size, 126);
    assert_eq!(header.num_pages, 1);
    assert_eq!(header.first_free_page_no, NO_FREE_PAGE);
}
