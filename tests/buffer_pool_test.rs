use anyhow::Result;

use sabledb::storage::buffer::{BufferPoolError, BufferPoolManager};

mod common;
use common::{create_test_buffer_pool, create_test_disk_manager, create_test_parallel_pool};

#[test]
fn test_new_page_ids_are_sequential() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    for expected_id in 0..10 {
        let (page, page_id) = buffer_pool.new_page()?;
        assert_eq!(page_id, expected_id);
        assert_eq!(page.read().page_id, page_id);
    }
    Ok(())
}

#[test]
fn test_pool_full_then_eviction_writes_back() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    // fill every frame with a pinned page
    let mut page_ids = Vec::new();
    let mut first_page = None;
    for _ in 0..10 {
        let (page, page_id) = buffer_pool.new_page()?;
        if first_page.is_none() {
            first_page = Some(page);
        }
        page_ids.push(page_id);
    }

    // all frames pinned: the next allocation must refuse
    assert!(matches!(
        buffer_pool.new_page(),
        Err(BufferPoolError::BufferPoolFull)
    ));

    // dirty page 0, release it, and let the next allocation evict it
    {
        let page = first_page.unwrap();
        let mut guard = page.write();
        guard.data[0..4].copy_from_slice(b"mark");
    }
    buffer_pool.unpin_page(page_ids[0], true)?;
    let (_, new_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(new_id, false)?;

    // the eviction wrote page 0 back; fetching it again reads the mark
    let page = buffer_pool.fetch_page(page_ids[0])?;
    assert_eq!(&page.read().data[0..4], b"mark");
    buffer_pool.unpin_page(page_ids[0], false)?;
    Ok(())
}

#[test]
fn test_fetch_pins_and_delete_refuses_pinned() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    let (_, page_id) = buffer_pool.new_page()?;
    let _second_pin = buffer_pool.fetch_page(page_id)?;
    assert_eq!(buffer_pool.occupied_page_num(), 1);

    buffer_pool.unpin_page(page_id, false)?;
    assert!(matches!(
        buffer_pool.delete_page(page_id),
        Err(BufferPoolError::PagePinned(_))
    ));

    buffer_pool.unpin_page(page_id, false)?;
    buffer_pool.delete_page(page_id)?;
    assert_eq!(buffer_pool.occupied_page_num(), 0);
    Ok(())
}

#[test]
fn test_unpin_contract_violations() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;

    assert!(matches!(
        buffer_pool.unpin_page(5, false),
        Err(BufferPoolError::PageNotFound(5))
    ));

    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;
    assert!(matches!(
        buffer_pool.unpin_page(page_id, false),
        Err(BufferPoolError::PageNotPinned(_))
    ));
    Ok(())
}

#[test]
fn test_flush_page_persists_clean_page() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let (page, page_id) = buffer_pool.new_page()?;
    {
        let mut guard = page.write();
        guard.data[100..109].copy_from_slice(b"flush me!");
    }
    // flush while pinned, then release as *clean*: only the explicit flush
    // can have written the bytes
    buffer_pool.flush_page(page_id)?;
    buffer_pool.unpin_page(page_id, false)?;

    // roll the page out of the pool
    for _ in 0..3 {
        let (_, id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(id, false)?;
    }

    let page = buffer_pool.fetch_page(page_id)?;
    assert_eq!(&page.read().data[100..109], b"flush me!");
    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_flush_all_pages() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(5)?;

    let mut page_ids = Vec::new();
    for i in 0..5u8 {
        let (page, page_id) = buffer_pool.new_page()?;
        page.write().data[0] = i + 1;
        buffer_pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }
    buffer_pool.flush_all_pages()?;

    // evict everything, then read the flushed bytes back
    for _ in 0..5 {
        let (_, id) = buffer_pool.new_page()?;
        buffer_pool.unpin_page(id, false)?;
    }
    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = buffer_pool.fetch_page(page_id)?;
        assert_eq!(page.read().data[0], i as u8 + 1);
        buffer_pool.unpin_page(page_id, false)?;
    }
    Ok(())
}

#[test]
fn test_delete_unmapped_page_succeeds() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(2)?;
    // never resident: deletion is just deallocation
    buffer_pool.delete_page(17)?;
    Ok(())
}

#[test]
fn test_occupied_page_num_tracks_pins() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(4)?;

    let (_, a) = buffer_pool.new_page()?;
    let (_, b) = buffer_pool.new_page()?;
    assert_eq!(buffer_pool.occupied_page_num(), 2);

    buffer_pool.unpin_page(a, false)?;
    assert_eq!(buffer_pool.occupied_page_num(), 1);

    buffer_pool.unpin_page(b, false)?;
    assert_eq!(buffer_pool.occupied_page_num(), 0);

    buffer_pool.fetch_page(a)?;
    assert_eq!(buffer_pool.occupied_page_num(), 1);
    buffer_pool.unpin_page(a, false)?;
    Ok(())
}

#[test]
fn test_shard_allocates_congruent_page_ids() -> Result<()> {
    let (disk_manager, _temp_file) = create_test_disk_manager()?;

    let shard = BufferPoolManager::new_shard(5, 3, 1, disk_manager);
    for i in 0..5 {
        let (_, page_id) = shard.new_page()?;
        assert_eq!(page_id, 1 + 3 * i);
        assert_eq!(page_id as usize % 3, 1);
        shard.unpin_page(page_id, false)?;
    }
    Ok(())
}

#[test]
fn test_parallel_pool_round_robin_allocation() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_parallel_pool(4, 5)?;

    // the rotating start index spreads the first allocations over all shards
    let mut residues = Vec::new();
    let mut page_ids = Vec::new();
    for _ in 0..4 {
        let (_, page_id) = buffer_pool.new_page()?;
        residues.push(page_id as usize % 4);
        page_ids.push(page_id);
    }
    residues.sort_unstable();
    assert_eq!(residues, vec![0, 1, 2, 3]);

    // routed operations reach the owning shard
    for &page_id in &page_ids {
        buffer_pool.unpin_page(page_id, true)?;
    }
    buffer_pool.flush_all_pages()?;
    for &page_id in &page_ids {
        let page = buffer_pool.fetch_page(page_id)?;
        assert_eq!(page.read().page_id, page_id);
        buffer_pool.unpin_page(page_id, false)?;
        buffer_pool.delete_page(page_id)?;
    }
    Ok(())
}

#[test]
fn test_parallel_pool_probes_all_shards_before_refusing() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_parallel_pool(2, 2)?;

    let mut page_ids = Vec::new();
    for _ in 0..4 {
        let (_, page_id) = buffer_pool.new_page()?;
        page_ids.push(page_id);
    }
    assert!(matches!(
        buffer_pool.new_page(),
        Err(BufferPoolError::BufferPoolFull)
    ));

    // freeing a single frame on one shard is enough again
    buffer_pool.unpin_page(page_ids[0], false)?;
    let (_, page_id) = buffer_pool.new_page()?;
    buffer_pool.unpin_page(page_id, false)?;
    Ok(())
}

#[test]
fn test_page_data_survives_eviction_cycles() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;

    let mut page_ids = Vec::new();
    for i in 0..12u32 {
        let (page, page_id) = buffer_pool.new_page()?;
        page.write().data[0..4].copy_from_slice(&i.to_le_bytes());
        buffer_pool.unpin_page(page_id, true)?;
        page_ids.push(page_id);
    }
    for (i, &page_id) in page_ids.iter().enumerate() {
        let page = buffer_pool.fetch_page(page_id)?;
        assert_eq!(page.read().data[0..4], (i as u32).to_le_bytes());
        buffer_pool.unpin_page(page_id, false)?;
    }
    Ok(())
}
