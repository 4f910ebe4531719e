use anyhow::Result;
use rand::prelude::*;
use std::collections::{HashMap, HashSet};

use sabledb::common::types::Rid;
use sabledb::index::hash::ExtendibleHashTable;

mod common;
use common::{create_test_buffer_pool, create_test_parallel_pool};

#[test]
fn test_insert_get_remove_sample() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(buffer_pool)?;

    // insert a few values
    for i in 0..5 {
        assert!(table.insert(None, &i, &i)?);
        assert_eq!(table.get_value(None, &i)?, vec![i]);
    }
    table.verify_integrity()?;

    // check the inserted values are all there
    for i in 0..5 {
        assert_eq!(table.get_value(None, &i)?, vec![i]);
    }

    // insert one more value for each key; (0, 0) is an exact duplicate
    for i in 0..5 {
        if i == 0 {
            assert!(!table.insert(None, &i, &(2 * i))?);
        } else {
            assert!(table.insert(None, &i, &(2 * i))?);
        }
        let mut values = table.get_value(None, &i)?;
        values.sort_unstable();
        if i == 0 {
            assert_eq!(values, vec![0]);
        } else {
            assert_eq!(values, vec![i, 2 * i]);
        }
    }
    table.verify_integrity()?;

    // a key that was never inserted
    assert!(table.get_value(None, &20)?.is_empty());

    // delete the original values
    for i in 0..5 {
        assert!(table.remove(None, &i, &i)?);
        let values = table.get_value(None, &i)?;
        if i == 0 {
            assert!(values.is_empty());
        } else {
            assert_eq!(values, vec![2 * i]);
        }
    }
    table.verify_integrity()?;

    // delete the rest; (0, 0) is already gone
    for i in 0..5 {
        if i == 0 {
            assert!(!table.remove(None, &i, &(2 * i))?);
        } else {
            assert!(table.remove(None, &i, &(2 * i))?);
        }
    }
    table.verify_integrity()?;
    Ok(())
}

#[test]
fn test_duplicate_pair_rejected() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;
    let table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(buffer_pool)?;

    assert!(table.insert(None, &0, &0)?);
    assert!(!table.insert(None, &0, &0)?);
    assert!(table.insert(None, &0, &1)?);

    let mut values = table.get_value(None, &0)?;
    values.sort_unstable();
    assert_eq!(values, vec![0, 1]);
    Ok(())
}

#[test]
fn test_split_on_full_bucket_then_shrink_to_depth_zero() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(50)?;
    let table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(buffer_pool.clone())?;

    // a (i32, i32) bucket holds 496 entries; at global depth 0 every key
    // lands in the single bucket
    for i in 0..496 {
        assert!(table.insert(None, &i, &i)?);
    }
    assert_eq!(table.get_global_depth()?, 0);
    assert_eq!(buffer_pool.occupied_page_num(), 0);

    // entry 497 saturates the bucket and forces the first split
    assert!(table.insert(None, &496, &496)?);
    assert_eq!(table.get_global_depth()?, 1);
    assert_eq!(buffer_pool.occupied_page_num(), 0);
    table.verify_integrity()?;

    for i in 0..=496 {
        assert_eq!(table.get_value(None, &i)?, vec![i]);
    }

    // draining one directory entry merges its bucket into the split image
    table.remove_all_items(None, 1)?;
    assert_eq!(buffer_pool.occupied_page_num(), 0);
    table.remove_all_items(None, 0)?;
    assert_eq!(table.get_global_depth()?, 0);
    assert_eq!(buffer_pool.occupied_page_num(), 0);
    table.verify_integrity()?;
    Ok(())
}

#[test]
fn test_large_roundtrip_with_tiny_pool() -> Result<()> {
    // three frames are exactly enough for directory + bucket + split image
    let (buffer_pool, _temp_file) = create_test_buffer_pool(3)?;
    let table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(buffer_pool)?;

    for i in 0..200_000 {
        assert!(table.insert(None, &i, &i)?);
        assert_eq!(table.get_value(None, &i)?, vec![i]);
    }
    table.verify_integrity()?;

    for i in 0..200_000 {
        assert!(table.remove(None, &i, &i)?);
    }
    table.verify_integrity()?;

    for i in (0..200_000).step_by(1000) {
        assert!(table.get_value(None, &i)?.is_empty());
    }
    Ok(())
}

#[test]
fn test_rid_values() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(10)?;
    let table: ExtendibleHashTable<i32, Rid> = ExtendibleHashTable::new(buffer_pool)?;

    for i in 0..100 {
        assert!(table.insert(None, &i, &Rid::new(i, (i * 2) as u32))?);
    }
    for i in 0..100 {
        assert_eq!(table.get_value(None, &i)?, vec![Rid::new(i, (i * 2) as u32)]);
    }
    assert!(table.remove(None, &7, &Rid::new(7, 14))?);
    assert!(table.get_value(None, &7)?.is_empty());
    Ok(())
}

#[test]
fn test_runs_over_parallel_buffer_pool() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_parallel_pool(4, 10)?;
    let table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(buffer_pool)?;

    for i in 0..2000 {
        assert!(table.insert(None, &i, &i)?);
    }
    table.verify_integrity()?;
    for i in 0..2000 {
        assert_eq!(table.get_value(None, &i)?, vec![i]);
        assert!(table.remove(None, &i, &i)?);
    }
    table.verify_integrity()?;
    Ok(())
}

#[test]
fn test_random_operations_match_model() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(20)?;
    let table: ExtendibleHashTable<i32, i32> = ExtendibleHashTable::new(buffer_pool)?;

    let mut rng = StdRng::seed_from_u64(0x5AB1E);
    let mut model: HashMap<i32, HashSet<i32>> = HashMap::new();

    for _ in 0..5000 {
        let key = rng.gen_range(0..200);
        let value = rng.gen_range(0..50);
        match rng.gen_range(0..3) {
            0 => {
                let expected = model.entry(key).or_default().insert(value);
                assert_eq!(table.insert(None, &key, &value)?, expected);
            }
            1 => {
                let expected = model.entry(key).or_default().remove(&value);
                assert_eq!(table.remove(None, &key, &value)?, expected);
            }
            _ => {
                let mut values = table.get_value(None, &key)?;
                values.sort_unstable();
                let mut expected: Vec<i32> =
                    model.get(&key).map(|s| s.iter().copied().collect()).unwrap_or_default();
                expected.sort_unstable();
                assert_eq!(values, expected);
            }
        }
    }
    table.verify_integrity()?;
    Ok(())
}
