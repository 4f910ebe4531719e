use std::sync::Arc;

use anyhow::Result;
use tempfile::NamedTempFile;

use sabledb::storage::buffer::{BufferPoolManager, ParallelBufferPoolManager};
use sabledb::storage::disk::DiskManager;

// Create a disk manager over a temporary database file
#[allow(dead_code)]
pub fn create_test_disk_manager() -> Result<(Arc<DiskManager>, NamedTempFile)> {
    let file = NamedTempFile::new()?;
    let disk_manager = Arc::new(DiskManager::new(file.path())?);
    Ok((disk_manager, file))
}

// Create a single-instance buffer pool with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (disk_manager, file) = create_test_disk_manager()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
    Ok((buffer_pool, file))
}

// Create a sharded buffer pool with a temporary database
#[allow(dead_code)]
pub fn create_test_parallel_pool(
    num_instances: usize,
    pool_size: usize,
) -> Result<(Arc<ParallelBufferPoolManager>, NamedTempFile)> {
    let (disk_manager, file) = create_test_disk_manager()?;
    let buffer_pool = Arc::new(ParallelBufferPoolManager::new(num_instances, pool_size, disk_manager));
    Ok((buffer_pool, file))
}
