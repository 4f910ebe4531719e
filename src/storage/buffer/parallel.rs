use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::manager::BufferPoolManager;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::DiskManager;

/// Shard router over several independent buffer pool instances.
///
/// Sharding by `page_id % num_instances` avoids a global pool latch: every
/// instance carries its own mutex, replacer, and page allocator sequence, so
/// operations on different shards never contend.
pub struct ParallelBufferPoolManager {
    num_instances: usize,
    instances: Vec<Arc<BufferPoolManager>>,
    start_index: AtomicUsize,
}

impl ParallelBufferPoolManager {
    /// Create `num_instances` shards of `pool_size` frames each, all backed by
    /// the same disk manager
    pub fn new(num_instances: usize, pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(num_instances > 0, "a parallel pool needs at least one instance");
        let instances = (0..num_instances)
            .map(|i| Arc::new(BufferPoolManager::new_shard(pool_size, num_instances, i, disk_manager.clone())))
            .collect();
        Self {
            num_instances,
            instances,
            start_index: AtomicUsize::new(0),
        }
    }

    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    /// The instance responsible for a page ID
    fn instance_for(&self, page_id: PageId) -> &BufferPoolManager {
        debug_assert!(page_id >= 0, "page {} cannot be routed", page_id);
        &self.instances[page_id as usize % self.num_instances]
    }

    /// Probe the shards round-robin for one willing to allocate.
    ///
    /// The starting shard rotates by one on every call to spread allocation
    /// load; the probe wraps all the way around before giving up.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let start = self.start_index.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.num_instances {
            let instance = &self.instances[(start + offset) % self.num_instances];
            match instance.new_page() {
                Ok(allocated) => return Ok(allocated),
                Err(BufferPoolError::BufferPoolFull) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(BufferPoolError::BufferPoolFull)
    }

    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        self.instance_for(page_id).fetch_page(page_id)
    }

    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).flush_page(page_id)
    }

    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.instance_for(page_id).delete_page(page_id)
    }
}

impl BufferPool for ParallelBufferPoolManager {
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        ParallelBufferPoolManager::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        ParallelBufferPoolManager::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        ParallelBufferPoolManager::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        ParallelBufferPoolManager::flush_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        ParallelBufferPoolManager::flush_all_pages(self)
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        ParallelBufferPoolManager::delete_page(self, page_id)
    }
}
