use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::common::types::{FrameId, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::buffer::BufferPool;
use crate::storage::disk::DiskManager;

/// Per-frame metadata; the page bytes themselves live behind the shared `PagePtr`
struct Frame {
    page: PagePtr,
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

struct PoolInner {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

/// A single buffer pool instance: a fixed array of frames caching disk pages,
/// with an LRU replacer choosing eviction victims.
///
/// When the instance is one shard of a [`ParallelBufferPoolManager`], it only
/// ever allocates or serves page IDs congruent to its shard index modulo the
/// shard count.
///
/// [`ParallelBufferPoolManager`]: crate::storage::buffer::ParallelBufferPoolManager
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: usize,
    instance_index: usize,
    disk_manager: Arc<DiskManager>,
    replacer: LruReplacer,
    inner: Mutex<PoolInner>,
}

impl BufferPoolManager {
    /// Create a standalone buffer pool (a single shard covering all page IDs)
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::new_shard(pool_size, 1, 0, disk_manager)
    }

    /// Create one shard of a parallel buffer pool
    pub fn new_shard(
        pool_size: usize,
        num_instances: usize,
        instance_index: usize,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "a buffer pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "shard index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            frames.push(Frame {
                page: Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID))),
                page_id: INVALID_PAGE_ID,
                pin_count: 0,
                is_dirty: false,
            });
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            disk_manager,
            replacer: LruReplacer::new(pool_size),
            inner: Mutex::new(PoolInner {
                frames,
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index as PageId,
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of pinned pages: resident pages minus eviction candidates
    pub fn occupied_page_num(&self) -> usize {
        let inner = self.inner.lock();
        inner.page_table.len() - self.replacer.len()
    }

    /// Allocate a fresh page of this shard, pinned into a frame.
    ///
    /// The free list is drained before the replacer is consulted; a dirty
    /// victim is written back before its frame is reused. Fails with
    /// [`BufferPoolError::BufferPoolFull`] iff every frame is pinned.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut inner = self.inner.lock();
        let frame_id = self.acquire_frame(&mut inner)?;

        let page_id = inner.next_page_id;
        inner.next_page_id += self.num_instances as PageId;
        self.validate_page_id(page_id);

        let frame = &mut inner.frames[frame_id];
        {
            let mut page = frame.page.write();
            page.data.fill(0);
            page.page_id = page_id;
        }
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;
        let page_ptr = frame.page.clone();
        inner.page_table.insert(page_id, frame_id);

        Ok((page_ptr, page_id))
    }

    /// Pin a page, reading it from disk if it is not resident
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        self.validate_page_id(page_id);
        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &mut inner.frames[frame_id];
            frame.pin_count += 1;
            if frame.pin_count == 1 {
                self.replacer.pin(frame_id);
            }
            return Ok(frame.page.clone());
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        {
            let page_ptr = inner.frames[frame_id].page.clone();
            let mut page = page_ptr.write();
            if let Err(e) = self.disk_manager.read_page(page_id, &mut page.data) {
                drop(page);
                inner.free_list.push_back(frame_id);
                return Err(e.into());
            }
            page.page_id = page_id;
        }

        let frame = &mut inner.frames[frame_id];
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;
        let page_ptr = frame.page.clone();
        inner.page_table.insert(page_id, frame_id);

        Ok(page_ptr)
    }

    /// Drop one pin. `is_dirty = true` marks the page for write-back; the flag
    /// is never cleared here. When the pin count reaches zero the frame becomes
    /// an eviction candidate.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        self.validate_page_id(page_id);
        let mut inner = self.inner.lock();
        let frame_id = *inner
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        let frame = &mut inner.frames[frame_id];
        if is_dirty {
            frame.is_dirty = true;
        }
        if frame.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Write a resident page to disk and clear its dirty flag. Pins are not
    /// touched.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.validate_page_id(page_id);
        let mut inner = self.inner.lock();
        let frame_id = *inner
            .page_table
            .get(&page_id)
            .ok_or(BufferPoolError::PageNotFound(page_id))?;

        {
            let page_ptr = inner.frames[frame_id].page.clone();
            let page = page_ptr.read();
            self.disk_manager.write_page(page_id, &page.data)?;
        }
        inner.frames[frame_id].is_dirty = false;
        Ok(())
    }

    /// Flush every resident page
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let mut inner = self.inner.lock();
        let mapped: Vec<(PageId, FrameId)> =
            inner.page_table.iter().map(|(&p, &f)| (p, f)).collect();
        for (page_id, frame_id) in mapped {
            {
                let page_ptr = inner.frames[frame_id].page.clone();
                let page = page_ptr.read();
                self.disk_manager.write_page(page_id, &page.data)?;
            }
            inner.frames[frame_id].is_dirty = false;
        }
        Ok(())
    }

    /// Discard a page. An unmapped page is deallocated immediately; a pinned
    /// page cannot be deleted. The discarded bytes are not flushed.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        self.validate_page_id(page_id);
        let mut inner = self.inner.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            None => {
                self.disk_manager.deallocate_page(page_id);
                return Ok(());
            }
            Some(&frame_id) => frame_id,
        };
        if inner.frames[frame_id].pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        inner.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        {
            let frame = &mut inner.frames[frame_id];
            let mut page = frame.page.write();
            page.data.fill(0);
            page.page_id = INVALID_PAGE_ID;
            drop(page);
            frame.page_id = INVALID_PAGE_ID;
            frame.pin_count = 0;
            frame.is_dirty = false;
        }
        inner.free_list.push_back(frame_id);
        self.disk_manager.deallocate_page(page_id);
        Ok(())
    }

    /// Pick a frame for a new mapping: free list first, then an eviction
    /// victim. A dirty victim is written back and its old mapping removed.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let victim_id = self.replacer.victim().ok_or(BufferPoolError::BufferPoolFull)?;
        let (old_page_id, dirty) = {
            let frame = &inner.frames[victim_id];
            (frame.page_id, frame.is_dirty)
        };
        if dirty {
            let page_ptr = inner.frames[victim_id].page.clone();
            let page = page_ptr.read();
            if let Err(e) = self.disk_manager.write_page(old_page_id, &page.data) {
                // keep the frame evictable instead of leaking it
                self.replacer.unpin(victim_id);
                return Err(e.into());
            }
        }
        inner.frames[victim_id].is_dirty = false;
        inner.frames[victim_id].page_id = INVALID_PAGE_ID;
        if old_page_id != INVALID_PAGE_ID {
            inner.page_table.remove(&old_page_id);
        }
        Ok(victim_id)
    }

    /// Pages handled by this instance must hash back to its shard index
    fn validate_page_id(&self, page_id: PageId) {
        debug_assert!(
            page_id >= 0 && page_id as usize % self.num_instances == self.instance_index,
            "page {} does not belong to shard {}/{}",
            page_id,
            self.instance_index,
            self.num_instances
        );
    }
}

impl BufferPool for BufferPoolManager {
    fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        BufferPoolManager::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        BufferPoolManager::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        BufferPoolManager::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        BufferPoolManager::flush_page(self, page_id)
    }

    fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        BufferPoolManager::flush_all_pages(self)
    }

    fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        BufferPoolManager::delete_page(self, page_id)
    }
}
