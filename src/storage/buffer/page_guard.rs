use log::warn;

use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::BufferPool;

/// Scoped pin on a buffer pool page.
///
/// Every successful fetch or allocation must be paired with exactly one unpin;
/// the guard issues it on drop, on every exit path. Callers that mutate the
/// page call [`mark_dirty`](PageGuard::mark_dirty) so the unpin carries the
/// dirty flag.
pub struct PageGuard<'a> {
    pool: &'a dyn BufferPool,
    page: PagePtr,
    page_id: PageId,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    /// Pin an existing page
    pub fn fetch(pool: &'a dyn BufferPool, page_id: PageId) -> Result<Self, BufferPoolError> {
        let page = pool.fetch_page(page_id)?;
        Ok(Self {
            pool,
            page,
            page_id,
            dirty: false,
        })
    }

    /// Allocate a fresh page, pinned
    pub fn new_page(pool: &'a dyn BufferPool) -> Result<Self, BufferPoolError> {
        let (page, page_id) = pool.new_page()?;
        Ok(Self {
            pool,
            page,
            page_id,
            dirty: false,
        })
    }

    pub fn page(&self) -> PagePtr {
        self.page.clone()
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.pool.unpin_page(self.page_id, self.dirty) {
            warn!("failed to unpin page {}: {}", self.page_id, e);
        }
    }
}
