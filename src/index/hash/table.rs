use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::common::types::PageId;
use crate::index::hash::error::HashTableError;
use crate::storage::buffer::{BufferPool, PageGuard};
use crate::storage::page::bucket::HashTableBucketPage;
use crate::storage::page::codec::Storable;
use crate::storage::page::directory::{HashTableDirectoryPage, DIRECTORY_ARRAY_SIZE};
use crate::transaction::Transaction;

/// Disk-backed extendible hash table.
///
/// The directory and every bucket are ordinary buffer pool pages; the table
/// holds nothing but the directory's page ID and pins pages only for the
/// duration of each operation. Writers (insert, remove, split, merge) take
/// the table latch exclusively and readers take it shared, so a split can
/// never race a read of the splitting bucket.
///
/// A transaction handle is threaded through the operations for the benefit of
/// future callers; the index itself never consults it.
pub struct ExtendibleHashTable<K, V> {
    buffer_pool: Arc<dyn BufferPool>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Storable + Hash,
    V: Storable,
{
    /// Set up an empty table: a directory of global depth zero whose single
    /// entry points at one empty bucket
    pub fn new(buffer_pool: Arc<dyn BufferPool>) -> Result<Self, HashTableError> {
        let mut directory_guard = PageGuard::new_page(buffer_pool.as_ref())?;
        let directory_page_id = directory_guard.page_id();
        let mut bucket_guard = PageGuard::new_page(buffer_pool.as_ref())?;
        let bucket_page_id = bucket_guard.page_id();

        {
            let page_ptr = directory_guard.page();
            let mut page = page_ptr.write();
            let mut directory = HashTableDirectoryPage::new(&mut page.data[..]);
            directory.init(directory_page_id);
            directory.set_bucket_page_id(0, bucket_page_id);
        }
        directory_guard.mark_dirty();
        // a zeroed page already is a valid empty bucket
        bucket_guard.mark_dirty();
        drop(directory_guard);
        drop(bucket_guard);

        Ok(Self {
            buffer_pool,
            directory_page_id,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// Downcast of the 64-bit hash; `DefaultHasher::new` is fixed-keyed, so
    /// bucket layouts are stable across runs
    fn hash32(key: &K) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }

    /// Directory index and bucket page for a key, read under the directory
    /// page latch
    fn route(&self, directory_guard: &PageGuard<'_>, key: &K) -> (u32, PageId) {
        let page_ptr = directory_guard.page();
        let page = page_ptr.read();
        let directory = HashTableDirectoryPage::new(&page.data[..]);
        let idx = Self::hash32(key) & directory.global_depth_mask();
        (idx, directory.bucket_page_id(idx))
    }

    /// Collect every value stored under `key`
    pub fn get_value(&self, _txn: Option<&Transaction>, key: &K) -> Result<Vec<V>, HashTableError> {
        let _table = self.table_latch.read();
        let directory_guard = PageGuard::fetch(self.buffer_pool.as_ref(), self.directory_page_id)?;
        let (_, bucket_page_id) = self.route(&directory_guard, key);

        let bucket_guard = PageGuard::fetch(self.buffer_pool.as_ref(), bucket_page_id)?;
        let page_ptr = bucket_guard.page();
        let page = page_ptr.read();
        let bucket = HashTableBucketPage::<_, K, V>::new(&page.data[..]);

        let mut result = Vec::new();
        bucket.get_value(key, &mut result);
        Ok(result)
    }

    /// Insert a (key, value) pair, splitting the target bucket as often as
    /// needed. Returns false on an exact duplicate, or when a required
    /// directory doubling would exceed its capacity.
    pub fn insert(&self, _txn: Option<&Transaction>, key: &K, value: &V) -> Result<bool, HashTableError> {
        let _table = self.table_latch.write();
        loop {
            let mut directory_guard =
                PageGuard::fetch(self.buffer_pool.as_ref(), self.directory_page_id)?;
            let (directory_idx, bucket_page_id) = self.route(&directory_guard, key);
            let mut bucket_guard = PageGuard::fetch(self.buffer_pool.as_ref(), bucket_page_id)?;

            let is_full = {
                let page_ptr = bucket_guard.page();
                let page = page_ptr.read();
                HashTableBucketPage::<_, K, V>::new(&page.data[..]).is_full()
            };

            if !is_full {
                let inserted = {
                    let page_ptr = bucket_guard.page();
                    let mut page = page_ptr.write();
                    HashTableBucketPage::<_, K, V>::new(&mut page.data[..]).insert(key, value)
                };
                if inserted {
                    bucket_guard.mark_dirty();
                }
                return Ok(inserted);
            }

            if !self.split_bucket(&mut directory_guard, &mut bucket_guard, directory_idx)? {
                return Ok(false);
            }
            // all pins drop here; the next round re-routes through the
            // reshaped directory
        }
    }

    /// Split the full bucket behind `directory_idx`, doubling the directory
    /// first when the bucket already uses every global bit. Returns false iff
    /// the directory is at capacity.
    fn split_bucket(
        &self,
        directory_guard: &mut PageGuard<'_>,
        bucket_guard: &mut PageGuard<'_>,
        directory_idx: u32,
    ) -> Result<bool, HashTableError> {
        let old_page_id = bucket_guard.page_id();

        {
            let page_ptr = directory_guard.page();
            let page = page_ptr.read();
            let directory = HashTableDirectoryPage::new(&page.data[..]);
            if directory.local_depth(directory_idx) == directory.global_depth()
                && (1usize << (directory.global_depth() + 1)) > DIRECTORY_ARRAY_SIZE
            {
                return Ok(false);
            }
        }

        let mut image_guard = PageGuard::new_page(self.buffer_pool.as_ref())?;
        let image_page_id = image_guard.page_id();

        // redirect every directory entry of the old bucket: entries whose
        // new distinguishing bit is set move to the image page
        let step = {
            let page_ptr = directory_guard.page();
            let mut page = page_ptr.write();
            let mut directory = HashTableDirectoryPage::new(&mut page.data[..]);
            if directory.local_depth(directory_idx) == directory.global_depth() {
                directory.incr_global_depth();
            }
            let depth = directory.local_depth(directory_idx);
            let high_bit = directory.local_high_bit(directory_idx);
            let step = 1u32 << depth;
            let size = directory.size() as u32;
            let mut idx = high_bit;
            while idx < size {
                if idx & step != 0 {
                    directory.set_bucket_page_id(idx, image_page_id);
                } else {
                    directory.set_bucket_page_id(idx, old_page_id);
                }
                directory.incr_local_depth(idx);
                idx += step;
            }
            step
        };
        directory_guard.mark_dirty();
        debug!(
            "split bucket page {} into {} (split bit {:#x})",
            old_page_id, image_page_id, step
        );

        // clone the bucket bytes, then drop each live entry from whichever
        // copy no longer matches its routing
        {
            let old_ptr = bucket_guard.page();
            let image_ptr = image_guard.page();
            let mut old_page = old_ptr.write();
            let mut image_page = image_ptr.write();
            image_page.data.copy_from_slice(&old_page.data);

            let mut old_bucket = HashTableBucketPage::<_, K, V>::new(&mut old_page.data[..]);
            let mut image_bucket = HashTableBucketPage::<_, K, V>::new(&mut image_page.data[..]);
            for idx in 0..HashTableBucketPage::<&[u8], K, V>::CAPACITY {
                if !old_bucket.is_readable(idx) {
                    continue;
                }
                if Self::hash32(&old_bucket.key_at(idx)) & step != 0 {
                    old_bucket.remove_at(idx);
                } else {
                    image_bucket.remove_at(idx);
                }
            }
        }
        bucket_guard.mark_dirty();
        image_guard.mark_dirty();
        Ok(true)
    }

    /// Remove the exact (key, value) pair; an emptied bucket is merged with
    /// its split image
    pub fn remove(&self, _txn: Option<&Transaction>, key: &K, value: &V) -> Result<bool, HashTableError> {
        let _table = self.table_latch.write();
        let mut directory_guard =
            PageGuard::fetch(self.buffer_pool.as_ref(), self.directory_page_id)?;
        let (directory_idx, bucket_page_id) = self.route(&directory_guard, key);

        let mut bucket_guard = PageGuard::fetch(self.buffer_pool.as_ref(), bucket_page_id)?;
        let (removed, now_empty) = {
            let page_ptr = bucket_guard.page();
            let mut page = page_ptr.write();
            let mut bucket = HashTableBucketPage::<_, K, V>::new(&mut page.data[..]);
            let removed = bucket.remove(key, value);
            (removed, bucket.is_empty())
        };
        if removed {
            bucket_guard.mark_dirty();
        }
        // the empty bucket must be unpinned before merge deletes its page
        drop(bucket_guard);

        if removed && now_empty {
            self.merge(&mut directory_guard, directory_idx)?;
        }
        Ok(removed)
    }

    /// Collapse the empty bucket at `bucket_idx` into its split image, then
    /// halve the directory for as long as every entry allows it
    fn merge(
        &self,
        directory_guard: &mut PageGuard<'_>,
        bucket_idx: u32,
    ) -> Result<(), HashTableError> {
        let (bucket_page_id, depth, mergeable) = {
            let page_ptr = directory_guard.page();
            let page = page_ptr.read();
            let directory = HashTableDirectoryPage::new(&page.data[..]);
            let bucket_page_id = directory.bucket_page_id(bucket_idx);
            let depth = directory.local_depth(bucket_idx);
            let mergeable = depth > 0 && {
                let image_idx = directory.split_image_index(bucket_idx);
                directory.bucket_page_id(image_idx) != bucket_page_id
                    && directory.local_depth(image_idx) == depth
            };
            (bucket_page_id, depth, mergeable)
        };
        if !mergeable {
            return Ok(());
        }

        {
            let page_ptr = directory_guard.page();
            let mut page = page_ptr.write();
            let mut directory = HashTableDirectoryPage::new(&mut page.data[..]);
            let image_page_id = directory.bucket_page_id(directory.split_image_index(bucket_idx));

            // every entry sharing the low depth-1 bits now points at the image
            let step = 1u32 << (depth - 1);
            let size = directory.size() as u32;
            let mut idx = bucket_idx & (step - 1);
            while idx < size {
                directory.set_bucket_page_id(idx, image_page_id);
                directory.decr_local_depth(idx);
                idx += step;
            }
            while directory.can_shrink() {
                directory.decr_global_depth();
            }
        }
        directory_guard.mark_dirty();
        debug!("merged empty bucket page {}", bucket_page_id);
        self.buffer_pool.delete_page(bucket_page_id)?;
        Ok(())
    }

    /// Remove every live pair of the bucket behind one directory entry
    pub fn remove_all_items(
        &self,
        txn: Option<&Transaction>,
        bucket_idx: u32,
    ) -> Result<(), HashTableError> {
        let items = {
            let _table = self.table_latch.read();
            let directory_guard =
                PageGuard::fetch(self.buffer_pool.as_ref(), self.directory_page_id)?;
            let bucket_page_id = {
                let page_ptr = directory_guard.page();
                let page = page_ptr.read();
                HashTableDirectoryPage::new(&page.data[..]).bucket_page_id(bucket_idx)
            };
            let bucket_guard = PageGuard::fetch(self.buffer_pool.as_ref(), bucket_page_id)?;
            let page_ptr = bucket_guard.page();
            let page = page_ptr.read();
            HashTableBucketPage::<_, K, V>::new(&page.data[..]).get_all_items()
        };

        for (key, value) in items {
            self.remove(txn, &key, &value)?;
        }
        Ok(())
    }

    pub fn get_global_depth(&self) -> Result<u32, HashTableError> {
        let _table = self.table_latch.read();
        let directory_guard = PageGuard::fetch(self.buffer_pool.as_ref(), self.directory_page_id)?;
        let page_ptr = directory_guard.page();
        let page = page_ptr.read();
        Ok(HashTableDirectoryPage::new(&page.data[..]).global_depth())
    }

    /// Fatal check of the directory invariants; see
    /// [`HashTableDirectoryPage::verify_integrity`]
    pub fn verify_integrity(&self) -> Result<(), HashTableError> {
        let _table = self.table_latch.read();
        let directory_guard = PageGuard::fetch(self.buffer_pool.as_ref(), self.directory_page_id)?;
        let page_ptr = directory_guard.page();
        let page = page_ptr.read();
        HashTableDirectoryPage::new(&page.data[..]).verify_integrity();
        Ok(())
    }

    /// Dump the directory to the debug log
    pub fn log_directory(&self) -> Result<(), HashTableError> {
        let _table = self.table_latch.read();
        let directory_guard = PageGuard::fetch(self.buffer_pool.as_ref(), self.directory_page_id)?;
        let page_ptr = directory_guard.page();
        let page = page_ptr.read();
        HashTableDirectoryPage::new(&page.data[..]).log_directory();
        Ok(())
    }
}
