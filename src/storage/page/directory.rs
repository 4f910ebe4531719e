use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::common::types::{PageId, PAGE_SIZE};

/// Maximum number of directory entries; caps the global depth at 9
pub const DIRECTORY_ARRAY_SIZE: usize = 512;

// Directory page layout (little-endian):
//
//  0:    page_id                                       (4 bytes, i32)
//  4:    global_depth                                  (4 bytes, u32)
//  8:    bucket_page_ids[DIRECTORY_ARRAY_SIZE]         (4 bytes each, i32)
//  2056: local_depths[DIRECTORY_ARRAY_SIZE]            (1 byte each)
const PAGE_ID_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const BUCKET_PAGE_IDS_OFFSET: usize = 8;
const LOCAL_DEPTHS_OFFSET: usize = BUCKET_PAGE_IDS_OFFSET + 4 * DIRECTORY_ARRAY_SIZE;

/// View over the bytes of an extendible hash directory page.
///
/// The directory maps the low `global_depth` bits of a key hash to a bucket
/// page ID, and remembers per entry how many of those bits the target bucket
/// actually distinguishes (its local depth).
pub struct HashTableDirectoryPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> HashTableDirectoryPage<B> {
    pub fn new(data: B) -> Self {
        debug_assert!(data.as_ref().len() >= PAGE_SIZE);
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data.as_ref()[PAGE_ID_OFFSET..])
    }

    pub fn global_depth(&self) -> u32 {
        LittleEndian::read_u32(&self.data.as_ref()[GLOBAL_DEPTH_OFFSET..])
    }

    pub fn global_depth_mask(&self) -> u32 {
        (1 << self.global_depth()) - 1
    }

    /// Current number of directory entries, `2^global_depth`
    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    pub fn bucket_page_id(&self, idx: u32) -> PageId {
        debug_assert!((idx as usize) < DIRECTORY_ARRAY_SIZE);
        let offset = BUCKET_PAGE_IDS_OFFSET + 4 * idx as usize;
        LittleEndian::read_i32(&self.data.as_ref()[offset..])
    }

    pub fn local_depth(&self, idx: u32) -> u32 {
        debug_assert!((idx as usize) < DIRECTORY_ARRAY_SIZE);
        self.data.as_ref()[LOCAL_DEPTHS_OFFSET + idx as usize] as u32
    }

    /// The low `local_depth` bits of a directory index
    pub fn local_high_bit(&self, idx: u32) -> u32 {
        idx & ((1 << self.local_depth(idx)) - 1)
    }

    /// The directory index that would merge with `idx` if its local depth
    /// were decremented
    pub fn split_image_index(&self, idx: u32) -> u32 {
        let depth = self.local_depth(idx);
        debug_assert!(depth > 0, "entry {} has no split image at depth 0", idx);
        idx ^ (1 << (depth - 1))
    }

    /// The directory can halve iff every entry distinguishes fewer bits than
    /// the directory itself
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        (0..self.size() as u32).all(|idx| self.local_depth(idx) < global_depth)
    }

    /// Fatal check of the directory invariants: every local depth is bounded
    /// by the global depth, and any two entries agreeing on their low
    /// `min(local_depth)` bits point at the same bucket page.
    pub fn verify_integrity(&self) {
        let size = self.size() as u32;
        let global_depth = self.global_depth();
        for i in 0..size {
            assert!(
                self.local_depth(i) <= global_depth,
                "entry {}: local depth {} exceeds global depth {}",
                i,
                self.local_depth(i),
                global_depth
            );
        }
        for i in 0..size {
            for j in (i + 1)..size {
                let mask = (1 << self.local_depth(i).min(self.local_depth(j))) - 1;
                if i & mask == j & mask {
                    assert_eq!(
                        self.bucket_page_id(i),
                        self.bucket_page_id(j),
                        "entries {} and {} share their low bits but map to different buckets",
                        i,
                        j
                    );
                }
            }
        }
    }

    /// Dump the live directory entries to the debug log
    pub fn log_directory(&self) {
        debug!("directory page {}: global depth {}", self.page_id(), self.global_depth());
        for idx in 0..self.size() as u32 {
            debug!(
                "  [{}] -> bucket page {} (local depth {})",
                idx,
                self.bucket_page_id(idx),
                self.local_depth(idx)
            );
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HashTableDirectoryPage<B> {
    /// Initialize a zeroed page as an empty directory of global depth zero
    pub fn init(&mut self, page_id: PageId) {
        self.set_page_id(page_id);
        self.set_global_depth(0);
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        LittleEndian::write_i32(&mut self.data.as_mut()[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4], page_id);
    }

    fn set_global_depth(&mut self, global_depth: u32) {
        LittleEndian::write_u32(
            &mut self.data.as_mut()[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4],
            global_depth,
        );
    }

    pub fn set_bucket_page_id(&mut self, idx: u32, bucket_page_id: PageId) {
        debug_assert!((idx as usize) < DIRECTORY_ARRAY_SIZE);
        let offset = BUCKET_PAGE_IDS_OFFSET + 4 * idx as usize;
        LittleEndian::write_i32(&mut self.data.as_mut()[offset..offset + 4], bucket_page_id);
    }

    pub fn set_local_depth(&mut self, idx: u32, local_depth: u32) {
        debug_assert!((idx as usize) < DIRECTORY_ARRAY_SIZE);
        debug_assert!(local_depth <= u8::MAX as u32);
        self.data.as_mut()[LOCAL_DEPTHS_OFFSET + idx as usize] = local_depth as u8;
    }

    pub fn incr_local_depth(&mut self, idx: u32) {
        let depth = self.local_depth(idx);
        self.set_local_depth(idx, depth + 1);
    }

    pub fn decr_local_depth(&mut self, idx: u32) {
        let depth = self.local_depth(idx);
        debug_assert!(depth > 0);
        self.set_local_depth(idx, depth - 1);
    }

    /// Double the directory: each new entry inherits the bucket and local
    /// depth of the entry it mirrors in the lower half
    pub fn incr_global_depth(&mut self) {
        let old_size = self.size();
        assert!(
            old_size * 2 <= DIRECTORY_ARRAY_SIZE,
            "directory cannot grow past {} entries",
            DIRECTORY_ARRAY_SIZE
        );
        for i in 0..old_size as u32 {
            let bucket_page_id = self.bucket_page_id(i);
            let local_depth = self.local_depth(i);
            let mirror = i + old_size as u32;
            self.set_bucket_page_id(mirror, bucket_page_id);
            self.set_local_depth(mirror, local_depth);
        }
        let global_depth = self.global_depth();
        self.set_global_depth(global_depth + 1);
    }

    /// Halve the directory
    pub fn decr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        debug_assert!(global_depth > 0);
        self.set_global_depth(global_depth - 1);
    }
}
