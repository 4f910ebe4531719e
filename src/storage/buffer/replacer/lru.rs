use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::common::types::FrameId;

/// LRU page replacement policy over buffer pool frames.
///
/// Ordering is by unpin time, not access time: a frame becomes a candidate
/// only once its pin count drops to zero, and `victim` always removes the
/// frame that has been eligible the longest.
pub struct LruReplacer {
    inner: Mutex<LruInner>,
}

struct LruInner {
    // Newest candidates at the front, victims taken from the back
    queue: VecDeque<FrameId>,
    in_queue: Vec<bool>,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(LruInner {
                queue: VecDeque::with_capacity(num_frames),
                in_queue: vec![false; num_frames],
            }),
        }
    }

    /// Remove and return the least recently unpinned frame
    pub fn victim(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        let frame_id = inner.queue.pop_back()?;
        inner.in_queue[frame_id] = false;
        Some(frame_id)
    }

    /// A pinned frame is no longer an eviction candidate
    pub fn pin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if inner.in_queue[frame_id] {
            if let Some(pos) = inner.queue.iter().position(|&id| id == frame_id) {
                inner.queue.remove(pos);
            }
            inner.in_queue[frame_id] = false;
        }
    }

    /// A frame whose pin count reached zero becomes the newest candidate
    pub fn unpin(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if !inner.in_queue[frame_id] {
            inner.queue.push_front(frame_id);
            inner.in_queue[frame_id] = true;
        }
    }

    /// Number of frames currently eligible for eviction
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
