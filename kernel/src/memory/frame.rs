//! Physical frame allocator.
//!
//! A pool of free frame numbers shared by every process. Frames are handed
//! out from the front of the pool and returned to the back, so a long-running
//! system quickly stops giving consecutive pages consecutive frames.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use spin::Mutex;

use super::MemoryError;

/// Free-frame pool.
pub struct FrameAllocator {
    free: Mutex<VecDeque<u32>>,
    total: usize,
}

impl FrameAllocator {
    /// Pool owning frames `0..num_frames`.
    pub fn new(num_frames: usize) -> Self {
        Self {
            free: Mutex::new((0..num_frames as u32).collect()),
            total: num_frames,
        }
    }

    /// Take one frame.
    pub fn allocate(&self) -> Option<u32> {
        self.free.lock().pop_front()
    }

    /// Take `count` frames, or none at all if the pool is too small.
    pub fn allocate_many(&self, count: usize) -> Result<Vec<u32>, MemoryError> {
        let mut free = self.free.lock();
        if free.len() < count {
            log::warn!(
                "[frames] need {} frames, only {} free",
                count,
                free.len()
            );
            return Err(MemoryError::OutOfFrames {
                requested: count,
                available: free.len(),
            });
        }
        Ok(free.drain(..count).collect())
    }

    /// Return a frame to the pool.
    ///
    /// Frames outside the pool's range or already free are ignored.
    pub fn free(&self, ppn: u32) {
        if ppn as usize >= self.total {
            log::warn!("[frames] ignoring free of foreign frame {}", ppn);
            return;
        }
        let mut free = self.free.lock();
        if free.contains(&ppn) {
            log::warn!("[frames] ignoring double free of frame {}", ppn);
            return;
        }
        free.push_back(ppn);
    }

    /// Frames currently free.
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    /// Frames managed by this pool.
    pub fn total(&self) -> usize {
        self.total
    }
}
