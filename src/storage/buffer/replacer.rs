//! Eviction policy for the buffer pool.

use std::collections::{BTreeMap, HashMap};

use super::frame::FrameId;

/// Least-recently-used eviction order over the pool's unpinned frames.
///
/// The pool reports pin-count transitions: [`unpin`](Self::unpin) when a
/// frame's last guard drops, [`pin`](Self::pin) when an unpinned frame is
/// taken again. [`victim`](Self::victim) hands back the frame whose last
/// unpin is oldest.
///
/// Recency is tracked with a monotonic stamp per unpin: `ages` orders
/// evictable frames oldest-first, `stamps` finds a frame's entry in O(log n)
/// when it gets re-pinned. Both maps always hold exactly the evictable
/// frames, so `victim` never has to skip stale entries.
pub struct LruReplacer {
    /// Monotonic counter; higher stamp = more recently unpinned.
    clock: u64,

    /// Evictable frames ordered by unpin stamp (oldest first).
    ages: BTreeMap<u64, FrameId>,

    /// Stamp of each evictable frame, for removal on re-pin.
    stamps: HashMap<FrameId, u64>,
}

impl LruReplacer {
    /// Creates an empty replacer.
    pub fn new() -> Self {
        Self {
            clock: 0,
            ages: BTreeMap::new(),
            stamps: HashMap::new(),
        }
    }

    /// Selects and removes the least recently unpinned frame.
    ///
    /// Returns `None` when every frame is pinned.
    pub fn victim(&mut self) -> Option<FrameId> {
        let (_, frame_id) = self.ages.pop_first()?;
        self.stamps.remove(&frame_id);
        Some(frame_id)
    }

    /// Marks a frame non-evictable.
    ///
    /// Called when a frame's pin count rises from 0. Pinning a frame the
    /// replacer is not tracking is a no-op.
    pub fn pin(&mut self, frame_id: FrameId) {
        if let Some(stamp) = self.stamps.remove(&frame_id) {
            self.ages.remove(&stamp);
        }
    }

    /// Marks a frame evictable, stamping it most recently used.
    ///
    /// Called when a frame's pin count drops to 0. A frame that is already
    /// evictable keeps its original stamp.
    pub fn unpin(&mut self, frame_id: FrameId) {
        if self.stamps.contains_key(&frame_id) {
            return;
        }
        self.clock += 1;
        self.ages.insert(self.clock, frame_id);
        self.stamps.insert(frame_id, self.clock);
    }

    /// Returns the number of evictable frames.
    pub fn evictable(&self) -> usize {
        self.stamps.len()
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}
