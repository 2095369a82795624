//! RAII guards for buffer pool page access.
//!
//! A guard pins its page for as long as it lives; dropping it unpins. This
//! is the scoped-pin discipline the rest of the engine relies on: early
//! returns and error paths cannot leak a pin.

use std::ops::{Deref, DerefMut};

use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};

use super::frame::FrameId;
use super::pool::BufferPool;
use crate::storage::{PageData, PageId, Storage};

/// RAII guard for read-only page access.
///
/// Holds a shared lock on the frame data and a pin on the page. Both are
/// released when the guard is dropped.
pub struct PageReadGuard<'a, S: Storage> {
    pub(super) pool: &'a BufferPool<S>,
    pub(super) frame_id: FrameId,
    pub(super) page_id: PageId,
    pub(super) data_guard: RwLockReadGuard<'a, PageData>,
}

impl<'a, S: Storage> PageReadGuard<'a, S> {
    /// Returns the PageId of this page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8] {
        self.data_guard.as_slice()
    }
}

impl<'a, S: Storage> Deref for PageReadGuard<'a, S> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data_guard.as_slice()
    }
}

impl<'a, S: Storage> Drop for PageReadGuard<'a, S> {
    fn drop(&mut self) {
        self.pool.unpin(self.frame_id, false);
    }
}

/// RAII guard for mutable page access.
///
/// Holds an exclusive lock on the frame data and a pin on the page. The page
/// is NOT automatically marked dirty; call [`mark_dirty`](Self::mark_dirty)
/// after modifying it, or the changes may be dropped instead of written back
/// on eviction.
pub struct PageWriteGuard<'a, S: Storage> {
    pub(super) pool: &'a BufferPool<S>,
    pub(super) frame_id: FrameId,
    pub(super) page_id: PageId,
    pub(super) data_guard: RwLockWriteGuard<'a, PageData>,
    pub(super) is_dirty: bool,
}

impl<'a, S: Storage> PageWriteGuard<'a, S> {
    /// Returns the PageId of this page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8] {
        self.data_guard.as_slice()
    }

    /// Returns the page bytes mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data_guard.as_mut_slice()
    }

    /// Records that the page was modified and must be written back.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }
}

impl<'a, S: Storage> Deref for PageWriteGuard<'a, S> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data_guard.as_slice()
    }
}

impl<'a, S: Storage> DerefMut for PageWriteGuard<'a, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_guard.as_mut_slice()
    }
}

impl<'a, S: Storage> Drop for PageWriteGuard<'a, S> {
    fn drop(&mut self) {
        self.pool.unpin(self.frame_id, self.is_dirty);
    }
}
