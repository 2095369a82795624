//! Buffer pool manager for caching pages in memory.

use std::collections::HashMap;
use std::sync::Mutex;

use log::trace;

use super::error::BufferPoolError;
use super::frame::{Frame, FrameId, FrameMetadata};
use super::guard::{PageReadGuard, PageWriteGuard};
use super::replacer::LruReplacer;
use crate::storage::{FileId, PageId, Storage};

/// Buffer pool manager for caching pages in memory.
///
/// The pool maintains a fixed number of frames and maps pages from storage
/// to frames on demand. When all frames are in use, the LRU policy selects
/// an unpinned victim for eviction; dirty victims are written back first.
///
/// # Architecture
///
/// ```text
/// +-------------------+
/// |  Record Manager   |
/// +-------------------+
///          |
///          v
/// +-------------------+
/// |    BufferPool     |  <- you are here
/// +-------------------+
///          |
///          v
/// +-------------------+
/// |  Storage (trait)  |
/// +-------------------+
/// ```
///
/// # Thread Safety
///
/// - Multiple readers can share a page (per-frame RwLock)
/// - Writers get exclusive access to their page
/// - Bookkeeping (page table, metadata, free list, replacer) lives under a
///   single state mutex
///
/// # Latch Hierarchy
///
/// To prevent deadlocks, locks must be acquired in strict order:
/// 1. State mutex
/// 2. Frame data RwLock
///
/// **NEVER** acquire the state lock while holding a frame data lock, except
/// through the synchronous `unpin` path which touches only the state mutex.
pub struct BufferPool<S: Storage> {
    /// The underlying storage backend.
    storage: S,

    /// Frame array; each frame's data is protected by its own RwLock.
    frames: Vec<Frame>,

    /// Protected mutable state.
    ///
    /// Uses `std::sync::Mutex` so it can be taken synchronously from
    /// guard `Drop` impls.
    state: Mutex<PoolState>,

    /// Number of frames in the pool.
    pool_size: usize,
}

/// Mutable state protected by the state mutex.
struct PoolState {
    /// Maps PageId -> FrameId for quick lookup.
    page_table: HashMap<PageId, FrameId>,

    /// Metadata for each frame (indexed by FrameId).
    frame_metadata: Vec<FrameMetadata>,

    /// Free frames (not currently holding any page).
    free_list: Vec<FrameId>,

    /// Replacement policy for selecting eviction victims.
    replacer: LruReplacer,
}

impl<S: Storage> BufferPool<S> {
    /// Creates a new buffer pool over the given storage.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is 0.
    pub fn new(storage: S, pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<_> = (0..pool_size).map(|_| Frame::new()).collect();
        let frame_metadata: Vec<_> = (0..pool_size).map(|_| FrameMetadata::new()).collect();
        let free_list: Vec<_> = (0..pool_size).map(FrameId::new).collect();

        Self {
            storage,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                frame_metadata,
                free_list,
                replacer: LruReplacer::new(),
            }),
            pool_size,
        }
    }

    /// Returns the underlying storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the number of frames in the buffer pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of pages currently cached.
    pub fn cached_pages(&self) -> usize {
        let state = self.state.lock().expect("state lock poisoned");
        state.page_table.len()
    }

    /// Fetches a page for reading.
    ///
    /// If the page is already in the buffer pool, returns it directly.
    /// Otherwise, reads it from storage into a free or evicted frame.
    ///
    /// The returned guard holds a pin on the page, preventing eviction
    /// until the guard is dropped.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::NoFreeFrames` if the pool is full and all pages are pinned
    /// - `BufferPoolError::Storage` if the page doesn't exist or I/O fails
    pub async fn fetch_page(
        &self,
        page_id: PageId,
    ) -> Result<PageReadGuard<'_, S>, BufferPoolError> {
        let frame_id = self.get_or_allocate_frame(page_id).await?;
        let data_guard = self.frames[frame_id.as_usize()].data.read().await;

        Ok(PageReadGuard {
            pool: self,
            frame_id,
            page_id,
            data_guard,
        })
    }

    /// Fetches a page for writing.
    ///
    /// Similar to `fetch_page`, but returns a mutable guard. The page is NOT
    /// automatically marked dirty; call `mark_dirty()` on the guard after
    /// modifications.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::NoFreeFrames` if the pool is full and all pages are pinned
    /// - `BufferPoolError::Storage` if the page doesn't exist or I/O fails
    pub async fn fetch_page_mut(
        &self,
        page_id: PageId,
    ) -> Result<PageWriteGuard<'_, S>, BufferPoolError> {
        let frame_id = self.get_or_allocate_frame(page_id).await?;
        let data_guard = self.frames[frame_id.as_usize()].data.write().await;

        Ok(PageWriteGuard {
            pool: self,
            frame_id,
            page_id,
            data_guard,
            is_dirty: false,
        })
    }

    /// Allocates a new page in the given file and fetches it for writing.
    ///
    /// The new page is zeroed by the storage backend.
    ///
    /// # Errors
    ///
    /// - `BufferPoolError::NoFreeFrames` if the pool is full and all pages are pinned
    /// - `BufferPoolError::Storage` if storage allocation fails
    pub async fn new_page(
        &self,
        file: FileId,
    ) -> Result<PageWriteGuard<'_, S>, BufferPoolError> {
        let page_id = self.storage.allocate_page(file).await?;
        self.fetch_page_mut(page_id).await
    }

    /// Flushes a specific page to storage if it's dirty.
    ///
    /// Does nothing if the page is not in the buffer pool or not dirty.
    ///
    /// # Errors
    ///
    /// Returns `BufferPoolError::Storage` if the write fails.
    pub async fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let frame_id = {
            let state = self.state.lock().expect("state lock poisoned");
            match state.page_table.get(&page_id) {
                Some(&fid) if state.frame_metadata[fid.as_usize()].is_dirty => Some(fid),
                _ => None,
            }
        };

        if let Some(frame_id) = frame_id {
            let data_guard = self.frames[frame_id.as_usize()].data.read().await;

            self.storage
                .write_page(page_id, data_guard.as_slice())
                .await?;

            let mut state = self.state.lock().expect("state lock poisoned");
            // Verify the frame still holds the same page before clearing
            if state.frame_metadata[frame_id.as_usize()].page_id == Some(page_id) {
                state.frame_metadata[frame_id.as_usize()].is_dirty = false;
            }
        }

        Ok(())
    }

    /// Flushes every dirty page of one file to storage.
    ///
    /// Cached clean copies stay in the pool.
    ///
    /// # Errors
    ///
    /// Returns `BufferPoolError::Storage` if any write fails.
    pub async fn flush_file(&self, file: FileId) -> Result<(), BufferPoolError> {
        let dirty_pages = self.collect_dirty(|page_id| page_id.file == file);
        for page_id in dirty_pages {
            self.flush_page(page_id).await?;
        }
        Ok(())
    }

    /// Flushes all dirty pages to storage and fsyncs.
    ///
    /// # Errors
    ///
    /// Returns `BufferPoolError::Storage` if any write fails.
    pub async fn flush_all(&self) -> Result<(), BufferPoolError> {
        let dirty_pages = self.collect_dirty(|_| true);
        for page_id in dirty_pages {
            self.flush_page(page_id).await?;
        }
        self.storage.sync_all().await?;
        Ok(())
    }

    /// Collects the ids of dirty pages matching a filter.
    fn collect_dirty(&self, filter: impl Fn(PageId) -> bool) -> Vec<PageId> {
        let state = self.state.lock().expect("state lock poisoned");
        state
            .frame_metadata
            .iter()
            .filter(|meta| meta.is_dirty)
            .filter_map(|meta| meta.page_id)
            .filter(|&page_id| filter(page_id))
            .collect()
    }

    /// Gets or allocates a frame for a page.
    ///
    /// If the page is already in the buffer pool, increments its pin count.
    /// Otherwise, allocates a free frame or evicts a victim frame.
    ///
    /// # Concurrency Note
    ///
    /// If multiple tasks concurrently request the same page that is not in
    /// the pool, both may allocate frames and perform I/O. After I/O
    /// completes, we re-check the page table and discard the redundant frame
    /// if another task won the race. This is inefficient but correct.
    async fn get_or_allocate_frame(&self, page_id: PageId) -> Result<FrameId, BufferPoolError> {
        // Fast path: page already cached
        {
            let mut state = self.state.lock().expect("state lock poisoned");

            if let Some(&frame_id) = state.page_table.get(&page_id) {
                state.frame_metadata[frame_id.as_usize()].pin_count += 1;
                state.replacer.pin(frame_id);
                return Ok(frame_id);
            }
        }

        // Page miss: allocate a frame and load from storage
        let frame_id = self.allocate_frame().await?;

        let read_result = {
            let mut data_guard = self.frames[frame_id.as_usize()].data.write().await;
            self.storage
                .read_page(page_id, data_guard.as_mut_slice())
                .await
        };

        // Return the frame to the free list on failure to avoid a leak
        if let Err(e) = read_result {
            let mut state = self.state.lock().expect("state lock poisoned");
            state.free_list.push(frame_id);
            return Err(e.into());
        }

        let mut state = self.state.lock().expect("state lock poisoned");

        // Another task may have loaded this page while we were doing I/O
        if let Some(&existing_frame_id) = state.page_table.get(&page_id) {
            state.free_list.push(frame_id);
            state.frame_metadata[existing_frame_id.as_usize()].pin_count += 1;
            state.replacer.pin(existing_frame_id);
            return Ok(existing_frame_id);
        }

        state.page_table.insert(page_id, frame_id);
        let meta = &mut state.frame_metadata[frame_id.as_usize()];
        meta.page_id = Some(page_id);
        meta.pin_count = 1;
        meta.is_dirty = false;

        Ok(frame_id)
    }

    /// Allocates a free frame, evicting if necessary.
    async fn allocate_frame(&self) -> Result<FrameId, BufferPoolError> {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if let Some(frame_id) = state.free_list.pop() {
                return Ok(frame_id);
            }
        }

        // No free frames: evict a victim
        loop {
            let victim = {
                let mut state = self.state.lock().expect("state lock poisoned");
                state.replacer.victim()
            };

            let frame_id = match victim {
                Some(fid) => fid,
                None => return Err(BufferPoolError::NoFreeFrames),
            };

            let (old_page_id, is_dirty) = {
                let state = self.state.lock().expect("state lock poisoned");
                let meta = &state.frame_metadata[frame_id.as_usize()];
                (meta.page_id, meta.is_dirty)
            };

            // Write back if dirty
            if let Some(old_page_id) = old_page_id
                && is_dirty
            {
                trace!("evicting dirty page {}", old_page_id);
                let data_guard = self.frames[frame_id.as_usize()].data.read().await;
                self.storage
                    .write_page(old_page_id, data_guard.as_slice())
                    .await?;
            }

            // Complete eviction under the state lock
            {
                let mut state = self.state.lock().expect("state lock poisoned");

                // The frame may have been re-pinned while we were doing I/O
                if state.frame_metadata[frame_id.as_usize()].pin_count > 0 {
                    continue;
                }

                if let Some(old_page_id) = old_page_id {
                    state.page_table.remove(&old_page_id);
                }
                state.frame_metadata[frame_id.as_usize()].reset();

                return Ok(frame_id);
            }
        }
    }

    /// Unpins a frame (called from guard `Drop` impls).
    ///
    /// This is a synchronous operation because Drop is synchronous.
    pub(super) fn unpin(&self, frame_id: FrameId, is_dirty: bool) {
        let mut state = self.state.lock().expect("state lock poisoned");

        let meta = &mut state.frame_metadata[frame_id.as_usize()];

        if meta.pin_count > 0 {
            meta.pin_count -= 1;

            if is_dirty {
                meta.is_dirty = true;
            }

            if meta.pin_count == 0 {
                state.replacer.unpin(frame_id);
            }
        }
    }

    #[cfg(test)]
    fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock().expect("state lock poisoned");
        state
            .page_table
            .get(&page_id)
            .map(|fid| state.frame_metadata[fid.as_usize()].pin_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, PAGE_SIZE};

    async fn pool_with_file(pool_size: usize) -> (BufferPool<MemoryStorage>, FileId) {
        let storage = MemoryStorage::new();
        storage.create_file("t").await.unwrap();
        let fd = storage.open_file("t").await.unwrap();
        (BufferPool::new(storage, pool_size), fd)
    }

    #[tokio::test]
    async fn test_new_buffer_pool() {
        let (pool, _fd) = pool_with_file(10).await;
        assert_eq!(pool.pool_size(), 10);
        assert_eq!(pool.cached_pages(), 0);
    }

    #[tokio::test]
    async fn test_new_page() {
        let (pool, fd) = pool_with_file(10).await;

        let guard = pool.new_page(fd).await.unwrap();
        let page_id = guard.page_id();

        assert_eq!(page_id, PageId::new(fd, 0));
        assert_eq!(guard.data().len(), PAGE_SIZE);

        drop(guard);
        assert_eq!(pool.cached_pages(), 1);
    }

    #[tokio::test]
    async fn test_fetch_same_page_twice() {
        let (pool, fd) = pool_with_file(10).await;
        let page_id = pool.storage().allocate_page(fd).await.unwrap();

        let guard1 = pool.fetch_page(page_id).await.unwrap();
        drop(guard1);

        let guard2 = pool.fetch_page(page_id).await.unwrap();
        assert_eq!(guard2.page_id(), page_id);
        drop(guard2);

        assert_eq!(pool.cached_pages(), 1);
    }

    #[tokio::test]
    async fn test_guard_drop_unpins() {
        let (pool, fd) = pool_with_file(10).await;
        let page_id = pool.storage().allocate_page(fd).await.unwrap();

        {
            let _guard = pool.fetch_page(page_id).await.unwrap();
            assert_eq!(pool.pin_count(page_id), Some(1));
        }
        assert_eq!(pool.pin_count(page_id), Some(0));
    }

    #[tokio::test]
    async fn test_dirty_page_write_back() {
        let (pool, fd) = pool_with_file(10).await;

        let page_id;
        {
            let mut guard = pool.new_page(fd).await.unwrap();
            page_id = guard.page_id();
            guard.data_mut()[0] = 42;
            guard.mark_dirty();
        }

        pool.flush_page(page_id).await.unwrap();

        // Verify the bytes reached storage
        let mut buf = vec![0u8; PAGE_SIZE];
        pool.storage().read_page(page_id, &mut buf).await.unwrap();
        assert_eq!(buf[0], 42);
    }

    #[tokio::test]
    async fn test_eviction_on_full_pool() {
        let storage = MemoryStorage::new();
        storage.create_file("t").await.unwrap();
        let fd = storage.open_file("t").await.unwrap();
        for _ in 0..5 {
            storage.allocate_page(fd).await.unwrap();
        }

        let pool = BufferPool::new(storage, 3);

        // Fetch all 5 pages; should trigger evictions
        for i in 0..5 {
            let guard = pool.fetch_page(PageId::new(fd, i)).await.unwrap();
            drop(guard);
        }

        assert_eq!(pool.cached_pages(), 3);
    }

    #[tokio::test]
    async fn test_no_free_frames_all_pinned() {
        let (pool, fd) = pool_with_file(2).await;
        for _ in 0..3 {
            pool.storage().allocate_page(fd).await.unwrap();
        }

        let _guard1 = pool.fetch_page(PageId::new(fd, 0)).await.unwrap();
        let _guard2 = pool.fetch_page(PageId::new(fd, 1)).await.unwrap();

        let result = pool.fetch_page(PageId::new(fd, 2)).await;
        assert!(matches!(result, Err(BufferPoolError::NoFreeFrames)));
    }

    #[tokio::test]
    async fn test_dirty_eviction_writes_back() {
        let (pool, fd) = pool_with_file(2).await;
        for _ in 0..3 {
            pool.storage().allocate_page(fd).await.unwrap();
        }

        {
            let mut guard = pool.fetch_page_mut(PageId::new(fd, 0)).await.unwrap();
            guard.data_mut()[0] = 99;
            guard.mark_dirty();
        }

        // Force eviction of page 0
        {
            let _g1 = pool.fetch_page(PageId::new(fd, 1)).await.unwrap();
        }
        {
            let _g2 = pool.fetch_page(PageId::new(fd, 2)).await.unwrap();
        }

        let guard = pool.fetch_page(PageId::new(fd, 0)).await.unwrap();
        assert_eq!(guard.data()[0], 99);
    }

    #[tokio::test]
    async fn test_flush_file_only_touches_that_file() {
        let storage = MemoryStorage::new();
        storage.create_file("a").await.unwrap();
        storage.create_file("b").await.unwrap();
        let fa = storage.open_file("a").await.unwrap();
        let fb = storage.open_file("b").await.unwrap();
        let pool = BufferPool::new(storage, 10);

        let pa = {
            let mut guard = pool.new_page(fa).await.unwrap();
            guard.data_mut()[0] = 1;
            guard.mark_dirty();
            guard.page_id()
        };
        let pb = {
            let mut guard = pool.new_page(fb).await.unwrap();
            guard.data_mut()[0] = 2;
            guard.mark_dirty();
            guard.page_id()
        };

        pool.flush_file(fa).await.unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        pool.storage().read_page(pa, &mut buf).await.unwrap();
        assert_eq!(buf[0], 1);
        // Page of file b has not been flushed yet
        pool.storage().read_page(pb, &mut buf).await.unwrap();
        assert_eq!(buf[0], 0);

        pool.flush_all().await.unwrap();
        pool.storage().read_page(pb, &mut buf).await.unwrap();
        assert_eq!(buf[0], 2);
    }

    #[tokio::test]
    async fn test_multiple_readers() {
        let (pool, fd) = pool_with_file(10).await;
        let page_id = pool.storage().allocate_page(fd).await.unwrap();

        let guard1 = pool.fetch_page(page_id).await.unwrap();
        let guard2 = pool.fetch_page(page_id).await.unwrap();
        assert_eq!(guard1.page_id(), guard2.page_id());
    }
}
