//! Record file lifecycle: create, open, close, destroy.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use super::error::RecordError;
use super::file::RecordFile;
use super::header::{FILE_HEADER_PAGE_NO, FileHeader};
use crate::storage::{BufferPool, PAGE_SIZE, PageId, Storage};

/// Creates and opens record files, caching open handles by table name.
///
/// The name cache is what lets rollback resolve a
/// [`WriteRecord`](crate::tx::WriteRecord)'s table name back to the file it
/// must undo against, mirroring the storage layer's fd-to-name mapping in
/// the opposite direction.
pub struct RecordManager<S: Storage> {
    pool: Arc<BufferPool<S>>,
    handles: RwLock<HashMap<String, Arc<RecordFile<S>>>>,
}

impl<S: Storage> RecordManager<S> {
    /// Creates a record manager over the given buffer pool.
    pub fn new(pool: Arc<BufferPool<S>>) -> Self {
        Self {
            pool,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the buffer pool record files perform I/O through.
    pub fn pool(&self) -> &Arc<BufferPool<S>> {
        &self.pool
    }

    /// Creates a new record file holding fixed `record_size`-byte records.
    ///
    /// Writes the file header to page 0 and leaves the file closed.
    ///
    /// # Errors
    ///
    /// `RecordError::InvalidRecordSize` if a record (plus its bitmap bit)
    /// cannot fit in a data page; `RecordError::Storage` if the name is
    /// taken or I/O fails.
    pub async fn create_file(&self, name: &str, record_size: usize) -> Result<(), RecordError> {
        let header =
            FileHeader::new(record_size).ok_or(RecordError::InvalidRecordSize(record_size))?;

        let storage = self.pool.storage();
        storage.create_file(name).await?;
        let fd = storage.open_file(name).await?;

        let page_id = storage.allocate_page(fd).await?;
        debug_assert_eq!(page_id.page_no, FILE_HEADER_PAGE_NO);

        let mut buf = vec![0u8; PAGE_SIZE];
        header.write_to(&mut buf);
        storage.write_page(page_id, &buf).await?;
        storage.close_file(fd).await?;

        debug!("created record file {} (record_size {})", name, record_size);
        Ok(())
    }

    /// Opens a record file and returns its shared handle.
    ///
    /// Repeated opens of the same name return the same handle.
    ///
    /// # Errors
    ///
    /// `RecordError::Storage` if the file does not exist or reading the
    /// header fails.
    pub async fn open_file(&self, name: &str) -> Result<Arc<RecordFile<S>>, RecordError> {
        if let Some(handle) = self.handle(name) {
            return Ok(handle);
        }

        let storage = self.pool.storage();
        let fd = storage.open_file(name).await?;

        let mut buf = vec![0u8; PAGE_SIZE];
        storage
            .read_page(PageId::new(fd, FILE_HEADER_PAGE_NO), &mut buf)
            .await?;
        let header = FileHeader::read_from(&buf);

        let mut handles = self.handles.write();
        // Another task may have opened the same file while we were reading
        let handle = handles
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(RecordFile::new(
                    fd,
                    name.to_string(),
                    Arc::clone(&self.pool),
                    header,
                ))
            })
            .clone();

        debug!("opened record file {} ({} pages)", name, header.num_pages);
        Ok(handle)
    }

    /// Returns the cached handle for an open file, if any.
    pub fn handle(&self, name: &str) -> Option<Arc<RecordFile<S>>> {
        self.handles.read().get(name).cloned()
    }

    /// Flushes and closes an open record file.
    ///
    /// The in-memory header is written back to page 0 and every dirty page
    /// of the file reaches storage before the file closes. Outstanding
    /// handles to the file become unusable.
    ///
    /// # Errors
    ///
    /// `RecordError::Storage` with `FileNotFound` if the file is not open.
    pub async fn close_file(&self, name: &str) -> Result<(), RecordError> {
        let handle = self.handles.write().remove(name).ok_or_else(|| {
            RecordError::Storage(crate::storage::StorageError::FileNotFound(name.to_string()))
        })?;

        handle.flush().await?;
        let storage = self.pool.storage();
        storage.sync_all().await?;
        storage.close_file(handle.file_id()).await?;

        debug!("closed record file {}", name);
        Ok(())
    }

    /// Destroys a record file that is not open.
    ///
    /// # Errors
    ///
    /// `RecordError::Storage` with `FileInUse` if the file is open, or
    /// `FileNotFound` if it does not exist.
    pub async fn destroy_file(&self, name: &str) -> Result<(), RecordError> {
        if self.handle(name).is_some() {
            return Err(RecordError::Storage(
                crate::storage::StorageError::FileInUse(name.to_string()),
            ));
        }
        self.pool.storage().destroy_file(name).await?;
        debug!("destroyed record file {}", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;
    use crate::storage::{MemoryStorage, StorageError};
    use crate::tx::Context;

    fn manager() -> RecordManager<MemoryStorage> {
        RecordManager::new(Arc::new(BufferPool::new(MemoryStorage::new(), 64)))
    }

    #[tokio::test]
    async fn test_create_and_open() {
        let record_mgr = manager();
        record_mgr.create_file("t", 64).await.unwrap();

        let file = record_mgr.open_file("t").await.unwrap();
        assert_eq!(file.name(), "t");
        assert_eq!(file.record_size(), 64);
        assert_eq!(file.header().num_pages, 1);
    }

    #[tokio::test]
    async fn test_open_returns_cached_handle() {
        let record_mgr = manager();
        record_mgr.create_file("t", 64).await.unwrap();

        let a = record_mgr.open_file("t").await.unwrap();
        let b = record_mgr.open_file("t").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(record_mgr.handle("t").is_some());
    }

    #[tokio::test]
    async fn test_invalid_record_size_rejected() {
        let record_mgr = manager();
        assert!(matches!(
            record_mgr.create_file("t", 0).await.unwrap_err(),
            RecordError::InvalidRecordSize(0)
        ));
        assert!(matches!(
            record_mgr.create_file("t", PAGE_SIZE).await.unwrap_err(),
            RecordError::InvalidRecordSize(_)
        ));
    }

    #[tokio::test]
    async fn test_close_persists_state_across_reopen() {
        let record_mgr = manager();
        record_mgr.create_file("t", 64).await.unwrap();
        let ctx = Context::none();

        let rid = {
            let file = record_mgr.open_file("t").await.unwrap();
            file.insert(&[7u8; 64], &ctx).await.unwrap()
        };
        record_mgr.close_file("t").await.unwrap();
        assert!(record_mgr.handle("t").is_none());

        let file = record_mgr.open_file("t").await.unwrap();
        assert_eq!(file.header().num_pages, 2);
        assert_eq!(file.get(rid, &ctx).await.unwrap(), vec![7u8; 64]);
    }

    #[tokio::test]
    async fn test_close_unopened_fails() {
        let record_mgr = manager();
        assert!(matches!(
            record_mgr.close_file("nope").await.unwrap_err(),
            RecordError::Storage(StorageError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_open_file_rejected() {
        let record_mgr = manager();
        record_mgr.create_file("t", 64).await.unwrap();
        let _file = record_mgr.open_file("t").await.unwrap();

        assert!(matches!(
            record_mgr.destroy_file("t").await.unwrap_err(),
            RecordError::Storage(StorageError::FileInUse(_))
        ));

        record_mgr.close_file("t").await.unwrap();
        record_mgr.destroy_file("t").await.unwrap();
        assert!(matches!(
            record_mgr.open_file("t").await.unwrap_err(),
            RecordError::Storage(StorageError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_distinct_files_do_not_interfere() {
        let record_mgr = manager();
        record_mgr.create_file("a", 64).await.unwrap();
        record_mgr.create_file("b", 128).await.unwrap();
        let ctx = Context::none();

        let fa = record_mgr.open_file("a").await.unwrap();
        let fb = record_mgr.open_file("b").await.unwrap();

        let ra = fa.insert(&[1u8; 64], &ctx).await.unwrap();
        let rb = fb.insert(&[2u8; 128], &ctx).await.unwrap();
        assert_eq!(ra, RecordId::new(1, 0));
        assert_eq!(rb, RecordId::new(1, 0));

        assert_eq!(fa.get(ra, &ctx).await.unwrap(), vec![1u8; 64]);
        assert_eq!(fb.get(rb, &ctx).await.unwrap(), vec![2u8; 128]);
    }
}
