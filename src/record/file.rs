//! Per-file record operations: get, insert, delete, update, and undo hooks.

use std::sync::Arc;

use parking_lot::Mutex;

use super::error::RecordError;
use super::header::{FILE_HEADER_PAGE_NO, FileHeader, NO_FREE_PAGE, PageLayout};
use super::page::RecordPage;
use super::scan::RecordScan;
use super::{RecordId, SlotId};
use crate::storage::{BufferPool, FileId, PageId, PageReadGuard, PageWriteGuard, Storage};
use crate::tx::{Context, WriteRecord};

/// Handle to one open record file.
///
/// Obtained from [`RecordManager::open_file`](super::RecordManager::open_file)
/// and shared as `Arc<RecordFile>`. All operations take a [`Context`]: with
/// a transaction present they acquire the appropriate locks (table intention
/// lock plus record lock) and append undo entries to the transaction's write
/// set; without one they do neither, which is how rollback replays inverses
/// against these same methods.
///
/// The in-memory [`FileHeader`] is the authority on page count and the free
/// chain while the file is open; it is written back to page 0 on
/// [`flush`](Self::flush) and close.
pub struct RecordFile<S: Storage> {
    file: FileId,
    name: String,
    layout: PageLayout,
    pool: Arc<BufferPool<S>>,
    header: Mutex<FileHeader>,
}

impl<S: Storage> std::fmt::Debug for RecordFile<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordFile")
            .field("file", &self.file)
            .field("name", &self.name)
            .field("layout", &self.layout)
            .field("header", &self.header)
            .finish()
    }
}

impl<S: Storage> RecordFile<S> {
    pub(super) fn new(
        file: FileId,
        name: String,
        pool: Arc<BufferPool<S>>,
        header: FileHeader,
    ) -> Self {
        Self {
            file,
            name,
            layout: header.layout(),
            pool,
            header: Mutex::new(header),
        }
    }

    /// Returns the storage file id.
    pub fn file_id(&self) -> FileId {
        self.file
    }

    /// Returns the table name this file was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fixed record size in bytes.
    pub fn record_size(&self) -> usize {
        self.layout.record_size
    }

    /// Returns the page geometry of this file.
    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    /// Returns a snapshot of the in-memory file header.
    pub fn header(&self) -> FileHeader {
        *self.header.lock()
    }

    /// Returns the buffer pool this file performs I/O through.
    pub fn pool(&self) -> &Arc<BufferPool<S>> {
        &self.pool
    }

    /// Returns a restartable scan over every record in the file.
    pub fn scan(&self) -> RecordScan<'_, S> {
        RecordScan::new(self)
    }

    /// Reads the record at `rid`.
    ///
    /// With a transaction in `ctx`, takes IS on the table and S on the
    /// record first.
    ///
    /// # Errors
    ///
    /// `RecordError::RecordNotFound` if the slot holds no record;
    /// `RecordError::PageNotExists` if `rid.page_no` is out of range;
    /// `RecordError::Abort` if a lock request fails.
    pub async fn get(&self, rid: RecordId, ctx: &Context) -> Result<Vec<u8>, RecordError> {
        if let Some((txn, lock_mgr)) = ctx.locking() {
            lock_mgr.lock_is_on_table(txn, self.file)?;
            lock_mgr.lock_s_on_record(txn, self.file, rid)?;
        }

        let guard = self.fetch_read(rid.page_no).await?;
        let page = RecordPage::new(guard.data(), self.layout);
        if !self.occupied(&page, rid.slot_no) {
            return Err(RecordError::RecordNotFound {
                page_no: rid.page_no,
                slot_no: rid.slot_no,
            });
        }
        Ok(page.slot(rid.slot_no).to_vec())
    }

    /// Inserts a record into the first free slot of a page with room,
    /// extending the file if every page is full.
    ///
    /// With a transaction in `ctx`, takes IX on the table first and records
    /// the insert for undo.
    ///
    /// # Errors
    ///
    /// `RecordError::RecordSizeMismatch` if `record` is not exactly
    /// `record_size` bytes; `RecordError::Abort` if the lock request fails.
    pub async fn insert(&self, record: &[u8], ctx: &Context) -> Result<RecordId, RecordError> {
        self.check_record_len(record)?;

        if let Some((txn, lock_mgr)) = ctx.locking() {
            lock_mgr.lock_ix_on_table(txn, self.file)?;
        }

        loop {
            let mut guard = self.acquire_free_page().await?;
            let page_no = guard.page_id().page_no;
            let mut page = RecordPage::new(guard.data_mut(), self.layout);

            let Some(slot_no) = page.first_free_slot() else {
                // A concurrent insert filled this page between our chain
                // read and the slot search. Unlink it if it is still the
                // chain head and try again.
                let next = page.header().next_free_page_no;
                drop(page);
                let mut header = self.header.lock();
                if header.first_free_page_no == page_no {
                    header.first_free_page_no = next;
                }
                continue;
            };

            page.write_record(slot_no, record);
            let now_full = page.is_full();
            let next_free = page.header().next_free_page_no;
            drop(page);
            guard.mark_dirty();

            if now_full {
                let mut header = self.header.lock();
                if header.first_free_page_no == page_no {
                    header.first_free_page_no = next_free;
                }
            }

            let rid = RecordId::new(page_no, slot_no);
            if let Some(txn) = ctx.recording_txn() {
                txn.push_write(WriteRecord::Insert {
                    table: self.name.clone(),
                    rid,
                });
            }
            return Ok(rid);
        }
    }

    /// Inserts a record at a specific rid, for undoing a prior delete.
    ///
    /// Restoring at the original rid is what keeps stale rid references
    /// (indexes, other write records) valid across rollback. Never takes
    /// locks and never records an undo entry.
    ///
    /// # Errors
    ///
    /// `RecordError::PageNotExists` if `rid.page_no` is not a data page of
    /// this file; `RecordError::Internal` if the slot is out of range or
    /// already occupied.
    pub async fn insert_at(&self, rid: RecordId, record: &[u8]) -> Result<(), RecordError> {
        self.check_record_len(record)?;

        let mut guard = self.fetch_write(rid.page_no).await?;
        let mut page = RecordPage::new(guard.data_mut(), self.layout);

        if rid.slot_no as usize >= self.layout.records_per_page {
            return Err(RecordError::Internal(format!(
                "insert_at: slot {} out of range",
                rid.slot_no
            )));
        }
        if page.is_occupied(rid.slot_no) {
            return Err(RecordError::Internal(format!(
                "insert_at: slot {} already occupied",
                rid
            )));
        }

        page.write_record(rid.slot_no, record);
        let now_full = page.is_full();
        let next_free = page.header().next_free_page_no;
        drop(page);
        guard.mark_dirty();

        if now_full {
            // The page left the free chain; if it is the head, advance the
            // head past it. It can only be mid-chain if undo is applied to
            // a page it did not delete from, which delete's head-push makes
            // impossible.
            let mut header = self.header.lock();
            if header.first_free_page_no == rid.page_no {
                header.first_free_page_no = next_free;
            }
        }

        Ok(())
    }

    /// Deletes the record at `rid`.
    ///
    /// With a transaction in `ctx`, takes IX on the table and X on the
    /// record, and records the before image for undo. A page that was full
    /// regains a free slot here and is pushed onto the head of the free
    /// chain.
    ///
    /// # Errors
    ///
    /// `RecordError::RecordNotFound` if the slot holds no record;
    /// `RecordError::PageNotExists` if `rid.page_no` is out of range;
    /// `RecordError::Abort` if a lock request fails.
    pub async fn delete(&self, rid: RecordId, ctx: &Context) -> Result<(), RecordError> {
        if let Some((txn, lock_mgr)) = ctx.locking() {
            lock_mgr.lock_ix_on_table(txn, self.file)?;
            lock_mgr.lock_x_on_record(txn, self.file, rid)?;
        }

        let mut guard = self.fetch_write(rid.page_no).await?;
        let mut page = RecordPage::new(guard.data_mut(), self.layout);

        if !self.occupied(&page, rid.slot_no) {
            return Err(RecordError::RecordNotFound {
                page_no: rid.page_no,
                slot_no: rid.slot_no,
            });
        }

        let was_full = page.is_full();

        if let Some(txn) = ctx.recording_txn() {
            txn.push_write(WriteRecord::Delete {
                table: self.name.clone(),
                rid,
                before: page.slot(rid.slot_no).to_vec(),
            });
        }

        page.clear_record(rid.slot_no);

        if was_full {
            // Full -> not-full fires at most once per delete, so the page
            // cannot be enqueued twice.
            let mut header = self.header.lock();
            page.set_next_free_page_no(header.first_free_page_no);
            header.first_free_page_no = rid.page_no;
        }

        drop(page);
        guard.mark_dirty();
        Ok(())
    }

    /// Overwrites the record at `rid`.
    ///
    /// With a transaction in `ctx`, takes IX on the table and X on the
    /// record (upgrading a scan's S lock if one is held), and records the
    /// before image for undo.
    ///
    /// # Errors
    ///
    /// `RecordError::RecordNotFound` if the slot holds no record;
    /// `RecordError::PageNotExists` if `rid.page_no` is out of range;
    /// `RecordError::RecordSizeMismatch` if `record` has the wrong length;
    /// `RecordError::Abort` if a lock request fails.
    pub async fn update(
        &self,
        rid: RecordId,
        record: &[u8],
        ctx: &Context,
    ) -> Result<(), RecordError> {
        self.check_record_len(record)?;

        if let Some((txn, lock_mgr)) = ctx.locking() {
            lock_mgr.lock_ix_on_table(txn, self.file)?;
            lock_mgr.lock_x_on_record(txn, self.file, rid)?;
        }

        let mut guard = self.fetch_write(rid.page_no).await?;
        let mut page = RecordPage::new(guard.data_mut(), self.layout);

        if !self.occupied(&page, rid.slot_no) {
            return Err(RecordError::RecordNotFound {
                page_no: rid.page_no,
                slot_no: rid.slot_no,
            });
        }

        if let Some(txn) = ctx.recording_txn() {
            txn.push_write(WriteRecord::Update {
                table: self.name.clone(),
                rid,
                before: page.slot(rid.slot_no).to_vec(),
            });
        }

        page.overwrite_record(rid.slot_no, record);
        drop(page);
        guard.mark_dirty();
        Ok(())
    }

    /// Writes the in-memory file header back to page 0 and flushes every
    /// dirty page of this file to storage.
    pub async fn flush(&self) -> Result<(), RecordError> {
        let header = self.header();
        let page_id = PageId::new(self.file, FILE_HEADER_PAGE_NO);
        let mut guard = self.pool.fetch_page_mut(page_id).await?;
        header.write_to(guard.data_mut());
        guard.mark_dirty();
        drop(guard);

        self.pool.flush_file(self.file).await?;
        Ok(())
    }

    /// Fetches a data page for reading, validating the page number.
    pub(super) async fn fetch_read(
        &self,
        page_no: u32,
    ) -> Result<PageReadGuard<'_, S>, RecordError> {
        self.validate_page_no(page_no)?;
        Ok(self.pool.fetch_page(PageId::new(self.file, page_no)).await?)
    }

    async fn fetch_write(&self, page_no: u32) -> Result<PageWriteGuard<'_, S>, RecordError> {
        self.validate_page_no(page_no)?;
        Ok(self
            .pool
            .fetch_page_mut(PageId::new(self.file, page_no))
            .await?)
    }

    /// Returns the chain head page, or extends the file with a fresh page
    /// when the chain is empty.
    ///
    /// A fresh page is initialized, linked to the current chain head, and
    /// becomes the new head before the guard is returned.
    async fn acquire_free_page(&self) -> Result<PageWriteGuard<'_, S>, RecordError> {
        let first_free = self.header.lock().first_free_page_no;

        if first_free != NO_FREE_PAGE {
            return Ok(self
                .pool
                .fetch_page_mut(PageId::new(self.file, first_free))
                .await?);
        }

        let mut guard = self.pool.new_page(self.file).await?;
        let page_no = guard.page_id().page_no;

        let mut header = self.header.lock();
        let mut page = RecordPage::new(guard.data_mut(), self.layout);
        page.init();
        // A delete may have pushed a page onto the chain while we were
        // allocating; link behind it rather than dropping it.
        page.set_next_free_page_no(header.first_free_page_no);
        drop(page);
        guard.mark_dirty();

        header.num_pages += 1;
        header.first_free_page_no = page_no;
        drop(header);

        Ok(guard)
    }

    fn validate_page_no(&self, page_no: u32) -> Result<(), RecordError> {
        let num_pages = self.header.lock().num_pages;
        if page_no <= FILE_HEADER_PAGE_NO || page_no >= num_pages {
            return Err(RecordError::PageNotExists {
                name: self.name.clone(),
                page_no,
            });
        }
        Ok(())
    }

    fn occupied<T: AsRef<[u8]>>(&self, page: &RecordPage<T>, slot_no: SlotId) -> bool {
        (slot_no as usize) < self.layout.records_per_page && page.is_occupied(slot_no)
    }

    fn check_record_len(&self, record: &[u8]) -> Result<(), RecordError> {
        if record.len() != self.layout.record_size {
            return Err(RecordError::RecordSizeMismatch {
                expected: self.layout.record_size,
                actual: record.len(),
            });
        }
        Ok(())
    }
}
