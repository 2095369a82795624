//! Full-file record scan.

use super::RecordId;
use super::error::RecordError;
use super::file::RecordFile;
use super::header::FILE_HEADER_PAGE_NO;
use super::page::RecordPage;
use crate::storage::Storage;

/// Restartable cursor over every record in a file.
///
/// Yields rids in ascending `(page_no, slot_no)` order, skipping free
/// slots. The scan pins one page at a time and takes no locks; callers that
/// need repeatable reads lock at the table level before scanning.
pub struct RecordScan<'a, S: Storage> {
    file: &'a RecordFile<S>,
    next_page_no: u32,
    next_slot_no: u32,
}

impl<'a, S: Storage> RecordScan<'a, S> {
    pub(super) fn new(file: &'a RecordFile<S>) -> Self {
        Self {
            file,
            next_page_no: FILE_HEADER_PAGE_NO + 1,
            next_slot_no: 0,
        }
    }

    /// Restarts the scan from the beginning of the file.
    pub fn rewind(&mut self) {
        self.next_page_no = FILE_HEADER_PAGE_NO + 1;
        self.next_slot_no = 0;
    }

    /// Returns the next occupied rid, or `None` at end of file.
    ///
    /// Pages appended after the scan passed their position are not
    /// revisited; pages appended ahead of it are seen.
    pub async fn next(&mut self) -> Result<Option<RecordId>, RecordError> {
        let layout = self.file.layout();

        loop {
            if self.next_page_no >= self.file.header().num_pages {
                return Ok(None);
            }
            if self.next_slot_no as usize >= layout.records_per_page {
                self.next_page_no += 1;
                self.next_slot_no = 0;
                continue;
            }

            let guard = self.file.fetch_read(self.next_page_no).await?;
            let page = RecordPage::new(guard.data(), layout);

            match page.next_occupied_slot(self.next_slot_no as u16) {
                Some(slot_no) => {
                    let rid = RecordId::new(self.next_page_no, slot_no);
                    self.next_slot_no = slot_no as u32 + 1;
                    return Ok(Some(rid));
                }
                None => {
                    self.next_page_no += 1;
                    self.next_slot_no = 0;
                }
            }
        }
    }
}
