//! In-memory page storage implementation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Storage;
use crate::storage::error::StorageError;
use crate::storage::page::{FileId, PAGE_SIZE, PageData, PageId};

/// An in-memory file: a growable array of pages.
struct MemFile {
    pages: Mutex<Vec<PageData>>,
}

/// In-memory page storage for testing and development.
///
/// Files behave like their on-disk counterparts: they survive close/reopen
/// (contents are kept until `destroy_file`), and page numbers are assigned
/// sequentially. All operations are synchronous but exposed through the
/// async `Storage` trait.
pub struct MemoryStorage {
    state: Mutex<State>,
}

struct State {
    next_fd: u32,
    /// All files by name, open or not.
    files: HashMap<String, Arc<MemFile>>,
    open: HashMap<FileId, (String, Arc<MemFile>)>,
    open_by_name: HashMap<String, FileId>,
}

impl MemoryStorage {
    /// Creates a new empty in-memory storage.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_fd: 0,
                files: HashMap::new(),
                open: HashMap::new(),
                open_by_name: HashMap::new(),
            }),
        }
    }

    fn lookup(&self, file: FileId) -> Result<Arc<MemFile>, StorageError> {
        let state = self.state.lock();
        state
            .open
            .get(&file)
            .map(|(_, f)| Arc::clone(f))
            .ok_or(StorageError::UnknownFile(file))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    async fn create_file(&self, name: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.files.contains_key(name) {
            return Err(StorageError::FileExists(name.to_string()));
        }
        state.files.insert(
            name.to_string(),
            Arc::new(MemFile {
                pages: Mutex::new(Vec::new()),
            }),
        );
        Ok(())
    }

    async fn destroy_file(&self, name: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.open_by_name.contains_key(name) {
            return Err(StorageError::FileInUse(name.to_string()));
        }
        state
            .files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))
    }

    async fn open_file(&self, name: &str) -> Result<FileId, StorageError> {
        let mut state = self.state.lock();
        if let Some(&fd) = state.open_by_name.get(name) {
            return Ok(fd);
        }
        let mem_file = state
            .files
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        let fd = FileId::new(state.next_fd);
        state.next_fd += 1;
        state.open.insert(fd, (name.to_string(), mem_file));
        state.open_by_name.insert(name.to_string(), fd);
        Ok(fd)
    }

    async fn close_file(&self, file: FileId) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let (name, _) = state
            .open
            .remove(&file)
            .ok_or(StorageError::UnknownFile(file))?;
        state.open_by_name.remove(&name);
        Ok(())
    }

    fn file_name(&self, file: FileId) -> Result<String, StorageError> {
        let state = self.state.lock();
        state
            .open
            .get(&file)
            .map(|(name, _)| name.clone())
            .ok_or(StorageError::UnknownFile(file))
    }

    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mem_file = self.lookup(page_id.file)?;
        let pages = mem_file.pages.lock();
        let page = pages
            .get(page_id.page_no as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;

        buf.copy_from_slice(page.as_slice());
        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mem_file = self.lookup(page_id.file)?;
        let mut pages = mem_file.pages.lock();
        let page = pages
            .get_mut(page_id.page_no as usize)
            .ok_or(StorageError::PageNotFound(page_id))?;

        page.as_mut_slice().copy_from_slice(buf);
        Ok(())
    }

    async fn allocate_page(&self, file: FileId) -> Result<PageId, StorageError> {
        let mem_file = self.lookup(file)?;
        let mut pages = mem_file.pages.lock();
        let page_id = PageId::new(file, pages.len() as u32);
        pages.push(PageData::new());
        Ok(page_id)
    }

    async fn page_count(&self, file: FileId) -> Result<usize, StorageError> {
        let mem_file = self.lookup(file)?;
        let count = mem_file.pages.lock().len();
        Ok(count)
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        // No-op for in-memory storage
        Ok(())
    }
}
