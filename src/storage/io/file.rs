//! Disk-backed storage implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::fs::{File as TokioFile, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::Storage;
use crate::storage::error::StorageError;
use crate::storage::page::{FileId, PAGE_SIZE, PageId};

/// An open disk file and its cached page count.
struct OpenFile {
    name: String,
    /// File handle wrapped in an async mutex to serialize I/O.
    file: tokio::sync::Mutex<TokioFile>,
    page_count: AtomicU64,
}

/// Disk-backed storage implementation.
///
/// Manages a directory of page files, one per name. Each file stores its
/// pages as contiguous 8KB blocks:
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (8KB)     | Page 1 (8KB)     | Page 2 (8KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 8192      ^ offset 16384
/// ```
///
/// # Concurrency
///
/// The file table is guarded by a `parking_lot::Mutex` (never held across
/// I/O); each open file serializes its reads and writes through a
/// `tokio::Mutex` around the handle.
///
/// NOTE: For higher throughput the per-file mutex could be replaced with
/// positional I/O (pread/pwrite) on a shared handle.
///
/// # Durability
///
/// `sync_all()` fsyncs every open file. Without it, writes may sit in the OS
/// cache and be lost on crash.
pub struct FileStorage {
    root: PathBuf,
    state: Mutex<State>,
}

struct State {
    next_fd: u32,
    open: HashMap<FileId, Arc<OpenFile>>,
    open_by_name: HashMap<String, FileId>,
}

impl FileStorage {
    /// Opens a storage rooted at the given directory, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            state: Mutex::new(State {
                next_fd: 0,
                open: HashMap::new(),
                open_by_name: HashMap::new(),
            }),
        })
    }

    /// Returns the root directory of this storage.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn lookup(&self, file: FileId) -> Result<Arc<OpenFile>, StorageError> {
        let state = self.state.lock();
        state
            .open
            .get(&file)
            .map(Arc::clone)
            .ok_or(StorageError::UnknownFile(file))
    }
}

impl Storage for FileStorage {
    async fn create_file(&self, name: &str) -> Result<(), StorageError> {
        let path = self.path_of(name);
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::FileExists(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn destroy_file(&self, name: &str) -> Result<(), StorageError> {
        {
            let state = self.state.lock();
            if state.open_by_name.contains_key(name) {
                return Err(StorageError::FileInUse(name.to_string()));
            }
        }
        match tokio::fs::remove_file(self.path_of(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open_file(&self, name: &str) -> Result<FileId, StorageError> {
        {
            let state = self.state.lock();
            if let Some(&fd) = state.open_by_name.get(name) {
                return Ok(fd);
            }
        }

        let path = self.path_of(name);
        let file = match OpenOptions::new().read(true).write(true).open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::FileNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let file_size = file.metadata().await?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file {} has size {} which is not a multiple of page size {}",
                name, file_size, PAGE_SIZE
            )));
        }

        let mut state = self.state.lock();
        // Another task may have opened the same name while we were doing I/O.
        if let Some(&fd) = state.open_by_name.get(name) {
            return Ok(fd);
        }

        let fd = FileId::new(state.next_fd);
        state.next_fd += 1;
        state.open.insert(
            fd,
            Arc::new(OpenFile {
                name: name.to_string(),
                file: tokio::sync::Mutex::new(file),
                page_count: AtomicU64::new(file_size / PAGE_SIZE as u64),
            }),
        );
        state.open_by_name.insert(name.to_string(), fd);
        Ok(fd)
    }

    async fn close_file(&self, file: FileId) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let open_file = state
            .open
            .remove(&file)
            .ok_or(StorageError::UnknownFile(file))?;
        state.open_by_name.remove(&open_file.name);
        // The handle closes when the last Arc (including in-flight I/O) drops.
        Ok(())
    }

    fn file_name(&self, file: FileId) -> Result<String, StorageError> {
        self.lookup(file).map(|f| f.name.clone())
    }

    async fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let open_file = self.lookup(page_id.file)?;
        if page_id.page_no as u64 >= open_file.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut file = open_file.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        file.read_exact(buf).await?;
        Ok(())
    }

    async fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let open_file = self.lookup(page_id.file)?;
        if page_id.page_no as u64 >= open_file.page_count.load(Ordering::Acquire) {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut file = open_file.file.lock().await;
        file.seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        file.write_all(buf).await?;
        Ok(())
    }

    async fn allocate_page(&self, file: FileId) -> Result<PageId, StorageError> {
        let open_file = self.lookup(file)?;

        let mut handle = open_file.file.lock().await;
        let page_no = open_file.page_count.load(Ordering::Acquire);
        let page_id = PageId::new(file, page_no as u32);

        // Extend the file with a zeroed page
        handle
            .seek(std::io::SeekFrom::Start(page_id.byte_offset()))
            .await?;
        handle.write_all(&[0u8; PAGE_SIZE]).await?;

        open_file.page_count.store(page_no + 1, Ordering::Release);
        Ok(page_id)
    }

    async fn page_count(&self, file: FileId) -> Result<usize, StorageError> {
        let open_file = self.lookup(file)?;
        Ok(open_file.page_count.load(Ordering::Acquire) as usize)
    }

    async fn sync_all(&self) -> Result<(), StorageError> {
        let open_files: Vec<Arc<OpenFile>> = {
            let state = self.state.lock();
            state.open.values().map(Arc::clone).collect()
        };
        for open_file in open_files {
            let file = open_file.file.lock().await;
            file.sync_all().await?;
        }
        Ok(())
    }
}
