//! Page I/O backend implementations.
//!
//! This module provides the `Storage` trait for file-grouped, page-based I/O,
//! along with MemoryStorage and FileStorage implementations.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::storage::error::StorageError;
use crate::storage::page::{FileId, PageId};

/// Page I/O backend trait for named page files.
///
/// The trait manages a set of named files, each an array of 8KB pages, and
/// defines raw read/write access using caller-owned buffers. Implementations:
/// - `io::MemoryStorage`: in-memory files, for tests and development
/// - `io::FileStorage`: disk-backed files under a root directory, using tokio::fs
///
/// # Design Decisions
///
/// 1. **Async trait**: Uses `async fn` (via `impl Future`) for compatibility
///    with tokio. File I/O is inherently blocking, so FileStorage uses
///    tokio::fs for async I/O.
///
/// 2. **Caller-owned buffers**: Storage reads and writes raw bytes only.
///    Memory management and caching are the responsibility of the buffer
///    pool above.
///
/// 3. **Handle-based access**: `open_file` hands out a `FileId`; page I/O is
///    addressed by `(FileId, page_no)`. The reverse mapping `file_name`
///    recovers the name a file was opened under.
///
/// 4. **Explicit allocation**: `allocate_page` grows a file by exactly one
///    zeroed page and is the only way to do so; reads and writes past the
///    end fail with `PageNotFound`.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync). Page-level latching is
/// handled by the buffer pool; this trait handles only raw I/O.
pub trait Storage: Send + Sync {
    /// Creates a new empty file with the given name.
    ///
    /// The file is not opened; call [`open_file`](Self::open_file) to obtain
    /// a handle.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::FileExists` if the name is already taken.
    fn create_file(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Removes a file and its pages.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::FileNotFound` if no such file exists, or
    /// `StorageError::FileInUse` if the file is currently open.
    fn destroy_file(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Opens a file and returns its handle.
    ///
    /// Opening an already-open file returns the existing handle.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::FileNotFound` if no such file exists.
    fn open_file(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<FileId, StorageError>> + Send;

    /// Closes an open file.
    ///
    /// The caller is responsible for flushing any cached pages first; closing
    /// does not sync.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UnknownFile` if the handle is not open.
    fn close_file(
        &self,
        file: FileId,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Returns the name an open file was opened under.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UnknownFile` if the handle is not open.
    fn file_name(&self, file: FileId) -> Result<String, StorageError>;

    /// Reads a page into a caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page has not been allocated,
    /// `StorageError::UnknownFile` if the file is not open, or
    /// `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    fn read_page(
        &self,
        page_id: PageId,
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Writes a page from a caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::PageNotFound` if the page has not been allocated,
    /// `StorageError::UnknownFile` if the file is not open, or
    /// `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    fn write_page(
        &self,
        page_id: PageId,
        buf: &[u8],
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Allocates a new zeroed page at the end of the file and returns its id.
    ///
    /// The first allocation in an empty file is guaranteed to return page
    /// number 0.
    fn allocate_page(
        &self,
        file: FileId,
    ) -> impl std::future::Future<Output = Result<PageId, StorageError>> + Send;

    /// Returns the number of allocated pages in an open file.
    fn page_count(
        &self,
        file: FileId,
    ) -> impl std::future::Future<Output = Result<usize, StorageError>> + Send;

    /// Syncs all pending writes of all open files to physical disk (fsync).
    ///
    /// For io::MemoryStorage, this is a no-op.
    fn sync_all(&self) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}
