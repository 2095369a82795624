//! Storage layer errors.

use crate::storage::{FileId, PageId};

/// Storage layer errors.
#[derive(Debug)]
pub enum StorageError {
    /// No file with the given name exists.
    FileNotFound(String),

    /// A file with the given name already exists.
    FileExists(String),

    /// The file cannot be destroyed because it is still open.
    FileInUse(String),

    /// The FileId does not refer to an open file.
    UnknownFile(FileId),

    /// Page not found in storage.
    ///
    /// This occurs when attempting to read or write a page that has not been
    /// allocated yet. Use `allocate_page` to create new pages.
    PageNotFound(PageId),

    /// Invalid buffer size provided to read_page or write_page.
    ///
    /// Buffers must be exactly PAGE_SIZE bytes.
    InvalidBufferSize {
        /// Expected buffer size (PAGE_SIZE)
        expected: usize,
        /// Actual buffer size provided
        actual: usize,
    },

    /// I/O error from the underlying file system.
    Io(std::io::Error),

    /// Data corruption detected.
    ///
    /// Indicates that a storage file has an invalid format or size.
    Corrupted(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "file not found: {}", name),
            StorageError::FileExists(name) => write!(f, "file already exists: {}", name),
            StorageError::FileInUse(name) => write!(f, "file is still open: {}", name),
            StorageError::UnknownFile(id) => write!(f, "no open file with id {}", id),
            StorageError::PageNotFound(id) => write!(f, "page not found: {}", id),
            StorageError::InvalidBufferSize { expected, actual } => {
                write!(
                    f,
                    "invalid buffer size: expected {}, got {}",
                    expected, actual
                )
            }
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::Corrupted(msg) => write!(f, "data corruption: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}
