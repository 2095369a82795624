//! Buffer pool errors.

use crate::storage::StorageError;

/// Errors from buffer pool operations.
#[derive(Debug)]
pub enum BufferPoolError {
    /// All frames are occupied and pinned; no page can be loaded or evicted.
    NoFreeFrames,

    /// Error from the underlying storage backend.
    Storage(StorageError),
}

impl std::fmt::Display for BufferPoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferPoolError::NoFreeFrames => {
                write!(f, "no free frames: all pages are pinned")
            }
            BufferPoolError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for BufferPoolError {}

impl From<StorageError> for BufferPoolError {
    fn from(e: StorageError) -> Self {
        BufferPoolError::Storage(e)
    }
}
