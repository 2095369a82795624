//! Error types for the record manager.

use crate::lock::TransactionAbort;
use crate::storage::{BufferPoolError, StorageError};

/// Errors from record file operations.
#[derive(Debug)]
pub enum RecordError {
    /// The target slot holds no record.
    RecordNotFound {
        /// Page of the requested record.
        page_no: u32,
        /// Slot of the requested record.
        slot_no: u16,
    },

    /// The page number is outside the file's data page range.
    PageNotExists {
        /// Name of the record file.
        name: String,
        /// The out-of-range page number.
        page_no: u32,
    },

    /// The record buffer does not match the file's fixed record size.
    RecordSizeMismatch {
        /// The file's record size.
        expected: usize,
        /// Length of the buffer provided.
        actual: usize,
    },

    /// The requested record size cannot fit in a page.
    InvalidRecordSize(usize),

    /// Internal invariant violation; indicates a bug or misuse.
    Internal(String),

    /// A lock request failed and the transaction must abort.
    Abort(TransactionAbort),

    /// Error from the buffer pool.
    Buffer(BufferPoolError),

    /// Error from the storage backend.
    Storage(StorageError),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::RecordNotFound { page_no, slot_no } => {
                write!(f, "record not found at page {} slot {}", page_no, slot_no)
            }
            RecordError::PageNotExists { name, page_no } => {
                write!(f, "page {} does not exist in file {}", page_no, name)
            }
            RecordError::RecordSizeMismatch { expected, actual } => {
                write!(
                    f,
                    "record size mismatch: expected {} bytes, got {}",
                    expected, actual
                )
            }
            RecordError::InvalidRecordSize(size) => {
                write!(f, "record size {} does not fit in a page", size)
            }
            RecordError::Internal(msg) => write!(f, "internal error: {}", msg),
            RecordError::Abort(e) => write!(f, "{}", e),
            RecordError::Buffer(e) => write!(f, "buffer pool error: {}", e),
            RecordError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<TransactionAbort> for RecordError {
    fn from(e: TransactionAbort) -> Self {
        RecordError::Abort(e)
    }
}

impl From<BufferPoolError> for RecordError {
    fn from(e: BufferPoolError) -> Self {
        RecordError::Buffer(e)
    }
}

impl From<StorageError> for RecordError {
    fn from(e: StorageError) -> Self {
        RecordError::Storage(e)
    }
}
