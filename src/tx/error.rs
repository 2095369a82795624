//! Transaction manager errors.

use crate::record::RecordError;

/// Errors from commit and abort processing.
#[derive(Debug)]
pub enum TxError {
    /// A write record names a table the record manager has no open handle
    /// for; rollback cannot proceed. Indicates a bug or a table closed
    /// while a transaction was live.
    UnknownTable(String),

    /// A record operation failed while undoing the write set.
    Record(RecordError),

    /// Flushing the log failed.
    Io(std::io::Error),
}

impl std::fmt::Display for TxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxError::UnknownTable(name) => {
                write!(f, "no open record file for table {}", name)
            }
            TxError::Record(e) => write!(f, "record operation failed: {}", e),
            TxError::Io(e) => write!(f, "log flush failed: {}", e),
        }
    }
}

impl std::error::Error for TxError {}

impl From<RecordError> for TxError {
    fn from(e: RecordError) -> Self {
        TxError::Record(e)
    }
}

impl From<std::io::Error> for TxError {
    fn from(e: std::io::Error) -> Self {
        TxError::Io(e)
    }
}
