//! Core transaction types.

use std::fmt;

/// Transaction identifier, allocated sequentially from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(u64);

impl TxnId {
    /// Creates a new transaction ID.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical start timestamp of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a new timestamp.
    pub const fn new(ts: u64) -> Self {
        Self(ts)
    }

    /// Returns the raw u64 value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a transaction.
///
/// `begin` starts a transaction in `Growing`; the first lock release moves
/// it to `Shrinking` (after which no lock may be acquired); `commit` and
/// `abort` settle it in `Committed` or `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Acquiring locks; writes are recorded into the write set.
    Growing,
    /// Released at least one lock; no further acquisition or recording.
    Shrinking,
    /// Finished successfully.
    Committed,
    /// Rolled back.
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_txn_id() {
        let id = TxnId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert!(TxnId::new(1) < TxnId::new(2));
        assert_eq!(format!("{}", id), "42");
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp::new(1) < Timestamp::new(2));
        assert_eq!(Timestamp::new(7).as_u64(), 7);
    }
}
