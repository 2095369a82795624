//! Lock manager failure signalling.

use crate::tx::TxnId;

/// Why a lock request forced its transaction to abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The transaction tried to acquire a lock after releasing one
    /// (two-phase locking violation).
    LockOnShrinking,
    /// The transaction holds a lock on the object in a mode that cannot be
    /// combined with the requested mode, or the combined mode conflicts
    /// with other holders.
    UpgradeConflict,
    /// The request conflicts with a lock granted to another transaction;
    /// under the no-wait policy the requester aborts instead of blocking.
    DeadlockPrevention,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AbortReason::LockOnShrinking => "lock acquired in shrinking phase",
            AbortReason::UpgradeConflict => "lock upgrade conflict",
            AbortReason::DeadlockPrevention => "lock conflict (no-wait)",
        };
        write!(f, "{}", s)
    }
}

/// Abort-inducing lock failure.
///
/// Carries the transaction id and a machine-readable reason. The caller is
/// expected to respond by aborting the transaction; the lock manager itself
/// never alters transaction state on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionAbort {
    /// The transaction whose request failed.
    pub txn_id: TxnId,
    /// Why the request failed.
    pub reason: AbortReason,
}

impl TransactionAbort {
    /// Creates a new abort signal.
    pub fn new(txn_id: TxnId, reason: AbortReason) -> Self {
        Self { txn_id, reason }
    }
}

impl std::fmt::Display for TransactionAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transaction {} must abort: {}", self.txn_id, self.reason)
    }
}

impl std::error::Error for TransactionAbort {}
