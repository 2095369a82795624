//! Execution context threaded through record operations.

use std::sync::Arc;

use super::transaction::Transaction;
use super::types::TransactionState;
use crate::lock::LockManager;
use crate::wal::LogManager;

/// References the record manager needs to participate in a transaction.
///
/// A full context (transaction + lock manager + log manager) makes record
/// operations acquire locks and append undo entries. A context without a
/// transaction does neither: it is the undo pathway used while rolling
/// back, where taking locks or recording writes again would recurse.
///
/// The context holds the transaction by shared handle only; transactions do
/// not reference their contexts.
#[derive(Clone)]
pub struct Context {
    txn: Option<Arc<Transaction>>,
    lock_mgr: Option<Arc<LockManager>>,
    log_mgr: Option<Arc<LogManager>>,
}

impl Context {
    /// Creates a full context for a running transaction.
    pub fn new(
        txn: Arc<Transaction>,
        lock_mgr: Arc<LockManager>,
        log_mgr: Arc<LogManager>,
    ) -> Self {
        Self {
            txn: Some(txn),
            lock_mgr: Some(lock_mgr),
            log_mgr: Some(log_mgr),
        }
    }

    /// Creates the undo context: no transaction, so record operations
    /// neither lock nor record further writes.
    pub fn undo(lock_mgr: Arc<LockManager>, log_mgr: Arc<LogManager>) -> Self {
        Self {
            txn: None,
            lock_mgr: Some(lock_mgr),
            log_mgr: Some(log_mgr),
        }
    }

    /// Creates an empty context for non-transactional access.
    pub fn none() -> Self {
        Self {
            txn: None,
            lock_mgr: None,
            log_mgr: None,
        }
    }

    /// Returns the transaction, if present.
    pub fn txn(&self) -> Option<&Arc<Transaction>> {
        self.txn.as_ref()
    }

    /// Returns the log manager, if present.
    pub fn log_mgr(&self) -> Option<&Arc<LogManager>> {
        self.log_mgr.as_ref()
    }

    /// Returns the transaction and lock manager when both are present,
    /// i.e. when record operations should take locks.
    pub(crate) fn locking(&self) -> Option<(&Transaction, &LockManager)> {
        match (&self.txn, &self.lock_mgr) {
            (Some(txn), Some(lock_mgr)) => Some((txn.as_ref(), lock_mgr.as_ref())),
            _ => None,
        }
    }

    /// Returns the transaction when it should record undo entries: present
    /// and still in the growing phase.
    ///
    /// The growing-phase gate is what stops rollback from feeding the write
    /// set it is consuming: abort moves the transaction to shrinking before
    /// replaying, so inverse operations are not recorded again.
    pub(crate) fn recording_txn(&self) -> Option<&Arc<Transaction>> {
        self.txn
            .as_ref()
            .filter(|txn| txn.state() == TransactionState::Growing)
    }
}
