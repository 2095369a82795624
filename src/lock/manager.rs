//! Central lock table and acquisition/release logic.

use std::collections::HashMap;

use log::debug;
use parking_lot::Mutex;

use super::error::{AbortReason, TransactionAbort};
use super::mode::LockMode;
use crate::record::RecordId;
use crate::storage::FileId;
use crate::tx::{Transaction, TransactionState, TxnId};

/// Identity of a lockable object: a whole table or a single record in one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockObjectId {
    /// A table, identified by its file.
    Table(FileId),
    /// A record, identified by its file and rid.
    Record(FileId, RecordId),
}

impl LockObjectId {
    /// Combines a held mode with a requested mode on this object.
    ///
    /// Tables use the full multi-granularity upgrade lattice. Records only
    /// ever carry `S` and `X`; any other combination has no defined upgrade
    /// and returns `None`.
    fn combined_mode(&self, held: LockMode, requested: LockMode) -> Option<LockMode> {
        match self {
            LockObjectId::Table(_) => Some(held.join(requested)),
            LockObjectId::Record(..) => {
                use LockMode::{Exclusive, Shared};
                match (held, requested) {
                    (Shared, Shared) => Some(Shared),
                    (Shared, Exclusive) | (Exclusive, Shared) | (Exclusive, Exclusive) => {
                        Some(Exclusive)
                    }
                    _ => None,
                }
            }
        }
    }
}

impl std::fmt::Display for LockObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockObjectId::Table(file) => write!(f, "table {}", file),
            LockObjectId::Record(file, rid) => write!(f, "record {} {}", file, rid),
        }
    }
}

/// One transaction's request for a lock on one object.
#[derive(Debug, Clone, Copy)]
pub struct LockRequest {
    /// Requesting transaction.
    pub txn_id: TxnId,
    /// Requested (and, once granted, held) mode.
    pub mode: LockMode,
    /// Whether the request has been granted.
    ///
    /// Under the no-wait policy every queued request is granted; the flag
    /// exists so the queue format does not change if waiting is ever added.
    pub granted: bool,
}

/// Ordered requests for one lock object.
#[derive(Debug, Default)]
pub struct LockRequestQueue {
    /// Requests in arrival order.
    pub requests: Vec<LockRequest>,
}

impl LockRequestQueue {
    /// Returns whether `mode` is compatible with every granted request of
    /// transactions other than `self_id`.
    fn compatible_with_others(&self, self_id: TxnId, mode: LockMode) -> bool {
        self.requests
            .iter()
            .filter(|req| req.granted && req.txn_id != self_id)
            .all(|req| req.mode.compatible_with(mode))
    }
}

/// Central lock manager.
///
/// One lock table maps each [`LockObjectId`] to its request queue. The whole
/// table sits behind a single mutex: critical sections are short (an
/// O(queue) compatibility check and an O(1) insertion), so a coarse latch
/// beats per-queue locks in simplicity without measurable contention loss.
///
/// Conflicts never block. A request that is incompatible with another
/// transaction's granted lock fails immediately with
/// [`AbortReason::DeadlockPrevention`], which makes deadlock impossible by
/// construction.
pub struct LockManager {
    table: Mutex<HashMap<LockObjectId, LockRequestQueue>>,
}

impl LockManager {
    /// Creates a lock manager with an empty lock table.
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires (or upgrades to) `mode` on `obj` for `txn`.
    ///
    /// Two-phase locking is enforced here: a transaction in the shrinking
    /// phase cannot acquire anything. If the transaction already holds the
    /// object, the held and requested modes are combined through the upgrade
    /// lattice and the request is re-checked against other holders.
    ///
    /// # Errors
    ///
    /// - [`AbortReason::LockOnShrinking`] if `txn` already released a lock
    /// - [`AbortReason::UpgradeConflict`] if the combination is undefined or
    ///   the combined mode conflicts with other holders
    /// - [`AbortReason::DeadlockPrevention`] if a fresh request conflicts
    ///   with another transaction's granted lock (no-wait)
    pub fn acquire(
        &self,
        txn: &Transaction,
        obj: LockObjectId,
        mode: LockMode,
    ) -> Result<(), TransactionAbort> {
        if txn.state() == TransactionState::Shrinking {
            return Err(TransactionAbort::new(txn.id(), AbortReason::LockOnShrinking));
        }

        let mut table = self.table.lock();
        let queue = table.entry(obj).or_default();

        let result = Self::acquire_in_queue(queue, txn.id(), obj, mode);

        if queue.requests.is_empty() {
            // A failed fresh request may have created the queue; don't leak it
            table.remove(&obj);
        }

        match result {
            Ok(()) => {
                txn.add_lock(obj);
                Ok(())
            }
            Err(reason) => {
                debug!("txn {} denied {} on {}: {}", txn.id(), mode, obj, reason);
                Err(TransactionAbort::new(txn.id(), reason))
            }
        }
    }

    fn acquire_in_queue(
        queue: &mut LockRequestQueue,
        txn_id: TxnId,
        obj: LockObjectId,
        mode: LockMode,
    ) -> Result<(), AbortReason> {
        // Re-entry or upgrade: the transaction already appears in the queue
        if let Some(pos) = queue.requests.iter().position(|r| r.txn_id == txn_id) {
            if !queue.requests[pos].granted {
                // No-wait never leaves ungranted requests behind
                return Err(AbortReason::DeadlockPrevention);
            }

            let held = queue.requests[pos].mode;
            let combined = obj
                .combined_mode(held, mode)
                .ok_or(AbortReason::UpgradeConflict)?;

            if combined == held {
                return Ok(());
            }
            if !queue.compatible_with_others(txn_id, combined) {
                return Err(AbortReason::UpgradeConflict);
            }
            queue.requests[pos].mode = combined;
            return Ok(());
        }

        // Fresh request: check against all other granted holders
        if !queue.compatible_with_others(txn_id, mode) {
            return Err(AbortReason::DeadlockPrevention);
        }
        queue.requests.push(LockRequest {
            txn_id,
            mode,
            granted: true,
        });
        Ok(())
    }

    /// Releases every request of `txn` on `obj`.
    ///
    /// Removes the object from the transaction's lock set and, per strict
    /// two-phase locking, moves a growing transaction to the shrinking
    /// phase. Releasing a lock that is not held is a no-op, which keeps
    /// mass-release loops simple.
    pub fn release(&self, txn: &Transaction, obj: LockObjectId) {
        {
            let mut table = self.table.lock();
            if let Some(queue) = table.get_mut(&obj) {
                queue.requests.retain(|req| req.txn_id != txn.id());
                if queue.requests.is_empty() {
                    table.remove(&obj);
                }
            }
        }

        txn.remove_lock(obj);

        if txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
        }
    }

    /// Shared lock on a record.
    pub fn lock_s_on_record(
        &self,
        txn: &Transaction,
        file: FileId,
        rid: RecordId,
    ) -> Result<(), TransactionAbort> {
        self.acquire(txn, LockObjectId::Record(file, rid), LockMode::Shared)
    }

    /// Exclusive lock on a record.
    pub fn lock_x_on_record(
        &self,
        txn: &Transaction,
        file: FileId,
        rid: RecordId,
    ) -> Result<(), TransactionAbort> {
        self.acquire(txn, LockObjectId::Record(file, rid), LockMode::Exclusive)
    }

    /// Shared lock on a table.
    pub fn lock_s_on_table(&self, txn: &Transaction, file: FileId) -> Result<(), TransactionAbort> {
        self.acquire(txn, LockObjectId::Table(file), LockMode::Shared)
    }

    /// Exclusive lock on a table.
    pub fn lock_x_on_table(&self, txn: &Transaction, file: FileId) -> Result<(), TransactionAbort> {
        self.acquire(txn, LockObjectId::Table(file), LockMode::Exclusive)
    }

    /// Intention-shared lock on a table.
    pub fn lock_is_on_table(
        &self,
        txn: &Transaction,
        file: FileId,
    ) -> Result<(), TransactionAbort> {
        self.acquire(txn, LockObjectId::Table(file), LockMode::IntentionShared)
    }

    /// Intention-exclusive lock on a table.
    pub fn lock_ix_on_table(
        &self,
        txn: &Transaction,
        file: FileId,
    ) -> Result<(), TransactionAbort> {
        self.acquire(txn, LockObjectId::Table(file), LockMode::IntentionExclusive)
    }

    /// Returns the mode `txn_id` holds on `obj`, if any.
    pub fn granted_mode(&self, txn_id: TxnId, obj: LockObjectId) -> Option<LockMode> {
        let table = self.table.lock();
        table.get(&obj).and_then(|queue| {
            queue
                .requests
                .iter()
                .find(|req| req.granted && req.txn_id == txn_id)
                .map(|req| req.mode)
        })
    }

    /// Returns the number of objects with at least one request.
    pub fn locked_objects(&self) -> usize {
        self.table.lock().len()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
