//! The transaction object: state, lock set, and write set.

use std::collections::HashSet;
use std::thread::ThreadId;

use parking_lot::Mutex;

use super::types::{Timestamp, TransactionState, TxnId};
use crate::lock::LockObjectId;
use crate::record::RecordId;

/// One recorded write, sufficient to undo itself.
///
/// `Delete` and `Update` carry the pre-write record bytes (the before
/// image); undoing an `Insert` needs only the rid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRecord {
    /// A record was inserted at `rid`.
    Insert {
        /// Table the write targeted.
        table: String,
        /// Location of the inserted record.
        rid: RecordId,
    },
    /// The record at `rid` was deleted.
    Delete {
        /// Table the write targeted.
        table: String,
        /// Location of the deleted record.
        rid: RecordId,
        /// Record bytes before the delete.
        before: Vec<u8>,
    },
    /// The record at `rid` was overwritten.
    Update {
        /// Table the write targeted.
        table: String,
        /// Location of the updated record.
        rid: RecordId,
        /// Record bytes before the update.
        before: Vec<u8>,
    },
}

impl WriteRecord {
    /// Returns the table the write targeted.
    pub fn table(&self) -> &str {
        match self {
            WriteRecord::Insert { table, .. }
            | WriteRecord::Delete { table, .. }
            | WriteRecord::Update { table, .. } => table,
        }
    }

    /// Returns the rid the write targeted.
    pub fn rid(&self) -> RecordId {
        match self {
            WriteRecord::Insert { rid, .. }
            | WriteRecord::Delete { rid, .. }
            | WriteRecord::Update { rid, .. } => *rid,
        }
    }
}

/// A transaction.
///
/// Shared as `Arc<Transaction>` between the session driving it, the record
/// manager (which appends write records), and the lock manager (which
/// maintains the lock set). Interior state sits behind short mutexes; the
/// lock table itself stores only [`TxnId`]s, so dropping the last `Arc`
/// never requires sweeping the lock table.
pub struct Transaction {
    id: TxnId,
    start_ts: Timestamp,
    thread_id: ThreadId,
    state: Mutex<TransactionState>,
    lock_set: Mutex<HashSet<LockObjectId>>,
    write_set: Mutex<Vec<WriteRecord>>,
}

impl Transaction {
    /// Creates a transaction in the growing phase.
    pub(crate) fn new(id: TxnId, start_ts: Timestamp) -> Self {
        Self {
            id,
            start_ts,
            thread_id: std::thread::current().id(),
            state: Mutex::new(TransactionState::Growing),
            lock_set: Mutex::new(HashSet::new()),
            write_set: Mutex::new(Vec::new()),
        }
    }

    /// Returns the transaction id.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Returns the start timestamp.
    pub fn start_ts(&self) -> Timestamp {
        self.start_ts
    }

    /// Returns the id of the thread that began the transaction.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Sets the lifecycle state.
    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    /// Appends a write record.
    ///
    /// Callers gate this on the growing phase; the write set must not grow
    /// during rollback.
    pub fn push_write(&self, write: WriteRecord) {
        self.write_set.lock().push(write);
    }

    /// Returns the number of recorded writes.
    pub fn write_count(&self) -> usize {
        self.write_set.lock().len()
    }

    /// Drains the write set, in recording order.
    pub(crate) fn take_write_set(&self) -> Vec<WriteRecord> {
        std::mem::take(&mut *self.write_set.lock())
    }

    /// Returns a snapshot of the held lock objects.
    ///
    /// Mass release iterates this snapshot so that [`LockManager::release`]
    /// mutating the live set cannot invalidate the iteration.
    ///
    /// [`LockManager::release`]: crate::lock::LockManager::release
    pub fn locks(&self) -> Vec<LockObjectId> {
        self.lock_set.lock().iter().copied().collect()
    }

    /// Returns whether the transaction holds a lock on `obj`.
    pub fn holds_lock(&self, obj: LockObjectId) -> bool {
        self.lock_set.lock().contains(&obj)
    }

    /// Returns the number of held locks.
    pub fn lock_count(&self) -> usize {
        self.lock_set.lock().len()
    }

    pub(crate) fn add_lock(&self, obj: LockObjectId) {
        self.lock_set.lock().insert(obj);
    }

    pub(crate) fn remove_lock(&self, obj: LockObjectId) {
        self.lock_set.lock().remove(&obj);
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("start_ts", &self.start_ts)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileId;

    fn txn() -> Transaction {
        Transaction::new(TxnId::new(1), Timestamp::new(1))
    }

    #[test]
    fn test_new_transaction_is_growing() {
        let t = txn();
        assert_eq!(t.state(), TransactionState::Growing);
        assert_eq!(t.write_count(), 0);
        assert_eq!(t.lock_count(), 0);
    }

    #[test]
    fn test_write_set_preserves_order() {
        let t = txn();
        t.push_write(WriteRecord::Insert {
            table: "t".into(),
            rid: RecordId::new(1, 0),
        });
        t.push_write(WriteRecord::Update {
            table: "t".into(),
            rid: RecordId::new(1, 0),
            before: vec![1, 2],
        });
        t.push_write(WriteRecord::Delete {
            table: "t".into(),
            rid: RecordId::new(1, 0),
            before: vec![3, 4],
        });

        let writes = t.take_write_set();
        assert_eq!(writes.len(), 3);
        assert!(matches!(writes[0], WriteRecord::Insert { .. }));
        assert!(matches!(writes[1], WriteRecord::Update { .. }));
        assert!(matches!(writes[2], WriteRecord::Delete { .. }));

        // Draining empties the set
        assert_eq!(t.write_count(), 0);
    }

    #[test]
    fn test_lock_set_membership() {
        let t = txn();
        let obj = LockObjectId::Table(FileId::new(0));

        t.add_lock(obj);
        assert!(t.holds_lock(obj));
        assert_eq!(t.locks(), vec![obj]);

        t.remove_lock(obj);
        assert!(!t.holds_lock(obj));
    }

    #[test]
    fn test_write_record_accessors() {
        let w = WriteRecord::Delete {
            table: "orders".into(),
            rid: RecordId::new(2, 5),
            before: vec![0xFF],
        };
        assert_eq!(w.table(), "orders");
        assert_eq!(w.rid(), RecordId::new(2, 5));
    }
}
