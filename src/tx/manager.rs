//! Transaction lifecycle orchestration.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use parking_lot::Mutex;

use super::context::Context;
use super::error::TxError;
use super::transaction::{Transaction, WriteRecord};
use super::types::{Timestamp, TransactionState, TxnId};
use crate::lock::LockManager;
use crate::record::RecordManager;
use crate::storage::Storage;
use crate::wal::LogManager;

/// Owns transaction lifecycles and the global transaction registry.
///
/// `begin` hands out transactions; `commit` and `abort` finish them. Both
/// finish paths release the transaction's locks in one sweep and flush the
/// log; abort additionally replays the write set in reverse through the
/// record manager before any lock is dropped, so no other transaction can
/// observe a partially rolled-back row.
pub struct TransactionManager<S: Storage> {
    next_txn_id: AtomicU64,
    next_ts: AtomicU64,
    /// Registry of live transactions, observable by id.
    txn_map: Mutex<HashMap<TxnId, Arc<Transaction>>>,
    lock_mgr: Arc<LockManager>,
    record_mgr: Arc<RecordManager<S>>,
}

impl<S: Storage> TransactionManager<S> {
    /// Creates a transaction manager.
    ///
    /// The record manager is needed to resolve table names during rollback;
    /// the lock manager to release lock sets.
    pub fn new(lock_mgr: Arc<LockManager>, record_mgr: Arc<RecordManager<S>>) -> Self {
        Self {
            next_txn_id: AtomicU64::new(1),
            next_ts: AtomicU64::new(1),
            txn_map: Mutex::new(HashMap::new()),
            lock_mgr,
            record_mgr,
        }
    }

    /// Returns the lock manager.
    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_mgr
    }

    /// Returns the record manager.
    pub fn record_manager(&self) -> &Arc<RecordManager<S>> {
        &self.record_mgr
    }

    /// Begins a transaction.
    ///
    /// With `existing`, the given transaction is (re)entered into the
    /// growing phase and returned unchanged; otherwise a fresh transaction
    /// is allocated and registered.
    pub fn begin(&self, existing: Option<Arc<Transaction>>) -> Arc<Transaction> {
        if let Some(txn) = existing {
            txn.set_state(TransactionState::Growing);
            return txn;
        }

        let id = TxnId::new(self.next_txn_id.fetch_add(1, Ordering::Relaxed));
        let ts = Timestamp::new(self.next_ts.fetch_add(1, Ordering::Relaxed));
        let txn = Arc::new(Transaction::new(id, ts));

        self.txn_map.lock().insert(id, Arc::clone(&txn));
        debug!("txn {} begun at ts {}", id, ts);
        txn
    }

    /// Returns the registered transaction with the given id, if live.
    pub fn get(&self, id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_map.lock().get(&id).cloned()
    }

    /// Returns the number of live transactions.
    pub fn active_count(&self) -> usize {
        self.txn_map.lock().len()
    }

    /// Commits a transaction.
    ///
    /// Releases every held lock, flushes the log, discards the write set,
    /// and removes the transaction from the registry.
    pub async fn commit(
        &self,
        txn: &Arc<Transaction>,
        log_mgr: &Arc<LogManager>,
    ) -> Result<(), TxError> {
        // Writes went straight to pages as they happened; nothing to apply.
        txn.set_state(TransactionState::Shrinking);

        self.release_all_locks(txn);
        log_mgr.flush_to_disk().await?;
        txn.take_write_set();

        txn.set_state(TransactionState::Committed);
        self.txn_map.lock().remove(&txn.id());
        debug!("txn {} committed", txn.id());
        Ok(())
    }

    /// Aborts a transaction, rolling back every recorded write.
    ///
    /// The write set is replayed in reverse: the inverse of the most recent
    /// write runs first. Replay goes through the ordinary record-manager
    /// methods under an undo [`Context`] (no transaction), so the inverses
    /// take no locks and are not themselves recorded — the shrinking
    /// transition before replay closes the recording gate for good measure.
    pub async fn abort(
        &self,
        txn: &Arc<Transaction>,
        log_mgr: &Arc<LogManager>,
    ) -> Result<(), TxError> {
        txn.set_state(TransactionState::Shrinking);

        let writes = txn.take_write_set();
        if !writes.is_empty() {
            let undo_ctx = Context::undo(Arc::clone(&self.lock_mgr), Arc::clone(log_mgr));

            for write in writes.iter().rev() {
                let table = self
                    .record_mgr
                    .handle(write.table())
                    .ok_or_else(|| TxError::UnknownTable(write.table().to_string()))?;

                match write {
                    WriteRecord::Insert { rid, .. } => {
                        table.delete(*rid, &undo_ctx).await?;
                    }
                    WriteRecord::Delete { rid, before, .. } => {
                        // Restore at the original rid; anything else would
                        // invalidate rids recorded elsewhere
                        table.insert_at(*rid, before).await?;
                    }
                    WriteRecord::Update { rid, before, .. } => {
                        table.update(*rid, before, &undo_ctx).await?;
                    }
                }
            }
        }

        self.release_all_locks(txn);
        log_mgr.flush_to_disk().await?;

        txn.set_state(TransactionState::Aborted);
        self.txn_map.lock().remove(&txn.id());
        debug!("txn {} aborted ({} writes undone)", txn.id(), writes.len());
        Ok(())
    }

    /// Releases every lock in the transaction's lock set.
    ///
    /// Iterates over a snapshot: `release` removes each object from the
    /// live set as it goes.
    fn release_all_locks(&self, txn: &Transaction) {
        for obj in txn.locks() {
            self.lock_mgr.release(txn, obj);
        }
    }
}
