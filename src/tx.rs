//! Transactions under strict two-phase locking.
//!
//! A [`Transaction`] carries its lock set and an in-memory undo log (the
//! write set). The [`TransactionManager`] owns lifecycles: `begin` registers
//! a transaction, `commit` releases locks and flushes the log, and `abort`
//! replays the write set in reverse against the record manager before
//! releasing locks.
//!
//! Record operations receive a [`Context`] naming the transaction and the
//! lock/log managers; a context without a transaction (the undo context)
//! suppresses both locking and write-set recording.

mod context;
mod error;
mod manager;
mod transaction;
mod types;

pub use context::Context;
pub use error::TxError;
pub use manager::TransactionManager;
pub use transaction::{Transaction, WriteRecord};
pub use types::{Timestamp, TransactionState, TxnId};
