//! Multi-granularity lock manager with no-wait conflict resolution.
//!
//! Locks are taken on tables and on individual records; intention modes
//! ([`LockMode::IntentionShared`], [`LockMode::IntentionExclusive`]) on the
//! table make the two granularities compose. A request that conflicts with
//! a granted lock of another transaction fails immediately instead of
//! blocking, so no waits-for cycle can ever form.

mod error;
mod manager;
mod mode;

pub use error::{AbortReason, TransactionAbort};
pub use manager::{LockManager, LockObjectId, LockRequest, LockRequestQueue};
pub use mode::LockMode;
