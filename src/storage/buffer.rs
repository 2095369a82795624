//! Buffer pool: in-memory page cache with pinning and LRU eviction.
//!
//! The buffer pool sits between the storage backend and the record manager,
//! caching hot pages in a fixed set of frames. Access goes through RAII
//! guards that pin the page for their lifetime, so every fetch is paired
//! with exactly one unpin on every exit path.

mod error;
mod frame;
mod guard;
mod pool;
mod replacer;

pub use error::BufferPoolError;
pub use frame::FrameId;
pub use guard::{PageReadGuard, PageWriteGuard};
pub use pool::BufferPool;
pub use replacer::LruReplacer;
