//! Log manager: buffered append with explicit flush.
//!
//! The engine treats the log as an opaque byte stream; record formats are
//! owned by whoever authors them. What commit and abort need from this
//! module is only the durability point: [`LogManager::flush_to_disk`]
//! drains the in-memory buffer to the log file and fsyncs it.

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Buffered writer over a single append-only log file.
pub struct LogManager {
    buffer: Mutex<BytesMut>,
    file: tokio::sync::Mutex<File>,
}

impl LogManager {
    /// Opens (or creates) the log file at `path` for appending.
    pub async fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await?;
        Ok(Self {
            buffer: Mutex::new(BytesMut::new()),
            file: tokio::sync::Mutex::new(file),
        })
    }

    /// Appends raw log bytes to the in-memory buffer.
    ///
    /// The bytes are not durable until [`flush_to_disk`](Self::flush_to_disk)
    /// runs.
    pub fn append(&self, record: &[u8]) {
        self.buffer.lock().extend_from_slice(record);
    }

    /// Returns the number of buffered, not-yet-flushed bytes.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Writes all buffered bytes to the log file and fsyncs.
    pub async fn flush_to_disk(&self) -> std::io::Result<()> {
        let pending = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                None
            } else {
                Some(buffer.split().freeze())
            }
        };

        let mut file = self.file.lock().await;
        if let Some(bytes) = pending {
            file.write_all(&bytes).await?;
        }
        file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_buffers_until_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let log_mgr = LogManager::open(&path).await.unwrap();

        log_mgr.append(b"hello ");
        log_mgr.append(b"world");
        assert_eq!(log_mgr.buffered(), 11);

        log_mgr.flush_to_disk().await.unwrap();
        assert_eq!(log_mgr.buffered(), 0);

        let contents = tokio::fs::read(&path).await.unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_is_ok() {
        let dir = tempdir().unwrap();
        let log_mgr = LogManager::open(dir.path().join("wal.log")).await.unwrap();
        log_mgr.flush_to_disk().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_appends_across_calls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let log_mgr = LogManager::open(&path).await.unwrap();

        log_mgr.append(b"one");
        log_mgr.flush_to_disk().await.unwrap();
        log_mgr.append(b"two");
        log_mgr.flush_to_disk().await.unwrap();

        let contents = tokio::fs::read(&path).await.unwrap();
        assert_eq!(contents, b"onetwo");
    }
}
