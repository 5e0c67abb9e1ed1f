//! Volatile backend backed by a byte vector.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};

/// Backend that keeps everything in a `Vec<u8>`.
///
/// Nothing survives drop. Tests, the loopback transport, and short-lived
/// stores use this where a [`super::FileBackend`] would only add disk
/// traffic. No internal locking is needed; mutation goes through
/// `&mut self`, so shared references only ever observe a settled buffer.
///
/// ```rust
/// use fieldsync_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// backend.append(b"scratch").unwrap();
/// assert_eq!(backend.size().unwrap(), 7);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: Vec<u8>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend whose contents start as `data`.
    ///
    /// Lets tests replay a journal captured from an earlier run.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.checked_add(len as u64).unwrap_or(u64::MAX);
        if end > self.data.len() as u64 {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.data.len() as u64,
            });
        }

        let start = offset as usize;
        Ok(self.data[start..start + len].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.data.len() as u64 {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "truncate to {new_size} past current size {}",
                    self.data.len()
                ),
            )));
        }

        self.data.truncate(new_size as usize);
        Ok(())
    }
}
