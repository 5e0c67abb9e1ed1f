//! Byte-store abstraction the journal is written against.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// A backend knows nothing about what it holds. Framing, checksums, and
/// record semantics all live in the journal layer above; down here there
/// are only offsets and byte runs. Keeping the boundary this narrow is
/// what lets the local store and the server change log share one journal
/// implementation over either files or memory.
///
/// Implementations guarantee that `append` hands back the offset the bytes
/// landed at, that `read_at` returns exactly what was written there, and
/// that data survives the process once `flush` has returned. All backends
/// are `Send + Sync` so a store can be shared across threads.
///
/// Shipped implementations: [`super::FileBackend`] for durable journals
/// and [`super::InMemoryBackend`] for tests and throwaway stores.
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails when the requested range extends past the current size, or on
    /// an underlying I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends bytes at the end and returns the offset they were written at.
    ///
    /// # Errors
    ///
    /// Fails on an underlying I/O error.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes down to the OS.
    ///
    /// Appended bytes are readable before this call; they are durable
    /// across a process exit only after it returns.
    ///
    /// # Errors
    ///
    /// Fails when the underlying flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Current size in bytes, which is also the offset of the next append.
    ///
    /// # Errors
    ///
    /// Fails when the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Forces data and metadata to durable storage.
    ///
    /// Stronger than [`flush`](Self::flush): file metadata such as the
    /// length is durable too once this returns.
    ///
    /// # Errors
    ///
    /// Fails when the underlying sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Shrinks the store to `new_size` bytes, discarding everything after.
    ///
    /// The journal relies on this to cut torn tails during recovery and to
    /// replace its contents during compaction.
    ///
    /// # Errors
    ///
    /// Fails when `new_size` exceeds the current size or truncation itself
    /// fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
