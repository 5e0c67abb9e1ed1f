//! Framed append-only journal.
//!
//! The journal is the durable spine of both the client-side local store and
//! the server-side change log. Each frame carries an opaque payload tagged
//! with a caller-defined kind byte:
//!
//! ```text
//! +-------+---------+------+--------+---------+-------+
//! | magic | version | kind | length | payload | crc32 |
//! |  4 B  |   2 B   | 1 B  |  4 B   |  len B  |  4 B  |
//! +-------+---------+------+--------+---------+-------+
//! ```
//!
//! The CRC covers everything before it. Recovery scans frames from the
//! start; an incomplete frame at the end of the file (a torn write from a
//! crash) ends the scan cleanly, while a checksum or magic mismatch on a
//! complete frame is reported as corruption.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// Magic bytes identifying a journal frame.
pub const FRAME_MAGIC: [u8; 4] = *b"FSJL";

/// Current journal format version.
pub const FORMAT_VERSION: u16 = 1;

/// Header size: magic (4) + version (2) + kind (1) + length (4).
const HEADER_SIZE: usize = 11;

/// CRC size.
const CRC_SIZE: usize = 4;

/// A single decoded journal frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalFrame {
    /// Offset of the frame header within the journal.
    pub offset: u64,
    /// Caller-defined record kind.
    pub kind: u8,
    /// Opaque frame payload.
    pub payload: Vec<u8>,
}

/// The outcome of scanning a journal on open.
#[derive(Debug)]
pub struct Recovery {
    /// All intact frames, in append order.
    pub frames: Vec<JournalFrame>,
    /// Length of the intact prefix. Everything past it is a torn tail.
    pub valid_len: u64,
    /// True when a torn (incomplete) frame was found at the end.
    pub torn_tail: bool,
}

/// An append-only, checksummed record journal over a storage backend.
///
/// The journal serializes all writes through an internal lock, so a shared
/// `Journal` provides atomic appends to concurrent writers.
pub struct Journal {
    backend: Arc<Mutex<Box<dyn StorageBackend>>>,
    sync_on_write: bool,
}

impl Journal {
    /// Creates a journal over the given backend.
    ///
    /// When `sync_on_write` is true every append is flushed before
    /// returning.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            sync_on_write,
        }
    }

    /// Appends one frame and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload exceeds the 4 GiB frame limit or the
    /// backend write fails.
    pub fn append(&self, kind: u8, payload: &[u8]) -> StorageResult<u64> {
        let len = u32::try_from(payload.len())
            .map_err(|_| StorageError::corrupted("frame payload exceeds 4 GiB limit"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&FRAME_MAGIC);
        data.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        data.push(kind);
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(payload);

        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());

        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;

        if self.sync_on_write {
            backend.flush()?;
        }

        Ok(offset)
    }

    /// Scans the journal from the start and returns every intact frame.
    ///
    /// A torn frame at the end of the file is tolerated and reported via
    /// [`Recovery::torn_tail`]; callers normally follow up with
    /// [`Journal::truncate_to`] at [`Recovery::valid_len`].
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, on a magic or version mismatch, or
    /// when a complete frame fails its checksum.
    pub fn recover(&self) -> StorageResult<Recovery> {
        let backend = self.backend.lock();
        let total = backend.size()?;

        let mut frames = Vec::new();
        let mut offset = 0u64;

        while offset < total {
            let remaining = (total - offset) as usize;
            if remaining < HEADER_SIZE {
                return Ok(Recovery {
                    frames,
                    valid_len: offset,
                    torn_tail: true,
                });
            }

            let header = backend.read_at(offset, HEADER_SIZE)?;
            if header[0..4] != FRAME_MAGIC {
                return Err(StorageError::corrupted(format!(
                    "invalid frame magic at offset {offset}"
                )));
            }

            let version = u16::from_le_bytes([header[4], header[5]]);
            if version > FORMAT_VERSION {
                return Err(StorageError::corrupted(format!(
                    "unsupported journal version {version} at offset {offset}"
                )));
            }

            let kind = header[6];
            let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);
            let frame_len = HEADER_SIZE + payload_len as usize + CRC_SIZE;

            if remaining < frame_len {
                return Ok(Recovery {
                    frames,
                    valid_len: offset,
                    torn_tail: true,
                });
            }

            let payload = backend.read_at(offset + HEADER_SIZE as u64, payload_len as usize)?;
            let crc_bytes = backend.read_at(
                offset + (HEADER_SIZE + payload_len as usize) as u64,
                CRC_SIZE,
            )?;
            let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

            let mut covered = header;
            covered.extend_from_slice(&payload);
            let computed = compute_crc32(&covered);

            if stored != computed {
                return Err(StorageError::ChecksumMismatch { stored, computed });
            }

            frames.push(JournalFrame {
                offset,
                kind,
                payload,
            });
            offset += frame_len as u64;
        }

        Ok(Recovery {
            frames,
            valid_len: offset,
            torn_tail: false,
        })
    }

    /// Truncates the journal to the given length.
    ///
    /// Used to drop a torn tail found by [`Journal::recover`].
    pub fn truncate_to(&self, len: u64) -> StorageResult<()> {
        self.backend.lock().truncate(len)
    }

    /// Replaces the journal contents with the given frames.
    ///
    /// This is the compaction primitive: the caller serializes its current
    /// state into frames, and the journal is rewritten from scratch and
    /// synced.
    pub fn rewrite(&self, frames: &[(u8, Vec<u8>)]) -> StorageResult<()> {
        {
            let mut backend = self.backend.lock();
            backend.truncate(0)?;
        }
        for (kind, payload) in frames {
            self.append(*kind, payload)?;
        }
        self.sync()
    }

    /// Flushes pending writes.
    pub fn flush(&self) -> StorageResult<()> {
        self.backend.lock().flush()
    }

    /// Syncs data and metadata to durable storage.
    pub fn sync(&self) -> StorageResult<()> {
        self.backend.lock().sync()
    }

    /// Returns the current journal size in bytes.
    pub fn size(&self) -> StorageResult<u64> {
        self.backend.lock().size()
    }

    #[cfg(test)]
    pub(crate) fn backend_for_testing(&self) -> Arc<Mutex<Box<dyn StorageBackend>>> {
        Arc::clone(&self.backend)
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

/// Computes a CRC32 checksum (IEEE polynomial).
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileBackend;
    use crate::memory::InMemoryBackend;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn memory_journal() -> Journal {
        Journal::new(Box::new(InMemoryBackend::new()), false)
    }

    #[test]
    fn recover_empty() {
        let journal = memory_journal();
        let recovery = journal.recover().unwrap();
        assert!(recovery.frames.is_empty());
        assert_eq!(recovery.valid_len, 0);
        assert!(!recovery.torn_tail);
    }

    #[test]
    fn append_and_recover() {
        let journal = memory_journal();
        journal.append(1, b"first").unwrap();
        journal.append(2, b"second").unwrap();
        journal.append(1, b"").unwrap();

        let recovery = journal.recover().unwrap();
        assert_eq!(recovery.frames.len(), 3);
        assert!(!recovery.torn_tail);

        assert_eq!(recovery.frames[0].kind, 1);
        assert_eq!(recovery.frames[0].payload, b"first");
        assert_eq!(recovery.frames[1].kind, 2);
        assert_eq!(recovery.frames[1].payload, b"second");
        assert_eq!(recovery.frames[2].kind, 1);
        assert!(recovery.frames[2].payload.is_empty());
    }

    #[test]
    fn offsets_are_frame_starts() {
        let journal = memory_journal();
        let off1 = journal.append(5, b"abc").unwrap();
        let off2 = journal.append(5, b"defg").unwrap();

        let recovery = journal.recover().unwrap();
        assert_eq!(recovery.frames[0].offset, off1);
        assert_eq!(recovery.frames[1].offset, off2);
        assert_eq!(recovery.valid_len, journal.size().unwrap());
    }

    #[test]
    fn torn_tail_is_tolerated() {
        let journal = memory_journal();
        journal.append(1, b"intact").unwrap();
        let intact_len = journal.size().unwrap();
        journal.append(1, b"will be torn").unwrap();

        // Chop the second frame mid-payload, as a crash during write would.
        journal.truncate_to(journal.size().unwrap() - 5).unwrap();

        let recovery = journal.recover().unwrap();
        assert_eq!(recovery.frames.len(), 1);
        assert!(recovery.torn_tail);
        assert_eq!(recovery.valid_len, intact_len);

        // Dropping the tail makes the journal appendable again.
        journal.truncate_to(recovery.valid_len).unwrap();
        journal.append(2, b"after recovery").unwrap();

        let recovery = journal.recover().unwrap();
        assert_eq!(recovery.frames.len(), 2);
        assert!(!recovery.torn_tail);
    }

    #[test]
    fn checksum_mismatch_is_error() {
        let journal = memory_journal();
        journal.append(1, b"payload").unwrap();

        // Flip one payload byte while preserving the frame length.
        {
            let backend = journal.backend_for_testing();
            let mut backend = backend.lock();
            let size = backend.size().unwrap();
            let mut bytes = backend.read_at(0, size as usize).unwrap();
            bytes[HEADER_SIZE] ^= 0xFF;
            backend.truncate(0).unwrap();
            backend.append(&bytes).unwrap();
        }

        let result = journal.recover();
        assert!(matches!(
            result,
            Err(StorageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_is_error() {
        let journal = memory_journal();
        {
            let backend = journal.backend_for_testing();
            let mut backend = backend.lock();
            backend.append(&[0u8; 32]).unwrap();
        }

        let result = journal.recover();
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn rewrite_replaces_contents() {
        let journal = memory_journal();
        journal.append(1, b"old-1").unwrap();
        journal.append(1, b"old-2").unwrap();

        journal
            .rewrite(&[(7, b"new".to_vec()), (8, b"state".to_vec())])
            .unwrap();

        let recovery = journal.recover().unwrap();
        assert_eq!(recovery.frames.len(), 2);
        assert_eq!(recovery.frames[0].kind, 7);
        assert_eq!(recovery.frames[0].payload, b"new");
        assert_eq!(recovery.frames[1].kind, 8);
        assert_eq!(recovery.frames[1].payload, b"state");
    }

    #[test]
    fn file_backed_journal_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.journal");

        {
            let backend = FileBackend::open(&path).unwrap();
            let journal = Journal::new(Box::new(backend), true);
            journal.append(3, b"durable frame").unwrap();
            journal.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        let journal = Journal::new(Box::new(backend), true);
        let recovery = journal.recover().unwrap();

        assert_eq!(recovery.frames.len(), 1);
        assert_eq!(recovery.frames[0].kind, 3);
        assert_eq!(recovery.frames[0].payload, b"durable frame");
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0x0000_0000);
    }

    proptest! {
        #[test]
        fn arbitrary_frames_survive_recovery(
            entries in prop::collection::vec(
                (any::<u8>(), prop::collection::vec(any::<u8>(), 0..256)),
                0..32,
            )
        ) {
            let journal = memory_journal();
            for (kind, payload) in &entries {
                journal.append(*kind, payload).unwrap();
            }

            let recovery = journal.recover().unwrap();
            prop_assert!(!recovery.torn_tail);
            prop_assert_eq!(recovery.frames.len(), entries.len());
            for (frame, (kind, payload)) in recovery.frames.iter().zip(entries.iter()) {
                prop_assert_eq!(frame.kind, *kind);
                prop_assert_eq!(&frame.payload, payload);
            }
        }
    }
}
