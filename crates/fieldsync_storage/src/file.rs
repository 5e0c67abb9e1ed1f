//! Durable backend over a single journal file.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Backend that persists to one file on disk.
///
/// The file is opened in append mode, so every write lands at the end
/// without an explicit seek. Reads take an internal lock around the seek
/// and read pair; the tracked size only changes through `&mut self`
/// methods, which keeps readers consistent without a second lock.
///
/// `flush` hands buffered bytes to the OS; `sync` additionally forces them
/// and the file metadata to disk via `File::sync_all`.
///
/// ```no_run
/// use fieldsync_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("outbox.journal")).unwrap();
/// backend.append(b"frame bytes").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileBackend {
    /// Opens the journal file at `path`, creating it empty if absent.
    ///
    /// # Errors
    ///
    /// Open and create failures surface as [`StorageError::Io`].
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Like [`FileBackend::open`], but first creates any missing parent
    /// directories.
    ///
    /// # Errors
    ///
    /// Directory creation failures surface before the open itself.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.checked_add(len as u64).unwrap_or(u64::MAX);
        if end > self.size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        // Append mode: the kernel places the write at end of file.
        self.file.get_mut().write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.get_mut().flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.get_mut().sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.size {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("truncate to {new_size} past current size {}", self.size),
            )));
        }

        let file = self.file.get_mut();
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_in(dir: &tempfile::TempDir) -> FileBackend {
        FileBackend::open(&dir.path().join("frames.journal")).unwrap()
    }

    #[test]
    fn open_creates_an_empty_file() {
        let dir = tempdir().unwrap();
        let backend = open_in(&dir);
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.path().exists());
    }

    #[test]
    fn appends_land_at_the_reported_offset() {
        let dir = tempdir().unwrap();
        let mut backend = open_in(&dir);

        assert_eq!(backend.append(b"push").unwrap(), 0);
        assert_eq!(backend.append(b"|pull").unwrap(), 4);
        assert_eq!(backend.size().unwrap(), 9);

        assert_eq!(&backend.read_at(0, 9).unwrap(), b"push|pull");
        assert_eq!(&backend.read_at(5, 4).unwrap(), b"pull");
    }

    #[test]
    fn out_of_range_read_is_rejected() {
        let dir = tempdir().unwrap();
        let mut backend = open_in(&dir);
        backend.append(b"cycle").unwrap();

        assert!(matches!(
            backend.read_at(2, 8),
            Err(StorageError::ReadPastEnd { size: 5, .. })
        ));
    }

    #[test]
    fn contents_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frames.journal");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"outlives the process").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 20);
        assert_eq!(&backend.read_at(0, 20).unwrap(), b"outlives the process");
    }

    #[test]
    fn zero_byte_append_changes_nothing() {
        let dir = tempdir().unwrap();
        let mut backend = open_in(&dir);
        backend.append(b"pad").unwrap();

        assert_eq!(backend.append(b"").unwrap(), 3);
        assert_eq!(backend.size().unwrap(), 3);
    }

    #[test]
    fn truncate_cuts_the_tail_and_appends_resume_there() {
        let dir = tempdir().unwrap();
        let mut backend = open_in(&dir);
        backend.append(b"head+torn").unwrap();

        backend.truncate(4).unwrap();
        assert_eq!(backend.size().unwrap(), 4);

        assert_eq!(backend.append(b"!").unwrap(), 4);
        assert_eq!(&backend.read_at(0, 5).unwrap(), b"head!");
    }

    #[test]
    fn truncate_cannot_grow_the_file() {
        let dir = tempdir().unwrap();
        let mut backend = open_in(&dir);
        backend.append(b"ab").unwrap();
        assert!(backend.truncate(3).is_err());
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tenant").join("device").join("frames.journal");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
    }
}
