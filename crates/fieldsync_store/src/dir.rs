//! On-disk layout of a local store.
//!
//! A store occupies one directory:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # exclusive-open guard
//! └─ store.journal     # append-only record journal
//! ```
//!
//! Two processes must never append to the same journal, so opening the
//! directory takes a non-blocking exclusive lock on LOCK and holds it for
//! the lifetime of the handle.

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "store.journal";

/// An opened, locked store directory.
///
/// Dropping the handle releases the lock and lets another process open
/// the store.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock: File,
}

impl StoreDir {
    /// Opens the store directory at `path`, locking it.
    ///
    /// With `create_if_missing`, a missing directory is created first;
    /// without it, a missing directory is an error.
    ///
    /// # Errors
    ///
    /// Fails with [`StoreError::StoreLocked`] when another handle holds
    /// the lock, and with a layout error when `path` is missing (and not
    /// to be created) or is not a directory.
    pub fn open(path: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if path.exists() {
            if !path.is_dir() {
                return Err(StoreError::invalid_layout(format!(
                    "{} is not a directory",
                    path.display()
                )));
            }
        } else if create_if_missing {
            fs::create_dir_all(path)?;
        } else {
            return Err(StoreError::invalid_layout(format!(
                "no store directory at {}",
                path.display()
            )));
        }

        let lock = take_lock(&path.join(LOCK_FILE))?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the record journal inside the store.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }
}

fn take_lock(lock_path: &Path) -> StoreResult<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)?;

    if file.try_lock_exclusive().is_err() {
        return Err(StoreError::StoreLocked);
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_directory_is_created_on_request() {
        let temp = tempdir().unwrap();
        let store_path = temp.path().join("fresh");

        let dir = StoreDir::open(&store_path, true).unwrap();
        assert!(store_path.is_dir());
        assert_eq!(dir.path(), store_path);
        assert_eq!(dir.journal_path(), store_path.join("store.journal"));
    }

    #[test]
    fn missing_directory_without_create_is_an_error() {
        let temp = tempdir().unwrap();
        assert!(StoreDir::open(&temp.path().join("absent"), false).is_err());
    }

    #[test]
    fn second_open_hits_the_lock() {
        let temp = tempdir().unwrap();
        let store_path = temp.path().join("contended");

        let _held = StoreDir::open(&store_path, true).unwrap();
        assert!(matches!(
            StoreDir::open(&store_path, true),
            Err(StoreError::StoreLocked)
        ));
    }

    #[test]
    fn dropping_the_handle_frees_the_lock() {
        let temp = tempdir().unwrap();
        let store_path = temp.path().join("recycled");

        drop(StoreDir::open(&store_path, true).unwrap());
        StoreDir::open(&store_path, true).unwrap();
    }
}
