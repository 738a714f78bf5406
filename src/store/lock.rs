//! Cooperative write lock shared by every writer of a record store.
//!
//! Two layers: an exclusive `fs2` lock on `<db>.lock` so separate processes
//! exclude each other, and an in-process mutex so threads sharing one
//! [`StoreLock`] do too. In-memory stores only get the mutex.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Errors from lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to create lock file {0}: {1}")]
    CreateFailed(PathBuf, #[source] io::Error),

    #[error("Failed to acquire lock {0}: {1}")]
    AcquireFailed(PathBuf, #[source] io::Error),
}

/// Get the lock file path for a database path.
///
/// - `/data/media.db` → `/data/media.db.lock`
/// - `/data/media` → `/data/media.lock`
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut lock_path = db_path.to_path_buf();
    match lock_path.extension() {
        Some(ext) => {
            let new_ext = format!("{}.lock", ext.to_string_lossy());
            lock_path.set_extension(new_ext);
        }
        None => {
            lock_path.set_extension("lock");
        }
    }
    lock_path
}

/// A reusable exclusive lock around store mutations.
#[derive(Debug)]
pub struct StoreLock {
    file: Option<(PathBuf, File)>,
    local: Mutex<()>,
}

impl StoreLock {
    /// Lock backed by the file at `lock_path` (created if missing).
    pub fn open(lock_path: &Path) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| LockError::CreateFailed(lock_path.to_path_buf(), e))?;

        Ok(Self {
            file: Some((lock_path.to_path_buf(), file)),
            local: Mutex::new(()),
        })
    }

    /// Lock for the database at `db_path`.
    pub fn for_database(db_path: &Path) -> Result<Self, LockError> {
        Self::open(&lock_path_for(db_path))
    }

    /// Lock that only excludes threads of this process.
    #[must_use]
    pub fn in_process() -> Self {
        Self {
            file: None,
            local: Mutex::new(()),
        }
    }

    /// Path of the backing lock file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(p, _)| p.as_path())
    }

    /// Block until the lock is held. Released when the guard drops.
    pub fn acquire(&self) -> Result<StoreLockGuard<'_>, LockError> {
        // The mutex guards no data, so poisoning is harmless.
        let local = self.local.lock().unwrap_or_else(|e| e.into_inner());

        let file = match &self.file {
            Some((path, file)) => {
                FileExt::lock_exclusive(file)
                    .map_err(|e| LockError::AcquireFailed(path.clone(), e))?;
                log::trace!("Acquired store lock: {}", path.display());
                Some(file)
            }
            None => None,
        };

        Ok(StoreLockGuard {
            _local: local,
            file,
        })
    }
}

/// Holds a [`StoreLock`] until dropped.
#[derive(Debug)]
pub struct StoreLockGuard<'a> {
    _local: MutexGuard<'a, ()>,
    file: Option<&'a File>,
}

impl Drop for StoreLockGuard<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file {
            if let Err(e) = FileExt::unlock(file) {
                log::warn!("Failed to release store lock: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_lock_path_for() {
        assert_eq!(
            lock_path_for(Path::new("/data/media.db")),
            PathBuf::from("/data/media.db.lock")
        );
        assert_eq!(
            lock_path_for(Path::new("/data/media")),
            PathBuf::from("/data/media.lock")
        );
    }

    #[test]
    fn test_file_lock_reacquire() {
        let dir = tempdir().unwrap();
        let lock = StoreLock::for_database(&dir.path().join("media.db")).unwrap();
        assert!(lock.path().unwrap().exists());

        drop(lock.acquire().unwrap());
        drop(lock.acquire().unwrap());
    }

    #[test]
    fn test_in_process_lock_has_no_file() {
        let lock = StoreLock::in_process();
        assert!(lock.path().is_none());
        let _guard = lock.acquire().unwrap();
    }

    #[test]
    fn test_lock_excludes_threads() {
        let dir = tempdir().unwrap();
        let lock = Arc::new(StoreLock::for_database(&dir.path().join("media.db")).unwrap());
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = lock.acquire().unwrap();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
