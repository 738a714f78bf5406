//! Access to stored media objects.
//!
//! Records carry paths relative to a configured base directory. This module
//! joins them onto the base directory and performs the few filesystem
//! operations the sweep needs: existence, size, deletion and streamed reads.
//!
//! Relative paths that could escape the base directory (absolute paths, drive
//! prefixes, `..` components) are refused with [`StorageError::UnsafePath`].
//!
//! # Example
//!
//! ```
//! use mediadupe::storage::LocalStorage;
//!
//! let storage = LocalStorage::new("/srv/media");
//! assert!(storage.resolve("user/pic.jpg").is_ok());
//! assert!(storage.resolve("../etc/passwd").is_err());
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The relative path would resolve outside the base directory.
    #[error("unsafe relative path: {0}")]
    UnsafePath(String),

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Media objects stored below a base directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Join `relative` onto the base directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsafePath`] for empty paths and any path with
    /// a root, prefix or parent-directory component.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let mut resolved = self.base_dir.clone();
        let mut pushed = false;

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    pushed = true;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::UnsafePath(relative.to_string()));
                }
            }
        }

        if !pushed {
            return Err(StorageError::UnsafePath(relative.to_string()));
        }
        Ok(resolved)
    }

    /// True if a regular file exists at `relative`.
    pub fn exists(&self, relative: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(relative)?.is_file())
    }

    /// Size in bytes, or `None` if nothing is stored at `relative`.
    pub fn size(&self, relative: &str) -> Result<Option<u64>, StorageError> {
        let path = self.resolve(relative)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// Delete the object at `relative`.
    ///
    /// Returns the number of bytes freed, or `None` if it was already gone.
    pub fn delete(&self, relative: &str) -> Result<Option<u64>, StorageError> {
        let path = self.resolve(relative)?;
        let Some(size) = self.size(relative)? else {
            return Ok(None);
        };

        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Deleted {}", path.display());
                Ok(Some(size))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// Open a buffered reader over the object at `relative`.
    pub fn open(&self, relative: &str) -> Result<BufReader<File>, StorageError> {
        let path = self.resolve(relative)?;
        let file = File::open(&path).map_err(|e| StorageError::io(&path, e))?;
        Ok(BufReader::new(file))
    }
}
