//! BLAKE3 content hasher with streaming support.
//!
//! Files are read in fixed-size chunks so memory use stays bounded no matter
//! how large the file is.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use super::FingerprintError;

/// Default read chunk: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Streaming BLAKE3 hasher producing lowercase hex digests.
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    chunk_size: usize,
}

impl ContentHasher {
    /// Create a hasher that reads `chunk_size` bytes at a time.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Size of each read.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hash the whole file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError::NotFound`] if the file vanished and
    /// [`FingerprintError::Io`] for any other read failure.
    pub fn hash_file(&self, path: &Path) -> Result<String, FingerprintError> {
        let file = File::open(path).map_err(|e| FingerprintError::from_io(path, e))?;
        self.hash_reader(file)
            .map_err(|e| FingerprintError::from_io(path, e))
    }

    /// Hash everything `reader` yields.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<String> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}
