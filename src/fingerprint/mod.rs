//! Fingerprinting of downloaded media.
//!
//! Every file gets exactly one [`Fingerprint`]:
//! - still images get a perceptual difference hash ([`perceptual`])
//! - everything else (non-images, undecodable or animated images) gets a
//!   BLAKE3 content hash ([`hasher`])
//!
//! The two kinds are tagged so that comparisons never mix them, even if their
//! string lengths happen to coincide.
//!
//! # Example
//!
//! ```no_run
//! use mediadupe::fingerprint::FingerprintEngine;
//! use std::path::Path;
//!
//! let engine = FingerprintEngine::default();
//! let fp = engine.best_fingerprint(Path::new("photo.png")).unwrap();
//! println!("{} {}", fp.kind(), fp.value());
//! ```

pub mod hasher;
pub mod perceptual;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub use hasher::{ContentHasher, DEFAULT_CHUNK_SIZE};
pub use perceptual::{PerceptualError, PerceptualHasher, DEFAULT_HASH_SIZE};

/// Number of partitions a fingerprint is split into for bucketed lookup.
pub const PARTITION_COUNT: usize = 4;

/// Which hash family produced a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintKind {
    /// Difference hash of a still image.
    Perceptual,
    /// BLAKE3 digest of the raw bytes.
    Content,
}

impl FingerprintKind {
    /// Tag stored in the record store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Perceptual => "dhash",
            Self::Content => "blake3",
        }
    }

    /// Parse a stored tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "dhash" => Some(Self::Perceptual),
            "blake3" => Some(Self::Content),
            _ => None,
        }
    }
}

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distance between two fingerprints.
///
/// `Incompatible` sorts above every `Bits` value, so it never satisfies a
/// threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Distance {
    /// Number of differing characters between two comparable values.
    Bits(u32),
    /// Different hash families or different lengths.
    Incompatible,
}

impl Distance {
    /// True if this is a comparable distance strictly below `threshold`.
    #[must_use]
    pub fn is_below(self, threshold: u32) -> bool {
        matches!(self, Self::Bits(d) if d < threshold)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits(d) => write!(f, "{d}"),
            Self::Incompatible => f.write_str("incompatible"),
        }
    }
}

/// Per-character Hamming distance between two strings.
///
/// Strings of different length are [`Distance::Incompatible`].
#[must_use]
pub fn hamming_distance(a: &str, b: &str) -> Distance {
    if a.chars().count() != b.chars().count() {
        return Distance::Incompatible;
    }
    let differing = a.chars().zip(b.chars()).filter(|(x, y)| x != y).count();
    Distance::Bits(differing as u32)
}

/// Split `value` into [`PARTITION_COUNT`] consecutive pieces of equal width.
///
/// The last piece absorbs any remainder.
#[must_use]
pub fn split_partitions(value: &str) -> [&str; PARTITION_COUNT] {
    let bounds: Vec<usize> = value
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(value.len()))
        .collect();
    let width = (bounds.len() - 1) / PARTITION_COUNT;
    let at = |k: usize| bounds[k * width];

    [
        &value[at(0)..at(1)],
        &value[at(1)..at(2)],
        &value[at(2)..at(3)],
        &value[at(3)..],
    ]
}

/// A tagged fingerprint value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    kind: FingerprintKind,
    value: String,
}

impl Fingerprint {
    /// Create a fingerprint from its parts.
    pub fn new(kind: FingerprintKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// A perceptual (difference hash) fingerprint.
    pub fn perceptual(value: impl Into<String>) -> Self {
        Self::new(FingerprintKind::Perceptual, value)
    }

    /// A content (BLAKE3) fingerprint.
    pub fn content(value: impl Into<String>) -> Self {
        Self::new(FingerprintKind::Content, value)
    }

    #[must_use]
    pub fn kind(&self) -> FingerprintKind {
        self.kind
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The coarse index keys for this fingerprint.
    #[must_use]
    pub fn partitions(&self) -> [&str; PARTITION_COUNT] {
        split_partitions(&self.value)
    }

    /// Distance to `other`; fingerprints of different kinds are incompatible.
    #[must_use]
    pub fn distance(&self, other: &Fingerprint) -> Distance {
        if self.kind != other.kind {
            return Distance::Incompatible;
        }
        hamming_distance(&self.value, &other.value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Errors that can occur while fingerprinting a file.
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// The file does not exist (or vanished while being read).
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl FingerprintError {
    pub(crate) fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Picks and computes the best fingerprint for a file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintEngine {
    perceptual: PerceptualHasher,
    content: ContentHasher,
}

impl FingerprintEngine {
    /// Create an engine with the given difference-hash grid size and
    /// content-hash read chunk.
    #[must_use]
    pub fn new(hash_size: u32, chunk_size: usize) -> Self {
        Self {
            perceptual: PerceptualHasher::new(hash_size),
            content: ContentHasher::new(chunk_size),
        }
    }

    /// Fingerprint the file at `path`.
    ///
    /// Still images get a difference hash. Anything that is not a decodable
    /// still image falls back to the content hash; decode failures are never
    /// surfaced.
    ///
    /// # Errors
    ///
    /// Only read failures of the content hash are returned.
    pub fn best_fingerprint(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        if let Some(fingerprint) = self.still_image_fingerprint(path) {
            return Ok(fingerprint);
        }
        self.content.hash_file(path).map(Fingerprint::content)
    }

    /// Difference hash of `path`, or `None` if it is not a decodable still
    /// image.
    pub fn still_image_fingerprint(&self, path: &Path) -> Option<Fingerprint> {
        match self.perceptual.compute_hash(path) {
            Ok(hash) => Some(Fingerprint::perceptual(hash)),
            Err(PerceptualError::Animated(_)) => {
                log::debug!("Animated image, using content hash: {}", path.display());
                None
            }
            Err(e) => {
                log::debug!("Not a still image ({}), using content hash", e);
                None
            }
        }
    }

    /// Content hash of everything `reader` yields.
    pub fn content_fingerprint<R: Read>(&self, reader: R) -> io::Result<Fingerprint> {
        self.content.hash_reader(reader).map(Fingerprint::content)
    }
}
