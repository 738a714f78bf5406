//! Record definitions.

use serde::Serialize;

use crate::fingerprint::Fingerprint;

/// An originating link that produced a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub id: i64,
    pub file_id: i64,
    pub url: Option<String>,
    /// Set when the link belongs to an album; album files are never merged.
    pub album_id: Option<String>,
    pub processed: bool,
}

impl SourceRef {
    #[must_use]
    pub fn is_album(&self) -> bool {
        self.album_id.is_some()
    }
}

/// One downloaded artifact with its eagerly loaded sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    /// Path relative to the storage base directory.
    pub path: String,
    pub downloaded: bool,
    pub fingerprint: Option<Fingerprint>,
    pub sources: Vec<SourceRef>,
}

impl FileRecord {
    /// True if any source is album-tagged.
    #[must_use]
    pub fn in_album(&self) -> bool {
        self.sources.iter().any(SourceRef::is_album)
    }

    /// True if every source has been processed by the download pipeline.
    #[must_use]
    pub fn fully_processed(&self) -> bool {
        self.sources.iter().all(|s| s.processed)
    }
}

/// Summary counts over the record store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub files: u64,
    pub downloaded: u64,
    pub fingerprinted: u64,
    /// Downloaded, not yet fingerprinted, not in an album.
    pub pending: u64,
    /// Files with no sources left.
    pub orphans: u64,
}
