//! Near-duplicate lookup.
//!
//! # Overview
//!
//! Finding matches is a two-step process:
//! 1. **Prefilter**: the record store returns every fingerprinted file whose
//!    fingerprint equals the query or shares any one of its four partitions.
//!    This is cheap (indexed) and errs on the side of recall.
//! 2. **Precision filter**: each candidate is checked in memory. Files in an
//!    album, files with unprocessed sources and files at distance at or
//!    above the threshold are dropped.
//!
//! # Example
//!
//! ```no_run
//! use mediadupe::duplicates::MatchFinder;
//! use mediadupe::fingerprint::Fingerprint;
//! use mediadupe::store::RecordStore;
//!
//! let mut store = RecordStore::open_in_memory().unwrap();
//! let tx = store.begin().unwrap();
//! let finder = MatchFinder::default();
//! let query = Fingerprint::perceptual("00ff00ff00ff00ff");
//! let matches = finder.find_matches(&tx, &query, 1).unwrap();
//! println!("{} matching files", matches.len());
//! ```

use crate::fingerprint::Fingerprint;
use crate::store::{FileRecord, StoreResult, StoreTx};

/// Default exclusive distance threshold.
pub const DEFAULT_MATCH_THRESHOLD: u32 = 4;

/// Finds existing files that are near-duplicates of a fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct MatchFinder {
    threshold: u32,
}

impl MatchFinder {
    /// Create a finder accepting distances strictly below `threshold`.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Files (other than `excluding`) that truly match `fingerprint`, in id
    /// order.
    pub fn find_matches(
        &self,
        tx: &StoreTx<'_>,
        fingerprint: &Fingerprint,
        excluding: i64,
    ) -> StoreResult<Vec<FileRecord>> {
        let candidates = tx.candidates(fingerprint, excluding)?;
        let prefiltered = candidates.len();

        let matches: Vec<FileRecord> = candidates
            .into_iter()
            .filter(|candidate| self.is_match(candidate, fingerprint))
            .collect();

        log::trace!(
            "{}: {} candidates, {} matches",
            fingerprint,
            prefiltered,
            matches.len()
        );
        Ok(matches)
    }

    /// Precision check of a single candidate.
    #[must_use]
    pub fn is_match(&self, candidate: &FileRecord, fingerprint: &Fingerprint) -> bool {
        let Some(theirs) = &candidate.fingerprint else {
            return false;
        };
        if candidate.in_album() || !candidate.fully_processed() {
            return false;
        }
        theirs.distance(fingerprint).is_below(self.threshold)
    }
}

impl Default for MatchFinder {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}
