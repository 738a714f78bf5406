//! Per-pass sweep statistics.

use bytesize::ByteSize;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// What one sweep pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Files waiting for a fingerprint when the pass started.
    pub files_pending: usize,
    pub files_fingerprinted: usize,
    /// Files whose stored object was absent; retried next pass.
    pub files_skipped_missing: usize,
    /// Loser records folded into a survivor.
    pub files_merged: usize,
    pub sources_reassigned: usize,
    pub bytes_reclaimed: u64,
    pub orphans_pruned: usize,
    /// True if the pass stopped early on a stop request.
    pub interrupted: bool,
    pub started_at: DateTime<Local>,
    pub duration: Duration,
}

impl SweepReport {
    #[must_use]
    pub fn new(started_at: DateTime<Local>) -> Self {
        Self {
            files_pending: 0,
            files_fingerprinted: 0,
            files_skipped_missing: 0,
            files_merged: 0,
            sources_reassigned: 0,
            bytes_reclaimed: 0,
            orphans_pruned: 0,
            interrupted: false,
            started_at,
            duration: Duration::ZERO,
        }
    }

    /// True if the pass changed nothing in the store.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.files_fingerprinted == 0 && self.files_merged == 0 && self.orphans_pruned == 0
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pending, {} fingerprinted, {} skipped, {} merged ({} reclaimed), {} pruned in {:.2?}",
            self.files_pending,
            self.files_fingerprinted,
            self.files_skipped_missing,
            self.files_merged,
            ByteSize::b(self.bytes_reclaimed),
            self.orphans_pruned,
            self.duration
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}
