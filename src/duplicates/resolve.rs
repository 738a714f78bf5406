//! Picking a survivor among duplicates and folding the rest into it.
//!
//! # Overview
//!
//! The largest stored object wins: among perceptually equal files the larger
//! one has lost less to compression (or is a superset). A missing object
//! counts as 0 bytes but ranks below a present object of equal size. The
//! sort is stable, so otherwise equal entries keep the order the match set
//! was given in.
//!
//! Merging happens in two steps:
//! 1. [`merge`] runs inside the per-file transaction: every loser's sources
//!    move to the survivor and the loser's record is deleted.
//! 2. [`reclaim`] runs after the transaction commits and deletes the losers'
//!    stored objects.
//!
//! # Example
//!
//! ```
//! use mediadupe::duplicates::choose_survivor;
//! use mediadupe::store::FileRecord;
//!
//! let file = |id: i64| FileRecord {
//!     id,
//!     path: format!("{id}.jpg"),
//!     downloaded: true,
//!     fingerprint: None,
//!     sources: Vec::new(),
//! };
//!
//! let resolution = choose_survivor(vec![(file(1), Some(10)), (file(2), Some(50))]).unwrap();
//! assert_eq!(resolution.survivor.id, 2);
//! ```

use crate::storage::{LocalStorage, StorageError};
use crate::store::{FileRecord, StoreResult, StoreTx};

/// The outcome of ranking a match set.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub survivor: FileRecord,
    /// Files folded into the survivor, largest first.
    pub losers: Vec<FileRecord>,
}

/// What a merge changed in the record store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub survivor_id: i64,
    /// Ids of deleted loser records.
    pub merged: Vec<i64>,
    pub sources_reassigned: usize,
    /// Relative paths of stored objects to delete once committed.
    pub doomed_objects: Vec<String>,
}

/// Rank `(file, size)` pairs by size, descending, where a `None` size is a
/// missing object. Returns `None` for an empty set.
#[must_use]
pub fn choose_survivor(sized: Vec<(FileRecord, Option<u64>)>) -> Option<Resolution> {
    let rank = |size: Option<u64>| (size.unwrap_or(0), size.is_some());
    let mut sized = sized;
    sized.sort_by(|a, b| rank(b.1).cmp(&rank(a.1)));

    let mut ranked = sized.into_iter().map(|(file, _)| file);
    let survivor = ranked.next()?;
    Some(Resolution {
        survivor,
        losers: ranked.collect(),
    })
}

/// Rank a match set by stored object size. Missing objects count as 0 bytes
/// and lose ties against present ones.
///
/// # Errors
///
/// Fails on I/O errors other than the object being absent. A record whose
/// path is unsafe is ranked as 0 bytes.
pub fn resolve(
    match_set: Vec<FileRecord>,
    storage: &LocalStorage,
) -> Result<Option<Resolution>, StorageError> {
    let mut sized = Vec::with_capacity(match_set.len());
    for file in match_set {
        let size = match storage.size(&file.path) {
            Ok(size) => size,
            Err(StorageError::UnsafePath(path)) => {
                log::warn!("File {} has unsafe path {:?}", file.id, path);
                None
            }
            Err(e) => return Err(e),
        };
        sized.push((file, size));
    }
    Ok(choose_survivor(sized))
}

/// Fold every loser into the survivor within `tx`.
///
/// Each loser's sources move in one bulk update keyed on the loser's id, so
/// no source is moved twice or lost, and then the loser record is deleted.
pub fn merge(tx: &StoreTx<'_>, resolution: &Resolution) -> StoreResult<MergeOutcome> {
    let survivor = &resolution.survivor;
    let mut outcome = MergeOutcome {
        survivor_id: survivor.id,
        ..Default::default()
    };

    for loser in &resolution.losers {
        let moved = tx.reassign_sources(loser.id, survivor.id)?;
        tx.delete_file(loser.id)?;
        log::info!(
            "Merged file {} ({}) into {} ({}), {} source(s) moved",
            loser.id,
            loser.path,
            survivor.id,
            survivor.path,
            moved
        );

        outcome.merged.push(loser.id);
        outcome.sources_reassigned += moved;
        // Two records can share one object; never delete the survivor's bytes.
        if loser.path != survivor.path {
            outcome.doomed_objects.push(loser.path.clone());
        }
    }

    Ok(outcome)
}

/// Delete the stored objects of merged losers. Returns the bytes freed.
///
/// Objects that are already gone, or whose path is unsafe, are skipped.
pub fn reclaim(storage: &LocalStorage, outcome: &MergeOutcome) -> Result<u64, StorageError> {
    let mut freed = 0;
    for path in &outcome.doomed_objects {
        match storage.delete(path) {
            Ok(Some(bytes)) => freed += bytes,
            Ok(None) => {}
            Err(StorageError::UnsafePath(path)) => {
                log::warn!("Refusing to delete unsafe path {:?}", path);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(freed)
}
