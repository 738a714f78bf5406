//! Removal of file records nothing refers to anymore.

use crate::store::{RecordStore, StoreLock};

use super::SweepError;

/// Delete every file record with no sources, in one locked transaction.
///
/// Fingerprints of pruned files go with them. Stored objects are left alone:
/// an orphaned record may still share its path with a live one.
///
/// Returns the number of records deleted.
pub fn prune(store: &mut RecordStore, lock: &StoreLock) -> Result<usize, SweepError> {
    let _guard = lock.acquire()?;
    let tx = store.begin()?;
    let pruned = tx.delete_orphans()?;
    tx.commit()?;

    if pruned > 0 {
        log::info!("Pruned {} orphaned file record(s)", pruned);
    } else {
        log::trace!("No orphaned file records");
    }
    Ok(pruned)
}
