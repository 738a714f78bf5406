//! Background deduplication sweeps.
//!
//! A [`Sweeper`] repeatedly looks for downloaded files that have no
//! fingerprint yet, fingerprints them, and folds near-duplicates into the
//! largest copy. It runs either in the foreground ([`Sweeper::sweep_once`])
//! or on a dedicated worker thread ([`Sweeper::spawn`]).
//!
//! # Lifecycle
//!
//! ```text
//! Starting -> Scanning -> IdleWait -> Scanning -> ... -> FinalScan -> Stopping -> Stopped
//! ```
//!
//! Raising the [`StopSignal`](crate::signal::StopSignal) ends regular
//! scanning at the next file boundary. One final pass then runs to
//! completion regardless of the signal, so nothing downloaded before the
//! stop request is left unprocessed.
//!
//! # Example
//!
//! ```no_run
//! use mediadupe::storage::LocalStorage;
//! use mediadupe::store::{RecordStore, StoreLock};
//! use mediadupe::sweep::Sweeper;
//! use std::path::Path;
//!
//! let db = Path::new("/srv/media/mediadupe.db");
//! let sweeper = Sweeper::new(
//!     RecordStore::open(db).unwrap(),
//!     StoreLock::for_database(db).unwrap(),
//!     LocalStorage::new("/srv/media"),
//! );
//!
//! let handle = sweeper.spawn().unwrap();
//! // ... later
//! handle.stop();
//! handle.join().unwrap();
//! ```

pub mod controller;
pub mod prune;
pub mod report;
pub mod status;

use std::io;
use thiserror::Error;

use crate::fingerprint::FingerprintError;
use crate::storage::StorageError;
use crate::store::{LockError, StoreError};

pub use controller::{SweepOptions, Sweeper, SweeperHandle, DEFAULT_IDLE_INTERVAL};
pub use prune::prune;
pub use report::SweepReport;
pub use status::{StatusHandle, SweepPhase, SweepStatus};

/// Errors that terminate a sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Store lock failed: {0}")]
    Lock(#[from] LockError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    /// The worker thread could not be started.
    #[error("Failed to spawn sweep worker: {0}")]
    Spawn(#[source] io::Error),

    /// The worker thread panicked.
    #[error("Sweep worker panicked: {0}")]
    WorkerPanicked(String),
}
