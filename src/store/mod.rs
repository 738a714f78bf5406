//! Persistent record store for downloaded files.
//!
//! The download pipeline registers files and their sources; the sweep worker
//! assigns fingerprints, merges duplicates and prunes orphans.
//!
//! # Architecture
//!
//! * [`database`]: SQLite persistence, schema management and typed queries,
//!   with an explicit transaction type ([`StoreTx`]).
//! * [`entry`]: The records stored and their helper predicates.
//! * [`lock`]: The cross-process advisory lock every writer takes around a
//!   unit of work.
//!
//! # Example
//!
//! ```no_run
//! use mediadupe::store::{RecordStore, StoreLock};
//! use std::path::Path;
//!
//! let db = Path::new("media.db");
//! let mut store = RecordStore::open(db).unwrap();
//! let lock = StoreLock::for_database(db).unwrap();
//!
//! let _guard = lock.acquire().unwrap();
//! let tx = store.begin().unwrap();
//! let orphans = tx.delete_orphans().unwrap();
//! tx.commit().unwrap();
//! println!("Deleted {orphans} orphan files");
//! ```

pub mod database;
pub mod entry;
pub mod lock;

pub use database::{RecordStore, StoreError, StoreResult, StoreTx};
pub use entry::{FileRecord, SourceRef, StoreStats};
pub use lock::{lock_path_for, LockError, StoreLock, StoreLockGuard};
