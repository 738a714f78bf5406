//! The sweep loop and its worker thread.

use chrono::Local;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::prune::prune;
use super::report::SweepReport;
use super::status::{StatusHandle, SweepPhase, SweepStatus};
use super::SweepError;
use crate::duplicates::{merge, reclaim, resolve, MatchFinder, DEFAULT_MATCH_THRESHOLD};
use crate::fingerprint::{
    Fingerprint, FingerprintEngine, FingerprintError, DEFAULT_CHUNK_SIZE, DEFAULT_HASH_SIZE,
};
use crate::progress::ProgressCallback;
use crate::signal::StopSignal;
use crate::storage::{LocalStorage, StorageError};
use crate::store::{FileRecord, RecordStore, StoreLock};

/// Default pause between passes.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(2);

/// Tunables for a [`Sweeper`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepOptions {
    /// Difference-hash grid size.
    pub hash_size: u32,
    /// Exclusive Hamming-distance threshold for a match.
    pub match_threshold: u32,
    pub idle_interval: Duration,
    /// Read chunk for content hashing.
    pub chunk_size: usize,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            hash_size: DEFAULT_HASH_SIZE,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl SweepOptions {
    #[must_use]
    pub fn with_hash_size(mut self, hash_size: u32) -> Self {
        self.hash_size = hash_size;
        self
    }

    #[must_use]
    pub fn with_match_threshold(mut self, threshold: u32) -> Self {
        self.match_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Outcome of one per-file unit of work.
enum FileOutcome {
    /// The stored object is absent.
    Missing,
    /// Someone else fingerprinted or removed the file first.
    Stale,
    Fingerprinted {
        merged: usize,
        sources_reassigned: usize,
        bytes_reclaimed: u64,
    },
}

/// Fingerprints pending files and merges near-duplicates.
///
/// A `Sweeper` owns its record-store connection. Writes happen under the
/// [`StoreLock`] one file at a time, so several sweepers (or a download
/// pipeline) can share one database.
pub struct Sweeper {
    store: RecordStore,
    lock: StoreLock,
    storage: LocalStorage,
    engine: FingerprintEngine,
    finder: MatchFinder,
    idle_interval: Duration,
    stop: StopSignal,
    status: StatusHandle,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl Sweeper {
    pub fn new(store: RecordStore, lock: StoreLock, storage: LocalStorage) -> Self {
        Self {
            store,
            lock,
            storage,
            engine: FingerprintEngine::default(),
            finder: MatchFinder::default(),
            idle_interval: DEFAULT_IDLE_INTERVAL,
            stop: StopSignal::new(),
            status: StatusHandle::new(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SweepOptions) -> Self {
        self.engine = FingerprintEngine::new(options.hash_size, options.chunk_size);
        self.finder = MatchFinder::new(options.match_threshold);
        self.idle_interval = options.idle_interval;
        self
    }

    /// Use an externally owned stop signal (for example the Ctrl+C one).
    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn status(&self) -> &StatusHandle {
        &self.status
    }

    /// Run the sweep loop on a dedicated thread.
    pub fn spawn(self) -> Result<SweeperHandle, SweepError> {
        let status = self.status.clone();
        let stop = self.stop.clone();

        let thread = thread::Builder::new()
            .name("mediadupe-sweeper".to_string())
            .spawn(move || self.run())
            .map_err(SweepError::Spawn)?;

        Ok(SweeperHandle {
            status,
            stop,
            thread,
        })
    }

    /// Run the sweep loop on the current thread until stopped or failed.
    ///
    /// Fatal errors are logged, recorded in the status and returned.
    pub fn run(mut self) -> Result<(), SweepError> {
        self.status.starting();
        log::info!(
            "Sweeper starting (idle interval {:?}, threshold {})",
            self.idle_interval,
            self.finder.threshold()
        );

        match self.run_loop() {
            Ok(()) => {
                self.status.set_phase(SweepPhase::Stopping);
                self.status.finished();
                log::info!("Sweeper finished");
                Ok(())
            }
            Err(e) => {
                log::error!("Sweeper stopped on error: {}", e);
                self.status.failed(e.to_string());
                Err(e)
            }
        }
    }

    fn run_loop(&mut self) -> Result<(), SweepError> {
        while !self.stop.is_raised() {
            self.status.set_phase(SweepPhase::Scanning);
            self.sweep_once(true)?;

            self.status.idle();
            if self.stop.wait_timeout(self.idle_interval) {
                break;
            }
        }

        log::info!("Stop requested, running final pass");
        self.status.set_phase(SweepPhase::FinalScan);
        self.sweep_once(false)?;
        Ok(())
    }

    /// One pass over every pending file followed by an orphan prune.
    ///
    /// With `honor_stop`, the pass ends early at the next file boundary once
    /// the stop signal is raised. The file being processed always completes.
    pub fn sweep_once(&mut self, honor_stop: bool) -> Result<SweepReport, SweepError> {
        let started = Instant::now();
        let mut report = SweepReport::new(Local::now());

        let pending = self.store.pending_files()?;
        report.files_pending = pending.len();
        log::debug!("{} file(s) pending", pending.len());

        if let Some(progress) = &self.progress {
            progress.on_phase_start("sweep", pending.len());
        }

        for (index, file) in pending.iter().enumerate() {
            if honor_stop && self.stop.is_raised() {
                log::debug!("Stop requested, leaving {} file(s) for later", pending.len() - index);
                report.interrupted = true;
                break;
            }

            self.status.set_remaining(pending.len() - index);
            if let Some(progress) = &self.progress {
                progress.on_progress(index + 1, &file.path);
            }

            match self.process_file(file)? {
                FileOutcome::Missing => report.files_skipped_missing += 1,
                FileOutcome::Stale => {}
                FileOutcome::Fingerprinted {
                    merged,
                    sources_reassigned,
                    bytes_reclaimed,
                } => {
                    report.files_fingerprinted += 1;
                    report.files_merged += merged;
                    report.sources_reassigned += sources_reassigned;
                    report.bytes_reclaimed += bytes_reclaimed;
                    if let Some(progress) = &self.progress {
                        progress.on_item_completed(bytes_reclaimed);
                    }
                }
            }
        }

        self.status.set_remaining(0);
        report.orphans_pruned = prune(&mut self.store, &self.lock)?;
        report.duration = started.elapsed();

        if let Some(progress) = &self.progress {
            progress.on_phase_end("sweep");
        }
        if report.is_noop() {
            log::debug!("Pass complete: {}", report);
        } else {
            log::info!("Pass complete: {}", report);
        }

        self.status.record_report(&report);
        Ok(report)
    }

    /// Content hash streamed from storage; `None` if the object is gone.
    fn content_fingerprint(
        &self,
        file: &FileRecord,
        path: &Path,
    ) -> Result<Option<Fingerprint>, SweepError> {
        let reader = match self.storage.open(&file.path) {
            Ok(reader) => reader,
            Err(StorageError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match self.engine.content_fingerprint(reader) {
            Ok(fingerprint) => Ok(Some(fingerprint)),
            Err(e) => match FingerprintError::from_io(path, e) {
                FingerprintError::NotFound(_) => Ok(None),
                other => Err(other.into()),
            },
        }
    }

    /// Fingerprint one file and merge it with its matches.
    ///
    /// Hashing happens before the lock is taken. Everything from the pending
    /// re-check to the merge is one transaction under the lock; losers'
    /// objects are deleted only after it commits.
    fn process_file(&mut self, file: &FileRecord) -> Result<FileOutcome, SweepError> {
        match self.storage.exists(&file.path) {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("Skipping file {}, object missing: {}", file.id, file.path);
                return Ok(FileOutcome::Missing);
            }
            Err(StorageError::UnsafePath(p)) => {
                log::warn!("Skipping file {} with unsafe path {:?}", file.id, p);
                return Ok(FileOutcome::Missing);
            }
            Err(e) => return Err(e.into()),
        }

        let path = self.storage.resolve(&file.path)?;
        let fingerprint = match self.engine.still_image_fingerprint(&path) {
            Some(fingerprint) => fingerprint,
            None => match self.content_fingerprint(file, &path)? {
                Some(fingerprint) => fingerprint,
                None => {
                    log::debug!("Object vanished while hashing: {}", path.display());
                    return Ok(FileOutcome::Missing);
                }
            },
        };
        log::debug!("File {} fingerprint {}", file.id, fingerprint);

        let guard = self.lock.acquire()?;
        let tx = self.store.begin()?;

        if !tx.is_pending(file.id)? {
            log::debug!("File {} is no longer pending", file.id);
            tx.rollback()?;
            return Ok(FileOutcome::Stale);
        }

        let matches = self.finder.find_matches(&tx, &fingerprint, file.id)?;
        tx.assign_fingerprint(file.id, &fingerprint)?;

        let outcome = if matches.is_empty() {
            None
        } else {
            // Reload for sources attached since the pending query ran.
            let current = tx.file(file.id)?.unwrap_or_else(|| file.clone());
            let mut match_set = matches;
            match_set.push(current);

            match resolve(match_set, &self.storage)? {
                Some(resolution) => Some(merge(&tx, &resolution)?),
                None => None,
            }
        };

        tx.commit()?;
        drop(guard);

        let Some(outcome) = outcome else {
            return Ok(FileOutcome::Fingerprinted {
                merged: 0,
                sources_reassigned: 0,
                bytes_reclaimed: 0,
            });
        };

        let bytes_reclaimed = reclaim(&self.storage, &outcome)?;
        Ok(FileOutcome::Fingerprinted {
            merged: outcome.merged.len(),
            sources_reassigned: outcome.sources_reassigned,
            bytes_reclaimed,
        })
    }
}

/// Control surface for a spawned [`Sweeper`].
#[derive(Debug)]
pub struct SweeperHandle {
    status: StatusHandle,
    stop: StopSignal,
    thread: JoinHandle<Result<(), SweepError>>,
}

impl SweeperHandle {
    /// Current worker status.
    #[must_use]
    pub fn status(&self) -> SweepStatus {
        self.status.snapshot()
    }

    pub fn status_handle(&self) -> &StatusHandle {
        &self.status
    }

    /// Ask the worker to finish: one final pass, then exit.
    pub fn stop(&self) {
        self.stop.raise();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker to exit and return how it ended.
    pub fn join(self) -> Result<(), SweepError> {
        self.thread.join().unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            self.status.failed(message.clone());
            Err(SweepError::WorkerPanicked(message))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn sweeper(dir: &TempDir) -> Sweeper {
        Sweeper::new(
            RecordStore::open_in_memory().unwrap(),
            StoreLock::in_process(),
            LocalStorage::new(dir.path()),
        )
    }

    #[test]
    fn test_options_builder() {
        let options = SweepOptions::default()
            .with_hash_size(16)
            .with_match_threshold(6)
            .with_idle_interval(Duration::from_millis(10))
            .with_chunk_size(4096);
        assert_eq!(options.hash_size, 16);
        assert_eq!(options.match_threshold, 6);
        assert_eq!(options.idle_interval, Duration::from_millis(10));
        assert_eq!(options.chunk_size, 4096);
    }

    #[test]
    fn test_empty_store_pass() {
        let dir = tempdir().unwrap();
        let mut sweeper = sweeper(&dir);

        let report = sweeper.sweep_once(true).unwrap();
        assert_eq!(report.files_pending, 0);
        assert!(report.is_noop());
        assert_eq!(sweeper.status().snapshot().last_report, Some(report));
    }

    #[test]
    fn test_identical_non_images_merge() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"same bytes").unwrap();
        fs::write(dir.path().join("b.bin"), b"same bytes").unwrap();

        let mut sweeper = sweeper(&dir);
        let a = sweeper.store.insert_file("a.bin", true).unwrap();
        sweeper.store.insert_source(a, Some("u1"), None, true).unwrap();
        let b = sweeper.store.insert_file("b.bin", true).unwrap();
        sweeper.store.insert_source(b, Some("u2"), None, true).unwrap();

        let report = sweeper.sweep_once(true).unwrap();
        assert_eq!(report.files_fingerprinted, 2);
        assert_eq!(report.files_merged, 1);
        assert_eq!(report.sources_reassigned, 1);
        assert_eq!(report.bytes_reclaimed, 10);

        let files = sweeper.store.files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].sources.len(), 2);
    }

    #[test]
    fn test_stop_abandons_regular_pass_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"a").unwrap();

        let mut sweeper = sweeper(&dir);
        let a = sweeper.store.insert_file("a.bin", true).unwrap();
        sweeper.store.insert_source(a, None, None, true).unwrap();
        sweeper.stop_signal().raise();

        let report = sweeper.sweep_once(true).unwrap();
        assert!(report.interrupted);
        assert_eq!(report.files_fingerprinted, 0);

        let report = sweeper.sweep_once(false).unwrap();
        assert!(!report.interrupted);
        assert_eq!(report.files_fingerprinted, 1);
    }

    #[test]
    fn test_directory_object_counts_as_missing() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("not_a_file.jpg")).unwrap();

        let mut sweeper = sweeper(&dir);
        let a = sweeper.store.insert_file("not_a_file.jpg", true).unwrap();
        sweeper.store.insert_source(a, None, None, true).unwrap();

        let report = sweeper.sweep_once(true).unwrap();
        assert_eq!(report.files_skipped_missing, 1);
        assert_eq!(report.files_fingerprinted, 0);
    }

    #[test]
    fn test_content_hash_streams_from_storage() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/a.txt"), b"streamed bytes").unwrap();

        let mut sweeper =
            sweeper(&dir).with_options(SweepOptions::default().with_chunk_size(3));
        let a = sweeper.store.insert_file("docs/a.txt", true).unwrap();
        sweeper.store.insert_source(a, None, None, true).unwrap();
        sweeper.sweep_once(true).unwrap();

        let fingerprint = sweeper.store.file(a).unwrap().unwrap().fingerprint.unwrap();
        let expected = blake3::hash(b"streamed bytes").to_hex().to_string();
        assert_eq!(fingerprint, Fingerprint::content(expected));
    }

    #[test]
    fn test_unsafe_path_is_skipped() {
        let dir = tempdir().unwrap();
        let mut sweeper = sweeper(&dir);
        let a = sweeper.store.insert_file("../escape.bin", true).unwrap();
        sweeper.store.insert_source(a, None, None, true).unwrap();

        let report = sweeper.sweep_once(true).unwrap();
        assert_eq!(report.files_skipped_missing, 1);
        assert!(sweeper.store.file(a).unwrap().unwrap().fingerprint.is_none());
    }
}
