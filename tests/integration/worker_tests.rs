//! Background worker lifecycle.

use image::{Rgb, RgbImage};
use mediadupe::storage::LocalStorage;
use mediadupe::store::{RecordStore, StoreLock};
use mediadupe::sweep::{SweepOptions, SweepPhase, Sweeper, SweeperHandle};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn spawn(base: &Path, db: &Path, idle: Duration) -> SweeperHandle {
    Sweeper::new(
        RecordStore::open(db).unwrap(),
        StoreLock::for_database(db).unwrap(),
        LocalStorage::new(base),
    )
    .with_options(SweepOptions::default().with_idle_interval(idle))
    .spawn()
    .unwrap()
}

/// Poll `handle` until `done` holds or ten seconds pass.
fn wait_until(handle: &SweeperHandle, done: impl Fn(&SweeperHandle) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(handle) {
        assert!(Instant::now() < deadline, "timed out, status: {:?}", handle.status());
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_stop_during_idle_runs_final_pass() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("mediadupe.db");
    let store = RecordStore::open(&db).unwrap();

    // Long idle interval: only the stop request can end the wait.
    let handle = spawn(dir.path(), &db, Duration::from_secs(60));
    wait_until(&handle, |h| h.status().phase == SweepPhase::IdleWait);

    RgbImage::from_pixel(8, 8, Rgb([10, 20, 30]))
        .save(dir.path().join("late.png"))
        .unwrap();
    let id = store.insert_file("late.png", true).unwrap();
    store.insert_source(id, Some("u1"), None, true).unwrap();

    let started = Instant::now();
    handle.stop();
    let status_handle = handle.status_handle().clone();
    handle.join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(30));

    let status = status_handle.snapshot();
    assert!(!status.running);
    assert_eq!(status.phase, SweepPhase::Stopped);
    assert_eq!(status.message, "Finished.");
    assert!(status.last_error.is_none());
    assert_eq!(status.last_report.unwrap().files_fingerprinted, 1);

    assert!(store.file(id).unwrap().unwrap().fingerprint.is_some());
}

#[test]
fn test_worker_reports_running_and_idle() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("mediadupe.db");

    let handle = spawn(dir.path(), &db, Duration::from_millis(20));
    wait_until(&handle, |h| {
        let status = h.status();
        status.running && status.last_report.is_some()
    });

    handle.stop();
    handle.join().unwrap();
}

#[test]
fn test_fatal_store_error_stops_worker() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("mediadupe.db");

    let sweeper = Sweeper::new(
        RecordStore::open(&db).unwrap(),
        StoreLock::for_database(&db).unwrap(),
        LocalStorage::new(dir.path()),
    );

    // Break the schema behind the worker's back.
    RecordStore::open(&db)
        .unwrap()
        .connection()
        .execute_batch("DROP TABLE fingerprints;")
        .unwrap();

    let status_handle = sweeper.status().clone();
    let handle = sweeper.spawn().unwrap();
    let result = handle.join();
    assert!(result.is_err());

    let status = status_handle.snapshot();
    assert!(!status.running);
    assert_eq!(status.phase, SweepPhase::Stopped);
    let error = status.last_error.expect("error should be recorded");
    assert!(error.contains("fingerprints"), "unexpected error: {error}");
}
