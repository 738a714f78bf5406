//! Foreground sweep passes against a real database and storage directory.

use image::{Rgb, RgbImage};
use mediadupe::fingerprint::FingerprintKind;
use mediadupe::storage::LocalStorage;
use mediadupe::store::{RecordStore, StoreLock};
use mediadupe::sweep::Sweeper;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

struct Fixture {
    dir: TempDir,
    db: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let db = dir.path().join("mediadupe.db");
        Self { dir, db }
    }

    fn base(&self) -> &Path {
        self.dir.path()
    }

    /// A second connection for setup and assertions.
    fn store(&self) -> RecordStore {
        RecordStore::open(&self.db).unwrap()
    }

    fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            RecordStore::open(&self.db).unwrap(),
            StoreLock::for_database(&self.db).unwrap(),
            LocalStorage::new(self.base()),
        )
    }

    /// Register a downloaded file with one processed, non-album source.
    fn add(&self, store: &RecordStore, path: &str, url: &str) -> i64 {
        let id = store.insert_file(path, true).unwrap();
        store.insert_source(id, Some(url), None, true).unwrap();
        id
    }
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = ((x * 255) / (width - 1)) as u8;
        Rgb([v, v / 2, ((y * 255) / (height - 1)) as u8])
    })
}

// ── End-to-end merges ────────────────────────────────────────────

#[test]
fn test_identical_jpegs_are_merged() {
    let fx = Fixture::new();
    gradient(64, 48).save(fx.base().join("a.jpg")).unwrap();
    fs::copy(fx.base().join("a.jpg"), fx.base().join("b.jpg")).unwrap();

    let store = fx.store();
    let a = fx.add(&store, "a.jpg", "https://example.com/a");
    let b = fx.add(&store, "b.jpg", "https://example.com/b");

    let report = fx.sweeper().sweep_once(true).unwrap();
    assert_eq!(report.files_pending, 2);
    assert_eq!(report.files_fingerprinted, 2);
    assert_eq!(report.files_merged, 1);
    assert_eq!(report.sources_reassigned, 1);
    assert!(report.bytes_reclaimed > 0);

    // Equal sizes keep the earlier file.
    let files = store.files().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, a);
    assert_eq!(files[0].sources.len(), 2);
    assert!(store.file(b).unwrap().is_none());

    let fingerprint = files[0].fingerprint.as_ref().unwrap();
    assert_eq!(fingerprint.kind(), FingerprintKind::Perceptual);
    assert_eq!(store.fingerprint_count().unwrap(), 1);

    assert!(fx.base().join("a.jpg").exists());
    assert!(!fx.base().join("b.jpg").exists());
}

#[test]
fn test_largest_copy_survives_across_formats() {
    let fx = Fixture::new();
    let img = gradient(64, 64);
    img.save(fx.base().join("small.png")).unwrap();
    img.save(fx.base().join("large.bmp")).unwrap();

    let png_size = fs::metadata(fx.base().join("small.png")).unwrap().len();
    let bmp_size = fs::metadata(fx.base().join("large.bmp")).unwrap().len();
    assert!(bmp_size > png_size);

    let store = fx.store();
    let png = fx.add(&store, "small.png", "u1");
    let bmp = fx.add(&store, "large.bmp", "u2");

    let report = fx.sweeper().sweep_once(true).unwrap();
    assert_eq!(report.files_merged, 1);
    assert_eq!(report.bytes_reclaimed, png_size);

    assert!(store.file(png).unwrap().is_none());
    let survivor = store.file(bmp).unwrap().unwrap();
    let urls: Vec<_> = survivor
        .sources
        .iter()
        .filter_map(|s| s.url.as_deref())
        .collect();
    assert_eq!(urls, vec!["u1", "u2"]);
    assert!(!fx.base().join("small.png").exists());
}

#[test]
fn test_different_images_are_kept() {
    let fx = Fixture::new();
    gradient(64, 64).save(fx.base().join("a.png")).unwrap();
    let mirrored = image::imageops::flip_horizontal(&gradient(64, 64));
    mirrored.save(fx.base().join("b.png")).unwrap();

    let store = fx.store();
    fx.add(&store, "a.png", "u1");
    fx.add(&store, "b.png", "u2");

    let report = fx.sweeper().sweep_once(true).unwrap();
    assert_eq!(report.files_fingerprinted, 2);
    assert_eq!(report.files_merged, 0);
    assert_eq!(store.files().unwrap().len(), 2);
    assert_eq!(store.fingerprint_count().unwrap(), 2);
}

#[test]
fn test_identical_documents_merge_by_content_hash() {
    let fx = Fixture::new();
    fs::create_dir(fx.base().join("docs")).unwrap();
    fs::write(fx.base().join("docs/one.txt"), "the same words").unwrap();
    fs::write(fx.base().join("docs/two.txt"), "the same words").unwrap();
    fs::write(fx.base().join("docs/three.txt"), "other words").unwrap();

    let store = fx.store();
    let one = fx.add(&store, "docs/one.txt", "u1");
    fx.add(&store, "docs/two.txt", "u2");
    let three = fx.add(&store, "docs/three.txt", "u3");

    let report = fx.sweeper().sweep_once(true).unwrap();
    assert_eq!(report.files_merged, 1);

    let ids: Vec<i64> = store.files().unwrap().iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![one, three]);
    let kind = store.file(one).unwrap().unwrap().fingerprint.unwrap().kind();
    assert_eq!(kind, FingerprintKind::Content);
}

// ── Skips and exclusions ─────────────────────────────────────────

#[test]
fn test_missing_object_is_skipped_and_retried() {
    let fx = Fixture::new();
    let store = fx.store();
    let id = fx.add(&store, "later.jpg", "u1");

    let mut sweeper = fx.sweeper();
    let report = sweeper.sweep_once(true).unwrap();
    assert_eq!(report.files_skipped_missing, 1);
    assert_eq!(report.files_fingerprinted, 0);
    assert!(store.file(id).unwrap().unwrap().fingerprint.is_none());
    assert_eq!(store.pending_files().unwrap().len(), 1);

    gradient(16, 16).save(fx.base().join("later.jpg")).unwrap();
    let report = sweeper.sweep_once(true).unwrap();
    assert_eq!(report.files_skipped_missing, 0);
    assert_eq!(report.files_fingerprinted, 1);
}

#[test]
fn test_file_is_swept_once_download_finishes() {
    let fx = Fixture::new();
    fs::write(fx.base().join("clip.mp4"), b"partial").unwrap();

    let store = fx.store();
    let id = store.insert_file("clip.mp4", false).unwrap();
    store.insert_source(id, Some("u1"), None, true).unwrap();

    let mut sweeper = fx.sweeper();
    let report = sweeper.sweep_once(true).unwrap();
    assert_eq!(report.files_pending, 0);

    fs::write(fx.base().join("clip.mp4"), b"complete video").unwrap();
    store.set_downloaded(id, true).unwrap();

    let report = sweeper.sweep_once(true).unwrap();
    assert_eq!(report.files_pending, 1);
    assert_eq!(report.files_fingerprinted, 1);
    let kind = store.file(id).unwrap().unwrap().fingerprint.unwrap().kind();
    assert_eq!(kind, FingerprintKind::Content);
}

#[test]
fn test_album_files_are_left_alone() {
    let fx = Fixture::new();
    gradient(32, 32).save(fx.base().join("a.png")).unwrap();
    fs::copy(fx.base().join("a.png"), fx.base().join("b.png")).unwrap();

    let store = fx.store();
    fx.add(&store, "a.png", "u1");
    let album = store.insert_file("b.png", true).unwrap();
    store
        .insert_source(album, Some("u2"), Some("album-1"), true)
        .unwrap();

    let report = fx.sweeper().sweep_once(true).unwrap();
    assert_eq!(report.files_pending, 1);
    assert_eq!(report.files_merged, 0);
    assert!(store.file(album).unwrap().unwrap().fingerprint.is_none());
    assert!(fx.base().join("b.png").exists());
}

#[test]
fn test_unprocessed_match_is_not_merged() {
    let fx = Fixture::new();
    gradient(32, 32).save(fx.base().join("a.png")).unwrap();
    fs::copy(fx.base().join("a.png"), fx.base().join("b.png")).unwrap();

    let store = fx.store();
    let a = store.insert_file("a.png", true).unwrap();
    store.insert_source(a, Some("u1"), None, false).unwrap();
    fx.add(&store, "b.png", "u2");

    let report = fx.sweeper().sweep_once(true).unwrap();
    assert_eq!(report.files_fingerprinted, 2);
    assert_eq!(report.files_merged, 0);
    assert_eq!(store.files().unwrap().len(), 2);
}

#[test]
fn test_orphans_pruned_after_pass() {
    let fx = Fixture::new();
    let store = fx.store();
    store.insert_file("orphan.jpg", false).unwrap();

    let mut sweeper = fx.sweeper();
    let report = sweeper.sweep_once(true).unwrap();
    assert_eq!(report.orphans_pruned, 1);

    let report = sweeper.sweep_once(true).unwrap();
    assert_eq!(report.orphans_pruned, 0);
    assert_eq!(store.stats().unwrap().files, 0);
}
