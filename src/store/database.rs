//! SQLite-backed record store.

use rusqlite::{params, Connection, OptionalExtension, Params, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::entry::{FileRecord, SourceRef, StoreStats};
use crate::fingerprint::{Fingerprint, FingerprintKind};

/// Errors from record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite call failed.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored fingerprint carries a kind tag this build does not know.
    #[error("File {file_id} has a fingerprint of unknown kind '{tag}'")]
    UnknownFingerprintKind { file_id: i64, tag: String },
}

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    id          INTEGER PRIMARY KEY,
    path        TEXT NOT NULL,
    downloaded  INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS sources (
    id          INTEGER PRIMARY KEY,
    file_id     INTEGER NOT NULL REFERENCES files(id),
    url         TEXT,
    album_id    TEXT,
    processed   INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS fingerprints (
    id          INTEGER PRIMARY KEY,
    file_id     INTEGER NOT NULL UNIQUE REFERENCES files(id) ON DELETE CASCADE,
    kind        TEXT NOT NULL,
    full_hash   TEXT NOT NULL,
    p1          TEXT NOT NULL,
    p2          TEXT NOT NULL,
    p3          TEXT NOT NULL,
    p4          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sources_file ON sources(file_id);
CREATE INDEX IF NOT EXISTS idx_fingerprints_full ON fingerprints(full_hash);
CREATE INDEX IF NOT EXISTS idx_fingerprints_p1 ON fingerprints(p1);
CREATE INDEX IF NOT EXISTS idx_fingerprints_p2 ON fingerprints(p2);
CREATE INDEX IF NOT EXISTS idx_fingerprints_p3 ON fingerprints(p3);
CREATE INDEX IF NOT EXISTS idx_fingerprints_p4 ON fingerprints(p4);
";

/// Downloaded, unfingerprinted, and not part of any album.
const PENDING_FILTER: &str = "f.downloaded = 1 AND h.id IS NULL \
     AND NOT EXISTS (SELECT 1 FROM sources s WHERE s.file_id = f.id AND s.album_id IS NOT NULL)";

const ORPHAN_FILTER: &str = "NOT EXISTS (SELECT 1 FROM sources s WHERE s.file_id = files.id)";

/// The persistent store of files, their sources and their fingerprints.
///
/// Each worker owns its own `RecordStore` (and therefore its own
/// connection). Writers coordinate through [`super::StoreLock`].
pub struct RecordStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.path)
            .finish()
    }
}

impl RecordStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.configure()?;
        Ok(store)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.configure()?;
        Ok(store)
    }

    fn configure(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        self.conn.execute_batch(SCHEMA)?;
        if version < SCHEMA_VERSION {
            self.conn
                .execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        }
        log::debug!("Record store ready (schema version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Location of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Begin an explicit write transaction.
    ///
    /// The transaction takes SQLite's write lock up front. It rolls back when
    /// dropped without [`StoreTx::commit`].
    pub fn begin(&mut self) -> StoreResult<StoreTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(StoreTx { tx })
    }

    // ── Download pipeline side ───────────────────────────────────

    /// Register a file at `path` (relative to the storage base directory).
    pub fn insert_file(&self, path: &str, downloaded: bool) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO files (path, downloaded) VALUES (?1, ?2)",
            params![path, downloaded],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Attach a source to a file.
    pub fn insert_source(
        &self,
        file_id: i64,
        url: Option<&str>,
        album_id: Option<&str>,
        processed: bool,
    ) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO sources (file_id, url, album_id, processed) VALUES (?1, ?2, ?3, ?4)",
            params![file_id, url, album_id, processed],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_downloaded(&self, file_id: i64, downloaded: bool) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE files SET downloaded = ?1 WHERE id = ?2",
            params![downloaded, file_id],
        )?;
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Files waiting for a fingerprint, in discovery (id) order.
    pub fn pending_files(&self) -> StoreResult<Vec<FileRecord>> {
        load_files(&self.conn, PENDING_FILTER, [])
    }

    pub fn file(&self, id: i64) -> StoreResult<Option<FileRecord>> {
        load_file(&self.conn, id)
    }

    /// Every file, in id order.
    pub fn files(&self) -> StoreResult<Vec<FileRecord>> {
        load_files(&self.conn, "1 = 1", [])
    }

    pub fn fingerprint_count(&self) -> StoreResult<u64> {
        count(&self.conn, "SELECT COUNT(*) FROM fingerprints")
    }

    /// Summary counts over the whole store.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        Ok(StoreStats {
            files: count(&self.conn, "SELECT COUNT(*) FROM files")?,
            downloaded: count(&self.conn, "SELECT COUNT(*) FROM files WHERE downloaded = 1")?,
            fingerprinted: self.fingerprint_count()?,
            pending: count(
                &self.conn,
                &format!(
                    "SELECT COUNT(*) FROM files f LEFT JOIN fingerprints h ON h.file_id = f.id \
                     WHERE {PENDING_FILTER}"
                ),
            )?,
            orphans: count(
                &self.conn,
                &format!("SELECT COUNT(*) FROM files WHERE {ORPHAN_FILTER}"),
            )?,
        })
    }
}

/// An open write transaction on a [`RecordStore`].
pub struct StoreTx<'a> {
    tx: Transaction<'a>,
}

impl StoreTx<'_> {
    pub fn file(&self, id: i64) -> StoreResult<Option<FileRecord>> {
        load_file(&self.tx, id)
    }

    /// True if the file still exists and is still waiting for a fingerprint.
    pub fn is_pending(&self, id: i64) -> StoreResult<bool> {
        let found = self
            .tx
            .query_row(
                &format!(
                    "SELECT f.id FROM files f LEFT JOIN fingerprints h ON h.file_id = f.id \
                     WHERE f.id = ?1 AND {PENDING_FILTER}"
                ),
                params![id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Fingerprinted files (other than `excluding`) whose fingerprint equals
    /// `fingerprint` or shares at least one partition with it.
    ///
    /// This is a recall-oriented prefilter; callers must still check the
    /// actual distance.
    pub fn candidates(&self, fingerprint: &Fingerprint, excluding: i64) -> StoreResult<Vec<FileRecord>> {
        let [p1, p2, p3, p4] = fingerprint.partitions();
        load_files(
            &self.tx,
            "f.id != ?1 AND (h.full_hash = ?2 OR h.p1 = ?3 OR h.p2 = ?4 OR h.p3 = ?5 OR h.p4 = ?6)",
            params![excluding, fingerprint.value(), p1, p2, p3, p4],
        )
    }

    /// Store the fingerprint for `file_id`.
    ///
    /// Fails if the file already has one.
    pub fn assign_fingerprint(&self, file_id: i64, fingerprint: &Fingerprint) -> StoreResult<()> {
        let [p1, p2, p3, p4] = fingerprint.partitions();
        self.tx.execute(
            "INSERT INTO fingerprints (file_id, kind, full_hash, p1, p2, p3, p4) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                file_id,
                fingerprint.kind().as_str(),
                fingerprint.value(),
                p1,
                p2,
                p3,
                p4
            ],
        )?;
        Ok(())
    }

    /// Move every source of `from` onto `to`. Returns the number moved.
    pub fn reassign_sources(&self, from: i64, to: i64) -> StoreResult<usize> {
        Ok(self.tx.execute(
            "UPDATE sources SET file_id = ?1 WHERE file_id = ?2",
            params![to, from],
        )?)
    }

    /// Delete a file record; its fingerprint goes with it.
    pub fn delete_file(&self, id: i64) -> StoreResult<usize> {
        Ok(self
            .tx
            .execute("DELETE FROM files WHERE id = ?1", params![id])?)
    }

    /// Delete every file with no sources left. Returns the number deleted.
    pub fn delete_orphans(&self) -> StoreResult<usize> {
        Ok(self
            .tx
            .execute(&format!("DELETE FROM files WHERE {ORPHAN_FILTER}"), [])?)
    }

    pub fn commit(self) -> StoreResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> StoreResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn count(conn: &Connection, sql: &str) -> StoreResult<u64> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn load_file(conn: &Connection, id: i64) -> StoreResult<Option<FileRecord>> {
    Ok(load_files(conn, "f.id = ?1", params![id])?.into_iter().next())
}

/// Load files matching `filter` (aliases: `f` files, `h` fingerprints) with
/// their fingerprints and sources, in id order.
fn load_files<P: Params>(conn: &Connection, filter: &str, params: P) -> StoreResult<Vec<FileRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT f.id, f.path, f.downloaded, h.kind, h.full_hash \
         FROM files f LEFT JOIN fingerprints h ON h.file_id = f.id \
         WHERE {filter} ORDER BY f.id"
    ))?;

    let rows = stmt
        .query_map(params, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut files = Vec::with_capacity(rows.len());
    for (id, path, downloaded, kind, full_hash) in rows {
        let fingerprint = match (kind, full_hash) {
            (Some(tag), Some(value)) => {
                let kind = FingerprintKind::from_tag(&tag)
                    .ok_or(StoreError::UnknownFingerprintKind { file_id: id, tag })?;
                Some(Fingerprint::new(kind, value))
            }
            _ => None,
        };

        files.push(FileRecord {
            id,
            path,
            downloaded,
            fingerprint,
            sources: load_sources(conn, id)?,
        });
    }

    Ok(files)
}

fn load_sources(conn: &Connection, file_id: i64) -> StoreResult<Vec<SourceRef>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, file_id, url, album_id, processed FROM sources WHERE file_id = ?1 ORDER BY id",
    )?;
    let sources = stmt
        .query_map(params![file_id], |row| {
            Ok(SourceRef {
                id: row.get(0)?,
                file_id: row.get(1)?,
                url: row.get(2)?,
                album_id: row.get(3)?,
                processed: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sources)
}
