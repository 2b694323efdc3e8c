//! `db`: the SQLite handle shared by the graph store and the search index.
//!
//! A [`Database`] is constructed explicitly with [`Database::open`] and torn
//! down with [`Database::close`]; consumers receive it as an `Arc<Database>`.
//!
//! ## Connections
//! - **Writer**: one long-lived connection behind a `Mutex`. Every mutation
//!   runs inside an `IMMEDIATE` transaction on it, so writes are serialized per
//!   database instance.
//! - **Readers**: each read opens a short-lived `query_only` connection. With
//!   the WAL journal a reader sees the last committed state and never blocks
//!   on, or observes half of, a write transaction.
//!
//! ## Schema (v1)
//! - `nodes`: one row per note.
//! - `edges`: directed references; both endpoints cascade on node delete.
//! - `search_index`: FTS5 table, one document per note.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::AppError;

/// Schema version stored in `PRAGMA user_version`.
pub(crate) const SCHEMA_VERSION: i64 = 1;

/// Milliseconds a connection waits on a locked database before `SQLITE_BUSY`.
const BUSY_TIMEOUT_MS: i64 = 5000;

// ── Database ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    writer: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file at `path` and apply the schema.
    ///
    /// Missing parent directories are created. Re-opening an existing file
    /// validates its schema version instead of re-running the DDL.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Storage(format!("graph: cannot create {}: {e}", parent.display()))
            })?;
        }

        let conn = open_conn(path)?;
        init_db(&conn)?;
        info!(path = %path.display(), "graph database opened");

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(conn),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the writer connection, surfacing any error SQLite reports while
    /// flushing. Read connections are never held beyond a single call.
    pub fn close(self) -> Result<(), AppError> {
        let Self { path, writer } = self;
        let conn = writer
            .into_inner()
            .map_err(|_| AppError::Storage("graph: writer lock poisoned".into()))?;
        conn.close()
            .map_err(|(_, e)| AppError::Storage(format!("graph: close {}: {e}", path.display())))?;
        info!(path = %path.display(), "graph database closed");
        Ok(())
    }

    /// Run `f` inside an `IMMEDIATE` transaction on the writer connection.
    ///
    /// The transaction commits only when `f` returns `Ok`; an error (or a
    /// panic) drops it, which rolls back every statement `f` executed.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut conn = self
            .writer
            .lock()
            .map_err(|_| AppError::Storage("graph: writer lock poisoned".into()))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| AppError::Storage(format!("graph: begin write tx: {e}")))?;

        let out = f(&tx)?;

        tx.commit()
            .map_err(|e| AppError::Storage(format!("graph: commit write tx: {e}")))?;
        Ok(out)
    }

    /// Run `f` on a fresh read-only connection.
    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let conn = open_read_conn(&self.path)?;
        f(&conn)
    }

    /// Like [`read`](Self::read), but every statement `f` runs observes the
    /// same committed snapshot.
    pub(crate) fn read_snapshot<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut conn = open_read_conn(&self.path)?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Storage(format!("graph: begin read tx: {e}")))?;
        let out = f(&tx)?;
        tx.finish()
            .map_err(|e| AppError::Storage(format!("graph: end read tx: {e}")))?;
        Ok(out)
    }
}

// ── Schema ────────────────────────────────────────────────────────────────────

fn init_db(conn: &Connection) -> Result<(), AppError> {
    let version: i64 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|e| AppError::Storage(format!("graph: read schema version: {e}")))?;

    if version == 0 {
        debug!("graph: creating schema v{SCHEMA_VERSION}");
        return init_schema(conn);
    }

    if version != SCHEMA_VERSION {
        return Err(AppError::Storage(format!(
            "graph: unsupported schema version {version}, expected {SCHEMA_VERSION}"
        )));
    }

    Ok(())
}

/// Execute the v1 DDL on a fresh database.
///
/// `search_index` keeps `note_id` and `updated_at` `UNINDEXED` (stored, not
/// tokenized); `title` and `content` are the searchable columns.
fn init_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS nodes (
            id           TEXT PRIMARY KEY,
            title        TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_at   INTEGER NOT NULL,
            updated_at   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS nodes_updated_at ON nodes (updated_at DESC);

        CREATE TABLE IF NOT EXISTS edges (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL REFERENCES nodes (id) ON DELETE CASCADE,
            target_id TEXT NOT NULL REFERENCES nodes (id) ON DELETE CASCADE,
            UNIQUE (source_id, target_id)
        );

        CREATE INDEX IF NOT EXISTS edges_target ON edges (target_id);

        CREATE VIRTUAL TABLE IF NOT EXISTS search_index USING fts5(
            note_id UNINDEXED,
            title,
            content,
            updated_at UNINDEXED,
            tokenize = 'porter unicode61'
        );

        PRAGMA user_version = 1;
        ",
    )
    .map_err(|e| AppError::Storage(format!("graph: initialize schema: {e}")))
}

// ── Connection helpers ────────────────────────────────────────────────────────

/// Open the writer connection and apply pragmas.
///
/// - `journal_mode = WAL`: readers proceed alongside the writer.
/// - `foreign_keys = ON`: edge rows cascade when a node row is deleted.
/// - `busy_timeout`: wait instead of failing fast on a locked file.
fn open_conn(db_path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Storage(format!("graph: open {}: {e}", db_path.display())))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Storage(format!("graph: set journal_mode WAL: {e}")))?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| AppError::Storage(format!("graph: set foreign_keys ON: {e}")))?;
    conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
        .map_err(|e| AppError::Storage(format!("graph: set busy_timeout: {e}")))?;

    Ok(conn)
}

fn open_read_conn(db_path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| AppError::Storage(format!("graph: open reader {}: {e}", db_path.display())))?;

    conn.pragma_update(None, "query_only", "ON")
        .map_err(|e| AppError::Storage(format!("graph: set query_only: {e}")))?;
    conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS)
        .map_err(|e| AppError::Storage(format!("graph: set busy_timeout: {e}")))?;

    Ok(conn)
}

// ── Utility functions ─────────────────────────────────────────────────────────

/// Lowercase hex SHA-256 of `content`; the node's content fingerprint.
pub(crate) fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current UTC time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_parent_dirs_and_schema() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("nested").join("aether.db");
        let db = Database::open(&path).expect("open");
        assert!(path.exists());

        let version = db
            .read(|conn| {
                conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, i64>(0))
                    .map_err(|e| AppError::Storage(e.to_string()))
            })
            .expect("read version");
        assert_eq!(version, SCHEMA_VERSION);
        db.close().expect("close");
    }

    #[test]
    fn reopen_keeps_existing_schema() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("aether.db");
        Database::open(&path).expect("first open").close().expect("close");
        Database::open(&path).expect("second open").close().expect("close");
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("aether.db");
        {
            let conn = Connection::open(&path).expect("raw open");
            conn.pragma_update(None, "user_version", 7).expect("set version");
        }
        let err = Database::open(&path).expect_err("version 7 must fail");
        assert!(matches!(err, AppError::Storage(msg) if msg.contains("unsupported schema version 7")));
    }

    #[test]
    fn failed_write_rolls_back() {
        let temp = TempDir::new().expect("tempdir");
        let db = Database::open(&temp.path().join("aether.db")).expect("open");

        let result: Result<(), AppError> = db.write(|conn| {
            conn.execute(
                "INSERT INTO nodes (id, title, content_hash, created_at, updated_at) VALUES ('a', 'A', '', 1, 1)",
                [],
            )
            .map_err(|e| AppError::Storage(e.to_string()))?;
            Err(AppError::Storage("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
                    .map_err(|e| AppError::Storage(e.to_string()))
            })
            .expect("count");
        assert_eq!(count, 0);
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(sha256_hex("abc"), sha256_hex("abc"));
        assert_ne!(sha256_hex("abc"), sha256_hex("abd"));
        assert_eq!(sha256_hex("").len(), 64);
    }
}
