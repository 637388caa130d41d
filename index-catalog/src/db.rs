use crate::error::Result;
use log::{debug, info};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA_VERSION: i32 = 1;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Process-wide handle to the index database. Opened once; every artifact
/// writer shares this connection, serialized by the inner mutex. Callers
/// must not hold the guard across await points.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        info!("Opened index database at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Path of the backing file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with the shared connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let guard = self.lock();
        Ok(f(&guard)?)
    }

    /// Run `f` with a mutable connection, for explicit transactions.
    pub fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut guard = self.lock();
        Ok(f(&mut guard)?)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 3000;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tag_catalog (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dir TEXT NOT NULL,
                branch TEXT NOT NULL,
                artifactId TEXT NOT NULL,
                path TEXT NOT NULL,
                cacheKey TEXT NOT NULL,
                lastUpdated INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS global_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cacheKey TEXT NOT NULL,
                dir TEXT NOT NULL,
                branch TEXT NOT NULL,
                artifactId TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cacheKey TEXT NOT NULL,
                path TEXT NOT NULL,
                idx INTEGER NOT NULL,
                startLine INTEGER NOT NULL,
                endLine INTEGER NOT NULL,
                content TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_path_cache_key
                ON chunks(path, cacheKey);

            CREATE VIRTUAL TABLE IF NOT EXISTS chunk_fts USING fts5(
                path,
                content,
                tokenize = 'trigram'
            );

            CREATE TABLE IF NOT EXISTS chunk_fts_metadata (
                id INTEGER PRIMARY KEY,
                path TEXT NOT NULL,
                cacheKey TEXT NOT NULL,
                chunkId INTEGER NOT NULL REFERENCES chunks(id)
            );

            CREATE INDEX IF NOT EXISTS idx_chunk_fts_metadata_path_cache_key
                ON chunk_fts_metadata(path, cacheKey);

            CREATE TABLE IF NOT EXISTS code_snippets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                cacheKey TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                startLine INTEGER NOT NULL,
                endLine INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_code_snippets_path_cache_key
                ON code_snippets(path, cacheKey);
            ",
        )?;

        Self::dedupe_and_index(conn)?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// Legacy databases predate the unique indexes and may hold duplicate
    /// rows. Keep the lowest id per uniqueness tuple, then install the
    /// indexes that make the duplicates impossible going forward.
    fn dedupe_and_index(conn: &Connection) -> Result<()> {
        let removed_catalog = conn.execute(
            "DELETE FROM tag_catalog WHERE id NOT IN (
                SELECT MIN(id) FROM tag_catalog
                GROUP BY dir, branch, artifactId, path, cacheKey
            )",
            [],
        )?;
        let removed_global = conn.execute(
            "DELETE FROM global_cache WHERE id NOT IN (
                SELECT MIN(id) FROM global_cache
                GROUP BY cacheKey, dir, branch, artifactId
            )",
            [],
        )?;
        if removed_catalog > 0 || removed_global > 0 {
            debug!(
                "Deduplicated legacy rows: {} tag_catalog, {} global_cache",
                removed_catalog, removed_global
            );
        }

        conn.execute_batch(
            "
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tag_catalog_unique
                ON tag_catalog(dir, branch, artifactId, path, cacheKey);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_global_cache_unique
                ON global_cache(cacheKey, dir, branch, artifactId);
            ",
        )?;
        Ok(())
    }
}
