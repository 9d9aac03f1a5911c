//! Database connection and schema management.

use juris_abstraction::StoreError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use super::sql_error;

/// How long a writer waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database connection wrapper.
///
/// Manages the SQLite connection and schema initialization. Cloning shares
/// the same connection; other processes open the same file to share state.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens a database file, creating it and its schema if needed.
    ///
    /// # Errors
    /// * `StoreError::Unavailable` - If the database cannot be opened or migrated
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(sql_error)?;
        let db = Self::init(conn, true)?;
        debug!(path = %path.display(), "Opened database");
        Ok(db)
    }

    /// Opens an in-memory database for testing.
    ///
    /// # Errors
    /// * `StoreError::Unavailable` - If the schema cannot be created
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(sql_error)?;
        Self::init(conn, false)
    }

    fn init(conn: Connection, wal: bool) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(sql_error)?;
        if wal {
            // Readers in other processes do not block the writer.
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .map_err(sql_error)?;
            debug!(journal_mode = %mode, "Journal mode set");
        }
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Runs `f` against the connection on the blocking thread pool.
    pub(crate) async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("database task failed: {}", e)))?
    }

    /// Creates the key-value, job and version tables.
    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        info!("Initializing database schema");

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expires_at_ms INTEGER
            );

            CREATE TABLE IF NOT EXISTS analysis_jobs (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                analysis_type TEXT NOT NULL,
                analysis_key TEXT NOT NULL,
                tier TEXT NOT NULL,
                status TEXT NOT NULL,
                result_version_id TEXT,
                lock_token TEXT NOT NULL,
                created_at TEXT NOT NULL,
                finished_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_analysis_jobs_key
                ON analysis_jobs(analysis_key);

            CREATE TABLE IF NOT EXISTS analysis_versions (
                id TEXT PRIMARY KEY,
                case_id TEXT NOT NULL,
                analysis_type TEXT NOT NULL,
                version INTEGER NOT NULL,
                analysis_key TEXT NOT NULL,
                tier TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost REAL NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (case_id, analysis_type, version)
            );
            ",
        )
        .map_err(sql_error)?;

        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("juris.db");
        Database::open(&path).unwrap();
        let db = Database::open(&path).unwrap();

        let tables: i64 = db
            .call(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                    [],
                    |row| row.get(0),
                )
                .map_err(sql_error)
            })
            .await
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("juris.db")).unwrap();

        let mode: String = db
            .call(|conn| conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)).map_err(sql_error))
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
