//! Single SQLite handle behind `tokio::sync::Mutex`.
//! Every query from every caller is serialized through this lock, and the
//! query itself runs on the blocking pool, not on an async worker.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::SeedResult;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS pscale (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        s TEXT NOT NULL DEFAULT '',
        t TEXT NOT NULL DEFAULT '',
        i TEXT NOT NULL DEFAULT '',
        content TEXT NOT NULL,
        created_at TEXT DEFAULT (datetime('now'))
    );
    CREATE TABLE IF NOT EXISTS memory (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identity TEXT NOT NULL DEFAULT '0.1',
        number INTEGER NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT DEFAULT (datetime('now'))
    );
    CREATE TABLE IF NOT EXISTS changelog (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identity TEXT NOT NULL DEFAULT '0.1',
        number INTEGER NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_memory_identity_number ON memory (identity, number);
    CREATE INDEX IF NOT EXISTS idx_changelog_identity_number ON changelog (identity, number);
";

/// Owns the one connection shared by the coordinate store and both numbered logs.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database file and its tables.
    pub fn open(path: &Path) -> SeedResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// In-memory database (for testing).
    pub fn open_in_memory() -> SeedResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> SeedResult<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = DELETE;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the lock and run a closure against the connection on the
    /// blocking pool. The lock is held until the closure returns, even if the
    /// caller stops waiting. A panic in the closure comes back as an error.
    pub async fn with_conn<F, T>(&self, f: F) -> SeedResult<T>
    where
        F: FnOnce(&Connection) -> SeedResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.conn.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || f(&guard))
            .await
            .map_err(anyhow::Error::from)?
    }
}
