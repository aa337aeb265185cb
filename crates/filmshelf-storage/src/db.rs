//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex so the metadata table and
//! the collection table share one serialized owner per process.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use tracing::info;

use filmshelf_core::error::FilmshelfError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL and runs all pending
    /// migrations.
    pub fn new(path: &Path) -> Result<Self, FilmshelfError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| FilmshelfError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| FilmshelfError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, FilmshelfError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| FilmshelfError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| FilmshelfError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, FilmshelfError>
    where
        F: FnOnce(&Connection) -> Result<T, FilmshelfError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FilmshelfError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

/// Map a rusqlite error into a storage error with context.
pub(crate) fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> FilmshelfError + '_ {
    move |e| FilmshelfError::Storage(format!("{}: {}", context, e))
}

/// Unix seconds back into a UTC timestamp.
pub(crate) fn from_unix(secs: i64) -> Result<DateTime<Utc>, FilmshelfError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| FilmshelfError::Storage(format!("Invalid timestamp: {}", secs)))
}
