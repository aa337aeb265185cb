//! Database schema migrations.
//!
//! Version 1 creates the metadata_records and collection_entries tables.
//! Collection entries deliberately carry no foreign key to metadata: an entry
//! may exist before its metadata is cached, and clearing the metadata cache
//! must never cascade into user data.

use rusqlite::Connection;
use tracing::info;

use filmshelf_core::error::FilmshelfError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), FilmshelfError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| FilmshelfError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| FilmshelfError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), FilmshelfError> {
    conn.execute_batch(
        "
        -- Shared, re-fetchable metadata. One row per external id.
        CREATE TABLE IF NOT EXISTS metadata_records (
            external_id     TEXT PRIMARY KEY NOT NULL
                            CHECK (length(external_id) > 0),
            title           TEXT NOT NULL,
            year            TEXT,
            rated           TEXT,
            released        TEXT,
            runtime_minutes INTEGER,
            genre           TEXT,
            director        TEXT,
            writer          TEXT,
            actors          TEXT,
            plot            TEXT,
            language        TEXT,
            country         TEXT,
            awards          TEXT,
            poster          TEXT,
            ratings         TEXT NOT NULL DEFAULT '[]',
            metascore       INTEGER,
            imdb_rating     TEXT,
            imdb_votes      TEXT,
            kind            TEXT
                            CHECK (kind IS NULL OR kind IN ('movie', 'series', 'episode', 'game')),
            last_fetched    INTEGER NOT NULL,
            version         INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_metadata_last_fetched
            ON metadata_records (last_fetched ASC);

        -- User-owned entries referencing metadata by external id only.
        CREATE TABLE IF NOT EXISTS collection_entries (
            id              TEXT PRIMARY KEY NOT NULL,
            external_id     TEXT NOT NULL
                            CHECK (length(external_id) > 0),
            rating          REAL
                            CHECK (rating IS NULL OR (rating >= 0 AND rating <= 10)),
            date_added      INTEGER NOT NULL,
            watched         INTEGER NOT NULL DEFAULT 0,
            date_watched    INTEGER,
            audience        TEXT
                            CHECK (audience IS NULL OR audience IN ('everyone', 'family', 'teens', 'adults')),
            notes           TEXT,
            recommended_by  TEXT,
            modified_at     INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_collection_external_id
            ON collection_entries (external_id);

        CREATE INDEX IF NOT EXISTS idx_collection_watched
            ON collection_entries (watched, date_added DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| FilmshelfError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
