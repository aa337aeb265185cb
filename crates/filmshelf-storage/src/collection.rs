//! Collection entry repository.
//!
//! Raw SQL over the collection_entries table. Entries hold user data and the
//! external id of the title only; nothing here touches metadata_records.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use uuid::Uuid;

use filmshelf_core::error::FilmshelfError;
use filmshelf_core::types::{Audience, CollectionEntry};

use crate::db::{from_unix, storage_err, Database};

const COLUMNS: &str = "id, external_id, rating, date_added, watched, date_watched, audience,
    notes, recommended_by, modified_at";

/// Repository for user collection entries.
pub struct CollectionRepository {
    db: Arc<Database>,
}

impl CollectionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store a new entry.
    ///
    /// Fails with [`FilmshelfError::Duplicate`] when an entry for the same
    /// external id already exists.
    pub fn insert(&self, entry: &CollectionEntry) -> Result<(), FilmshelfError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO collection_entries ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    COLUMNS
                ),
                rusqlite::params![
                    entry.id.to_string(),
                    entry.external_id,
                    entry.rating,
                    entry.date_added.timestamp(),
                    entry.watched as i32,
                    entry.date_watched.map(|d| d.timestamp()),
                    entry.audience.map(|a| a.as_str()),
                    entry.notes,
                    entry.recommended_by,
                    entry.modified_at.timestamp(),
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    FilmshelfError::Duplicate(entry.external_id.clone())
                } else {
                    FilmshelfError::Storage(format!("Failed to save collection entry: {}", e))
                }
            })?;
            Ok(())
        })
    }

    /// Overwrite the user-editable fields of an entry.
    ///
    /// `id`, `external_id` and `date_added` are never changed. Returns
    /// whether a row was updated.
    pub fn update(&self, entry: &CollectionEntry) -> Result<bool, FilmshelfError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE collection_entries
                     SET rating = ?2, watched = ?3, date_watched = ?4, audience = ?5,
                         notes = ?6, recommended_by = ?7, modified_at = ?8
                     WHERE id = ?1",
                    rusqlite::params![
                        entry.id.to_string(),
                        entry.rating,
                        entry.watched as i32,
                        entry.date_watched.map(|d| d.timestamp()),
                        entry.audience.map(|a| a.as_str()),
                        entry.notes,
                        entry.recommended_by,
                        entry.modified_at.timestamp(),
                    ],
                )
                .map_err(storage_err("Failed to update collection entry"))?;
            Ok(changed > 0)
        })
    }

    /// Delete an entry by local id. Returns whether a row was removed.
    pub fn delete(&self, id: Uuid) -> Result<bool, FilmshelfError> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM collection_entries WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(storage_err("Failed to delete collection entry"))?;
            Ok(removed > 0)
        })
    }

    /// Find the entry referencing `external_id`.
    pub fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<CollectionEntry>, FilmshelfError> {
        self.find_one("external_id", external_id.to_string())
    }

    /// Find an entry by local id.
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<CollectionEntry>, FilmshelfError> {
        self.find_one("id", id.to_string())
    }

    fn find_one(
        &self,
        column: &'static str,
        value: String,
    ) -> Result<Option<CollectionEntry>, FilmshelfError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM collection_entries WHERE {} = ?1",
                    COLUMNS, column
                ))
                .map_err(storage_err("Collection lookup prepare"))?;

            let result = stmt
                .query_row(rusqlite::params![value], |row| Ok(row_to_entry(row)))
                .optional()
                .map_err(storage_err("Collection lookup"))?;

            result.transpose()
        })
    }

    pub fn exists(&self, external_id: &str) -> Result<bool, FilmshelfError> {
        self.db.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM collection_entries WHERE external_id = ?1",
                    rusqlite::params![external_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err("Collection existence check"))?;
            Ok(found.is_some())
        })
    }

    /// List entries, newest first, optionally filtered by watched state.
    pub fn list(&self, watched: Option<bool>) -> Result<Vec<CollectionEntry>, FilmshelfError> {
        self.db.with_conn(|conn| {
            let (sql, params_vec): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match watched {
                Some(w) => (
                    format!(
                        "SELECT {} FROM collection_entries WHERE watched = ?1
                         ORDER BY date_added DESC, external_id ASC",
                        COLUMNS
                    ),
                    vec![Box::new(w as i32) as Box<dyn rusqlite::types::ToSql>],
                ),
                None => (
                    format!(
                        "SELECT {} FROM collection_entries
                         ORDER BY date_added DESC, external_id ASC",
                        COLUMNS
                    ),
                    vec![],
                ),
            };

            let params_refs: Vec<&dyn rusqlite::types::ToSql> =
                params_vec.iter().map(|p| p.as_ref()).collect();

            let mut stmt = conn
                .prepare(&sql)
                .map_err(storage_err("Collection listing prepare"))?;

            let rows = stmt
                .query_map(params_refs.as_slice(), |row| Ok(row_to_entry(row)))
                .map_err(storage_err("Collection listing"))?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(row.map_err(storage_err("Collection listing row"))??);
            }
            Ok(entries)
        })
    }

    pub fn count(&self) -> Result<u64, FilmshelfError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM collection_entries", [], |row| row.get(0))
                .map_err(storage_err("Collection count"))?;
            Ok(count as u64)
        })
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<CollectionEntry, FilmshelfError> {
    let get_err = |e: rusqlite::Error| FilmshelfError::Storage(e.to_string());

    let id: String = row.get(0).map_err(get_err)?;
    let date_added: i64 = row.get(3).map_err(get_err)?;
    let watched: i32 = row.get(4).map_err(get_err)?;
    let date_watched: Option<i64> = row.get(5).map_err(get_err)?;
    let audience: Option<String> = row.get(6).map_err(get_err)?;
    let modified_at: i64 = row.get(9).map_err(get_err)?;

    Ok(CollectionEntry {
        id: Uuid::parse_str(&id)
            .map_err(|e| FilmshelfError::Storage(format!("Invalid UUID: {}", e)))?,
        external_id: row.get(1).map_err(get_err)?,
        rating: row.get(2).map_err(get_err)?,
        date_added: from_unix(date_added)?,
        watched: watched != 0,
        date_watched: date_watched.map(from_unix).transpose()?,
        audience: audience.map(|a| a.parse::<Audience>()).transpose()?,
        notes: row.get(7).map_err(get_err)?,
        recommended_by: row.get(8).map_err(get_err)?,
        modified_at: from_unix(modified_at)?,
    })
}
