//! Persistent metadata store.
//!
//! One record per external id, replaced wholesale on every write. The store
//! never filters by staleness; callers decide what to do with old records.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use rusqlite::OptionalExtension;
use serde::Serialize;
use tracing::{debug, info, warn};

use filmshelf_core::error::{FilmshelfError, Result};
use filmshelf_core::types::{ContentKind, MetadataRecord, RatingPair};

use crate::db::{from_unix, storage_err, Database};

/// Summary of the persisted metadata cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total: u64,
    /// Records older than the horizon the stats were computed with.
    pub stale: u64,
    pub oldest_fetch: Option<DateTime<Utc>>,
    pub newest_fetch: Option<DateTime<Utc>>,
}

/// Durable, id-keyed metadata storage.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Look up a record regardless of staleness. Storage failures are logged
    /// and reported as a miss.
    async fn get(&self, external_id: &str) -> Option<MetadataRecord>;

    /// Insert or replace a record, stamping it as fetched now.
    async fn put(&self, record: MetadataRecord) -> Result<MetadataRecord> {
        self.put_at(record, Utc::now()).await
    }

    /// Insert or replace a record with an explicit fetch time.
    ///
    /// The returned record carries the stored `last_fetched` and the bumped
    /// `version`.
    async fn put_at(
        &self,
        record: MetadataRecord,
        fetched_at: DateTime<Utc>,
    ) -> Result<MetadataRecord>;

    async fn all(&self) -> Result<Vec<MetadataRecord>>;

    async fn count(&self) -> Result<u64>;

    /// Delete records fetched more than `days` days ago.
    async fn remove_older_than(&self, days: i64) -> Result<u64>;

    /// Delete every record.
    async fn clear(&self) -> Result<u64>;

    async fn stats(&self, horizon_days: i64) -> Result<StoreStats> {
        let records = self.all().await?;
        let now = Utc::now();
        Ok(StoreStats {
            total: records.len() as u64,
            stale: records
                .iter()
                .filter(|r| r.is_stale_at(now, horizon_days))
                .count() as u64,
            oldest_fetch: records.iter().map(|r| r.last_fetched).min(),
            newest_fetch: records.iter().map(|r| r.last_fetched).max(),
        })
    }
}

fn validate_id(record: &MetadataRecord) -> Result<()> {
    if record.external_id.trim().is_empty() {
        return Err(FilmshelfError::Validation(
            "external id must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn cutoff(days: i64) -> Result<DateTime<Utc>> {
    if days < 0 {
        return Err(FilmshelfError::Validation(format!(
            "age in days must not be negative: {}",
            days
        )));
    }
    Ok(Utc::now() - Duration::days(days))
}

// =============================================================================
// SQLite backend
// =============================================================================

const COLUMNS: &str = "external_id, title, year, rated, released, runtime_minutes, genre,
    director, writer, actors, plot, language, country, awards, poster, ratings, metascore,
    imdb_rating, imdb_votes, kind, last_fetched, version";

/// SQLite-backed metadata store.
pub struct SqliteMetadataStore {
    db: Arc<Database>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn find(&self, external_id: &str) -> Result<Option<MetadataRecord>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM metadata_records WHERE external_id = ?1",
                    COLUMNS
                ))
                .map_err(storage_err("Metadata lookup prepare"))?;

            let result = stmt
                .query_row(rusqlite::params![external_id], |row| {
                    Ok(row_to_record(row))
                })
                .optional()
                .map_err(storage_err("Metadata lookup"))?;

            result.transpose()
        })
    }

    fn write(&self, mut record: MetadataRecord, fetched_at: DateTime<Utc>) -> Result<MetadataRecord> {
        validate_id(&record)?;
        record.last_fetched = fetched_at.trunc_subsecs(0);
        let ratings = serde_json::to_string(&record.ratings)?;

        let version = self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage_err("Failed to begin metadata write"))?;

            let previous: Option<i64> = tx
                .query_row(
                    "SELECT version FROM metadata_records WHERE external_id = ?1",
                    rusqlite::params![record.external_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(storage_err("Failed to read metadata version"))?;
            let version = previous.map(|v| v + 1).unwrap_or(1);

            tx.execute(
                "DELETE FROM metadata_records WHERE external_id = ?1",
                rusqlite::params![record.external_id],
            )
            .map_err(storage_err("Failed to replace metadata"))?;

            tx.execute(
                &format!(
                    "INSERT INTO metadata_records ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                             ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                    COLUMNS
                ),
                rusqlite::params![
                    record.external_id,
                    record.title,
                    record.year,
                    record.rated,
                    record.released.map(|d| d.format("%Y-%m-%d").to_string()),
                    record.runtime_minutes,
                    record.genre,
                    record.director,
                    record.writer,
                    record.actors,
                    record.plot,
                    record.language,
                    record.country,
                    record.awards,
                    record.poster,
                    ratings,
                    record.metascore,
                    record.imdb_rating,
                    record.imdb_votes,
                    record.kind.map(|k| k.as_str()),
                    record.last_fetched.timestamp(),
                    version,
                ],
            )
            .map_err(storage_err("Failed to save metadata"))?;

            tx.commit()
                .map_err(storage_err("Failed to commit metadata write"))?;
            Ok(version)
        })?;

        record.version = version as u32;
        debug!(external_id = %record.external_id, version = record.version, "Metadata stored");
        Ok(record)
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get(&self, external_id: &str) -> Option<MetadataRecord> {
        match self.find(external_id) {
            Ok(record) => record,
            Err(e) => {
                warn!(external_id, error = %e, "Metadata lookup failed, treating as miss");
                None
            }
        }
    }

    async fn put_at(
        &self,
        record: MetadataRecord,
        fetched_at: DateTime<Utc>,
    ) -> Result<MetadataRecord> {
        self.write(record, fetched_at)
    }

    async fn all(&self) -> Result<Vec<MetadataRecord>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM metadata_records ORDER BY external_id ASC",
                    COLUMNS
                ))
                .map_err(storage_err("Metadata listing prepare"))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_record(row)))
                .map_err(storage_err("Metadata listing"))?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row.map_err(storage_err("Metadata listing row"))??);
            }
            Ok(records)
        })
    }

    async fn count(&self) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM metadata_records", [], |row| row.get(0))
                .map_err(storage_err("Metadata count"))?;
            Ok(count as u64)
        })
    }

    async fn remove_older_than(&self, days: i64) -> Result<u64> {
        let cutoff = cutoff(days)?;
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM metadata_records WHERE last_fetched < ?1",
                rusqlite::params![cutoff.timestamp()],
            )
            .map_err(storage_err("Failed to prune metadata"))
        })?;
        info!(days, removed, "Pruned old metadata records");
        Ok(removed as u64)
    }

    async fn clear(&self) -> Result<u64> {
        let removed = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM metadata_records", [])
                .map_err(storage_err("Failed to clear metadata"))
        })?;
        info!(removed, "Metadata cache cleared");
        Ok(removed as u64)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<MetadataRecord> {
    let get_err = |e: rusqlite::Error| FilmshelfError::Storage(e.to_string());

    let released: Option<String> = row.get(4).map_err(get_err)?;
    let released = released
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| FilmshelfError::Storage(format!("Invalid release date {}: {}", s, e)))
        })
        .transpose()?;

    let ratings: String = row.get(15).map_err(get_err)?;
    let ratings: Vec<RatingPair> = serde_json::from_str(&ratings)?;

    let kind: Option<String> = row.get(19).map_err(get_err)?;
    let kind = kind.map(|k| k.parse::<ContentKind>()).transpose()?;

    let last_fetched: i64 = row.get(20).map_err(get_err)?;
    let version: i64 = row.get(21).map_err(get_err)?;

    Ok(MetadataRecord {
        external_id: row.get(0).map_err(get_err)?,
        title: row.get(1).map_err(get_err)?,
        year: row.get(2).map_err(get_err)?,
        rated: row.get(3).map_err(get_err)?,
        released,
        runtime_minutes: row.get(5).map_err(get_err)?,
        genre: row.get(6).map_err(get_err)?,
        director: row.get(7).map_err(get_err)?,
        writer: row.get(8).map_err(get_err)?,
        actors: row.get(9).map_err(get_err)?,
        plot: row.get(10).map_err(get_err)?,
        language: row.get(11).map_err(get_err)?,
        country: row.get(12).map_err(get_err)?,
        awards: row.get(13).map_err(get_err)?,
        poster: row.get(14).map_err(get_err)?,
        ratings,
        metascore: row.get(16).map_err(get_err)?,
        imdb_rating: row.get(17).map_err(get_err)?,
        imdb_votes: row.get(18).map_err(get_err)?,
        kind,
        last_fetched: from_unix(last_fetched)?,
        version: version as u32,
    })
}

// =============================================================================
// In-memory backend
// =============================================================================

/// Process-local metadata store for tests and ephemeral sessions.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<String, MetadataRecord>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> FilmshelfError {
    FilmshelfError::Storage(format!("Metadata map lock poisoned: {}", e))
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, external_id: &str) -> Option<MetadataRecord> {
        match self.records.read() {
            Ok(records) => records.get(external_id).cloned(),
            Err(e) => {
                warn!(external_id, error = %e, "Metadata map unavailable, treating as miss");
                None
            }
        }
    }

    async fn put_at(
        &self,
        mut record: MetadataRecord,
        fetched_at: DateTime<Utc>,
    ) -> Result<MetadataRecord> {
        validate_id(&record)?;
        let mut records = self.records.write().map_err(poisoned)?;
        record.last_fetched = fetched_at.trunc_subsecs(0);
        record.version = records
            .get(&record.external_id)
            .map(|previous| previous.version + 1)
            .unwrap_or(1);
        records.insert(record.external_id.clone(), record.clone());
        Ok(record)
    }

    async fn all(&self) -> Result<Vec<MetadataRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut all: Vec<MetadataRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        Ok(all)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.read().map_err(poisoned)?.len() as u64)
    }

    async fn remove_older_than(&self, days: i64) -> Result<u64> {
        let cutoff = cutoff(days)?.timestamp();
        let mut records = self.records.write().map_err(poisoned)?;
        let before = records.len();
        records.retain(|_, r| r.last_fetched.timestamp() >= cutoff);
        Ok((before - records.len()) as u64)
    }

    async fn clear(&self) -> Result<u64> {
        let mut records = self.records.write().map_err(poisoned)?;
        let removed = records.len();
        records.clear();
        Ok(removed as u64)
    }
}
