use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FilmshelfError;

/// Days after which a persisted metadata record is considered stale.
pub const FRESHNESS_HORIZON_DAYS: i64 = 30;

/// Lowest rating a user may give.
pub const MIN_RATING: f64 = 0.0;

/// Highest rating a user may give.
pub const MAX_RATING: f64 = 10.0;

// =============================================================================
// Enums
// =============================================================================

/// Kind of title as reported by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Movie,
    Series,
    Episode,
    Game,
}

impl ContentKind {
    /// Wire form used by the provider and the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::Series => "series",
            ContentKind::Episode => "episode",
            ContentKind::Game => "game",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = FilmshelfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(ContentKind::Movie),
            "series" => Ok(ContentKind::Series),
            "episode" => Ok(ContentKind::Episode),
            "game" => Ok(ContentKind::Game),
            other => Err(FilmshelfError::Validation(format!(
                "unknown content kind: {}",
                other
            ))),
        }
    }
}

/// Audience a user considers a title suitable for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Everyone,
    Family,
    Teens,
    Adults,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Everyone => "everyone",
            Audience::Family => "family",
            Audience::Teens => "teens",
            Audience::Adults => "adults",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Audience {
    type Err = FilmshelfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "everyone" => Ok(Audience::Everyone),
            "family" => Ok(Audience::Family),
            "teens" => Ok(Audience::Teens),
            "adults" => Ok(Audience::Adults),
            other => Err(FilmshelfError::Validation(format!(
                "unknown audience: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// A single third-party rating, e.g. ("Rotten Tomatoes", "94%").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingPair {
    pub source: String,
    pub value: String,
}

/// Shared, re-fetchable description of one title.
///
/// Optional fields are `None` when the provider does not know them; the
/// provider's placeholder values never reach this type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub external_id: String,
    pub title: String,
    /// Release year as reported, may be a range for series ("2005–2007").
    pub year: Option<String>,
    /// Content rating classification, e.g. "PG-13".
    pub rated: Option<String>,
    pub released: Option<NaiveDate>,
    pub runtime_minutes: Option<u32>,
    /// Comma-separated genre list as delivered by the provider.
    pub genre: Option<String>,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub actors: Option<String>,
    pub plot: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub awards: Option<String>,
    pub poster: Option<String>,
    #[serde(default)]
    pub ratings: Vec<RatingPair>,
    pub metascore: Option<u32>,
    pub imdb_rating: Option<String>,
    pub imdb_votes: Option<String>,
    pub kind: Option<ContentKind>,
    /// When the record was last fetched from the provider.
    pub last_fetched: DateTime<Utc>,
    /// Bumped every time the record is written to the persistent store.
    pub version: u32,
}

impl MetadataRecord {
    /// Create a record with only the required fields set.
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            year: None,
            rated: None,
            released: None,
            runtime_minutes: None,
            genre: None,
            director: None,
            writer: None,
            actors: None,
            plot: None,
            language: None,
            country: None,
            awards: None,
            poster: None,
            ratings: Vec::new(),
            metascore: None,
            imdb_rating: None,
            imdb_votes: None,
            kind: None,
            last_fetched: Utc::now().trunc_subsecs(0),
            version: 0,
        }
    }

    /// Whether the record is older than the default freshness horizon.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now(), FRESHNESS_HORIZON_DAYS)
    }

    /// Whether `now - last_fetched` exceeds `horizon_days`.
    pub fn is_stale_at(&self, now: DateTime<Utc>, horizon_days: i64) -> bool {
        now.signed_duration_since(self.last_fetched) > Duration::days(horizon_days)
    }

    /// Genres split out of the provider's comma-separated string.
    pub fn genres(&self) -> Vec<String> {
        split_list(self.genre.as_deref())
    }

    /// Cast members split out of the provider's comma-separated string.
    pub fn cast(&self) -> Vec<String> {
        split_list(self.actors.as_deref())
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Lightweight projection returned by a search. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub external_id: String,
    pub title: String,
    pub year: Option<String>,
    pub kind: Option<ContentKind>,
    pub poster: Option<String>,
}

/// One page of search results.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub items: Vec<SearchResultItem>,
    /// Total number of matches across all pages.
    pub total_results: u32,
}

impl SearchPage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Collection
// =============================================================================

/// A user-owned collection entry.
///
/// Holds only user data plus the external id of the title it describes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub id: Uuid,
    pub external_id: String,
    pub rating: Option<f64>,
    pub date_added: DateTime<Utc>,
    pub watched: bool,
    pub date_watched: Option<DateTime<Utc>>,
    pub audience: Option<Audience>,
    pub notes: Option<String>,
    /// Who recommended the title.
    pub recommended_by: Option<String>,
    pub modified_at: DateTime<Utc>,
}

impl CollectionEntry {
    /// Create a fresh, unwatched entry for `external_id`.
    pub fn new(external_id: impl Into<String>) -> Self {
        // Stored with second precision.
        let now = Utc::now().trunc_subsecs(0);
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            rating: None,
            date_added: now,
            watched: false,
            date_watched: None,
            audience: None,
            notes: None,
            recommended_by: None,
            modified_at: now,
        }
    }
}

/// Optional user fields supplied when adding an entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntrySeed {
    pub rating: Option<f64>,
    pub audience: Option<Audience>,
    pub notes: Option<String>,
    pub recommended_by: Option<String>,
}

/// Whether `value` is an acceptable user rating.
pub fn is_valid_rating(value: f64) -> bool {
    value.is_finite() && (MIN_RATING..=MAX_RATING).contains(&value)
}
