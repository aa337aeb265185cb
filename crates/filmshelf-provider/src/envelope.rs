//! Provider envelope decoding and placeholder normalization.
//!
//! Every response carries `"Response": "True" | "False"` and, on failure, an
//! `"Error"` message. Missing fields are reported as `"N/A"`, which is
//! turned into `None` here and never leaves this module.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use filmshelf_core::types::{ContentKind, MetadataRecord, RatingPair, SearchPage, SearchResultItem};

use crate::error::ProviderError;
use crate::transport::{HttpResponse, HttpStatusError};

/// Placeholder the provider uses for unknown values.
pub const SENTINEL: &str = "N/A";

/// Normalize a raw provider value: trims, and maps the sentinel or an empty
/// string to `None`.
pub fn present(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(SENTINEL) {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

/// Check the envelope of a response and return its JSON body on success.
pub fn open_envelope(response: &HttpResponse) -> Result<Value, ProviderError> {
    let body: Value = match serde_json::from_str(&response.body) {
        Ok(body) => body,
        Err(e) if !response.is_success() => {
            debug!(status = response.status, error = %e, "Non-JSON error body");
            return Err(ProviderError::Transport(Box::new(HttpStatusError {
                status: response.status,
            })));
        }
        Err(e) => {
            warn!(error = %e, "Provider returned a body that is not JSON");
            return Err(ProviderError::MalformedResponse(format!(
                "body is not JSON: {}",
                e
            )));
        }
    };

    let flag = body
        .get("Response")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ProviderError::MalformedResponse("missing Response flag".to_string())
        })?;

    if flag.eq_ignore_ascii_case("true") {
        return Ok(body);
    }
    if !flag.eq_ignore_ascii_case("false") {
        return Err(ProviderError::MalformedResponse(format!(
            "unexpected Response flag: {}",
            flag
        )));
    }

    match body.get("Error").and_then(Value::as_str) {
        Some(message) if !message.trim().is_empty() => Err(ProviderError::classify(message)),
        _ => Err(ProviderError::MalformedResponse(
            "failure without an error message".to_string(),
        )),
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ProviderError> {
    serde_json::from_value(body).map_err(|e| {
        warn!(error = %e, "Provider payload did not match the expected shape");
        ProviderError::Decoding(e.to_string())
    })
}

/// Detail payload as delivered by the provider.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawDetail {
    title: Option<String>,
    year: Option<String>,
    rated: Option<String>,
    released: Option<String>,
    runtime: Option<String>,
    genre: Option<String>,
    director: Option<String>,
    writer: Option<String>,
    actors: Option<String>,
    plot: Option<String>,
    language: Option<String>,
    country: Option<String>,
    awards: Option<String>,
    poster: Option<String>,
    #[serde(default)]
    ratings: Vec<RawRating>,
    metascore: Option<String>,
    #[serde(rename = "imdbRating")]
    imdb_rating: Option<String>,
    #[serde(rename = "imdbVotes")]
    imdb_votes: Option<String>,
    #[serde(rename = "imdbID")]
    imdb_id: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRating {
    source: Option<String>,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSearch {
    #[serde(rename = "Search")]
    search: Vec<RawSearchItem>,
    #[serde(rename = "totalResults")]
    total_results: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSearchItem {
    title: Option<String>,
    year: Option<String>,
    #[serde(rename = "imdbID")]
    imdb_id: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
    poster: Option<String>,
}

/// Decode a successful detail body into a record.
pub fn decode_detail(body: Value) -> Result<MetadataRecord, ProviderError> {
    let raw: RawDetail = decode(body)?;

    let external_id = present(raw.imdb_id)
        .ok_or_else(|| ProviderError::Decoding("detail payload has no imdbID".to_string()))?;
    let title = present(raw.title)
        .ok_or_else(|| ProviderError::Decoding("detail payload has no Title".to_string()))?;

    let mut record = MetadataRecord::new(external_id, title);
    record.year = present(raw.year);
    record.rated = present(raw.rated);
    record.released = present(raw.released).and_then(|s| parse_release_date(&s));
    record.runtime_minutes = present(raw.runtime).and_then(|s| parse_runtime(&s));
    record.genre = present(raw.genre);
    record.director = present(raw.director);
    record.writer = present(raw.writer);
    record.actors = present(raw.actors);
    record.plot = present(raw.plot);
    record.language = present(raw.language);
    record.country = present(raw.country);
    record.awards = present(raw.awards);
    record.poster = present(raw.poster);
    record.ratings = raw
        .ratings
        .into_iter()
        .filter_map(|r| {
            Some(RatingPair {
                source: present(r.source)?,
                value: present(r.value)?,
            })
        })
        .collect();
    record.metascore = present(raw.metascore).and_then(|s| s.parse().ok());
    record.imdb_rating = present(raw.imdb_rating);
    record.imdb_votes = present(raw.imdb_votes);
    record.kind = parse_kind(raw.kind);
    Ok(record)
}

/// Decode a successful search body into a page of results.
pub fn decode_search(body: Value) -> Result<SearchPage, ProviderError> {
    let raw: RawSearch = decode(body)?;

    let items: Vec<SearchResultItem> = raw
        .search
        .into_iter()
        .filter_map(|item| {
            let external_id = present(item.imdb_id);
            let title = present(item.title);
            match (external_id, title) {
                (Some(external_id), Some(title)) => Some(SearchResultItem {
                    external_id,
                    title,
                    year: present(item.year),
                    kind: parse_kind(item.kind),
                    poster: present(item.poster),
                }),
                _ => {
                    warn!("Skipping search item without id or title");
                    None
                }
            }
        })
        .collect();

    let total_results = present(raw.total_results)
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(items.len() as u32);

    Ok(SearchPage {
        items,
        total_results,
    })
}

fn parse_kind(value: Option<String>) -> Option<ContentKind> {
    let value = present(value)?;
    match value.parse() {
        Ok(kind) => Some(kind),
        Err(_) => {
            debug!(kind = %value, "Unrecognized content kind");
            None
        }
    }
}

/// "18 Jul 2008" -> 2008-07-18.
fn parse_release_date(value: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(value, "%d %b %Y") {
        Ok(date) => Some(date),
        Err(_) => {
            debug!(released = %value, "Unparseable release date");
            None
        }
    }
}

/// "152 min" -> 152.
fn parse_runtime(value: &str) -> Option<u32> {
    value.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(body: Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            body: body.to_string(),
        }
    }

    fn dark_knight() -> Value {
        json!({
            "Title": "The Dark Knight",
            "Year": "2008",
            "Rated": "PG-13",
            "Released": "18 Jul 2008",
            "Runtime": "152 min",
            "Genre": "Action, Crime, Drama",
            "Director": "Christopher Nolan",
            "Writer": "Jonathan Nolan, Christopher Nolan",
            "Actors": "Christian Bale, Heath Ledger, Aaron Eckhart",
            "Plot": "Batman faces the Joker.",
            "Language": "English, Mandarin",
            "Country": "United States, United Kingdom",
            "Awards": "Won 2 Oscars.",
            "Poster": "https://example.org/poster.jpg",
            "Ratings": [
                {"Source": "Internet Movie Database", "Value": "9.0/10"},
                {"Source": "Rotten Tomatoes", "Value": "94%"},
                {"Source": "Metacritic", "Value": "N/A"}
            ],
            "Metascore": "84",
            "imdbRating": "9.0",
            "imdbVotes": "2,900,000",
            "imdbID": "tt0468569",
            "Type": "movie",
            "DVD": "N/A",
            "Response": "True"
        })
    }

    #[test]
    fn test_present_normalizes_sentinel_and_blank() {
        assert_eq!(present(Some("N/A".into())), None);
        assert_eq!(present(Some(" n/a ".into())), None);
        assert_eq!(present(Some("".into())), None);
        assert_eq!(present(Some("   ".into())), None);
        assert_eq!(present(None), None);
        assert_eq!(present(Some(" PG ".into())).as_deref(), Some("PG"));
        assert_eq!(present(Some("R".into())).as_deref(), Some("R"));
    }

    #[test]
    fn test_decode_full_detail() {
        let body = open_envelope(&ok(dark_knight())).unwrap();
        let record = decode_detail(body).unwrap();
        assert_eq!(record.external_id, "tt0468569");
        assert_eq!(record.title, "The Dark Knight");
        assert_eq!(record.year.as_deref(), Some("2008"));
        assert_eq!(record.rated.as_deref(), Some("PG-13"));
        assert_eq!(record.released, NaiveDate::from_ymd_opt(2008, 7, 18));
        assert_eq!(record.runtime_minutes, Some(152));
        assert_eq!(record.metascore, Some(84));
        assert_eq!(record.kind, Some(ContentKind::Movie));
        // The Metacritic pair carried the placeholder and is dropped.
        assert_eq!(record.ratings.len(), 2);
        assert_eq!(record.ratings[1].value, "94%");
        assert_eq!(record.genres(), vec!["Action", "Crime", "Drama"]);
    }

    #[test]
    fn test_rated_sentinel_decodes_to_absent() {
        let mut body = dark_knight();
        body["Rated"] = json!("N/A");
        body["Awards"] = json!("");
        body["Metascore"] = json!("N/A");
        body["Runtime"] = json!("N/A");
        let record = decode_detail(open_envelope(&ok(body)).unwrap()).unwrap();
        assert!(record.rated.is_none());
        assert!(record.awards.is_none());
        assert!(record.metascore.is_none());
        assert!(record.runtime_minutes.is_none());

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("N/A"));
    }

    #[test]
    fn test_detail_without_id_is_decoding_error() {
        let mut body = dark_knight();
        body["imdbID"] = json!("N/A");
        let err = decode_detail(body).unwrap_err();
        assert!(matches!(err, ProviderError::Decoding(_)));
    }

    #[test]
    fn test_detail_with_wrong_shape_is_decoding_error() {
        let mut body = dark_knight();
        body["Ratings"] = json!("not a list");
        let err = decode_detail(body).unwrap_err();
        assert!(matches!(err, ProviderError::Decoding(_)));
    }

    #[test]
    fn test_unparseable_release_date_is_absent() {
        let mut body = dark_knight();
        body["Released"] = json!("sometime in 2008");
        let record = decode_detail(body).unwrap();
        assert!(record.released.is_none());
    }

    #[test]
    fn test_decode_search_page() {
        let body = json!({
            "Search": [
                {"Title": "Batman Begins", "Year": "2005", "imdbID": "tt0372784", "Type": "movie", "Poster": "N/A"},
                {"Title": "Batman", "Year": "1989", "imdbID": "tt0096895", "Type": "movie", "Poster": "https://example.org/b.jpg"},
                {"Title": "Broken", "Year": "1990", "imdbID": "N/A", "Type": "movie", "Poster": "N/A"}
            ],
            "totalResults": "512",
            "Response": "True"
        });
        let page = decode_search(open_envelope(&ok(body)).unwrap()).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_results, 512);
        assert!(page.items[0].poster.is_none());
        assert_eq!(page.items[1].external_id, "tt0096895");
    }

    #[test]
    fn test_search_without_results_array_is_decoding_error() {
        let body = json!({"Response": "True", "totalResults": "3"});
        let err = decode_search(body).unwrap_err();
        assert!(matches!(err, ProviderError::Decoding(_)));
    }

    #[test]
    fn test_envelope_failure_is_classified() {
        let response = HttpResponse {
            status: 401,
            body: json!({"Response": "False", "Error": "Invalid API key!"}).to_string(),
        };
        assert!(matches!(
            open_envelope(&response).unwrap_err(),
            ProviderError::InvalidCredentials
        ));

        let response = ok(json!({"Response": "False", "Error": "Movie not found!"}));
        assert!(matches!(
            open_envelope(&response).unwrap_err(),
            ProviderError::NotFound
        ));
    }

    #[test]
    fn test_envelope_contract_violations() {
        let missing_flag = ok(json!({"Title": "x"}));
        assert!(matches!(
            open_envelope(&missing_flag).unwrap_err(),
            ProviderError::MalformedResponse(_)
        ));

        let odd_flag = ok(json!({"Response": "Maybe"}));
        assert!(matches!(
            open_envelope(&odd_flag).unwrap_err(),
            ProviderError::MalformedResponse(_)
        ));

        let silent_failure = ok(json!({"Response": "False"}));
        assert!(matches!(
            open_envelope(&silent_failure).unwrap_err(),
            ProviderError::MalformedResponse(_)
        ));

        let not_json = HttpResponse {
            status: 200,
            body: "<html>oops</html>".to_string(),
        };
        assert!(matches!(
            open_envelope(&not_json).unwrap_err(),
            ProviderError::MalformedResponse(_)
        ));
    }

    #[test]
    fn test_non_json_error_status_is_transport() {
        let response = HttpResponse {
            status: 503,
            body: "Service Unavailable".to_string(),
        };
        let err = open_envelope(&response).unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
        assert!(err.to_string().contains("503"));
    }
}
