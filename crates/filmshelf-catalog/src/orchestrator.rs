//! Cache-first metadata resolution.
//!
//! A by-id request walks the tiers in a fixed order:
//!
//! 1. persistent store, if the record is fresh
//! 2. session cache
//! 3. upstream provider, writing the result back to both tiers
//!
//! Title lookups and searches have no persistent key, so they consult the
//! session cache before going upstream. Concurrent by-id misses for the same
//! title share a single upstream request when `coalesce_requests` is set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex as FlightLock;
use tracing::{debug, info, warn};

use filmshelf_core::config::CacheConfig;
use filmshelf_core::types::{MetadataRecord, SearchPage};
use filmshelf_provider::{MetadataProvider, ProviderError, SearchQuery};
use filmshelf_storage::MetadataStore;

use crate::error::CatalogError;
use crate::session::{SessionCache, SessionKey, SessionValue};

/// Where a resolved record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveSource {
    Persistent,
    Session,
    Remote,
    /// A stale persistent copy served because the refresh failed.
    Stale,
}

/// A record together with the tier that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    pub record: MetadataRecord,
    pub source: ResolveSource,
}

#[derive(Clone, Copy, Debug)]
enum Stage {
    NotStarted,
    CheckingPersistent,
    CheckingSession,
    FetchingRemote,
    CachingThenDone,
    Done,
    DoneWithError,
}

fn enter(external_id: &str, stage: Stage) {
    debug!(external_id, stage = ?stage, "resolve");
}

/// Coordinates the persistent store, the session cache and the provider.
pub struct CacheOrchestrator {
    store: Arc<dyn MetadataStore>,
    provider: Arc<dyn MetadataProvider>,
    session: SessionCache,
    freshness_days: i64,
    coalesce: bool,
    serve_stale_on_error: bool,
    flights: Mutex<HashMap<String, Arc<FlightLock<()>>>>,
}

impl CacheOrchestrator {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        provider: Arc<dyn MetadataProvider>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            store,
            provider,
            session: SessionCache::with_capacity(config.session_capacity),
            freshness_days: config.freshness_days,
            coalesce: config.coalesce_requests,
            serve_stale_on_error: config.serve_stale_on_error,
            flights: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    pub fn session(&self) -> &SessionCache {
        &self.session
    }

    /// Resolve full metadata for an external id.
    pub async fn resolve_by_id(&self, external_id: &str) -> Result<MetadataRecord, CatalogError> {
        self.resolve_by_id_traced(external_id)
            .await
            .map(|resolved| resolved.record)
    }

    /// Like [`resolve_by_id`](Self::resolve_by_id), also reporting the tier
    /// that answered.
    pub async fn resolve_by_id_traced(&self, external_id: &str) -> Result<Resolved, CatalogError> {
        let external_id = external_id.trim();
        enter(external_id, Stage::NotStarted);

        let stale = match self.cached(external_id).await {
            Ok(resolved) => return Ok(resolved),
            Err(stale) => stale,
        };

        enter(external_id, Stage::FetchingRemote);
        let result = if self.coalesce {
            self.fetch_coalesced(external_id).await
        } else {
            self.fetch_and_cache(external_id).await.map(|record| Resolved {
                record,
                source: ResolveSource::Remote,
            })
        };

        match result {
            Ok(resolved) => {
                enter(external_id, Stage::Done);
                Ok(resolved)
            }
            Err(CatalogError::Provider(err)) => {
                if let Some(record) = stale {
                    if self.serve_stale_on_error && err.allows_stale_fallback() {
                        warn!(external_id, error = %err, "Refresh failed, serving stale record");
                        enter(external_id, Stage::Done);
                        return Ok(Resolved {
                            record,
                            source: ResolveSource::Stale,
                        });
                    }
                }
                enter(external_id, Stage::DoneWithError);
                Err(CatalogError::Provider(err))
            }
            Err(other) => {
                enter(external_id, Stage::DoneWithError);
                Err(other)
            }
        }
    }

    /// Check the local tiers. On a miss, returns any stale persistent copy.
    async fn cached(&self, external_id: &str) -> Result<Resolved, Option<MetadataRecord>> {
        enter(external_id, Stage::CheckingPersistent);
        let stale = match self.store.get(external_id).await {
            Some(record) if !record.is_stale_at(Utc::now(), self.freshness_days) => {
                enter(external_id, Stage::Done);
                return Ok(Resolved {
                    record,
                    source: ResolveSource::Persistent,
                });
            }
            Some(record) => {
                debug!(external_id, last_fetched = %record.last_fetched, "Persistent record is stale");
                Some(record)
            }
            None => None,
        };

        enter(external_id, Stage::CheckingSession);
        if let Some(record) = self.session.get_record(&SessionKey::detail(external_id)) {
            enter(external_id, Stage::Done);
            return Ok(Resolved {
                record,
                source: ResolveSource::Session,
            });
        }

        Err(stale)
    }

    async fn fetch_coalesced(&self, external_id: &str) -> Result<Resolved, CatalogError> {
        let lock = self.flight_lock(external_id);
        let guard = Arc::clone(&lock).lock_owned().await;

        // Another caller may have completed the fetch while we waited.
        let result = match self.cached(external_id).await {
            Ok(resolved) => Ok(resolved),
            Err(_) => self.fetch_and_cache(external_id).await.map(|record| Resolved {
                record,
                source: ResolveSource::Remote,
            }),
        };

        drop(guard);
        drop(lock);
        self.finish_flight(external_id);
        result
    }

    fn flight_lock(&self, external_id: &str) -> Arc<FlightLock<()>> {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(flights.entry(external_id.to_string()).or_default())
    }

    fn finish_flight(&self, external_id: &str) {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if flights
            .get(external_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            flights.remove(external_id);
        }
    }

    async fn fetch_and_cache(&self, external_id: &str) -> Result<MetadataRecord, CatalogError> {
        let record = self.provider.fetch_by_id(external_id).await?;
        Ok(self
            .cache_record(record, vec![SessionKey::detail(external_id)])
            .await)
    }

    /// Write a fetched record to the persistent store, then the session
    /// cache under each key. Persistence failures are logged, not returned.
    async fn cache_record(&self, record: MetadataRecord, keys: Vec<SessionKey>) -> MetadataRecord {
        enter(&record.external_id, Stage::CachingThenDone);
        let record = match self.store.put(record.clone()).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(external_id = %record.external_id, error = %e, "Failed to persist metadata");
                record
            }
        };
        for key in keys {
            self.session.put(key, SessionValue::Record(record.clone()));
        }
        record
    }

    /// Resolve full metadata for an exact title, optionally narrowed by year.
    pub async fn resolve_by_title(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<MetadataRecord, CatalogError> {
        let key = SessionKey::title(title, year);
        if let Some(record) = self.session.get_record(&key) {
            debug!(title, ?year, "Title lookup served from session cache");
            return Ok(record);
        }

        let record = self.provider.fetch_by_title(title.trim(), year).await?;
        let detail = SessionKey::detail(&record.external_id);
        Ok(self.cache_record(record, vec![key, detail]).await)
    }

    /// Search titles. Results live in the session cache only.
    ///
    /// A provider "not found" answer is an empty page, not an error.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchPage, CatalogError> {
        let key = SessionKey::Search(query.clone());
        if let Some(page) = self.session.get_page(&key) {
            debug!(text = %query.text, page = query.page, "Search served from session cache");
            return Ok(page);
        }

        let page = match self.provider.search(query).await {
            Ok(page) => page,
            Err(ProviderError::NotFound) => SearchPage::empty(),
            Err(e) => return Err(e.into()),
        };
        self.session.put(key, SessionValue::Page(page.clone()));
        Ok(page)
    }

    /// Re-fetch a record regardless of freshness and overwrite both tiers.
    pub async fn refresh(&self, external_id: &str) -> Result<MetadataRecord, CatalogError> {
        let external_id = external_id.trim();
        info!(external_id, "Refreshing metadata");
        self.fetch_and_cache(external_id).await
    }
}
