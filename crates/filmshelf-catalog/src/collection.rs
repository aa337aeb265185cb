//! User collection service.
//!
//! Entries reference titles by external id only. Display metadata is always
//! resolved through the [`CacheOrchestrator`](crate::CacheOrchestrator), so
//! nothing here ever writes a metadata field onto an entry.
//!
//! Every mutation republishes the full entry list on a watch channel and is
//! forwarded to the configured [`SyncProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use filmshelf_core::error::FilmshelfError;
use filmshelf_core::types::{is_valid_rating, CollectionEntry, EntrySeed};
use filmshelf_storage::CollectionRepository;

use crate::error::CatalogError;
use crate::orchestrator::CacheOrchestrator;
use crate::sync::{EntryChange, LocalOnlySync, SyncProvider, SyncStatus};

/// Pre-fetches metadata for newly added titles.
#[async_trait]
pub trait MetadataWarmer: Send + Sync {
    async fn warm(&self, external_id: &str) -> Result<(), CatalogError>;
}

#[async_trait]
impl MetadataWarmer for CacheOrchestrator {
    async fn warm(&self, external_id: &str) -> Result<(), CatalogError> {
        self.resolve_by_id(external_id).await.map(|_| ())
    }
}

pub struct CollectionStore {
    repo: CollectionRepository,
    warmer: Option<Arc<dyn MetadataWarmer>>,
    sync: Arc<dyn SyncProvider>,
    view: watch::Sender<Vec<CollectionEntry>>,
}

impl CollectionStore {
    /// Open the store and load the current entry list.
    pub fn new(repo: CollectionRepository) -> Result<Self, CatalogError> {
        let entries = repo.list(None)?;
        let (view, _) = watch::channel(entries);
        Ok(Self {
            repo,
            warmer: None,
            sync: Arc::new(LocalOnlySync),
            view,
        })
    }

    pub fn with_warmer(mut self, warmer: Arc<dyn MetadataWarmer>) -> Self {
        self.warmer = Some(warmer);
        self
    }

    pub fn with_sync(mut self, sync: Arc<dyn SyncProvider>) -> Self {
        self.sync = sync;
        self
    }

    /// Observe the entry list. The receiver sees every committed change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<CollectionEntry>> {
        self.view.subscribe()
    }

    /// The most recently published entry list.
    pub fn snapshot(&self) -> Vec<CollectionEntry> {
        self.view.borrow().clone()
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.sync.status().await
    }

    /// Add a title to the collection.
    ///
    /// Fails with [`CatalogError::AlreadyExists`] if the title is already
    /// present. Metadata warming runs afterwards and never fails the add.
    pub async fn add(
        &self,
        external_id: &str,
        seed: Option<EntrySeed>,
    ) -> Result<CollectionEntry, CatalogError> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(FilmshelfError::Validation("External id must not be empty".into()).into());
        }
        if self.repo.exists(external_id)? {
            return Err(CatalogError::AlreadyExists(external_id.to_string()));
        }

        let mut entry = CollectionEntry::new(external_id);
        if let Some(seed) = seed {
            if let Some(rating) = seed.rating {
                check_rating(rating)?;
            }
            entry.rating = seed.rating;
            entry.audience = seed.audience;
            entry.notes = non_blank(seed.notes);
            entry.recommended_by = non_blank(seed.recommended_by);
        }

        self.repo.insert(&entry).map_err(|e| match e {
            FilmshelfError::Duplicate(id) => CatalogError::AlreadyExists(id),
            other => CatalogError::Storage(other),
        })?;
        info!(external_id, id = %entry.id, "Added collection entry");

        self.publish();
        self.push(EntryChange::Upserted(entry.clone())).await;

        if let Some(warmer) = &self.warmer {
            if let Err(e) = warmer.warm(external_id).await {
                warn!(external_id, error = %e, "Metadata warm-up failed");
            }
        }
        Ok(entry)
    }

    /// Persist the user-editable fields of `entry`.
    ///
    /// Clearing `watched` also clears `date_watched`.
    pub async fn update(&self, entry: &CollectionEntry) -> Result<CollectionEntry, CatalogError> {
        let mut entry = entry.clone();
        validate_entry(&mut entry)?;
        entry.modified_at = Utc::now().trunc_subsecs(0);

        if !self.repo.update(&entry)? {
            return Err(CatalogError::EntryNotFound(entry.external_id));
        }
        let stored = self
            .repo
            .find_by_id(entry.id)?
            .ok_or_else(|| CatalogError::EntryNotFound(entry.external_id.clone()))?;
        debug!(external_id = %stored.external_id, "Updated collection entry");

        self.publish();
        self.push(EntryChange::Upserted(stored.clone())).await;
        Ok(stored)
    }

    /// Remove an entry. Cached metadata for the title is left alone.
    pub async fn delete(&self, entry: &CollectionEntry) -> Result<(), CatalogError> {
        if !self.repo.delete(entry.id)? {
            return Err(CatalogError::EntryNotFound(entry.external_id.clone()));
        }
        info!(external_id = %entry.external_id, "Removed collection entry");

        self.publish();
        self.push(EntryChange::Deleted {
            id: entry.id,
            external_id: entry.external_id.clone(),
        })
        .await;
        Ok(())
    }

    pub async fn get(&self, external_id: &str) -> Result<Option<CollectionEntry>, CatalogError> {
        Ok(self.repo.find_by_external_id(external_id.trim())?)
    }

    pub async fn exists(&self, external_id: &str) -> Result<bool, CatalogError> {
        Ok(self.repo.exists(external_id.trim())?)
    }

    pub async fn list_all(&self) -> Result<Vec<CollectionEntry>, CatalogError> {
        Ok(self.repo.list(None)?)
    }

    pub async fn list_watched(&self) -> Result<Vec<CollectionEntry>, CatalogError> {
        Ok(self.repo.list(Some(true))?)
    }

    pub async fn list_unwatched(&self) -> Result<Vec<CollectionEntry>, CatalogError> {
        Ok(self.repo.list(Some(false))?)
    }

    pub async fn count(&self) -> Result<u64, CatalogError> {
        Ok(self.repo.count()?)
    }

    /// Mark an entry watched, on `date` or now.
    pub async fn mark_watched(
        &self,
        entry: &CollectionEntry,
        date: Option<DateTime<Utc>>,
    ) -> Result<CollectionEntry, CatalogError> {
        let date = date.unwrap_or_else(Utc::now).trunc_subsecs(0);
        if date > Utc::now() {
            return Err(CatalogError::InvalidWatchDate);
        }
        let mut entry = entry.clone();
        entry.watched = true;
        entry.date_watched = Some(date);
        self.update(&entry).await
    }

    pub async fn mark_unwatched(
        &self,
        entry: &CollectionEntry,
    ) -> Result<CollectionEntry, CatalogError> {
        let mut entry = entry.clone();
        entry.watched = false;
        entry.date_watched = None;
        self.update(&entry).await
    }

    /// Set the user rating, 0 to 10 inclusive.
    pub async fn rate(
        &self,
        entry: &CollectionEntry,
        value: f64,
    ) -> Result<CollectionEntry, CatalogError> {
        check_rating(value)?;
        let mut entry = entry.clone();
        entry.rating = Some(value);
        self.update(&entry).await
    }

    pub async fn clear_rating(
        &self,
        entry: &CollectionEntry,
    ) -> Result<CollectionEntry, CatalogError> {
        let mut entry = entry.clone();
        entry.rating = None;
        self.update(&entry).await
    }

    /// Merge remote entries into the local collection.
    ///
    /// Unknown titles are inserted. Known titles take the remote fields when
    /// the remote copy was modified later. Returns how many entries changed.
    pub async fn pull_remote(&self) -> Result<usize, CatalogError> {
        let remote = self.sync.pull().await?;
        let mut applied = 0;
        let result = self.merge_remote(remote, &mut applied);

        if applied > 0 {
            info!(applied, "Merged remote collection entries");
            self.publish();
        }
        result.map(|()| applied)
    }

    fn merge_remote(
        &self,
        remote: Vec<CollectionEntry>,
        applied: &mut usize,
    ) -> Result<(), CatalogError> {
        for mut incoming in remote {
            if let Err(e) = validate_entry(&mut incoming) {
                warn!(external_id = %incoming.external_id, error = %e, "Skipping invalid remote entry");
                continue;
            }

            match self.repo.find_by_external_id(&incoming.external_id)? {
                None => match self.repo.insert(&incoming) {
                    Ok(()) => *applied += 1,
                    Err(FilmshelfError::Duplicate(id)) => {
                        warn!(external_id = %id, "Remote entry collides with a local one, skipping");
                    }
                    Err(e) => return Err(e.into()),
                },
                Some(local) if incoming.modified_at > local.modified_at => {
                    let merged = CollectionEntry {
                        id: local.id,
                        external_id: local.external_id,
                        date_added: local.date_added,
                        ..incoming
                    };
                    if self.repo.update(&merged)? {
                        *applied += 1;
                    }
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn publish(&self) {
        match self.repo.list(None) {
            Ok(entries) => {
                self.view.send_replace(entries);
            }
            Err(e) => warn!(error = %e, "Failed to refresh collection view"),
        }
    }

    async fn push(&self, change: EntryChange) {
        let external_id = change.external_id().to_string();
        match self.sync.push(std::slice::from_ref(&change)).await {
            Ok(SyncStatus::Conflict { external_ids }) => {
                warn!(?external_ids, "Remote reports conflicting edits");
            }
            Ok(status) => debug!(external_id = %external_id, ?status, "Change pushed"),
            Err(e) => warn!(external_id = %external_id, error = %e, "Failed to push change"),
        }
    }
}

/// Normalize an entry and check the invariants every stored entry holds.
///
/// An unwatched entry has no watch date; a watch date is never in the future.
fn validate_entry(entry: &mut CollectionEntry) -> Result<(), CatalogError> {
    entry.external_id = entry.external_id.trim().to_string();
    if entry.external_id.is_empty() {
        return Err(FilmshelfError::Validation("External id must not be empty".into()).into());
    }
    if !entry.watched {
        entry.date_watched = None;
    }
    if let Some(rating) = entry.rating {
        check_rating(rating)?;
    }
    if entry.date_watched.is_some_and(|d| d > Utc::now()) {
        return Err(CatalogError::InvalidWatchDate);
    }
    Ok(())
}

fn check_rating(value: f64) -> Result<(), CatalogError> {
    if is_valid_rating(value) {
        Ok(())
    } else {
        Err(CatalogError::InvalidRating(value))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
