//! Remote synchronization of collection entries.
//!
//! The collection store reports every local change to a [`SyncProvider`]
//! and can pull remote entries back in. Builds without a sync backend use
//! [`LocalOnlySync`], which keeps everything on this device.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use filmshelf_core::types::CollectionEntry;

use crate::error::CatalogError;

/// A local mutation to forward to the remote side.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum EntryChange {
    Upserted(CollectionEntry),
    Deleted { id: Uuid, external_id: String },
}

impl EntryChange {
    pub fn external_id(&self) -> &str {
        match self {
            EntryChange::Upserted(entry) => &entry.external_id,
            EntryChange::Deleted { external_id, .. } => external_id,
        }
    }
}

/// Observable sync state.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    /// No remote backend is configured.
    LocalOnly,
    Synced { at: DateTime<Utc> },
    /// The remote is unreachable; changes stay local.
    Offline,
    /// The remote holds newer edits for these titles.
    Conflict { external_ids: Vec<String> },
}

#[async_trait]
pub trait SyncProvider: Send + Sync {
    async fn push(&self, changes: &[EntryChange]) -> Result<SyncStatus, CatalogError>;

    /// Fetch the remote copy of every entry.
    async fn pull(&self) -> Result<Vec<CollectionEntry>, CatalogError>;

    async fn status(&self) -> SyncStatus;
}

/// Sync backend that never leaves the device.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnlySync;

#[async_trait]
impl SyncProvider for LocalOnlySync {
    async fn push(&self, _changes: &[EntryChange]) -> Result<SyncStatus, CatalogError> {
        Ok(SyncStatus::LocalOnly)
    }

    async fn pull(&self) -> Result<Vec<CollectionEntry>, CatalogError> {
        Ok(Vec::new())
    }

    async fn status(&self) -> SyncStatus {
        SyncStatus::LocalOnly
    }
}
