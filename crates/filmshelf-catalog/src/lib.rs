//! Filmshelf catalog crate - cache-first metadata retrieval and the user
//! collection service.
//!
//! The [`CacheOrchestrator`] resolves metadata from the persistent store,
//! then the [`SessionCache`], then the upstream provider. The
//! [`CollectionStore`] manages user entries and only ever references
//! metadata by external id.

pub mod collection;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod sync;

pub use collection::{CollectionStore, MetadataWarmer};
pub use error::CatalogError;
pub use orchestrator::{CacheOrchestrator, ResolveSource, Resolved};
pub use session::{SessionCache, SessionKey, SessionValue};
pub use sync::{EntryChange, LocalOnlySync, SyncProvider, SyncStatus};
