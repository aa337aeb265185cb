//! Error types for the catalog layer.

use filmshelf_core::error::FilmshelfError;
use filmshelf_provider::ProviderError;

/// Errors from metadata resolution and collection management.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Storage(#[from] FilmshelfError),
    #[error("Collection entry already exists for {0}")]
    AlreadyExists(String),
    #[error("No collection entry for {0}")]
    EntryNotFound(String),
    #[error("Rating {0} is outside the range 0 to 10")]
    InvalidRating(f64),
    #[error("Watch date must not be in the future")]
    InvalidWatchDate,
    #[error("Sync error: {0}")]
    Sync(String),
}
