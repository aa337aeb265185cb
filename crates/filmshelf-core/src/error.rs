use thiserror::Error;

/// Top-level error type for Filmshelf.
///
/// Subsystem crates define their own error types and implement
/// `From<FilmshelfError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FilmshelfError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

impl From<toml::de::Error> for FilmshelfError {
    fn from(err: toml::de::Error) -> Self {
        FilmshelfError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for FilmshelfError {
    fn from(err: toml::ser::Error) -> Self {
        FilmshelfError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for FilmshelfError {
    fn from(err: serde_json::Error) -> Self {
        FilmshelfError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Filmshelf operations.
pub type Result<T> = std::result::Result<T, FilmshelfError>;
