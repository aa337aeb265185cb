//! Filmshelf core crate - shared domain types, errors and configuration.
//!
//! Metadata records are shared and re-fetchable; collection entries are
//! user-owned and reference metadata by external id only.

pub mod config;
pub mod error;
pub mod types;

pub use config::FilmshelfConfig;
pub use error::{FilmshelfError, Result};
pub use types::*;
