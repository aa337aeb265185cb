//! Filmshelf storage crate - SQLite persistence for metadata and collection.
//!
//! Provides a WAL-mode SQLite database with migrations, the persistent
//! metadata store (SQLite and in-memory backends behind one trait) and the
//! collection entry repository.

pub mod collection;
pub mod db;
pub mod metadata;
pub mod migrations;

pub use collection::CollectionRepository;
pub use db::Database;
pub use metadata::{InMemoryMetadataStore, MetadataStore, SqliteMetadataStore, StoreStats};
