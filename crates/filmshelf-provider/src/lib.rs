//! Filmshelf provider crate - client for the upstream metadata provider.
//!
//! Builds query-string requests, decodes the provider's JSON envelope,
//! normalizes placeholder values and maps provider error strings onto a
//! closed error taxonomy. Nothing in this crate caches.

pub mod client;
pub mod envelope;
pub mod error;
pub mod query;
pub mod transport;

pub use client::{MetadataProvider, OmdbClient};
pub use error::ProviderError;
pub use query::{SearchQuery, MIN_QUERY_LEN, WILDCARD};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
