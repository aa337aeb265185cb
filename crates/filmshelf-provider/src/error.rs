//! Error taxonomy for upstream provider calls.

use thiserror::Error;

/// Boxed lower-level cause of a transport failure.
pub type TransportSource = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the upstream client.
///
/// The provider has no stable error codes, so failure messages are mapped
/// onto these variants by substring matching (see [`ProviderError::classify`]).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rejected the access key")]
    InvalidCredentials,

    #[error("no matching title")]
    NotFound,

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("transport failure: {0}")]
    Transport(#[source] TransportSource),

    #[error("provider request limit reached")]
    RateLimited,

    #[error("failed to decode provider payload: {0}")]
    Decoding(String),

    #[error("provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Map a provider failure message onto the taxonomy.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("api key") {
            ProviderError::InvalidCredentials
        } else if lower.contains("limit reached") || lower.contains("request limit") {
            ProviderError::RateLimited
        } else if lower.contains("not found") || lower.contains("incorrect imdb id") {
            ProviderError::NotFound
        } else {
            ProviderError::Other(message.trim().to_string())
        }
    }

    /// Whether repeating the same request may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }

    /// Whether a cached copy may stand in for a failed refresh.
    pub fn allows_stale_fallback(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_) | ProviderError::RateLimited
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(Box::new(err))
    }
}
