//! HTTP transport seam.
//!
//! The client only needs "GET this URL with these query parameters"; the
//! production implementation is backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::ProviderError;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Non-success HTTP status with a body the client could not interpret.
#[derive(Debug, thiserror::Error)]
#[error("HTTP status {status}")]
pub struct HttpStatusError {
    pub status: u16,
}

/// Issues a single GET request.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<HttpResponse, ProviderError>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<HttpResponse, ProviderError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}
