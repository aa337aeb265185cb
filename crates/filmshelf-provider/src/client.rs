//! Upstream metadata client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use filmshelf_core::config::ProviderConfig;
use filmshelf_core::types::{MetadataRecord, SearchPage};

use crate::envelope::{decode_detail, decode_search, open_envelope};
use crate::error::ProviderError;
use crate::query::SearchQuery;
use crate::transport::{HttpTransport, ReqwestTransport};

/// Source of metadata records and search results.
///
/// Implemented by [`OmdbClient`]; the cache layer depends only on this trait.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Search titles. Queries too short to send yield an empty page.
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, ProviderError>;

    /// Fetch the full record for an external id.
    async fn fetch_by_id(&self, external_id: &str) -> Result<MetadataRecord, ProviderError>;

    /// Fetch the full record for the best title match.
    async fn fetch_by_title(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<MetadataRecord, ProviderError>;
}

/// Client for an OMDb-style query-string API.
pub struct OmdbClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    api_key: String,
    full_plot: bool,
}

impl OmdbClient {
    /// Build a client backed by `reqwest` from configuration.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let transport = ReqwestTransport::new(
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )?;
        Ok(Self::with_transport(
            Arc::new(transport),
            config.base_url.clone(),
            config.api_key.clone(),
        )
        .full_plot(config.full_plot))
    }

    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            api_key: api_key.into(),
            full_plot: false,
        }
    }

    /// Request the long plot on detail lookups.
    pub fn full_plot(mut self, enabled: bool) -> Self {
        self.full_plot = enabled;
        self
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        vec![("apikey", self.api_key.clone()), ("r", "json".to_string())]
    }

    async fn request(
        &self,
        params: Vec<(&'static str, String)>,
    ) -> Result<serde_json::Value, ProviderError> {
        debug!(url = %self.base_url, params = %redacted(&params), "Provider request");
        let response = self.transport.get(&self.base_url, &params).await?;
        open_envelope(&response)
    }
}

/// Render query parameters for logs with the access key masked.
fn redacted(params: &[(&'static str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| {
            if *k == "apikey" {
                format!("{}=***", k)
            } else {
                format!("{}={}", k, v)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[async_trait]
impl MetadataProvider for OmdbClient {
    #[instrument(skip(self), fields(text = %query.text, page = query.page))]
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, ProviderError> {
        let Some(text) = query.upstream_text() else {
            debug!("Query too short, not sent");
            return Ok(SearchPage::empty());
        };

        let mut params = self.base_params();
        params.push(("s", text));
        params.push(("page", query.page.max(1).to_string()));
        if let Some(year) = query.year {
            params.push(("y", year.to_string()));
        }
        if let Some(kind) = query.kind {
            params.push(("type", kind.as_str().to_string()));
        }

        let body = self.request(params).await?;
        decode_search(body)
    }

    #[instrument(skip(self))]
    async fn fetch_by_id(&self, external_id: &str) -> Result<MetadataRecord, ProviderError> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(ProviderError::NotFound);
        }

        let mut params = self.base_params();
        params.push(("i", external_id.to_string()));
        if self.full_plot {
            params.push(("plot", "full".to_string()));
        }

        let body = self.request(params).await?;
        decode_detail(body)
    }

    #[instrument(skip(self))]
    async fn fetch_by_title(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<MetadataRecord, ProviderError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ProviderError::NotFound);
        }

        let mut params = self.base_params();
        params.push(("t", title.to_string()));
        if let Some(year) = year {
            params.push(("y", year.to_string()));
        }
        if self.full_plot {
            params.push(("plot", "full".to_string()));
        }

        let body = self.request(params).await?;
        decode_detail(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use filmshelf_core::types::ContentKind;
    use serde_json::json;

    use crate::transport::HttpResponse;

    /// Records every request and replays canned responses in order.
    #[derive(Default)]
    struct FakeTransport {
        requests: Mutex<Vec<Vec<(&'static str, String)>>>,
        responses: Mutex<VecDeque<Result<HttpResponse, ProviderError>>>,
    }

    impl FakeTransport {
        fn replying(bodies: Vec<serde_json::Value>) -> Arc<Self> {
            let fake = FakeTransport::default();
            {
                let mut responses = fake.responses.lock().unwrap();
                for body in bodies {
                    responses.push_back(Ok(HttpResponse {
                        status: 200,
                        body: body.to_string(),
                    }));
                }
            }
            Arc::new(fake)
        }

        fn failing(err: ProviderError) -> Arc<Self> {
            let fake = FakeTransport::default();
            fake.responses.lock().unwrap().push_back(Err(err));
            Arc::new(fake)
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn param(&self, index: usize, key: &str) -> Option<String> {
            self.requests.lock().unwrap()[index]
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn get(
            &self,
            _url: &str,
            query: &[(&'static str, String)],
        ) -> Result<HttpResponse, ProviderError> {
            self.requests.lock().unwrap().push(query.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Other("no canned response".into())))
        }
    }

    fn client(transport: Arc<FakeTransport>) -> OmdbClient {
        OmdbClient::with_transport(transport, "https://omdb.test/", "secret-key")
    }

    fn search_body() -> serde_json::Value {
        json!({
            "Search": [
                {"Title": "Batman", "Year": "1989", "imdbID": "tt0096895", "Type": "movie", "Poster": "N/A"}
            ],
            "totalResults": "1",
            "Response": "True"
        })
    }

    fn detail_body(id: &str) -> serde_json::Value {
        json!({
            "Title": "The Dark Knight",
            "Year": "2008",
            "Rated": "N/A",
            "imdbID": id,
            "Type": "movie",
            "Response": "True"
        })
    }

    #[tokio::test]
    async fn test_search_appends_wildcard() {
        let transport = FakeTransport::replying(vec![search_body()]);
        let page = client(transport.clone())
            .search(&SearchQuery::new("bat"))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(transport.param(0, "s").as_deref(), Some("bat*"));
        assert_eq!(transport.param(0, "r").as_deref(), Some("json"));
        assert_eq!(transport.param(0, "page").as_deref(), Some("1"));
        assert_eq!(transport.param(0, "apikey").as_deref(), Some("secret-key"));
    }

    #[tokio::test]
    async fn test_search_keeps_existing_wildcard() {
        let transport = FakeTransport::replying(vec![search_body()]);
        client(transport.clone())
            .search(&SearchQuery::new("bat*"))
            .await
            .unwrap();
        assert_eq!(transport.param(0, "s").as_deref(), Some("bat*"));
    }

    #[tokio::test]
    async fn test_short_search_makes_no_request() {
        let transport = FakeTransport::replying(vec![]);
        let page = client(transport.clone())
            .search(&SearchQuery::new("ba"))
            .await
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_results, 0);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_search_optional_filters() {
        let transport = FakeTransport::replying(vec![search_body()]);
        let query = SearchQuery::new("alien")
            .with_year(1979)
            .with_kind(ContentKind::Series)
            .with_page(3);
        client(transport.clone()).search(&query).await.unwrap();
        assert_eq!(transport.param(0, "y").as_deref(), Some("1979"));
        assert_eq!(transport.param(0, "type").as_deref(), Some("series"));
        assert_eq!(transport.param(0, "page").as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_search_without_filters_omits_them() {
        let transport = FakeTransport::replying(vec![search_body()]);
        client(transport.clone())
            .search(&SearchQuery::new("alien"))
            .await
            .unwrap();
        assert!(transport.param(0, "y").is_none());
        assert!(transport.param(0, "type").is_none());
    }

    #[tokio::test]
    async fn test_search_not_found_surfaces_as_error() {
        let transport = FakeTransport::replying(vec![
            json!({"Response": "False", "Error": "Movie not found!"}),
        ]);
        let err = client(transport)
            .search(&SearchQuery::new("zzzzqx"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound));
    }

    #[tokio::test]
    async fn test_fetch_by_id_params_and_normalization() {
        let transport = FakeTransport::replying(vec![detail_body("tt0468569")]);
        let record = client(transport.clone())
            .fetch_by_id("tt0468569")
            .await
            .unwrap();
        assert_eq!(record.external_id, "tt0468569");
        assert!(record.rated.is_none());
        assert_eq!(transport.param(0, "i").as_deref(), Some("tt0468569"));
        assert!(transport.param(0, "plot").is_none());
    }

    #[tokio::test]
    async fn test_fetch_by_id_full_plot() {
        let transport = FakeTransport::replying(vec![detail_body("tt1")]);
        client(transport.clone())
            .full_plot(true)
            .fetch_by_id("tt1")
            .await
            .unwrap();
        assert_eq!(transport.param(0, "plot").as_deref(), Some("full"));
    }

    #[tokio::test]
    async fn test_fetch_blank_id_makes_no_request() {
        let transport = FakeTransport::replying(vec![]);
        let err = client(transport.clone()).fetch_by_id("  ").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_by_title_params() {
        let transport = FakeTransport::replying(vec![detail_body("tt0468569")]);
        let record = client(transport.clone())
            .fetch_by_title("The Dark Knight", Some(2008))
            .await
            .unwrap();
        assert_eq!(record.title, "The Dark Knight");
        assert_eq!(transport.param(0, "t").as_deref(), Some("The Dark Knight"));
        assert_eq!(transport.param(0, "y").as_deref(), Some("2008"));
    }

    #[tokio::test]
    async fn test_error_strings_are_mapped() {
        let transport = FakeTransport::replying(vec![
            json!({"Response": "False", "Error": "Request limit reached!"}),
        ]);
        let err = client(transport).fetch_by_id("tt1").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));

        let transport = FakeTransport::replying(vec![
            json!({"Response": "False", "Error": "Invalid API key!"}),
        ]);
        let err = client(transport).fetch_by_id("tt1").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidCredentials));

        let transport = FakeTransport::replying(vec![
            json!({"Response": "False", "Error": "Something went wrong."}),
        ]);
        let err = client(transport).fetch_by_id("tt1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Other(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let transport = FakeTransport::failing(ProviderError::Transport(Box::new(
            std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"),
        )));
        let err = client(transport).fetch_by_id("tt1").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_redacted_hides_key() {
        let params = vec![("apikey", "secret".to_string()), ("i", "tt1".to_string())];
        let rendered = redacted(&params);
        assert_eq!(rendered, "apikey=***&i=tt1");
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_from_config_builds() {
        let config = ProviderConfig::default();
        assert!(OmdbClient::from_config(&config).is_ok());
    }
}
