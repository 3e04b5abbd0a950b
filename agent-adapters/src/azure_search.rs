//! Azure AI Search client implementing [`DocumentSearch`].

use std::fmt;
use std::time::Duration;

use agent_tools::builtin::{DocumentSearch, SearchError, SearchHit};
use async_trait::async_trait;
use hyper::Uri;
use hyper::header::HeaderName;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http_client::{HyperClient, JsonPost, build_https_client, sanitize_base_url};
use crate::traits::{AdapterError, AdapterResult};

/// Search REST API version.
pub const SEARCH_API_VERSION: &str = "2023-11-01";

const SELECT_FIELDS: &str = "title,content,url";

/// Connection settings for an Azure AI Search index.
#[derive(Clone)]
pub struct AzureSearchConfig {
    endpoint: String,
    index: String,
    api_key: String,
    timeout: Duration,
}

impl fmt::Debug for AzureSearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSearchConfig")
            .field("endpoint", &self.endpoint)
            .field("index", &self.index)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AzureSearchConfig {
    /// Creates settings for `index` on the search service at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the endpoint is not an
    /// http(s) URL or the index name or key is blank.
    pub fn new(
        endpoint: impl AsRef<str>,
        index: impl Into<String>,
        api_key: impl Into<String>,
    ) -> AdapterResult<Self> {
        let index = index.into();
        let api_key = api_key.into();
        if index.trim().is_empty() {
            return Err(AdapterError::configuration("search index name cannot be empty"));
        }
        if api_key.trim().is_empty() {
            return Err(AdapterError::configuration("search API key cannot be empty"));
        }

        Ok(Self {
            endpoint: sanitize_base_url(endpoint.as_ref(), "Azure AI Search")?,
            index,
            api_key,
            timeout: Duration::from_secs(30),
        })
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn search_url(&self) -> String {
        format!(
            "{}indexes/{}/docs/search?api-version={SEARCH_API_VERSION}",
            self.endpoint, self.index
        )
    }
}

/// Client for the documents search endpoint of one index.
pub struct AzureSearchClient {
    client: HyperClient,
    uri: Uri,
    index: String,
    api_key: String,
    timeout: Duration,
}

impl fmt::Debug for AzureSearchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureSearchClient")
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

impl AzureSearchClient {
    /// Creates a client for the configured index.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] if the search URL is invalid.
    pub fn new(config: AzureSearchConfig) -> AdapterResult<Self> {
        let uri = config.search_url().parse::<Uri>().map_err(|err| {
            AdapterError::configuration(format!("invalid search endpoint: {err}"))
        })?;

        Ok(Self {
            client: build_https_client()?,
            uri,
            index: config.index,
            api_key: config.api_key,
            timeout: config.timeout,
        })
    }

    /// Runs a full-text query against the index.
    ///
    /// # Errors
    ///
    /// Returns an [`AdapterError`] when the request fails or the response
    /// cannot be decoded.
    pub async fn query(&self, query: &str, top: usize) -> AdapterResult<Vec<SearchHit>> {
        let body = serde_json::to_vec(&SearchRequest {
            search: query,
            top,
            select: SELECT_FIELDS,
        })
        .map_err(|err| AdapterError::invalid_request(format!("failed to encode search: {err}")))?;

        debug!(index = %self.index, top, "querying search index");

        let bytes = JsonPost {
            client: &self.client,
            uri: &self.uri,
            auth: (HeaderName::from_static("api-key"), &self.api_key),
            timeout: self.timeout,
            service: "Azure AI Search",
        }
        .send(body)
        .await?;

        let response: SearchResponse = serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::response(format!("failed to decode search response: {err}"))
        })?;
        Ok(response.value)
    }
}

#[async_trait]
impl DocumentSearch for AzureSearchClient {
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>, SearchError> {
        self.query(query, top)
            .await
            .map_err(|err| SearchError::Backend(err.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    search: &'a str,
    top: usize,
    select: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>,
}
