//! `OpenAlex` provider - bibliographic search via the `OpenAlex` works API.
//!
//! Queries `GET /works?search=...` and maps each result into a [`RawRecord`].
//! The work's `OpenAlex` id doubles as its URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::http_client::build_provider_http_client;
use super::{ProviderClient, ProviderError, ProviderResult, RECORDS_PER_PROVIDER, RawRecord};

/// Default `OpenAlex` API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openalex.org";

// ==================== OpenAlex API Response Types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAlexResponse {
    #[serde(default)]
    pub results: Vec<OpenAlexWork>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAlexWork {
    pub id: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub authorships: Vec<OpenAlexAuthorship>,
    pub publication_year: Option<i32>,
    pub doi: Option<String>,
    pub relevance_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAlexAuthorship {
    pub author: Option<OpenAlexAuthor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAlexAuthor {
    pub display_name: Option<String>,
}

// ==================== OpenAlexProvider ====================

/// Searches the `OpenAlex` works API.
pub struct OpenAlexProvider {
    client: Client,
    base_url: String,
}

impl OpenAlexProvider {
    /// Creates a new `OpenAlexProvider` against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if HTTP client construction fails.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates an `OpenAlexProvider` with a custom base URL (configured
    /// deployments and wiremock tests).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if HTTP client construction fails.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = build_provider_http_client("openalex")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl std::fmt::Debug for OpenAlexProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAlexProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderClient for OpenAlexProvider {
    fn name(&self) -> &'static str {
        "openalex"
    }

    #[tracing::instrument(skip(self), fields(provider = "openalex"))]
    async fn search(&self, query: &str) -> Result<ProviderResult, ProviderError> {
        let per_page = RECORDS_PER_PROVIDER.to_string();
        let url = format!("{}/works", self.base_url);
        debug!(api_url = %url, "Calling OpenAlex works API");

        let response = self
            .client
            .get(&url)
            .query(&[("search", query), ("per-page", &per_page)])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.name(), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transport(
                self.name(),
                format!("OpenAlex API returned HTTP {}", status.as_u16()),
            ));
        }

        let body: OpenAlexResponse = response.json().await.map_err(|e| {
            ProviderError::unexpected_response(self.name(), format!("invalid JSON payload: {e}"))
        })?;

        let records = body
            .results
            .into_iter()
            .map(|work| self.map_work(work))
            .collect();

        Ok(ProviderResult {
            source: self.name().to_string(),
            records,
        })
    }
}

impl OpenAlexProvider {
    fn map_work(&self, work: OpenAlexWork) -> RawRecord {
        let authors = work
            .authorships
            .into_iter()
            .filter_map(|a| a.author.and_then(|author| author.display_name))
            .filter(|name| !name.is_empty())
            .collect();

        RawRecord {
            title: work.title.filter(|t| !t.is_empty()),
            authors,
            year: work.publication_year,
            doi: work.doi,
            url: work.id,
            source: self.name().to_string(),
            score: work.relevance_score,
        }
    }
}
