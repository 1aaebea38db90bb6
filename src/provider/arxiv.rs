//! arXiv provider - search via the arXiv export API.
//!
//! The export API answers with an Atom feed. Only entry titles are extracted;
//! arXiv records therefore arrive title-only and rely on the resolver merge to
//! pick up richer fields from other indexes.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::http_client::build_provider_http_client;
use super::{ProviderClient, ProviderError, ProviderResult, RECORDS_PER_PROVIDER, RawRecord};

/// Default arXiv export API base URL.
const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/api";

/// Searches the arXiv export API.
pub struct ArxivProvider {
    client: Client,
    base_url: String,
}

impl ArxivProvider {
    /// Creates a new `ArxivProvider` against the public export API.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if HTTP client construction fails.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates an `ArxivProvider` with a custom base URL (configured
    /// deployments and wiremock tests).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if HTTP client construction fails.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = build_provider_http_client("arxiv")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl std::fmt::Debug for ArxivProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArxivProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderClient for ArxivProvider {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    #[tracing::instrument(skip(self), fields(provider = "arxiv"))]
    async fn search(&self, query: &str) -> Result<ProviderResult, ProviderError> {
        let max_results = RECORDS_PER_PROVIDER.to_string();
        let url = format!("{}/query", self.base_url);
        debug!(api_url = %url, "Calling arXiv export API");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("search_query", query),
                ("start", "0"),
                ("max_results", &max_results),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.name(), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transport(
                self.name(),
                format!("arXiv export API returned HTTP {}", status.as_u16()),
            ));
        }

        let feed = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.name(), &e))?;

        let records = extract_entry_titles(&feed)
            .into_iter()
            .map(|title| RawRecord {
                title: Some(title),
                source: self.name().to_string(),
                ..RawRecord::default()
            })
            .collect();

        Ok(ProviderResult {
            source: self.name().to_string(),
            records,
        })
    }
}

/// Pulls trimmed `<title>` contents out of each `<entry>` block.
///
/// Entries without a title tag are skipped rather than failing the search.
fn extract_entry_titles(feed: &str) -> Vec<String> {
    feed.split("<entry>")
        .skip(1)
        .filter_map(|entry| extract_tag(entry, "title"))
        .filter(|title| !title.is_empty())
        .collect()
}

fn extract_tag(fragment: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = fragment.find(&open)? + open.len();
    let end = fragment[start..].find(&close)? + start;
    Some(fragment[start..end].trim().to_string())
}
