//! Crossref provider - bibliographic search via the Crossref works API.
//!
//! Queries `GET /works?query=...` and maps each returned item into a
//! [`RawRecord`]. Requests include a `mailto` parameter when configured so
//! traffic lands in Crossref's polite pool.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::http_client::build_provider_http_client;
use super::{ProviderClient, ProviderError, ProviderResult, RECORDS_PER_PROVIDER, RawRecord};

/// Default Crossref API base URL.
const DEFAULT_BASE_URL: &str = "https://api.crossref.org";

// ==================== Crossref API Response Types ====================

#[derive(Debug, Deserialize)]
pub(crate) struct CrossrefResponse {
    pub message: CrossrefMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CrossrefMessage {
    #[serde(default)]
    pub items: Vec<CrossrefWork>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CrossrefWork {
    pub title: Option<Vec<String>>,
    pub author: Option<Vec<CrossrefAuthor>>,
    pub issued: Option<CrossrefDate>,
    /// Uppercase field names in the Crossref response.
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(rename = "URL")]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CrossrefAuthor {
    pub given: Option<String>,
    pub family: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct CrossrefDate {
    pub date_parts: Option<Vec<Vec<Option<i32>>>>,
}

// ==================== CrossrefProvider ====================

/// Searches the Crossref works API.
pub struct CrossrefProvider {
    client: Client,
    base_url: String,
    mailto: Option<String>,
}

impl CrossrefProvider {
    /// Creates a new `CrossrefProvider` against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if HTTP client construction fails.
    pub fn new(mailto: Option<String>) -> Result<Self, ProviderError> {
        Self::build(mailto, DEFAULT_BASE_URL.to_string())
    }

    /// Creates a `CrossrefProvider` with a custom base URL (for testing with
    /// wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if HTTP client construction fails.
    pub fn with_base_url(
        mailto: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Self::build(mailto, base_url.into())
    }

    fn build(mailto: Option<String>, base_url: String) -> Result<Self, ProviderError> {
        let client = build_provider_http_client("crossref")?;
        Ok(Self {
            client,
            base_url,
            mailto,
        })
    }
}

impl std::fmt::Debug for CrossrefProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossrefProvider")
            .field("base_url", &self.base_url)
            .field("mailto", &self.mailto)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderClient for CrossrefProvider {
    fn name(&self) -> &'static str {
        "crossref"
    }

    #[tracing::instrument(skip(self), fields(provider = "crossref"))]
    async fn search(&self, query: &str) -> Result<ProviderResult, ProviderError> {
        let rows = RECORDS_PER_PROVIDER.to_string();
        let mut params: Vec<(&str, &str)> = vec![("query", query), ("rows", &rows)];
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto));
        }

        let url = format!("{}/works", self.base_url);
        debug!(api_url = %url, "Calling Crossref works API");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.name(), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transport(
                self.name(),
                format!("Crossref API returned HTTP {}", status.as_u16()),
            ));
        }

        let body: CrossrefResponse = response.json().await.map_err(|e| {
            ProviderError::unexpected_response(self.name(), format!("invalid JSON payload: {e}"))
        })?;

        let records = body
            .message
            .items
            .into_iter()
            .map(|item| self.map_work(item))
            .collect();

        Ok(ProviderResult {
            source: self.name().to_string(),
            records,
        })
    }
}

impl CrossrefProvider {
    fn map_work(&self, work: CrossrefWork) -> RawRecord {
        let title = work
            .title
            .and_then(|titles| titles.into_iter().next())
            .filter(|t| !t.is_empty());
        let authors = work
            .author
            .unwrap_or_default()
            .into_iter()
            .map(format_author)
            .filter(|name| !name.is_empty())
            .collect();
        let year = extract_year(work.issued.as_ref());

        RawRecord {
            title,
            authors,
            year,
            doi: work.doi,
            url: work.url,
            source: self.name().to_string(),
            score: None,
        }
    }
}

/// Joins given and family name with a space, omitting missing parts.
fn format_author(author: CrossrefAuthor) -> String {
    [author.given, author.family]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_year(date: Option<&CrossrefDate>) -> Option<i32> {
    date.and_then(|d| d.date_parts.as_ref())
        .and_then(|parts| parts.first())
        .and_then(|inner| inner.first())
        .copied()
        .flatten()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn crossref_success_json() -> serde_json::Value {
        serde_json::json!({
            "status": "ok",
            "message": {
                "items": [{
                    "title": ["Sample Research"],
                    "author": [{"given": "Alice", "family": "Smith"}],
                    "issued": {"date-parts": [[2021, 3, 1]]},
                    "DOI": "10.1000/sample",
                    "URL": "https://doi.org/10.1000/sample"
                }]
            }
        })
    }

    #[test]
    fn test_crossref_work_deserialize_uppercase_fields() {
        let work: CrossrefWork = serde_json::from_value(serde_json::json!({
            "title": ["A Paper"],
            "DOI": "10.1234/x",
            "URL": "https://doi.org/10.1234/x"
        }))
        .unwrap();
        assert_eq!(work.doi.unwrap(), "10.1234/x");
        assert_eq!(work.url.unwrap(), "https://doi.org/10.1234/x");
    }

    #[test]
    fn test_format_author_joins_given_and_family() {
        let name = format_author(CrossrefAuthor {
            given: Some("Alice".to_string()),
            family: Some("Smith".to_string()),
        });
        assert_eq!(name, "Alice Smith");
    }

    #[test]
    fn test_format_author_family_only() {
        let name = format_author(CrossrefAuthor {
            given: None,
            family: Some("Consortium".to_string()),
        });
        assert_eq!(name, "Consortium");
    }

    #[test]
    fn test_extract_year_from_date_parts() {
        let date = CrossrefDate {
            date_parts: Some(vec![vec![Some(2021), Some(3)]]),
        };
        assert_eq!(extract_year(Some(&date)), Some(2021));
        assert_eq!(extract_year(None), None);
    }

    #[tokio::test]
    async fn test_crossref_search_maps_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("query", "sample"))
            .and(query_param("rows", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(crossref_success_json()))
            .mount(&server)
            .await;

        let provider = CrossrefProvider::with_base_url(None, server.uri()).unwrap();
        let result = provider.search("sample").await.unwrap();

        assert_eq!(result.source, "crossref");
        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!(record.title.as_deref(), Some("Sample Research"));
        assert_eq!(record.authors, vec!["Alice Smith".to_string()]);
        assert_eq!(record.year, Some(2021));
        assert_eq!(record.doi.as_deref(), Some("10.1000/sample"));
    }

    #[tokio::test]
    async fn test_crossref_search_sends_mailto_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .and(query_param("mailto", "weaver@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(crossref_success_json()))
            .mount(&server)
            .await;

        let provider =
            CrossrefProvider::with_base_url(Some("weaver@example.com".to_string()), server.uri())
                .unwrap();
        // Missing mailto would not match the mock and would surface as HTTP 404.
        let result = provider.search("sample").await.unwrap();
        assert_eq!(result.records.len(), 1);
    }

    #[tokio::test]
    async fn test_crossref_search_empty_items_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "message": {"items": []}
            })))
            .mount(&server)
            .await;

        let provider = CrossrefProvider::with_base_url(None, server.uri()).unwrap();
        let result = provider.search("nothing matches").await.unwrap();
        assert!(result.records.is_empty());
    }

    #[tokio::test]
    async fn test_crossref_search_http_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = CrossrefProvider::with_base_url(None, server.uri()).unwrap();
        let error = provider.search("sample").await.unwrap_err();
        assert!(matches!(error, ProviderError::Transport { .. }));
        assert!(error.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_crossref_search_malformed_json_is_unexpected_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/works"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("not json")
                    .insert_header("content-type", "application/json"),
            )
            .mount(&server)
            .await;

        let provider = CrossrefProvider::with_base_url(None, server.uri()).unwrap();
        let error = provider.search("sample").await.unwrap_err();
        assert!(matches!(error, ProviderError::UnexpectedResponse { .. }));
    }
}
