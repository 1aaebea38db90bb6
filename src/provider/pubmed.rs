//! PubMed provider - two-step search via the NCBI E-utilities.
//!
//! `esearch.fcgi` returns matching PMIDs, `esummary.fcgi` returns their
//! summaries. The summary payload is a heterogeneous map keyed by PMID (with
//! a stray `uids` entry), so mapping works on `serde_json::Value` rather than
//! a rigid struct.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::http_client::build_provider_http_client;
use super::{ProviderClient, ProviderError, ProviderResult, RECORDS_PER_PROVIDER, RawRecord};

/// Default NCBI E-utilities base URL.
const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

#[derive(Debug, Deserialize)]
pub(crate) struct EsearchResponse {
    pub esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EsearchResult {
    #[serde(default)]
    pub idlist: Vec<String>,
}

/// Searches PubMed through the NCBI E-utilities.
pub struct PubMedProvider {
    client: Client,
    base_url: String,
}

impl PubMedProvider {
    /// Creates a new `PubMedProvider` against the public E-utilities.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if HTTP client construction fails.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a `PubMedProvider` with a custom base URL (for testing with
    /// wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if HTTP client construction fails.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = build_provider_http_client("pubmed")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn fetch_ids(&self, query: &str) -> Result<Vec<String>, ProviderError> {
        let retmax = RECORDS_PER_PROVIDER.to_string();
        let url = format!("{}/esearch.fcgi", self.base_url);
        debug!(api_url = %url, "Calling PubMed esearch");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("db", "pubmed"),
                ("term", query),
                ("retmode", "json"),
                ("retmax", &retmax),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.name(), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transport(
                self.name(),
                format!("PubMed esearch returned HTTP {}", status.as_u16()),
            ));
        }

        let body: EsearchResponse = response.json().await.map_err(|e| {
            ProviderError::unexpected_response(self.name(), format!("invalid esearch JSON: {e}"))
        })?;
        Ok(body.esearchresult.idlist)
    }

    async fn fetch_summaries(&self, ids: &[String]) -> Result<Value, ProviderError> {
        let joined = ids.join(",");
        let url = format!("{}/esummary.fcgi", self.base_url);
        debug!(api_url = %url, count = ids.len(), "Calling PubMed esummary");

        let response = self
            .client
            .get(&url)
            .query(&[("db", "pubmed"), ("id", &joined), ("retmode", "json")])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.name(), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::transport(
                self.name(),
                format!("PubMed esummary returned HTTP {}", status.as_u16()),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            ProviderError::unexpected_response(self.name(), format!("invalid esummary JSON: {e}"))
        })?;
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    fn map_summary(&self, pmid: &str, item: &Value) -> RawRecord {
        let title = item
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let authors = item
            .get("authors")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let year = item
            .get("pubdate")
            .and_then(Value::as_str)
            .and_then(parse_pubdate_year);
        let doi = item
            .get("elocationid")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        RawRecord {
            title,
            authors,
            year,
            doi,
            url: Some(format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/")),
            source: self.name().to_string(),
            score: None,
        }
    }
}

impl std::fmt::Debug for PubMedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubMedProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderClient for PubMedProvider {
    fn name(&self) -> &'static str {
        "pubmed"
    }

    #[tracing::instrument(skip(self), fields(provider = "pubmed"))]
    async fn search(&self, query: &str) -> Result<ProviderResult, ProviderError> {
        let ids = self.fetch_ids(query).await?;
        let mut records = Vec::with_capacity(ids.len());

        if !ids.is_empty() {
            let summaries = self.fetch_summaries(&ids).await?;
            for pmid in &ids {
                if let Some(item) = summaries.get(pmid) {
                    records.push(self.map_summary(pmid, item));
                }
            }
        }

        Ok(ProviderResult {
            source: self.name().to_string(),
            records,
        })
    }
}

/// The leading four characters of a PubMed `pubdate` ("2021 Mar 15").
fn parse_pubdate_year(pubdate: &str) -> Option<i32> {
    pubdate.get(..4).and_then(|y| y.parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn esearch_json(ids: &[&str]) -> serde_json::Value {
        serde_json::json!({"esearchresult": {"idlist": ids}})
    }

    fn esummary_json() -> serde_json::Value {
        serde_json::json!({
            "result": {
                "uids": ["11111"],
                "11111": {
                    "title": "Sample Research",
                    "authors": [{"name": "Smith A"}, {"name": "Jones B"}],
                    "pubdate": "2021 Mar 15",
                    "elocationid": "10.1000/sample"
                }
            }
        })
    }

    #[test]
    fn test_parse_pubdate_year() {
        assert_eq!(parse_pubdate_year("2021 Mar 15"), Some(2021));
        assert_eq!(parse_pubdate_year("n.d."), None);
        assert_eq!(parse_pubdate_year(""), None);
    }

    #[tokio::test]
    async fn test_pubmed_search_two_step_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .and(query_param("term", "sample"))
            .respond_with(ResponseTemplate::new(200).set_body_json(esearch_json(&["11111"])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/esummary.fcgi"))
            .and(query_param("id", "11111"))
            .respond_with(ResponseTemplate::new(200).set_body_json(esummary_json()))
            .mount(&server)
            .await;

        let provider = PubMedProvider::with_base_url(server.uri()).unwrap();
        let result = provider.search("sample").await.unwrap();

        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!(record.title.as_deref(), Some("Sample Research"));
        assert_eq!(
            record.authors,
            vec!["Smith A".to_string(), "Jones B".to_string()]
        );
        assert_eq!(record.year, Some(2021));
        assert_eq!(record.doi.as_deref(), Some("10.1000/sample"));
        assert_eq!(
            record.url.as_deref(),
            Some("https://pubmed.ncbi.nlm.nih.gov/11111/")
        );
    }

    #[tokio::test]
    async fn test_pubmed_search_no_ids_skips_esummary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(200).set_body_json(esearch_json(&[])))
            .mount(&server)
            .await;
        // No esummary mock: a request to it would fail the test with HTTP 404.

        let provider = PubMedProvider::with_base_url(server.uri()).unwrap();
        let result = provider.search("nothing").await.unwrap();
        assert!(result.records.is_empty());
    }

    #[tokio::test]
    async fn test_pubmed_search_esearch_http_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let provider = PubMedProvider::with_base_url(server.uri()).unwrap();
        let error = provider.search("sample").await.unwrap_err();
        assert!(matches!(error, ProviderError::Transport { .. }));
    }
}
