//! Provider clients for external scholarly indexes.
//!
//! Each client implements the [`ProviderClient`] trait, mapping its index's
//! response shape into untyped [`RawRecord`]s. Missing fields stay `None`;
//! an empty result set is a successful search. Transport failures (network,
//! HTTP status, timeout) propagate as [`ProviderError`] - the fan-out failure
//! policy lives in the resolver, not here.
//!
//! # Architecture
//!
//! - [`ProviderClient`] - Async trait that individual clients implement
//! - [`CrossrefProvider`] - Crossref works API
//! - [`OpenAlexProvider`] - `OpenAlex` works API
//! - [`PubMedProvider`] - NCBI E-utilities (esearch + esummary)
//! - [`ArxivProvider`] - arXiv export API (Atom feed)

mod arxiv;
mod crossref;
mod error;
mod http_client;
mod openalex;
mod pubmed;

pub use arxiv::ArxivProvider;
pub use crossref::CrossrefProvider;
pub use error::ProviderError;
pub use http_client::{
    PROVIDER_TIMEOUT_SECS, build_provider_http_client, build_provider_http_client_with_timeout,
    standard_user_agent,
};
pub use openalex::OpenAlexProvider;
pub use pubmed::PubMedProvider;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::Settings;

/// Maximum records requested from each index per query.
pub const RECORDS_PER_PROVIDER: usize = 5;

/// An unvalidated, provider-shaped record before normalization.
///
/// Transient: raw records exist only between a provider response and the
/// resolver merge, and are never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub url: Option<String>,
    /// Name of the provider that produced this record.
    pub source: String,
    pub score: Option<f64>,
}

/// The records one provider returned for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResult {
    /// Provider name.
    pub source: String,
    pub records: Vec<RawRecord>,
}

/// Trait that all provider clients must implement.
///
/// # Object Safety
///
/// This trait uses `async_trait` to support dynamic dispatch via
/// `Arc<dyn ProviderClient>`. Rust 2024 native async traits are not
/// object-safe, so `async_trait` is required for the fan-out pattern.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Returns the provider's name (e.g., "crossref", "openalex").
    fn name(&self) -> &'static str;

    /// Searches the index for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on network/HTTP/timeout failure or when the
    /// response payload cannot be interpreted. No results is `Ok` with an
    /// empty record list.
    async fn search(&self, query: &str) -> Result<ProviderResult, ProviderError>;
}

/// Builds the default provider set used by the reference resolver.
///
/// Order is deterministic and fixes the merge order of the resolver pass.
/// A provider whose client cannot be constructed is skipped with a warning
/// so the remaining indexes stay usable.
#[must_use]
pub fn build_default_provider_set(settings: &Settings) -> Vec<Arc<dyn ProviderClient>> {
    let mut providers: Vec<Arc<dyn ProviderClient>> = Vec::new();

    match CrossrefProvider::new(settings.crossref_mailto.clone()) {
        Ok(provider) => providers.push(Arc::new(provider)),
        Err(error) => warn!(
            error = %error,
            "Crossref provider unavailable; continuing with remaining providers"
        ),
    }

    match OpenAlexProvider::with_base_url(&settings.openalex_base) {
        Ok(provider) => providers.push(Arc::new(provider)),
        Err(error) => warn!(
            error = %error,
            "OpenAlex provider unavailable; continuing with remaining providers"
        ),
    }

    match PubMedProvider::new() {
        Ok(provider) => providers.push(Arc::new(provider)),
        Err(error) => warn!(
            error = %error,
            "PubMed provider unavailable; continuing with remaining providers"
        ),
    }

    match ArxivProvider::with_base_url(&settings.arxiv_base) {
        Ok(provider) => providers.push(Arc::new(provider)),
        Err(error) => warn!(
            error = %error,
            "arXiv provider unavailable; continuing with remaining providers"
        ),
    }

    providers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_default_has_no_fields_set() {
        let record = RawRecord::default();
        assert!(record.title.is_none());
        assert!(record.authors.is_empty());
        assert!(record.doi.is_none());
        assert!(record.score.is_none());
    }

    #[test]
    fn test_default_provider_set_order_is_deterministic() {
        let settings = Settings::default();
        let providers = build_default_provider_set(&settings);
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["crossref", "openalex", "pubmed", "arxiv"]);
    }
}
