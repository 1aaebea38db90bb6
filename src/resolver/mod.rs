//! Reference resolution: concurrent provider fan-out and duplicate merging.
//!
//! [`ReferenceResolver::search`] sends one query to every configured
//! [`ProviderClient`] concurrently, waits for all of them, and reconciles the
//! differently-shaped, possibly duplicate results into one list of canonical
//! [`Reference`]s with stable citation keys.
//!
//! Merging is deterministic: provider results are processed in configured
//! provider order and records in per-provider output order, so identical
//! inputs always produce identical output.
//!
//! Clustering is a heuristic. Fuzzy title matching can merge unrelated works
//! whose titles are structurally close, and can miss true duplicates whose
//! titles diverge too far; both outcomes are accepted.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::project::Reference;
use crate::provider::{ProviderClient, ProviderError, ProviderResult, RawRecord};

/// Fuzzy title similarity threshold, on a 0-100 scale.
const TITLE_SIMILARITY_THRESHOLD: f64 = 85.0;

/// Errors that can fail a resolver search.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// A provider failed during fan-out under the strict policy
    #[error("provider '{provider}' failed during fan-out: {source}")]
    ProviderFailed {
        /// The provider that failed
        provider: String,
        /// The underlying transport failure
        #[source]
        source: ProviderError,
    },
}

/// How a fan-out reacts to an individual provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanoutPolicy {
    /// Any provider failure fails the whole search.
    #[default]
    Strict,
    /// A failing provider is dropped with a warning; the rest still merge.
    DropFailed,
}

/// Fans a query out to scholarly indexes and merges the results.
pub struct ReferenceResolver {
    providers: Vec<Arc<dyn ProviderClient>>,
    policy: FanoutPolicy,
}

impl ReferenceResolver {
    /// Creates a resolver with the strict fan-out policy.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn ProviderClient>>) -> Self {
        Self::with_policy(providers, FanoutPolicy::Strict)
    }

    /// Creates a resolver with an explicit fan-out policy.
    #[must_use]
    pub fn with_policy(providers: Vec<Arc<dyn ProviderClient>>, policy: FanoutPolicy) -> Self {
        Self { providers, policy }
    }

    /// Searches every configured provider concurrently and merges the results
    /// into deduplicated references in first-seen-cluster order.
    ///
    /// # Errors
    ///
    /// Under [`FanoutPolicy::Strict`], returns [`ResolverError::ProviderFailed`]
    /// for the first provider (in configuration order) that failed.
    #[tracing::instrument(skip(self), fields(providers = self.providers.len()))]
    pub async fn search(&self, query: &str) -> Result<Vec<Reference>, ResolverError> {
        let calls = self.providers.iter().map(|provider| provider.search(query));
        let outcomes = join_all(calls).await;

        let mut results: Vec<ProviderResult> = Vec::with_capacity(outcomes.len());
        for (provider, outcome) in self.providers.iter().zip(outcomes) {
            match outcome {
                Ok(result) => {
                    debug!(
                        provider = provider.name(),
                        records = result.records.len(),
                        "provider returned"
                    );
                    results.push(result);
                }
                Err(error) => match self.policy {
                    FanoutPolicy::Strict => {
                        return Err(ResolverError::ProviderFailed {
                            provider: provider.name().to_string(),
                            source: error,
                        });
                    }
                    FanoutPolicy::DropFailed => {
                        warn!(
                            provider = provider.name(),
                            error = %error,
                            "dropping failed provider from fan-out"
                        );
                    }
                },
            }
        }

        Ok(merge(results))
    }
}

impl std::fmt::Debug for ReferenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field("providers", &self.providers.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// One merged entry: the content key that seeded the cluster plus the
/// reference accumulated into it.
struct Cluster {
    content_key: String,
    reference: Reference,
}

/// Merges provider results into references, clustering by fuzzy title.
///
/// Membership is decided by title similarity alone: records sharing a DOI but
/// with dissimilar titles stay distinct, while two providers that agree on a
/// work without agreeing on its exact title string still merge.
fn merge(results: Vec<ProviderResult>) -> Vec<Reference> {
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut key_uses: HashMap<String, usize> = HashMap::new();

    for result in results {
        for record in result.records {
            let candidate_title = record.title.as_deref().unwrap_or_default();
            let target = clusters
                .iter_mut()
                .find(|cluster| titles_similar(&cluster.reference.title, candidate_title));

            if let Some(cluster) = target {
                debug!(
                    cluster = %cluster.content_key,
                    source = %record.source,
                    "merging duplicate into existing cluster"
                );
                merge_record(&mut cluster.reference, &record);
            } else {
                let content_key = content_key(&record);
                let mut reference = record_to_reference(&record);
                let uses = key_uses.entry(reference.key.clone()).or_insert(0);
                *uses += 1;
                if *uses > 1 {
                    reference.key = format!("{}{}", reference.key, collision_suffix(*uses));
                }
                debug!(cluster = %content_key, key = %reference.key, "opened cluster");
                clusters.push(Cluster {
                    content_key,
                    reference,
                });
            }
        }
    }

    clusters.into_iter().map(|c| c.reference).collect()
}

/// Case-insensitive fuzzy similarity, true above the clustering threshold.
fn titles_similar(existing: &str, candidate: &str) -> bool {
    let ratio =
        strsim::jaro_winkler(&existing.to_lowercase(), &candidate.to_lowercase()) * 100.0;
    ratio > TITLE_SIMILARITY_THRESHOLD
}

/// Content key used for cluster bookkeeping: SHA-256 of the DOI when present,
/// else of the title.
fn content_key(record: &RawRecord) -> String {
    let basis = record
        .doi
        .as_deref()
        .or(record.title.as_deref())
        .unwrap_or_default();
    format!("{:x}", Sha256::digest(basis.as_bytes()))
}

/// Folds an incoming record into an existing cluster reference.
fn merge_record(existing: &mut Reference, record: &RawRecord) {
    existing.score = match (existing.score, record.score) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    let mut sources: BTreeSet<String> = existing
        .source
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if !record.source.is_empty() {
        sources.insert(record.source.clone());
    }
    if !sources.is_empty() {
        existing.source = Some(sources.into_iter().collect::<Vec<_>>().join(","));
    }

    if existing.doi.is_none() {
        existing.doi.clone_from(&record.doi);
    }
    if existing.url.is_none() {
        existing.url.clone_from(&record.url);
    }
    // True iff no DOI survived the merge.
    existing.needs_review = existing.doi.is_none();
}

/// Normalizes a raw record into a fresh reference with a canonical key.
fn record_to_reference(record: &RawRecord) -> Reference {
    let title = record
        .title
        .clone()
        .unwrap_or_else(|| "Untitled".to_string());
    let authors: Vec<String> = record
        .authors
        .iter()
        .filter(|a| !a.is_empty())
        .cloned()
        .collect();
    let key = canonical_key(&title, &authors, record.year);

    Reference {
        key,
        title,
        authors,
        venue: None,
        year: record.year,
        doi: record.doi.clone(),
        url: record.url.clone(),
        source: Some(record.source.clone()).filter(|s| !s.is_empty()),
        score: record.score,
        needs_review: record.doi.is_none(),
    }
}

/// Derives the canonical citation key from author, year, and title.
///
/// `lowercase(surname of first author | "anon") + (year | "n.d.") +
/// lowercase(first title word | "untitled")`. Keys are not globally unique;
/// within one resolver pass collisions get a suffix (see
/// [`collision_suffix`]'s scheme), across passes callers must tolerate reuse.
#[must_use]
pub fn canonical_key(title: &str, authors: &[String], year: Option<i32>) -> String {
    let surname = authors
        .first()
        .and_then(|name| name.split_whitespace().last())
        .map_or_else(|| "anon".to_string(), str::to_lowercase);
    let year_part = year.map_or_else(|| "n.d.".to_string(), |y| y.to_string());
    let first_word = title
        .split_whitespace()
        .next()
        .map_or_else(|| "untitled".to_string(), str::to_lowercase);
    format!("{surname}{year_part}{first_word}")
}

/// Disambiguation suffix for the Nth cluster reusing a canonical key within
/// one pass: the second occurrence gets "b", the third "c", and occurrences
/// past "z" fall back to "-N".
fn collision_suffix(occurrence: usize) -> String {
    debug_assert!(occurrence >= 2);
    let offset = occurrence - 2;
    if offset < 25 {
        let letter = b'b' + u8::try_from(offset).unwrap_or(0);
        (letter as char).to_string()
    } else {
        format!("-{occurrence}")
    }
}
