//! Exact-key bibliography deduplication and BibTeX serialization.
//!
//! [`BibliographyCompiler`] is an independent second pass over any reference
//! list, not only resolver output. Unlike the resolver's fuzzy clustering it
//! groups purely on the normalized citation key, keeps the first-seen
//! reference per group, backfills its DOI/URL from later duplicates, and ORs
//! `needs_review`.
//!
//! Serialization emits `@article` blocks with no escaping of special
//! characters; titles containing BibTeX-significant characters pass through
//! verbatim. Known limitation.

use crate::project::Reference;

/// Deduplicates reference lists and renders them in bibliography-file syntax.
#[derive(Debug, Default)]
pub struct BibliographyCompiler;

impl BibliographyCompiler {
    /// Creates a new `BibliographyCompiler`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Normalizes a citation key by stripping non-alphanumeric characters.
    #[must_use]
    pub fn normalize_key(&self, reference: &Reference) -> String {
        reference
            .key
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect()
    }

    /// Collapses references sharing a normalized citation key.
    ///
    /// The first-seen reference per key survives, adopting the DOI and URL of
    /// later duplicates when its own are absent; `needs_review` is ORed
    /// across the group. Idempotent, and the surviving key set does not
    /// depend on input order.
    #[must_use]
    pub fn deduplicate(&self, references: &[Reference]) -> Vec<Reference> {
        let mut entries: Vec<Reference> = Vec::new();
        let mut index_by_key: std::collections::HashMap<String, usize> =
            std::collections::HashMap::new();

        for reference in references {
            let key = self.normalize_key(reference);
            if let Some(&index) = index_by_key.get(&key) {
                let existing = &mut entries[index];
                if existing.doi.is_none() {
                    existing.doi.clone_from(&reference.doi);
                }
                if existing.url.is_none() {
                    existing.url.clone_from(&reference.url);
                }
                existing.needs_review = existing.needs_review || reference.needs_review;
            } else {
                index_by_key.insert(key, entries.len());
                entries.push(reference.clone());
            }
        }

        entries
    }

    /// Renders references as BibTeX text, one entry block per reference with
    /// a blank line between entries.
    #[must_use]
    pub fn serialize(&self, references: &[Reference]) -> String {
        references
            .iter()
            .map(|reference| self.entry(reference))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Renders one `@article` block with only the non-null fields, in fixed
    /// order: title, author, year, journal, doi, url.
    fn entry(&self, reference: &Reference) -> String {
        let mut fields: Vec<(&str, String)> = Vec::new();
        if !reference.title.is_empty() {
            fields.push(("title", reference.title.clone()));
        }
        if !reference.authors.is_empty() {
            fields.push(("author", reference.authors.join(" and ")));
        }
        if let Some(year) = reference.year {
            fields.push(("year", year.to_string()));
        }
        if let Some(venue) = &reference.venue {
            fields.push(("journal", venue.clone()));
        }
        if let Some(doi) = &reference.doi {
            fields.push(("doi", doi.clone()));
        }
        if let Some(url) = &reference.url {
            fields.push(("url", url.clone()));
        }

        let body = fields
            .iter()
            .map(|(name, value)| format!("  {name} = {{{value}}}"))
            .collect::<Vec<_>>()
            .join(",\n");

        format!("@article{{{},\n{}\n}}", self.normalize_key(reference), body)
    }
}
