//! Core data model for manuscripts, projects, and resolved references.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw Markdown manuscript content with an optional uploaded filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manuscript {
    /// Raw Markdown manuscript content.
    pub content: String,
    /// Optional uploaded filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Manuscript {
    /// Creates a manuscript from raw Markdown content.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            filename: None,
        }
    }
}

/// A sentence-level citation slot proposed by the detection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationSlot {
    pub sentence: String,
    pub need_citation: bool,
    pub reasons: Vec<String>,
    pub query_terms: Vec<String>,
    pub confidence: f64,
    /// One of: pending, confirmed, rejected, manual_review.
    #[serde(default = "default_slot_status")]
    pub status: String,
}

fn default_slot_status() -> String {
    "pending".to_string()
}

/// A canonical, deduplicated bibliography entry.
///
/// `key` is derived deterministically from author/year/title (see
/// [`crate::resolver::canonical_key`]); duplicate records share it.
/// `needs_review` is true iff no DOI survived the merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Stable citation key, also used as the bibliography entry name.
    pub key: String,
    pub title: String,
    /// Ordered author names.
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Originating provider names, comma-joined after merging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub needs_review: bool,
}

/// Coarse project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

/// A manuscript project with its accumulated pipeline artifacts.
///
/// The core pipeline only touches `references` and reads `normalized_json`;
/// the remaining fields keep store round-trips faithful for upstream stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub manuscript: Manuscript,
    pub template_id: String,
    /// Unix seconds.
    pub created_at: u64,
    pub status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_json: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_tex: Option<String>,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub citation_slots: Vec<CitationSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    /// Named artifact paths produced by pipeline stages.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
}

impl Project {
    /// Creates a new pending project.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        manuscript: Manuscript,
        template_id: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            id: id.into(),
            manuscript,
            template_id: template_id.into(),
            created_at,
            status: ProjectStatus::Pending,
            normalized_json: None,
            main_tex: None,
            references: Vec::new(),
            citation_slots: Vec::new(),
            pdf_path: None,
            artifacts: BTreeMap::new(),
        }
    }
}
