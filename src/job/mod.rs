//! Job lifecycle model and orchestration.
//!
//! A [`Job`] tracks one asynchronously executed pipeline stage:
//! `queued -> running -> {completed, failed}`, monotonic, with a terminal
//! status set exactly once. Logs are append-only while running; a terminal
//! job is immutable. Re-running a terminal job is undefined - callers create
//! a new job instead.

mod orchestrator;

pub use orchestrator::{JobOrchestrator, JobStream, STREAM_SENTINEL};

use serde::{Deserialize, Serialize};

/// Named stages of the manuscript pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Import,
    Structure,
    CitationDetection,
    ReferenceSearch,
    Formatting,
    Compile,
    Preflight,
}

impl PipelineStage {
    /// The wire/storage name of the stage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Structure => "structure",
            Self::CitationDetection => "citation_detection",
            Self::ReferenceSearch => "reference_search",
            Self::Formatting => "formatting",
            Self::Compile => "compile",
            Self::Preflight => "preflight",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle status; transitions are forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether this status ends the job's lifecycle.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One asynchronously executed pipeline stage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque id, generated per run.
    pub id: String,
    pub project_id: String,
    pub stage: PipelineStage,
    pub status: JobStatus,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds, touched on every persisted mutation.
    pub updated_at: u64,
    /// Append-only ordered progress log.
    #[serde(default)]
    pub logs: Vec<String>,
    /// Structured payload from a completed handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure description from a failed handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
