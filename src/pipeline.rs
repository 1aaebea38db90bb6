//! Stage handlers wiring the resolver and compiler into jobs.
//!
//! Each handler runs under the orchestrator as one [`PipelineStage`]: it
//! emits progress lines, mutates the owning project, writes stage artifacts
//! into the per-project directory, and hands the orchestrator a structured
//! result.

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::bibliography::BibliographyCompiler;
use crate::job::{Job, JobOrchestrator, PipelineStage};
use crate::resolver::ReferenceResolver;
use crate::store::{ProjectRepository, StoreError};

/// Errors from pipeline stage setup.
///
/// Failures inside a running handler never surface here; they terminate the
/// job as failed instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The stage targets a project id that is not in the store
    #[error("project '{project_id}' not found")]
    ProjectNotFound {
        /// The missing id
        project_id: String,
    },

    /// Store failure while loading the project or creating the job
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs the reference-search stage for a project as a job.
///
/// The query is the structured title when the project has one, else the
/// manuscript's first line. The handler fans out to the resolver, runs the
/// compiler's exact-key pass over the merged references, writes
/// `references.bib` into the project directory, and records both the
/// reference list and the artifact path on the project.
///
/// Returns the running job immediately; progress is observed through
/// [`JobOrchestrator::stream`].
///
/// # Errors
///
/// Returns [`PipelineError::ProjectNotFound`] for an unknown project id, and
/// [`PipelineError::Store`] when the job cannot be created.
pub async fn run_reference_search(
    orchestrator: &JobOrchestrator,
    projects: Arc<ProjectRepository>,
    resolver: Arc<ReferenceResolver>,
    project_id: &str,
) -> Result<Job, PipelineError> {
    let mut project =
        projects
            .get(project_id)
            .await?
            .ok_or_else(|| PipelineError::ProjectNotFound {
                project_id: project_id.to_string(),
            })?;

    let emitter = orchestrator.clone();
    let job = orchestrator
        .run_task(project_id, PipelineStage::ReferenceSearch, move |job| {
            async move {
                let query = project
                    .normalized_json
                    .as_ref()
                    .and_then(|normalized| normalized.get("title"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_else(|| first_line(&project.manuscript.content))
                    .to_string();
                let preview: String = query.chars().take(80).collect();
                emitter
                    .emit(&job.id, &format!("Searching references with query: {preview}"))
                    .await?;

                let resolved = resolver.search(&query).await?;
                let compiler = BibliographyCompiler::new();
                let references = compiler.deduplicate(&resolved);

                let project_dir = projects.project_dir(&project.id);
                tokio::fs::create_dir_all(&project_dir).await?;
                let references_path = project_dir.join("references.bib");
                tokio::fs::write(&references_path, compiler.serialize(&references)).await?;

                project.references = references;
                project.artifacts.insert(
                    "references".to_string(),
                    references_path.display().to_string(),
                );
                projects.save(&project).await?;

                let count = project.references.len();
                emitter
                    .emit(&job.id, &format!("Aggregated {count} references"))
                    .await?;
                info!(project_id = %project.id, count, "reference search finished");
                Ok(Some(json!({
                    "references": serde_json::to_value(&project.references)?,
                })))
            }
        })
        .await?;

    Ok(job)
}

/// The first line of the manuscript, used as a fallback search query.
fn first_line(content: &str) -> &str {
    content.lines().next().unwrap_or_default()
}
