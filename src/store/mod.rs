//! Flat JSON-file persistence for projects and jobs.
//!
//! One file per entity under a storage root: `{root}/proj_*.json` for
//! projects and `{root}/jobs/job_*.json` for jobs. Every orchestrator
//! transition is mirrored here before it becomes externally observable.
//!
//! Writes are whole-file and non-atomic; a project's reference list is
//! read-modify-written by whichever stage currently owns it, so serializing
//! concurrent stages on one project is the caller's responsibility.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::job::{Job, JobStatus, PipelineStage};
use crate::project::Project;

/// Errors from store reads and writes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O failure at '{path}': {source}")]
    Io {
        /// The file or directory involved
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored document could not be encoded or decoded
    #[error("invalid JSON document at '{path}': {source}")]
    Serialization {
        /// The file involved
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A job id that is not in the store
    #[error("job '{job_id}' not found")]
    JobNotFound {
        /// The missing id
        job_id: String,
    },

    /// Attempted transition out of a terminal status
    #[error("job '{job_id}' already reached terminal status '{status}'")]
    TerminalJob {
        /// The job involved
        job_id: String,
        /// Its terminal status
        status: JobStatus,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn serialization(path: &Path, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Generates an opaque id: `{prefix}_{16 hex chars}`.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    let token: u64 = rand::random();
    format!("{prefix}_{token:016x}")
}

/// Current time as unix seconds.
#[must_use]
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => {
            let value = serde_json::from_str(&raw).map_err(|e| StoreError::serialization(path, e))?;
            Ok(Some(value))
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(StoreError::io(path, error)),
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let raw =
        serde_json::to_string_pretty(value).map_err(|e| StoreError::serialization(path, e))?;
    tokio::fs::write(path, raw)
        .await
        .map_err(|e| StoreError::io(path, e))
}

// ==================== ProjectRepository ====================

/// JSON-file store for [`Project`]s.
#[derive(Debug, Clone)]
pub struct ProjectRepository {
    root: PathBuf,
}

impl ProjectRepository {
    /// Opens (and creates if needed) a project store under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    /// The per-project artifact directory (`{root}/{project_id}`).
    #[must_use]
    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    fn project_path(&self, project_id: &str) -> PathBuf {
        self.root.join(format!("{project_id}.json"))
    }

    /// Persists a project, overwriting any previous document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on write or encode failure.
    pub async fn save(&self, project: &Project) -> Result<(), StoreError> {
        let path = self.project_path(&project.id);
        debug!(project_id = %project.id, path = %path.display(), "saving project");
        write_json(&path, project).await
    }

    /// Loads a project, or `None` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on read or decode failure.
    pub async fn get(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        read_json(&self.project_path(project_id)).await
    }

    /// Lists every stored project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on directory or document read failure.
    pub async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let mut projects = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::io(&self.root, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            let path = entry.path();
            let is_project_file = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("proj_"));
            if is_project_file
                && let Some(project) = read_json::<Project>(&path).await?
            {
                projects.push(project);
            }
        }
        Ok(projects)
    }
}

// ==================== JobRepository ====================

/// JSON-file store for [`Job`]s, under `{root}/jobs`.
#[derive(Debug, Clone)]
pub struct JobRepository {
    root: PathBuf,
}

impl JobRepository {
    /// Opens (and creates if needed) a job store under `{root}/jobs`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into().join("jobs");
        std::fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.root.join(format!("{job_id}.json"))
    }

    /// Creates and persists a new queued job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on write failure.
    pub async fn create(&self, project_id: &str, stage: PipelineStage) -> Result<Job, StoreError> {
        let now = unix_timestamp();
        let job = Job {
            id: generate_id("job"),
            project_id: project_id.to_string(),
            stage,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            logs: Vec::new(),
            result: None,
            error: None,
        };
        self.save(&job).await?;
        Ok(job)
    }

    /// Persists a job document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on write or encode failure.
    pub async fn save(&self, job: &Job) -> Result<(), StoreError> {
        write_json(&self.job_path(&job.id), job).await
    }

    /// Loads a job, or `None` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on read or decode failure.
    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        read_json(&self.job_path(job_id)).await
    }

    /// Appends one line to a job's durable log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] for unknown ids, otherwise
    /// read/write failures.
    pub async fn append_log(&self, job_id: &str, message: &str) -> Result<(), StoreError> {
        let mut job = self
            .get(job_id)
            .await?
            .ok_or_else(|| StoreError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        job.logs.push(message.to_string());
        job.updated_at = unix_timestamp();
        self.save(&job).await
    }

    /// Transitions a job's status, optionally recording an error or result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::JobNotFound`] for unknown ids and
    /// [`StoreError::TerminalJob`] when the job already reached a terminal
    /// status - terminal transitions happen exactly once.
    pub async fn mark_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<String>,
        result: Option<Value>,
    ) -> Result<Job, StoreError> {
        let mut job = self
            .get(job_id)
            .await?
            .ok_or_else(|| StoreError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        if job.status.is_terminal() {
            return Err(StoreError::TerminalJob {
                job_id: job_id.to_string(),
                status: job.status,
            });
        }

        job.status = status;
        job.updated_at = unix_timestamp();
        if let Some(error) = error {
            job.error = Some(error);
        }
        if let Some(result) = result {
            job.result = Some(result);
        }
        self.save(&job).await?;
        Ok(job)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::project::Manuscript;
    use tempfile::tempdir;

    #[test]
    fn test_generate_id_shape_and_uniqueness() {
        let a = generate_id("job");
        let b = generate_id("job");
        assert!(a.starts_with("job_"));
        assert_eq!(a.len(), "job_".len() + 16);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_project_save_get_round_trip() {
        let dir = tempdir().unwrap();
        let repo = ProjectRepository::new(dir.path()).unwrap();
        let project = Project::new(
            generate_id("proj"),
            Manuscript::new("# Hi"),
            "Generic-Article",
            unix_timestamp(),
        );

        repo.save(&project).await.unwrap();
        let loaded = repo.get(&project.id).await.unwrap().unwrap();
        assert_eq!(loaded, project);
    }

    #[test]
    fn test_project_get_unknown_is_none() {
        let dir = tempdir().unwrap();
        let repo = ProjectRepository::new(dir.path()).unwrap();
        let loaded = tokio_test::block_on(repo.get("proj_missing")).unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_list_projects_only_sees_project_files() {
        let dir = tempdir().unwrap();
        let repo = ProjectRepository::new(dir.path()).unwrap();
        let project = Project::new(
            generate_id("proj"),
            Manuscript::new("body"),
            "Generic-Article",
            unix_timestamp(),
        );
        repo.save(&project).await.unwrap();
        tokio::fs::write(dir.path().join("notes.json"), "{}")
            .await
            .unwrap();

        let projects = repo.list_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, project.id);
    }

    #[tokio::test]
    async fn test_job_create_starts_queued_and_persists() {
        let dir = tempdir().unwrap();
        let repo = JobRepository::new(dir.path()).unwrap();
        let job = repo
            .create("proj_1", PipelineStage::ReferenceSearch)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        let loaded = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded, job);
    }

    #[tokio::test]
    async fn test_append_log_preserves_order() {
        let dir = tempdir().unwrap();
        let repo = JobRepository::new(dir.path()).unwrap();
        let job = repo.create("proj_1", PipelineStage::Compile).await.unwrap();

        repo.append_log(&job.id, "first").await.unwrap();
        repo.append_log(&job.id, "second").await.unwrap();

        let loaded = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.logs, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn test_append_log_unknown_job_fails() {
        let dir = tempdir().unwrap();
        let repo = JobRepository::new(dir.path()).unwrap();
        let error = repo.append_log("job_missing", "line").await.unwrap_err();
        assert!(matches!(error, StoreError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn test_mark_status_rejects_second_terminal_transition() {
        let dir = tempdir().unwrap();
        let repo = JobRepository::new(dir.path()).unwrap();
        let job = repo.create("proj_1", PipelineStage::Preflight).await.unwrap();

        repo.mark_status(&job.id, JobStatus::Running, None, None)
            .await
            .unwrap();
        repo.mark_status(&job.id, JobStatus::Completed, None, None)
            .await
            .unwrap();
        let error = repo
            .mark_status(&job.id, JobStatus::Failed, Some("late".to_string()), None)
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::TerminalJob { .. }));
    }

    #[tokio::test]
    async fn test_mark_status_records_error_and_result() {
        let dir = tempdir().unwrap();
        let repo = JobRepository::new(dir.path()).unwrap();
        let job = repo.create("proj_1", PipelineStage::Formatting).await.unwrap();

        let updated = repo
            .mark_status(
                &job.id,
                JobStatus::Completed,
                None,
                Some(serde_json::json!({"count": 3})),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::Completed);
        assert_eq!(updated.result, Some(serde_json::json!({"count": 3})));
    }
}
