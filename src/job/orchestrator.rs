//! Job orchestration: scheduling stage handlers and streaming their progress.
//!
//! [`JobOrchestrator`] creates a [`Job`], runs the stage handler as an
//! independent tokio task, and multiplexes progress through one unbounded
//! channel per job id (created lazily, living for the process). A
//! [`JobStream`] replays the persisted log at subscribe time and then yields
//! live messages until the [`STREAM_SENTINEL`] is observed.
//!
//! Streams are single-consumer: each job's channel has one producer (the
//! handler) and the first subscriber wins its messages. Concurrent
//! subscribers on one job compete rather than each receiving a copy; callers
//! needing broadcast fan-out must add a dispatcher on top.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error};

use crate::job::{Job, JobStatus, PipelineStage};
use crate::store::{JobRepository, StoreError};

/// Distinguished terminal value marking end-of-stream.
pub const STREAM_SENTINEL: &str = "__COMPLETE__";

/// Per-job live channel: one producer, claimed by one consumer.
#[derive(Clone)]
struct JobChannel {
    tx: UnboundedSender<String>,
    rx: Arc<tokio::sync::Mutex<UnboundedReceiver<String>>>,
}

impl JobChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }
}

/// Schedules stage handlers and multiplexes their progress to observers.
///
/// Construct one instance at application start and pass it (it clones
/// cheaply, sharing state) to every stage handler and the API layer; there is
/// no hidden global.
#[derive(Clone)]
pub struct JobOrchestrator {
    repository: Arc<JobRepository>,
    channels: Arc<Mutex<HashMap<String, JobChannel>>>,
}

impl JobOrchestrator {
    /// Creates an orchestrator persisting through `repository`.
    #[must_use]
    pub fn new(repository: Arc<JobRepository>) -> Self {
        Self {
            repository,
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The backing job repository, for status polling.
    #[must_use]
    pub fn repository(&self) -> &Arc<JobRepository> {
        &self.repository
    }

    /// The lazily created channel for a job id.
    fn channel(&self, job_id: &str) -> JobChannel {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(job_id.to_string())
            .or_insert_with(JobChannel::new)
            .clone()
    }

    /// Creates a job for `stage`, marks it running, and schedules `handler`
    /// as an independent task. Returns the running job without waiting for
    /// the handler.
    ///
    /// A handler returning `Ok(result)` completes the job with the result
    /// persisted; a handler returning `Err` (or panicking) fails it with the
    /// error persisted, an `"ERROR: ..."` line pushed to the stream, and the
    /// sentinel after it. Exactly one terminal transition happens per job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the job cannot be created or marked
    /// running; handler failures never propagate here.
    pub async fn run_task<F, Fut>(
        &self,
        project_id: &str,
        stage: PipelineStage,
        handler: F,
    ) -> Result<Job, StoreError>
    where
        F: FnOnce(Job) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        let job = self.repository.create(project_id, stage).await?;
        let channel = self.channel(&job.id);
        let job = self
            .repository
            .mark_status(&job.id, JobStatus::Running, None, None)
            .await?;

        let repository = Arc::clone(&self.repository);
        let job_id = job.id.clone();
        let handler_job = job.clone();
        tokio::spawn(async move {
            debug!(job_id = %job_id, stage = %stage, "stage handler started");
            // Nested spawn so a panicking handler still terminates the job.
            let outcome = tokio::spawn(handler(handler_job)).await;
            match outcome {
                Ok(Ok(result)) => {
                    if let Err(store_error) = repository
                        .mark_status(&job_id, JobStatus::Completed, None, result)
                        .await
                    {
                        error!(job_id = %job_id, error = %store_error, "failed to persist completion");
                    }
                    let _ = channel.tx.send(STREAM_SENTINEL.to_string());
                }
                Ok(Err(handler_error)) => {
                    fail_job(&repository, &channel, &job_id, handler_error.to_string()).await;
                }
                Err(join_error) => {
                    fail_job(
                        &repository,
                        &channel,
                        &job_id,
                        format!("handler panicked: {join_error}"),
                    )
                    .await;
                }
            }
        });

        Ok(job)
    }

    /// Emits one progress line for a running job: pushed onto the live
    /// channel, then appended to the durable log. Order is preserved within
    /// one handler; there is no ordering across jobs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the durable log append fails.
    pub async fn emit(&self, job_id: &str, message: &str) -> Result<(), StoreError> {
        let channel = self.channel(job_id);
        let _ = channel.tx.send(message.to_string());
        self.repository.append_log(job_id, message).await
    }

    /// Subscribes to a job's progress: already-logged lines replay
    /// immediately, then live messages follow until the sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the persisted log cannot be read. An
    /// unknown job id is not an error - the stream simply starts empty and
    /// waits.
    pub async fn stream(&self, job_id: &str) -> Result<JobStream, StoreError> {
        let channel = self.channel(job_id);
        let logs = self
            .repository
            .get(job_id)
            .await?
            .map(|job| job.logs)
            .unwrap_or_default();
        Ok(JobStream {
            skip: logs.len(),
            replay: VecDeque::from(logs),
            rx: channel.rx,
            finished: false,
        })
    }
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator").finish_non_exhaustive()
    }
}

async fn fail_job(
    repository: &JobRepository,
    channel: &JobChannel,
    job_id: &str,
    description: String,
) {
    if let Err(store_error) = repository
        .mark_status(job_id, JobStatus::Failed, Some(description.clone()), None)
        .await
    {
        error!(job_id = %job_id, error = %store_error, "failed to persist failure");
    }
    let _ = channel.tx.send(format!("ERROR: {description}"));
    let _ = channel.tx.send(STREAM_SENTINEL.to_string());
}

/// Lazy progress sequence for one job.
///
/// Replays the log snapshot taken at subscribe time, then consumes the live
/// channel. Messages emitted before the subscribe exist both in the snapshot
/// and in the channel backlog; the backlog duplicates are skipped so each
/// line is yielded once. The sentinel is yielded as the final item.
pub struct JobStream {
    replay: VecDeque<String>,
    /// Channel backlog entries that duplicate the replayed snapshot.
    skip: usize,
    rx: Arc<tokio::sync::Mutex<UnboundedReceiver<String>>>,
    finished: bool,
}

impl JobStream {
    /// The next progress line, or `None` after the sentinel.
    pub async fn next(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }
        if let Some(line) = self.replay.pop_front() {
            return Some(line);
        }
        loop {
            let message = { self.rx.lock().await.recv().await };
            match message {
                Some(_) if self.skip > 0 => {
                    self.skip -= 1;
                }
                Some(message) => {
                    if message == STREAM_SENTINEL {
                        self.finished = true;
                    }
                    return Some(message);
                }
                None => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Collects every remaining line through the sentinel.
    pub async fn collect_to_end(mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next().await {
            lines.push(line);
        }
        lines
    }

    /// Adapts this sequence into a [`futures_util::Stream`] for API layers.
    pub fn into_stream(self) -> impl Stream<Item = String> {
        futures_util::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|line| (line, stream))
        })
    }
}

impl std::fmt::Debug for JobStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStream")
            .field("replay", &self.replay.len())
            .field("skip", &self.skip)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::bail;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::timeout;

    fn orchestrator(dir: &std::path::Path) -> JobOrchestrator {
        JobOrchestrator::new(Arc::new(JobRepository::new(dir).unwrap()))
    }

    async fn wait_terminal(orchestrator: &JobOrchestrator, job_id: &str) -> Job {
        for _ in 0..200 {
            let job = orchestrator.repository().get(job_id).await.unwrap().unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never reached a terminal status");
    }

    #[tokio::test]
    async fn test_run_task_returns_running_without_waiting() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let job = orchestrator
            .run_task("proj_1", PipelineStage::ReferenceSearch, move |_job| async {
                let _ = release_rx.await;
                Ok(None)
            })
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Running);
        release_tx.send(()).unwrap();
        let finished = wait_terminal(&orchestrator, &job.id).await;
        assert_eq!(finished.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_run_task_persists_handler_result() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let job = orchestrator
            .run_task("proj_1", PipelineStage::Compile, |_job| async {
                Ok(Some(serde_json::json!({"count": 2})))
            })
            .await
            .unwrap();

        let finished = wait_terminal(&orchestrator, &job.id).await;
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.result, Some(serde_json::json!({"count": 2})));
        assert!(finished.error.is_none());
    }

    #[tokio::test]
    async fn test_failing_handler_yields_failed_job_and_error_line() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let job = orchestrator
            .run_task("proj_1", PipelineStage::ReferenceSearch, |_job| async {
                bail!("boom")
            })
            .await
            .unwrap();

        let finished = wait_terminal(&orchestrator, &job.id).await;
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.error.as_deref(), Some("boom"));

        let lines = orchestrator
            .stream(&job.id)
            .await
            .unwrap()
            .collect_to_end()
            .await;
        assert_eq!(
            lines.last_chunk::<2>().unwrap(),
            &["ERROR: boom".to_string(), STREAM_SENTINEL.to_string()]
        );
    }

    #[tokio::test]
    async fn test_panicking_handler_yields_failed_job() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());

        let job = orchestrator
            .run_task("proj_1", PipelineStage::Compile, |_job| async {
                panic!("handler exploded");
            })
            .await
            .unwrap();

        let finished = wait_terminal(&orchestrator, &job.id).await;
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(finished.error.unwrap().contains("handler panicked"));
    }

    #[tokio::test]
    async fn test_emit_appends_durable_log_in_order() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let inner = orchestrator.clone();

        let job = orchestrator
            .run_task("proj_1", PipelineStage::ReferenceSearch, move |job| async move {
                inner.emit(&job.id, "step one").await?;
                inner.emit(&job.id, "step two").await?;
                Ok(None)
            })
            .await
            .unwrap();

        let finished = wait_terminal(&orchestrator, &job.id).await;
        assert_eq!(
            finished.logs,
            vec!["step one".to_string(), "step two".to_string()]
        );
    }

    #[tokio::test]
    async fn test_stream_after_completion_replays_log_then_sentinel_immediately() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let inner = orchestrator.clone();

        let job = orchestrator
            .run_task("proj_1", PipelineStage::ReferenceSearch, move |job| async move {
                inner.emit(&job.id, "one").await?;
                inner.emit(&job.id, "two").await?;
                Ok(None)
            })
            .await
            .unwrap();
        wait_terminal(&orchestrator, &job.id).await;

        let stream = orchestrator.stream(&job.id).await.unwrap();
        let lines = timeout(Duration::from_secs(1), stream.collect_to_end())
            .await
            .unwrap();
        assert_eq!(
            lines,
            vec![
                "one".to_string(),
                "two".to_string(),
                STREAM_SENTINEL.to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_subscribed_before_run_sees_live_messages_once() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let inner = orchestrator.clone();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let job = orchestrator
            .run_task("proj_1", PipelineStage::ReferenceSearch, move |job| async move {
                let _ = release_rx.await;
                inner.emit(&job.id, "live line").await?;
                Ok(None)
            })
            .await
            .unwrap();

        let stream = orchestrator.stream(&job.id).await.unwrap();
        release_tx.send(()).unwrap();
        let lines = timeout(Duration::from_secs(1), stream.collect_to_end())
            .await
            .unwrap();
        assert_eq!(
            lines,
            vec!["live line".to_string(), STREAM_SENTINEL.to_string()]
        );
    }

    #[tokio::test]
    async fn test_into_stream_adapts_to_futures_stream() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator(dir.path());
        let inner = orchestrator.clone();

        let job = orchestrator
            .run_task("proj_1", PipelineStage::Preflight, move |job| async move {
                inner.emit(&job.id, "only line").await?;
                Ok(None)
            })
            .await
            .unwrap();
        wait_terminal(&orchestrator, &job.id).await;

        let collected: Vec<String> = orchestrator
            .stream(&job.id)
            .await
            .unwrap()
            .into_stream()
            .collect()
            .await;
        assert_eq!(
            collected,
            vec!["only line".to_string(), STREAM_SENTINEL.to_string()]
        );
    }
}
