//! Bounded worker pool for ingest jobs: accepts jobs, processes at most `W`
//! concurrently, delivers idempotent results keyed by provider id.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::blob_store::{BlobStore, UploadOutcome};
use crate::error::{JukeboxError, JukeboxResult};
use crate::media_provider::MediaProvider;

/// Lifecycle state of a single download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Successful outcome of a completed ingest.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownloadResult {
    pub video_id: String,
    pub title: String,
    pub duration: Option<f64>,
    pub artwork: Option<String>,
    pub filename: String,
    pub url: String,
    pub size: u64,
    pub message: Option<String>,
}

struct TaskEntry {
    task_id: String,
    video_id: String,
    created_at: f64,
    status: Mutex<TaskStatus>,
    result: Mutex<Option<DownloadResult>>,
    error: Mutex<Option<String>>,
    done_tx: Mutex<Option<oneshot::Sender<()>>>,
    done_rx: Mutex<Option<oneshot::Receiver<()>>>,
}

/// Point-in-time status view returned by [`DownloadQueue::status`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskStatusView {
    pub status: TaskStatus,
    pub created_at: f64,
    pub result: Option<DownloadResult>,
    pub error: Option<String>,
    pub queue_position: usize,
}

struct Job {
    task_id: String,
    video_id: String,
    format: String,
}

/// Bounded worker pool fed by an unbounded job queue. Workers are started
/// lazily on first submission and observe `shutdown` between jobs.
pub struct DownloadQueue {
    tasks: Arc<DashMap<String, Arc<TaskEntry>>>,
    pending_order: Arc<Mutex<VecDeque<String>>>,
    job_tx: mpsc::UnboundedSender<Job>,
    next_id: AtomicU64,
    workers_started: std::sync::atomic::AtomicBool,
    worker_count: usize,
    blob_store: Arc<dyn BlobStore>,
    media_provider: Arc<dyn MediaProvider>,
    shutdown: CancellationToken,
    job_rx: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
}

impl DownloadQueue {
    pub fn new(
        worker_count: usize,
        blob_store: Arc<dyn BlobStore>,
        media_provider: Arc<dyn MediaProvider>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tasks: Arc::new(DashMap::new()),
            pending_order: Arc::new(Mutex::new(VecDeque::new())),
            job_tx,
            next_id: AtomicU64::new(1),
            workers_started: std::sync::atomic::AtomicBool::new(false),
            worker_count: worker_count.max(1),
            blob_store,
            media_provider,
            shutdown,
            job_rx: Mutex::new(Some(job_rx)),
        })
    }

    fn ensure_workers_started(self: &Arc<Self>) {
        if self
            .workers_started
            .swap(true, Ordering::SeqCst)
        {
            return;
        }
        let Some(job_rx) = self.job_rx.lock().take() else {
            return;
        };
        let rx = Arc::new(Mutex::new(job_rx));
        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        for _ in 0..self.worker_count {
            let queue = self.clone();
            let rx = rx.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                loop {
                    if queue.shutdown.is_cancelled() {
                        break;
                    }
                    let job = {
                        let mut guard = rx.lock();
                        guard.try_recv().ok()
                    };
                    let job = match job {
                        Some(job) => job,
                        None => {
                            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
                            continue;
                        }
                    };
                    let _permit = semaphore.acquire().await;
                    queue.process_job(job).await;
                }
            });
        }
    }

    /// Appends a new download task in `pending`; returns immediately.
    pub fn submit(self: &Arc<Self>, video_id: impl Into<String>, _format: &str) -> String {
        self.ensure_workers_started();
        let video_id = video_id.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let task_id = format!("task-{id}");

        let (done_tx, done_rx) = oneshot::channel();
        let entry = Arc::new(TaskEntry {
            task_id: task_id.clone(),
            video_id: video_id.clone(),
            created_at: crate::clock::SystemClock.now_secs(),
            status: Mutex::new(TaskStatus::Pending),
            result: Mutex::new(None),
            error: Mutex::new(None),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx: Mutex::new(Some(done_rx)),
        });
        self.tasks.insert(task_id.clone(), entry);
        self.pending_order.lock().push_back(task_id.clone());

        let _ = self.job_tx.send(Job {
            task_id: task_id.clone(),
            video_id,
            format: "mp3".into(),
        });
        task_id
    }

    /// Blocks until the task reaches a terminal state or `timeout` elapses.
    pub async fn await_task(
        &self,
        task_id: &str,
        timeout: std::time::Duration,
    ) -> JukeboxResult<DownloadResult> {
        let entry = self
            .tasks
            .get(task_id)
            .map(|e| e.clone())
            .ok_or_else(|| JukeboxError::ItemNotFound(task_id.to_string()))?;

        let rx = entry.done_rx.lock().take();
        if let Some(rx) = rx {
            let _ = tokio::time::timeout(timeout, rx).await;
        } else {
            // Another caller already consumed the receiver; poll status instead.
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if matches!(
                    *entry.status.lock(),
                    TaskStatus::Completed | TaskStatus::Failed
                ) {
                    break;
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(JukeboxError::DeadlineExceeded);
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        }

        match *entry.status.lock() {
            TaskStatus::Completed => entry
                .result
                .lock()
                .clone()
                .ok_or_else(|| JukeboxError::Internal("completed task missing result".into())),
            TaskStatus::Failed => Err(JukeboxError::MediaProvider(
                entry
                    .error
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "unknown failure".into()),
            )),
            _ => Err(JukeboxError::DeadlineExceeded),
        }
    }

    /// Point-in-time status, including best-effort queue position.
    pub fn status(&self, task_id: &str) -> JukeboxResult<TaskStatusView> {
        let entry = self
            .tasks
            .get(task_id)
            .ok_or_else(|| JukeboxError::ItemNotFound(task_id.to_string()))?;
        let queue_position = self
            .pending_order
            .lock()
            .iter()
            .position(|id| id == task_id)
            .unwrap_or(0);
        Ok(TaskStatusView {
            status: *entry.status.lock(),
            created_at: entry.created_at,
            result: entry.result.lock().clone(),
            error: entry.error.lock().clone(),
            queue_position,
        })
    }

    async fn process_job(self: &Arc<Self>, job: Job) {
        let Some(entry) = self.tasks.get(&job.task_id).map(|e| e.clone()) else {
            return;
        };
        *entry.status.lock() = TaskStatus::Processing;
        self.pending_order.lock().retain(|id| id != &job.task_id);

        let key = format!("yt-{}.mp3", job.video_id);
        let result = self.run_job(&job, &key).await;

        match result {
            Ok(result) => {
                *entry.result.lock() = Some(result);
                *entry.status.lock() = TaskStatus::Completed;
            }
            Err(err) => {
                *entry.error.lock() = Some(err.to_string());
                *entry.status.lock() = TaskStatus::Failed;
            }
        }
        if let Some(tx) = entry.done_tx.lock().take() {
            let _ = tx.send(());
        }
    }

    async fn run_job(&self, job: &Job, key: &str) -> JukeboxResult<DownloadResult> {
        if self.blob_store.exists(key).await? {
            let info = self.media_provider.info(&job.video_id, true).await?;
            let blob = self.blob_store.info(key).await?;
            return Ok(DownloadResult {
                video_id: job.video_id.clone(),
                title: info.title,
                duration: info.duration,
                artwork: Some(info.thumbnail),
                filename: key.to_string(),
                url: self.blob_store.public_url(key),
                size: blob.size,
                message: Some("File already exists in storage".into()),
            });
        }

        let scratch = tempfile::tempdir().map_err(JukeboxError::from)?;
        let extracted = self
            .media_provider
            .extract_audio(&job.video_id, &job.format, scratch.path())
            .await?;
        let bytes = tokio::fs::read(&extracted.local_path)
            .await
            .map_err(JukeboxError::from)?;

        let outcome = self
            .blob_store
            .upload(key, &bytes, "audio/mpeg", true)
            .await?;
        let message = match outcome {
            UploadOutcome::AlreadyExists => Some("File already exists in storage".to_string()),
            UploadOutcome::Uploaded => None,
        };

        let size = bytes.len() as u64;
        Ok(DownloadResult {
            video_id: job.video_id.clone(),
            title: extracted.title,
            duration: extracted.duration,
            artwork: extracted.artwork,
            filename: key.to_string(),
            url: self.blob_store.public_url(key),
            size,
            message,
        })
        // scratch dropped here, removing the directory on every exit path
        // (including the early-return error paths above, via `?`).
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::InMemoryBlobStore;
    use crate::media_provider::StubMediaProvider;

    fn queue() -> Arc<DownloadQueue> {
        DownloadQueue::new(
            2,
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(StubMediaProvider::default()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn submit_and_await_completes_successfully() {
        let q = queue();
        let task_id = q.submit("abc123", "mp3");
        let result = q
            .await_task(&task_id, std::time::Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.video_id, "abc123");
        assert!(result.size > 0);
    }

    #[tokio::test]
    async fn idempotent_key_on_second_submit_short_circuits_extraction() {
        let q = queue();
        let first = q.submit("dup", "mp3");
        q.await_task(&first, std::time::Duration::from_secs(5))
            .await
            .unwrap();

        let second = q.submit("dup", "mp3");
        let result = q
            .await_task(&second, std::time::Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.message.as_deref(), Some("File already exists in storage"));
    }

    #[tokio::test]
    async fn status_reports_created_at_and_terminal_state() {
        let q = queue();
        let task_id = q.submit("xyz", "mp3");
        q.await_task(&task_id, std::time::Duration::from_secs(5))
            .await
            .unwrap();
        let view = q.status(&task_id).unwrap();
        assert_eq!(view.status, TaskStatus::Completed);
    }
}
