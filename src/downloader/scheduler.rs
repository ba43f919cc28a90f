//! Bounded worker pool and per-task execution.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{FailureKind, ProgressResolver, ProgressSink, RawProgress, TransferFailure};
use crate::error::{DownloadError, Error, Result};
use crate::progress_bus::ProgressBus;
use crate::types::{Event, Progress, ProgressEvent, Task, TaskId, TaskOutcome};

use super::MediaDownloader;
use super::registry::TaskRegistry;

/// Worker pool state (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub(crate) struct Scheduler {
    /// Semaphore limiting concurrent transfers to the pool capacity
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Cancellation tokens of queued and running tasks
    pub(crate) active_downloads: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    /// Cleared once shutdown begins
    pub(crate) accepting_new: Arc<AtomicBool>,
    capacity: usize,
}

impl Scheduler {
    /// Create a pool with `capacity` slots (at least one)
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            concurrent_limit: Arc::new(Semaphore::new(capacity)),
            active_downloads: Arc::new(Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    async fn register(&self, id: &TaskId, token: CancellationToken) {
        self.active_downloads.lock().await.insert(id.clone(), token);
    }

    async fn unregister(&self, id: &TaskId) {
        self.active_downloads.lock().await.remove(id);
    }
}

/// Handle to one submitted task
///
/// Dropping the handle does not stop the work; use [`DownloadHandle::cancel`] or
/// [`MediaDownloader::cancel`] for that.
#[derive(Debug)]
pub struct DownloadHandle {
    task_id: TaskId,
    cancel: CancellationToken,
    join: Option<JoinHandle<TaskOutcome>>,
    finished: Option<TaskOutcome>,
}

impl DownloadHandle {
    /// Id of the task this handle belongs to
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Request cancellation of the task
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task to finish
    ///
    /// Transfer failures are reported as [`TaskOutcome::Failed`]; an `Err` means the
    /// worker itself was lost.
    pub async fn wait(self) -> Result<TaskOutcome> {
        if let Some(outcome) = self.finished {
            return Ok(outcome);
        }
        let join = self.join.ok_or_else(|| worker_lost(&self.task_id, "already joined"))?;
        join.await
            .map_err(|e| worker_lost(&self.task_id, &e.to_string()))
    }

    /// Wait for the task to finish, giving up after `timeout`
    ///
    /// Returns `Ok(None)` on timeout. The task keeps running; only the wait stops.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<TaskOutcome>> {
        if let Some(outcome) = &self.finished {
            return Ok(Some(outcome.clone()));
        }
        let join = self
            .join
            .as_mut()
            .ok_or_else(|| worker_lost(&self.task_id, "already joined"))?;

        match tokio::time::timeout(timeout, join).await {
            Ok(Ok(outcome)) => {
                self.join = None;
                self.finished = Some(outcome.clone());
                Ok(Some(outcome))
            }
            Ok(Err(e)) => {
                self.join = None;
                Err(worker_lost(&self.task_id, &e.to_string()))
            }
            Err(_) => Ok(None),
        }
    }
}

fn worker_lost(id: &TaskId, reason: &str) -> Error {
    Error::Other(format!("download worker for task {id} was lost: {reason}"))
}

/// Progress sink handed to the backend for one execution
struct TaskProgressSink<'a> {
    task_id: &'a TaskId,
    registry: &'a TaskRegistry,
    bus: &'a ProgressBus,
    resolver: ProgressResolver,
}

impl ProgressSink for TaskProgressSink<'_> {
    fn report(&self, tick: RawProgress) {
        let progress = self.resolver.resolve(&tick);
        let speed_bps = tick.speed_bps.map(|speed| speed.round() as u64);

        let Some(recorded) = self.registry.record_progress(self.task_id, progress, speed_bps)
        else {
            tracing::trace!(task_id = %self.task_id, ?progress, "Dropped out-of-order progress");
            return;
        };

        self.bus.publish(&ProgressEvent {
            task_id: self.task_id.clone(),
            progress: recorded,
            speed_bps,
            downloaded_bytes: tick.downloaded_bytes,
            total_bytes: tick.total_bytes.or(tick.total_bytes_estimate),
        });
    }
}

impl MediaDownloader {
    /// Submit a pending task to the worker pool
    ///
    /// The task moves to `Queued` immediately and to `Downloading` once a worker slot is
    /// free. A task can only be started once; starting it again fails with
    /// [`DownloadError::InvalidState`].
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun
    /// - [`Error::TaskNotFound`] if no such task exists
    /// - [`Error::Download`] if the task is not `Pending`
    /// - [`Error::Io`] if the output directory cannot be created (the task is failed)
    pub async fn start_download(&self, id: &TaskId) -> Result<DownloadHandle> {
        if !self.scheduler.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let task = self.registry.begin_queue(id)?;

        if let Err(e) = tokio::fs::create_dir_all(&task.output_directory).await {
            let message = format!(
                "Failed to create output directory '{}': {}",
                task.output_directory.display(),
                e
            );
            self.record_failure(id, TransferFailure::new(FailureKind::Generic, message.clone()));
            return Err(Error::Io(std::io::Error::new(e.kind(), message)));
        }

        let cancel = CancellationToken::new();
        self.scheduler.register(id, cancel.clone()).await;

        // Shutdown may have begun while the directory was created; it only waits
        // for tasks it can see in the active map
        if !self.scheduler.is_accepting() {
            self.record_failure(
                id,
                TransferFailure::new(FailureKind::Cancelled, "download engine is shutting down"),
            );
            self.scheduler.unregister(id).await;
            return Err(Error::ShuttingDown);
        }

        tracing::debug!(task_id = %id, "Task queued");

        let downloader = self.clone();
        let worker_cancel = cancel.clone();
        let join = tokio::spawn(async move { downloader.run_task(task, worker_cancel).await });

        Ok(DownloadHandle {
            task_id: id.clone(),
            cancel,
            join: Some(join),
            finished: None,
        })
    }

    /// Request cancellation of a queued or running task
    ///
    /// Returns once the request is signalled; the task reaches `Failed` with
    /// [`FailureKind::Cancelled`] when its worker observes it.
    pub async fn cancel(&self, id: &TaskId) -> Result<()> {
        if self.registry.get(id).is_none() {
            return Err(Error::TaskNotFound(id.clone()));
        }

        let active = self.scheduler.active_downloads.lock().await;
        let token = active
            .get(id)
            .ok_or_else(|| DownloadError::NotActive { id: id.clone() })?;
        token.cancel();

        tracing::info!(task_id = %id, "Cancellation requested");
        Ok(())
    }

    /// Number of tasks currently queued for or holding a worker slot
    pub async fn active_count(&self) -> usize {
        self.scheduler.active_downloads.lock().await.len()
    }

    /// Worker body: wait for a slot, transfer, record the outcome
    async fn run_task(self, task: Task, cancel: CancellationToken) -> TaskOutcome {
        let id = task.id.clone();
        let result = self.execute(task, &cancel).await;

        let outcome = match result {
            Ok(path) => self.record_completion(&id, path),
            Err(failure) => self.record_failure(&id, failure),
        };

        self.scheduler.unregister(&id).await;
        outcome
    }

    async fn execute(
        &self,
        task: Task,
        cancel: &CancellationToken,
    ) -> std::result::Result<PathBuf, TransferFailure> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferFailure::cancelled()),
            permit = self.scheduler.concurrent_limit.clone().acquire_owned() => permit,
        };
        let _permit = permit.map_err(|_| {
            TransferFailure::new(FailureKind::Generic, "worker pool is closed")
        })?;

        if cancel.is_cancelled() {
            return Err(TransferFailure::cancelled());
        }
        if !self.registry.mark_downloading(&task.id) {
            return Err(TransferFailure::new(
                FailureKind::Generic,
                "task was removed before it started",
            ));
        }

        tracing::info!(
            task_id = %task.id,
            platform = %task.platform,
            backend = self.backend.name(),
            "Download started"
        );
        self.emit_event(Event::Started {
            id: task.id.clone(),
        });

        let sink = TaskProgressSink {
            task_id: &task.id,
            registry: &self.registry,
            bus: &self.progress_bus,
            resolver: ProgressResolver::new(),
        };

        let transfer = AssertUnwindSafe(self.backend.transfer(&task, &sink, cancel.clone()))
            .catch_unwind()
            .await;

        match transfer {
            Ok(Ok(path)) => Ok(path),
            Ok(Err(_)) if cancel.is_cancelled() => Err(TransferFailure::cancelled()),
            Ok(Err(e)) => Err(TransferFailure::from_error(e)),
            Err(_) => Err(TransferFailure::new(
                FailureKind::Generic,
                "retrieval backend panicked",
            )),
        }
    }

    /// Terminal events are only emitted for tasks still in the registry
    fn record_completion(&self, id: &TaskId, path: PathBuf) -> TaskOutcome {
        let Some(previous) = self.registry.complete(id, path.clone()) else {
            tracing::debug!(task_id = %id, "Completed task is no longer registered");
            return TaskOutcome::Completed { path };
        };
        if previous != Progress::Exact(100.0) {
            self.progress_bus.publish(&ProgressEvent {
                task_id: id.clone(),
                progress: Progress::Exact(100.0),
                speed_bps: None,
                downloaded_bytes: None,
                total_bytes: None,
            });
        }

        tracing::info!(task_id = %id, path = %path.display(), "Download completed");
        self.emit_event(Event::Completed {
            id: id.clone(),
            path: path.clone(),
        });
        TaskOutcome::Completed { path }
    }

    fn record_failure(&self, id: &TaskId, failure: TransferFailure) -> TaskOutcome {
        if !self.registry.fail(id, &failure) {
            tracing::debug!(task_id = %id, kind = %failure.kind, "Failed task is no longer registered");
            return TaskOutcome::Failed { failure };
        }

        tracing::warn!(
            task_id = %id,
            kind = %failure.kind,
            error = %failure.message,
            "Download failed"
        );
        self.emit_event(Event::Failed {
            id: id.clone(),
            kind: failure.kind,
            error: failure.message.clone(),
        });
        TaskOutcome::Failed { failure }
    }
}
