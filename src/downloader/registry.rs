//! In-memory task registry owned by one downloader instance.

use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backend::TransferFailure;
use crate::error::{DownloadError, Error, Result};
use crate::types::{Progress, Status, Task, TaskId};

/// Task store (cloneable - all clones share the same map)
///
/// Every mutation goes through the write lock, so status transitions are atomic with
/// respect to each other. A poisoned lock is recovered rather than propagated: the map
/// only holds plain data and stays consistent between statements.
#[derive(Clone, Default)]
pub(crate) struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, Task>> {
        self.tasks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, Task>> {
        self.tasks.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn insert(&self, task: Task) {
        self.write().insert(task.id.clone(), task);
    }

    pub(crate) fn get(&self, id: &TaskId) -> Option<Task> {
        self.read().get(id).cloned()
    }

    pub(crate) fn list(&self) -> Vec<Task> {
        self.read().values().cloned().collect()
    }

    pub(crate) fn remove(&self, id: &TaskId) -> Option<Task> {
        self.write().remove(id)
    }

    /// Drop every task in a terminal state, returning their ids
    pub(crate) fn remove_finished(&self) -> Vec<TaskId> {
        let mut tasks = self.write();
        let finished: Vec<TaskId> = tasks
            .values()
            .filter(|task| task.status.is_terminal())
            .map(|task| task.id.clone())
            .collect();
        for id in &finished {
            tasks.remove(id);
        }
        finished
    }

    /// Move a task from `Pending` to `Queued`
    ///
    /// This is the only way into the scheduler, so a task can be started at most once.
    pub(crate) fn begin_queue(&self, id: &TaskId) -> Result<Task> {
        let mut tasks = self.write();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;

        if task.status != Status::Pending {
            return Err(Error::Download(DownloadError::InvalidState {
                id: id.clone(),
                operation: "start".to_string(),
                current_state: task.status,
            }));
        }

        task.status = Status::Queued;
        Ok(task.clone())
    }

    /// Move a task from `Queued` to `Downloading`. Returns false if the task is gone
    /// or not queued.
    pub(crate) fn mark_downloading(&self, id: &TaskId) -> bool {
        let mut tasks = self.write();
        match tasks.get_mut(id) {
            Some(task) if task.status == Status::Queued => {
                task.status = Status::Downloading;
                task.progress = Progress::Exact(0.0);
                task.started_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Record a progress value for a downloading task
    ///
    /// Returns the value that was stored, or `None` if the update was dropped. Once a
    /// real ratio has been reported, lower exact values and indeterminate values are
    /// dropped, so the stored progress never moves backwards within one execution.
    pub(crate) fn record_progress(
        &self,
        id: &TaskId,
        progress: Progress,
        speed_bps: Option<u64>,
    ) -> Option<Progress> {
        let mut tasks = self.write();
        let task = tasks.get_mut(id)?;
        if task.status != Status::Downloading {
            return None;
        }

        if let Progress::Exact(current) = task.progress {
            let accepted = match progress {
                Progress::Exact(next) => next >= current,
                Progress::Estimated(_) | Progress::Activity(_) => current <= 0.0,
            };
            if !accepted {
                return None;
            }
        }

        task.progress = progress;
        if speed_bps.is_some() {
            task.speed_bps = speed_bps;
        }
        Some(progress)
    }

    /// Mark a downloading task completed. Returns the progress it had before, or
    /// `None` if the task is gone or was not downloading.
    pub(crate) fn complete(&self, id: &TaskId, path: PathBuf) -> Option<Progress> {
        let mut tasks = self.write();
        let task = tasks.get_mut(id)?;
        if task.status != Status::Downloading {
            return None;
        }

        let previous = task.progress;
        task.status = Status::Completed;
        task.progress = Progress::Exact(100.0);
        task.result_path = Some(path);
        task.finished_at = Some(Utc::now());
        Some(previous)
    }

    /// Mark a non-terminal task failed. Returns false if the task is gone or already
    /// finished.
    pub(crate) fn fail(&self, id: &TaskId, failure: &TransferFailure) -> bool {
        let mut tasks = self.write();
        match tasks.get_mut(id) {
            Some(task) if !task.status.is_terminal() => {
                task.status = Status::Failed;
                task.error_message = Some(failure.message.clone());
                task.failure = Some(failure.kind);
                task.finished_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }
}
