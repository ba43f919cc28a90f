//! Task creation, lookup and removal.

use chrono::Utc;
use std::path::PathBuf;

use crate::backend::MediaMetadata;
use crate::config::PlatformConfig;
use crate::error::{Error, Result};
use crate::platform::PlatformResolver;
use crate::retry::retry_with_backoff;
use crate::types::{Event, Progress, Status, Task, TaskId, TaskOptions, UNKNOWN_TITLE};

use super::MediaDownloader;

impl MediaDownloader {
    /// Create a task for `url`
    ///
    /// The URL is classified by host, checked against the platform policy and
    /// described through the backend. A failed metadata lookup is logged and the task
    /// is created with the title `"Unknown"`. The task starts out `Pending`; pass its
    /// id to [`start_download`](Self::start_download) to run it.
    ///
    /// Unset options fall back to the platform's preferred quality and then the
    /// configured defaults. `output_directory` defaults to
    /// `Config.download.default_output_dir`.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once shutdown has begun
    /// - [`Error::PlatformDisabled`] if the URL's platform is disabled; nothing is created
    pub async fn add_task(
        &self,
        url: &str,
        output_directory: Option<PathBuf>,
        options: TaskOptions,
    ) -> Result<TaskId> {
        if !self.scheduler.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let url = url.trim();
        let platform = PlatformResolver::resolve(url);
        if !self.config.is_platform_enabled(platform) {
            tracing::warn!(url, platform = %platform, "Rejected task for disabled platform");
            return Err(Error::PlatformDisabled { platform });
        }

        let download = &self.config.download;
        let quality = options
            .quality
            .or_else(|| {
                self.config
                    .platform(platform)
                    .and_then(PlatformConfig::preferred_quality)
            })
            .unwrap_or(download.default_quality);
        let container_format = options
            .container_format
            .filter(|format| !format.trim().is_empty())
            .unwrap_or_else(|| download.default_format.clone());

        let metadata = if self.config.metadata.fetch_metadata {
            self.lookup_metadata(url).await
        } else {
            None
        };
        let (title, uploader, duration_secs) = match metadata {
            Some(meta) => (meta.title, meta.uploader, meta.duration_secs),
            None => (UNKNOWN_TITLE.to_string(), None, None),
        };

        let task = Task {
            id: TaskId::generate(url),
            source_url: url.to_string(),
            output_directory: output_directory
                .unwrap_or_else(|| download.default_output_dir.clone()),
            quality,
            container_format,
            audio_only: options.audio_only,
            platform,
            title,
            uploader,
            duration_secs,
            status: Status::Pending,
            progress: Progress::default(),
            speed_bps: None,
            result_path: None,
            error_message: None,
            failure: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let id = task.id.clone();

        tracing::info!(
            task_id = %id,
            platform = %platform,
            title = %task.title,
            "Task added"
        );
        let title = task.title.clone();
        self.registry.insert(task);
        self.emit_event(Event::Added {
            id: id.clone(),
            platform,
            title,
        });

        Ok(id)
    }

    /// Best-effort metadata lookup, retried on transient errors
    async fn lookup_metadata(&self, url: &str) -> Option<MediaMetadata> {
        let backend = &self.backend;
        let result = retry_with_backoff(&self.config.metadata.metadata_retry, move || {
            backend.extract_metadata(url)
        })
        .await;

        match result {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!(url, error = %e, "Metadata lookup failed, continuing without it");
                None
            }
        }
    }

    /// Get a snapshot of a task
    pub fn get_task(&self, id: &TaskId) -> Result<Task> {
        self.registry
            .get(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))
    }

    /// Snapshots of every task, in no particular order
    pub fn list_tasks(&self) -> Vec<Task> {
        self.registry.list()
    }

    /// Remove a task; removing an unknown id is a no-op
    ///
    /// A queued or running task is cancelled first. Returns whether a task was removed.
    pub async fn remove_task(&self, id: &TaskId) -> bool {
        if let Some(token) = self.scheduler.active_downloads.lock().await.get(id) {
            token.cancel();
        }

        if self.registry.remove(id).is_none() {
            return false;
        }

        tracing::info!(task_id = %id, "Task removed");
        self.emit_event(Event::Removed { id: id.clone() });
        true
    }

    /// Remove every completed or failed task, returning how many were removed
    pub fn remove_finished_tasks(&self) -> usize {
        let removed = self.registry.remove_finished();
        for id in &removed {
            self.emit_event(Event::Removed { id: id.clone() });
        }
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "Removed finished tasks");
        }
        removed.len()
    }
}
