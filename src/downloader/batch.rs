//! Batch and one-shot download helpers.

use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{TaskId, TaskOptions, TaskOutcome};

use super::{DownloadHandle, MediaDownloader};

/// Result of [`MediaDownloader::download_batch`]
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    /// Outcome of every task that was started, in URL order
    pub outcomes: Vec<(TaskId, TaskOutcome)>,
    /// URLs that could not be added or started, with the reason
    pub rejected: Vec<(String, String)>,
    /// URLs not attempted because the batch was cancelled
    pub skipped: Vec<String>,
}

impl BatchReport {
    /// Number of tasks that completed successfully
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_completed())
            .count()
    }
}

impl MediaDownloader {
    /// Add and start every URL, then wait for all of them
    ///
    /// `cancel` is checked between URLs only: once it fires the remaining URLs are
    /// reported as skipped, while tasks already started run to completion.
    ///
    /// URLs that fail to add or start (disabled platform, shutdown) are collected in
    /// [`BatchReport::rejected`] instead of aborting the batch.
    pub async fn download_batch<I, S>(
        &self,
        urls: I,
        output_directory: Option<PathBuf>,
        options: TaskOptions,
        cancel: CancellationToken,
    ) -> Result<BatchReport>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut report = BatchReport::default();
        let mut handles: Vec<DownloadHandle> = Vec::new();

        for url in urls {
            let url = url.into();
            if cancel.is_cancelled() {
                report.skipped.push(url);
                continue;
            }

            let started = match self
                .add_task(&url, output_directory.clone(), options.clone())
                .await
            {
                Ok(id) => self.start_download(&id).await,
                Err(e) => Err(e),
            };

            match started {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Batch entry rejected");
                    report.rejected.push((url, e.to_string()));
                }
            }
        }

        if !report.skipped.is_empty() {
            tracing::info!(skipped = report.skipped.len(), "Batch cancelled");
        }

        for handle in handles {
            let id = handle.task_id().clone();
            let outcome = handle.wait().await?;
            report.outcomes.push((id, outcome));
        }

        tracing::info!(
            completed = report.completed(),
            failed = report.outcomes.len() - report.completed(),
            rejected = report.rejected.len(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Add a task, start it and wait for its outcome
    pub async fn quick_download(
        &self,
        url: &str,
        output_directory: Option<PathBuf>,
        options: TaskOptions,
    ) -> Result<TaskOutcome> {
        let id = self.add_task(url, output_directory, options).await?;
        self.start_download(&id).await?.wait().await
    }
}
