//! Shared test helpers for creating MediaDownloader instances in tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    MediaMetadata, ProgressSink, RawProgress, RetrievalBackend, TransferFailure,
};
use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::{Error, Result};
use crate::types::Task;

/// Title returned by [`ScriptedBackend`] when no metadata error is scripted
pub(crate) const SCRIPTED_TITLE: &str = "Scripted title";

/// Fake retrieval backend driven by a script
///
/// Transfers replay `ticks` (with `tick_delay` between them), wait `hold`, then either
/// fail with the scripted failure or write a small file into the task's output
/// directory. Cancellation is honored between every step.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    metadata_errors: Mutex<VecDeque<String>>,
    ticks: Vec<RawProgress>,
    tick_delay: Duration,
    hold: Duration,
    failure: Option<TransferFailure>,
    panic_on_transfer: bool,
    pub(crate) metadata_calls: AtomicUsize,
    pub(crate) transfers: AtomicUsize,
    running: AtomicUsize,
    pub(crate) peak_running: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail the next metadata lookups with these engine messages, in order
    pub(crate) fn with_metadata_errors(self, messages: &[&str]) -> Self {
        *self.metadata_errors.lock().unwrap() = messages.iter().map(|m| m.to_string()).collect();
        self
    }

    pub(crate) fn with_ticks(mut self, ticks: Vec<RawProgress>) -> Self {
        self.ticks = ticks;
        self
    }

    /// Report each value as a downloaded/total byte ratio out of 1000 bytes
    pub(crate) fn with_percent_ticks(self, percents: &[u64]) -> Self {
        let ticks = percents
            .iter()
            .map(|p| RawProgress {
                downloaded_bytes: Some(p * 10),
                total_bytes: Some(1000),
                speed_bps: Some(2048.0),
                ..RawProgress::default()
            })
            .collect();
        self.with_ticks(ticks)
    }

    pub(crate) fn with_tick_delay(mut self, delay: Duration) -> Self {
        self.tick_delay = delay;
        self
    }

    /// Keep every transfer busy for `hold` after its ticks
    pub(crate) fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// Fail every transfer with a failure classified from `message`
    pub(crate) fn failing_with(mut self, message: &str) -> Self {
        self.failure = Some(TransferFailure::classify(message));
        self
    }

    pub(crate) fn panicking(mut self) -> Self {
        self.panic_on_transfer = true;
        self
    }

    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        if duration.is_zero() {
            return if cancel.is_cancelled() {
                Err(Error::Transfer(TransferFailure::cancelled()))
            } else {
                Ok(())
            };
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Transfer(TransferFailure::cancelled())),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn run(
        &self,
        task: &Task,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        for tick in &self.ticks {
            self.pause(Duration::ZERO, cancel).await?;
            progress.report(tick.clone());
            self.pause(self.tick_delay, cancel).await?;
        }
        self.pause(self.hold, cancel).await?;

        if let Some(failure) = &self.failure {
            return Err(Error::Transfer(failure.clone()));
        }

        let path = task
            .output_directory
            .join(format!("{}.{}", task.id, task.container_format));
        tokio::fs::write(&path, b"scripted media").await?;
        Ok(path)
    }
}

#[async_trait]
impl RetrievalBackend for ScriptedBackend {
    async fn extract_metadata(&self, url: &str) -> Result<MediaMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.metadata_errors.lock().unwrap().pop_front();
        match scripted {
            Some(reason) => Err(Error::MetadataExtraction {
                url: url.to_string(),
                reason,
            }),
            None => Ok(MediaMetadata {
                title: SCRIPTED_TITLE.to_string(),
                uploader: Some("uploader".to_string()),
                duration_secs: Some(42.0),
                ..MediaMetadata::default()
            }),
        }
    }

    async fn transfer(
        &self,
        task: &Task,
        progress: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_transfer {
            panic!("scripted backend panic");
        }

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(running, Ordering::SeqCst);
        let result = self.run(task, progress, &cancel).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Config pointing every directory into `root`, with fast retries
pub(crate) fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.download.default_output_dir = root.join("downloads");
    config.download.max_workers = 2;
    config.download.shutdown_timeout = Duration::from_secs(2);
    config.tools.search_path = false;
    config.credentials.cookies_dir = root.join("cookies");
    config.credentials.scan_cookies_on_start = false;
    config.metadata.metadata_retry.initial_delay = Duration::from_millis(5);
    config.metadata.metadata_retry.max_delay = Duration::from_millis(20);
    config.metadata.metadata_retry.jitter = false;
    config
}

/// Helper to create a test MediaDownloader backed by a default [`ScriptedBackend`].
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (MediaDownloader, tempfile::TempDir) {
    let (downloader, _backend, temp_dir) =
        create_test_downloader_with(ScriptedBackend::new(), |_| {});
    (downloader, temp_dir)
}

/// Helper to create a test MediaDownloader around `backend`, after letting the caller
/// adjust the config. Returns the backend too, for inspecting its counters.
pub(crate) fn create_test_downloader_with(
    backend: ScriptedBackend,
    configure: impl FnOnce(&mut Config),
) -> (MediaDownloader, Arc<ScriptedBackend>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    configure(&mut config);

    let backend = Arc::new(backend);
    let downloader = MediaDownloader::with_backend(config, backend.clone()).unwrap();
    (downloader, backend, temp_dir)
}
