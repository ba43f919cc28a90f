//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`tasks`] - Task creation, lookup and removal
//! - [`scheduler`] - Bounded worker pool and per-task execution
//! - [`batch`] - Batch and one-shot download helpers
//! - [`lifecycle`] - Shutdown coordination
//! - `registry` - In-memory task store

mod batch;
mod lifecycle;
mod registry;
mod scheduler;
mod tasks;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use batch::BatchReport;
pub use scheduler::DownloadHandle;

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::backend::{BackendSettings, RetrievalBackend, UnavailableBackend, YtDlpBackend};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::platform::Platform;
use crate::progress_bus::{ObserverId, ProgressBus};
use crate::speed_profile::SpeedProfile;
use crate::types::{Event, ProgressEvent};

use registry::TaskRegistry;
use scheduler::Scheduler;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Retrieval engine (trait object for pluggable implementations)
    pub(crate) backend: Arc<dyn RetrievalBackend>,
    /// Tasks owned by this instance
    pub(crate) registry: TaskRegistry,
    /// Progress fan-out
    pub(crate) progress_bus: ProgressBus,
    /// Per-platform credential bundles
    pub(crate) credentials: CredentialStore,
    /// Worker pool state
    pub(crate) scheduler: Scheduler,
    /// Speed profile resolved at construction
    pub(crate) speed_profile: SpeedProfile,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Loads cookie files from the credentials directory (if enabled)
    /// - Resolves the speed profile (`auto` is evaluated once, here)
    /// - Picks the retrieval backend: the configured `yt_dlp_path`, else `yt-dlp` on
    ///   PATH, else a stub that fails every transfer
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let credentials = CredentialStore::new();
        if config.credentials.scan_cookies_on_start {
            let dir = &config.credentials.cookies_dir;
            if let Err(e) = credentials.scan_dir(dir).await {
                tracing::warn!(
                    cookies_dir = %dir.display(),
                    error = %e,
                    "Failed to scan cookies directory, continuing without credentials"
                );
            }
        }

        let config = Arc::new(config);
        let settings = BackendSettings::from_config(config.clone(), credentials.clone());

        let backend: Arc<dyn RetrievalBackend> = if let Some(ref path) = config.tools.yt_dlp_path
        {
            // Use explicitly configured binary path
            Arc::new(YtDlpBackend::new(path.clone(), settings.clone()))
        } else if config.tools.search_path {
            // Search PATH for yt-dlp
            YtDlpBackend::from_path(settings.clone())
                .map(|b| Arc::new(b) as Arc<dyn RetrievalBackend>)
                .unwrap_or_else(|| Arc::new(UnavailableBackend))
        } else {
            // No binary configured and PATH search disabled
            Arc::new(UnavailableBackend)
        };

        Ok(Self::assemble(config, backend, credentials, settings.profile))
    }

    /// Create a downloader around a caller-supplied retrieval backend
    ///
    /// No binaries are looked up and the cookies directory is not scanned; register
    /// credentials through [`credentials`](Self::credentials) if the backend uses them.
    pub fn with_backend(config: Config, backend: Arc<dyn RetrievalBackend>) -> Result<Self> {
        config.validate()?;
        let profile = config.speed_profile.resolve().clone();
        Ok(Self::assemble(
            Arc::new(config),
            backend,
            CredentialStore::new(),
            profile,
        ))
    }

    fn assemble(
        config: Arc<Config>,
        backend: Arc<dyn RetrievalBackend>,
        credentials: CredentialStore,
        speed_profile: SpeedProfile,
    ) -> Self {
        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);
        let scheduler = Scheduler::new(config.download.max_workers);

        tracing::info!(
            backend = backend.name(),
            speed_profile = %speed_profile.name,
            max_workers = scheduler.capacity(),
            "Media downloader initialized"
        );

        Self {
            event_tx,
            config,
            backend,
            registry: TaskRegistry::new(),
            progress_bus: ProgressBus::new(),
            credentials,
            scheduler,
            speed_profile,
        }
    }

    /// Subscribe to lifecycle events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, MediaDownloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = MediaDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "download event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Progress fan-out shared by every task of this instance
    ///
    /// Observers registered here run on the worker performing the transfer; see
    /// [`ProgressBus`] for the threading contract.
    pub fn progress_bus(&self) -> &ProgressBus {
        &self.progress_bus
    }

    /// Receive progress events through a channel instead of an inline observer
    pub fn subscribe_progress(&self) -> (ObserverId, mpsc::UnboundedReceiver<ProgressEvent>) {
        self.progress_bus.channel()
    }

    /// Per-platform credential bundles used by the backend
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Speed profile resolved when this instance was created
    pub fn speed_profile(&self) -> &SpeedProfile {
        &self.speed_profile
    }

    /// Name of the retrieval backend in use
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Maximum number of concurrent transfers
    pub fn max_workers(&self) -> usize {
        self.scheduler.capacity()
    }

    /// Platforms a URL can be classified as, with whether each is enabled
    pub fn supported_platforms(&self) -> Vec<(Platform, bool)> {
        Platform::ALL
            .iter()
            .map(|&platform| (platform, self.config.is_platform_enabled(platform)))
            .collect()
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
