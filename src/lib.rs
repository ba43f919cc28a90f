//! # media-dl
//!
//! Backend library for media download applications: classify URLs by platform,
//! describe and fetch media through a pluggable retrieval engine (yt-dlp by default),
//! run transfers on a bounded worker pool and report progress to observers.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Engine-agnostic** - The retrieval engine sits behind the [`RetrievalBackend`] trait
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Event-driven** - Consumers subscribe to progress and lifecycle events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, MediaDownloader, TaskOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default()).await?;
//!
//!     // Hand progress off to another task
//!     let (_observer, mut progress) = downloader.subscribe_progress();
//!     tokio::spawn(async move {
//!         while let Some(event) = progress.recv().await {
//!             println!("{}: {:.1}%", event.task_id, event.progress.percent());
//!         }
//!     });
//!
//!     let id = downloader
//!         .add_task("https://www.youtube.com/watch?v=abc", None, TaskOptions::default())
//!         .await?;
//!     let outcome = downloader.start_download(&id).await?.wait().await?;
//!     println!("{outcome:?}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Retrieval engine abstraction and the yt-dlp implementation
pub mod backend;
/// Configuration types
pub mod config;
/// Per-platform credential bundles
pub mod credentials;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// URL to platform classification
pub mod platform;
/// Progress event fan-out
pub mod progress_bus;
/// Retry logic with exponential backoff
pub mod retry;
/// Transfer tuning presets
pub mod speed_profile;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use backend::{
    FailureKind, MediaMetadata, ProgressSink, RawProgress, RetrievalBackend, TickStatus,
    TransferFailure, UnavailableBackend, YtDlpBackend,
};
pub use config::{Config, PlatformConfig};
pub use credentials::{CredentialBundle, CredentialStore};
pub use downloader::{BatchReport, DownloadHandle, MediaDownloader};
pub use error::{DownloadError, Error, Result};
pub use platform::{Platform, PlatformResolver};
pub use progress_bus::{ObserverError, ObserverId, ProgressBus, ProgressObserver};
pub use speed_profile::{ProfileName, SpeedProfile, SpeedProfileSelection};
pub use types::{
    Event, Progress, ProgressEvent, Quality, Status, Task, TaskId, TaskOptions, TaskOutcome,
};

/// Run the downloader until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to Ctrl+C if the handlers
///   cannot be registered.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, MediaDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = MediaDownloader::new(Config::default()).await?;
///     run_with_shutdown(downloader).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
