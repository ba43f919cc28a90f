//! Retrieval backends
//!
//! This module abstracts the engine that actually fetches media. It mirrors a
//! plug-in layout: a trait, a CLI-driven implementation and a stub for graceful
//! degradation when no engine is installed.
//!
//! ## Architecture
//!
//! The core abstraction is the [`RetrievalBackend`] trait. Implementations:
//!
//! - [`YtDlpBackend`]: drives the external `yt-dlp` binary
//! - [`UnavailableBackend`]: stub used when `yt-dlp` cannot be found
//!
//! Shared pieces used by any backend:
//!
//! - [`EngineOptions`]: layering of speed profile, platform overlay and format selector
//! - [`ProgressResolver`]: turns raw engine ticks into exact or indeterminate progress
//! - [`classify_failure`]: maps engine error text to a [`FailureKind`]
//!
//! ## Usage
//!
//! ```no_run
//! use media_dl::backend::{BackendSettings, RetrievalBackend, YtDlpBackend};
//! use media_dl::{Config, CredentialStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = BackendSettings::from_config(Arc::new(Config::default()), CredentialStore::new());
//!     let backend = YtDlpBackend::from_path(settings).expect("yt-dlp not found in PATH");
//!
//!     let metadata = backend.extract_metadata("https://youtu.be/dQw4w9WgXcQ").await?;
//!     println!("{} ({} formats)", metadata.title, metadata.formats.len());
//!     Ok(())
//! }
//! ```

mod failure;
mod noop;
mod options;
mod progress;
mod traits;
mod ytdlp;

pub use failure::{FailureKind, TransferFailure, classify_failure};
pub use noop::UnavailableBackend;
pub use options::{AudioExtraction, BackendSettings, EngineOptions, format_selector};
pub use progress::{ProgressResolver, parse_progress_line};
pub use traits::{FormatInfo, MediaMetadata, ProgressSink, RawProgress, RetrievalBackend, TickStatus};
pub use ytdlp::YtDlpBackend;
