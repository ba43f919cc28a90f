//! Traits and types for retrieval backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::types::Task;

/// Description of the media behind a URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Media title
    pub title: String,
    /// Duration in seconds
    pub duration_secs: Option<f64>,
    /// Uploader or channel name
    pub uploader: Option<String>,
    /// View count
    pub view_count: Option<u64>,
    /// Available formats
    pub formats: Vec<FormatInfo>,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
    /// Description text
    pub description: Option<String>,
    /// Upload date as reported by the platform (YYYYMMDD)
    pub upload_date: Option<String>,
}

/// One downloadable rendition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    /// Engine format id
    pub format_id: String,
    /// File extension
    pub ext: Option<String>,
    /// Video height in pixels
    pub height: Option<u32>,
    /// Video width in pixels
    pub width: Option<u32>,
    /// Frames per second
    pub fps: Option<f64>,
    /// Video codec ("none" for audio-only formats)
    pub vcodec: Option<String>,
    /// Audio codec ("none" for video-only formats)
    pub acodec: Option<String>,
    /// Size in bytes, exact or approximate
    pub filesize: Option<u64>,
    /// Free-form note (e.g. "1080p")
    pub format_note: Option<String>,
}

/// Stage of a raw engine tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TickStatus {
    /// Bytes are still arriving
    #[default]
    Downloading,
    /// The engine finished fetching this file
    Finished,
}

/// One unprocessed progress tick as the engine reports it
///
/// Every field is optional because engines report very different amounts of detail
/// depending on the protocol (plain HTTP, HLS fragments, live streams).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProgress {
    /// Tick stage
    pub status: TickStatus,
    /// Bytes received so far
    pub downloaded_bytes: Option<u64>,
    /// Exact total size
    pub total_bytes: Option<u64>,
    /// Engine's estimate of the total size
    pub total_bytes_estimate: Option<u64>,
    /// Engine-formatted percentage (e.g. " 42.0%")
    pub percent_str: Option<String>,
    /// Speed in bytes per second
    pub speed_bps: Option<f64>,
    /// Estimated seconds remaining
    pub eta_secs: Option<u64>,
}

/// Receiver for raw progress ticks
///
/// Called synchronously from within [`RetrievalBackend::transfer`], on the worker that
/// runs the transfer. Implementations must be quick and must not block.
pub trait ProgressSink: Send + Sync {
    /// Handle one tick
    fn report(&self, tick: RawProgress);
}

/// Trait for media retrieval engines
///
/// Implementations translate a [`Task`] into an engine invocation. They must honor
/// the cancellation token by aborting the engine call and returning a
/// [`FailureKind::Cancelled`](super::FailureKind::Cancelled) transfer failure.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Describe the media behind `url` without downloading it
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataExtraction`](crate::Error::MetadataExtraction) when the
    /// engine cannot describe the URL.
    async fn extract_metadata(&self, url: &str) -> crate::Result<MediaMetadata>;

    /// Fetch the media for `task` into its output directory
    ///
    /// Returns the path of the final file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transfer`](crate::Error::Transfer) with a categorized failure
    /// when the engine fails or the transfer is cancelled.
    async fn transfer(
        &self,
        task: &Task,
        progress: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> crate::Result<PathBuf>;

    /// Name of this backend implementation
    fn name(&self) -> &'static str;
}
