//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{FailureKind, TransferFailure};
use crate::error::Error;
use crate::platform::Platform;

/// Title used when metadata lookup fails or is disabled
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Unique identifier for a task
///
/// Built from the creation time in milliseconds, a digest prefix of the source URL
/// and a process-wide sequence number, so two tasks for the same URL never collide.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh id for a task created from `url`
    pub fn generate(url: &str) -> Self {
        static SEQUENCE: AtomicU64 = AtomicU64::new(0);

        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let digest = Sha256::digest(url.as_bytes());
        let url_hash: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();

        Self(format!(
            "{}_{}_{}",
            Utc::now().timestamp_millis(),
            url_hash,
            sequence
        ))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested quality of the downloaded media
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Quality {
    /// Best available rendition
    #[default]
    Best,
    /// Worst available rendition
    Worst,
    /// Best rendition whose height does not exceed the given number of pixels
    MaxHeight(u32),
}

impl std::str::FromStr for Quality {
    type Err = Error;

    /// Accepts `best`, `worst`, or a height such as `720` / `720p`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "best" => Ok(Quality::Best),
            "worst" => Ok(Quality::Worst),
            other => {
                let digits = other.strip_suffix('p').unwrap_or(other);
                match digits.parse::<u32>() {
                    Ok(height) if height > 0 => Ok(Quality::MaxHeight(height)),
                    _ => Err(Error::Config {
                        message: format!("invalid quality selector '{s}'"),
                        key: Some("quality".to_string()),
                    }),
                }
            }
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quality::Best => f.write_str("best"),
            Quality::Worst => f.write_str("worst"),
            Quality::MaxHeight(height) => write!(f, "{height}"),
        }
    }
}

impl Serialize for Quality {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Task status
///
/// Transitions only move forward: `Pending → Queued → Downloading → Completed | Failed`.
/// A queued task may also go straight to `Failed` when it is cancelled before a worker
/// picks it up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, not yet submitted
    Pending,
    /// Submitted, waiting for a free worker slot
    Queued,
    /// A worker is transferring the media
    Downloading,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl Status {
    /// Whether the task has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    /// Whether the task is queued or running
    pub fn is_active(&self) -> bool {
        matches!(self, Status::Queued | Status::Downloading)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Pending => "pending",
            Status::Queued => "queued",
            Status::Downloading => "downloading",
            Status::Completed => "completed",
            Status::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Progress of a task in percent
///
/// Only [`Progress::Exact`] is derived from real byte counts or engine-reported
/// percentages. The other two variants are indeterminate: they signal liveness and
/// must not be read as a completion fraction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "percent", rename_all = "snake_case")]
pub enum Progress {
    /// Completion fraction known from the engine
    Exact(f32),
    /// Rough guess from bytes received so far, capped below 100
    Estimated(f32),
    /// Nothing quantitative is known; value cycles to show activity
    Activity(f32),
}

impl Progress {
    /// Exact progress clamped to `0..=100`
    pub fn exact(percent: f32) -> Self {
        Progress::Exact(clamp_percent(percent))
    }

    /// Percent value of any variant
    pub fn percent(&self) -> f32 {
        match *self {
            Progress::Exact(p) | Progress::Estimated(p) | Progress::Activity(p) => p,
        }
    }

    /// Whether this value is an estimate or activity pulse rather than a real fraction
    pub fn is_indeterminate(&self) -> bool {
        !matches!(self, Progress::Exact(_))
    }
}

impl Default for Progress {
    fn default() -> Self {
        Progress::Exact(0.0)
    }
}

pub(crate) fn clamp_percent(percent: f32) -> f32 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

/// Per-task options supplied when a task is created
///
/// Unset fields fall back to the platform preference and then the global config.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Quality selector override
    #[serde(default)]
    pub quality: Option<Quality>,

    /// Container format override (e.g. "mp4", "webm")
    #[serde(default)]
    pub container_format: Option<String>,

    /// Download the audio track only
    #[serde(default)]
    pub audio_only: bool,
}

/// A requested download and its execution state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id
    pub id: TaskId,
    /// URL the media is fetched from
    pub source_url: String,
    /// Directory the final file is written into
    pub output_directory: PathBuf,
    /// Quality selector
    pub quality: Quality,
    /// Container format (e.g. "mp4")
    pub container_format: String,
    /// Audio-only download
    pub audio_only: bool,
    /// Platform the URL was classified as
    pub platform: Platform,
    /// Media title ("Unknown" when metadata lookup failed)
    pub title: String,
    /// Uploader, if metadata lookup succeeded
    pub uploader: Option<String>,
    /// Duration in seconds, if metadata lookup succeeded
    pub duration_secs: Option<f64>,
    /// Current status
    pub status: Status,
    /// Latest recorded progress
    pub progress: Progress,
    /// Latest reported transfer speed in bytes per second
    pub speed_bps: Option<u64>,
    /// Path of the finished file
    pub result_path: Option<PathBuf>,
    /// Error message when the task failed
    pub error_message: Option<String>,
    /// Category of the failure when the task failed
    pub failure: Option<FailureKind>,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When a worker started transferring
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

/// A single progress update delivered to observers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Task the update belongs to
    pub task_id: TaskId,
    /// Progress value (check [`Progress::is_indeterminate`])
    pub progress: Progress,
    /// Instantaneous speed in bytes per second, if known
    pub speed_bps: Option<u64>,
    /// Bytes received so far, if known
    pub downloaded_bytes: Option<u64>,
    /// Total size in bytes, if known
    pub total_bytes: Option<u64>,
}

/// Final result of one task execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The media was written to `path`
    Completed {
        /// Final file path
        path: PathBuf,
    },
    /// The transfer failed
    Failed {
        /// Categorized failure
        failure: TransferFailure,
    },
}

impl TaskOutcome {
    /// Whether the task completed successfully
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed { .. })
    }
}

/// Lifecycle events broadcast to subscribers
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A task was created
    Added {
        /// Task id
        id: TaskId,
        /// Classified platform
        platform: Platform,
        /// Title from metadata (or "Unknown")
        title: String,
    },
    /// A worker started transferring a task
    Started {
        /// Task id
        id: TaskId,
    },
    /// A task finished successfully
    Completed {
        /// Task id
        id: TaskId,
        /// Final file path
        path: PathBuf,
    },
    /// A task failed
    Failed {
        /// Task id
        id: TaskId,
        /// Failure category
        kind: FailureKind,
        /// Error message
        error: String,
    },
    /// A task was removed from the registry
    Removed {
        /// Task id
        id: TaskId,
    },
    /// The downloader finished shutting down
    Shutdown,
}
