//! Error types for media-dl
//!
//! Every fallible operation in the library returns [`Result`], whose error side is the
//! single [`Error`] enum. Variants carry enough context (task id, platform, engine
//! message) to diagnose a failure without re-reading logs.

use crate::backend::TransferFailure;
use crate::platform::Platform;
use crate::types::{Status, TaskId};
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_workers")
        key: Option<String>,
    },

    /// The URL belongs to a platform that is disabled by configuration
    #[error("platform {platform} is disabled")]
    PlatformDisabled {
        /// The platform the URL was classified as
        platform: Platform,
    },

    /// The retrieval engine could not describe the media behind a URL
    #[error("metadata extraction failed for {url}: {reason}")]
    MetadataExtraction {
        /// The URL that was being inspected
        url: String,
        /// Engine-provided reason
        reason: String,
    },

    /// No task with the given id exists in the registry
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Task lifecycle error (operation not allowed in the current state)
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// The retrieval engine failed to transfer the media
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferFailure),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (yt-dlp could not be spawned, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable, machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::PlatformDisabled { .. } => "platform_disabled",
            Error::MetadataExtraction { .. } => "metadata_extraction_failed",
            Error::TaskNotFound(_) => "task_not_found",
            Error::Download(DownloadError::InvalidState { .. }) => "invalid_state",
            Error::Download(DownloadError::NotActive { .. }) => "not_active",
            Error::Transfer(_) => "transfer_failed",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

/// Task lifecycle errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Cannot perform operation in current state
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task that is in an invalid state for the operation
        id: TaskId,
        /// The operation that was attempted (e.g., "start")
        operation: String,
        /// The state that prevents the operation
        current_state: Status,
    },

    /// The task has no queued or running execution to act on
    #[error("task {id} has no active execution")]
    NotActive {
        /// The task id
        id: TaskId,
    },
}
