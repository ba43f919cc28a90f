//! Categorization of engine failures

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

use crate::error::Error;

/// Category of a failed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The media requires age verification or a signed-in account
    AgeRestricted,
    /// The media is blocked in the current region
    GeoRestricted,
    /// The media is private, removed or otherwise unavailable
    Unavailable,
    /// The transfer was cancelled
    Cancelled,
    /// Anything else
    Generic,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FailureKind::AgeRestricted => "age restricted",
            FailureKind::GeoRestricted => "geo restricted",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Generic => "download failed",
        };
        f.write_str(text)
    }
}

/// A categorized transfer failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TransferFailure {
    /// Failure category
    pub kind: FailureKind,
    /// Engine or library message
    pub message: String,
}

impl TransferFailure {
    /// Create a failure with an explicit category
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a failure, categorizing it from the message text
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify_failure(&message),
            message,
        }
    }

    /// Failure recorded for a cancelled transfer
    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "transfer cancelled")
    }

    /// Convert any library error into the failure stored on a task
    pub(crate) fn from_error(error: Error) -> Self {
        match error {
            Error::Transfer(failure) => failure,
            other => Self::classify(other.to_string()),
        }
    }
}

static AGE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bage[- ]?(restricted|gate|gated|verification|limit)|confirm your age|inappropriate for some users|\b18\+",
    )
    .ok()
});

static GEO_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bgeo[- ]?(restricted|restriction|blocked)|available in your (country|region|location)|blocked in your (country|region)|from your location",
    )
    .ok()
});

static UNAVAILABLE_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bprivate (video|account)\b|\bis private\b|not available|unavailable|has been removed|does not exist|no longer available|\bhttp error 404\b",
    )
    .ok()
});

/// Categorize an engine error message
///
/// Best-effort: checks age, then geo, then availability phrasing, and falls back to
/// [`FailureKind::Generic`].
pub fn classify_failure(message: &str) -> FailureKind {
    let matches = |pattern: &LazyLock<Option<Regex>>| {
        pattern
            .as_ref()
            .is_some_and(|regex| regex.is_match(message))
    };

    if matches(&AGE_PATTERN) {
        FailureKind::AgeRestricted
    } else if matches(&GEO_PATTERN) {
        FailureKind::GeoRestricted
    } else if matches(&UNAVAILABLE_PATTERN) {
        FailureKind::Unavailable
    } else {
        FailureKind::Generic
    }
}
