//! Retry logic with exponential backoff
//!
//! Used for metadata lookups, where a flaky network or a busy extractor is worth a
//! second attempt but a removed video is not.
//!
//! # Example
//!
//! ```no_run
//! use media_dl::retry::{IsRetryable, retry_with_backoff};
//! use media_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum LookupError {
//!     Busy,
//!     Gone,
//! }
//!
//! impl std::fmt::Display for LookupError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for LookupError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, LookupError::Busy)
//!     }
//! }
//!
//! # async fn example() -> Result<(), LookupError> {
//! let config = RetryConfig::default();
//! let title = retry_with_backoff(&config, || async {
//!     Ok::<_, LookupError>("title".to_string())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, rate limiting) return `true`.
/// Permanent failures (removed media, bad configuration) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Engine errors only say what went wrong in their message
            Error::MetadataExtraction { reason, .. } => is_transient_message(reason),
            Error::ExternalTool(msg) => is_transient_message(msg),
            Error::Config { .. }
            | Error::PlatformDisabled { .. }
            | Error::TaskNotFound(_)
            | Error::Download(_)
            | Error::Transfer(_)
            | Error::Serialization(_)
            | Error::NotSupported(_)
            | Error::ShuttingDown
            | Error::Other(_) => false,
        }
    }
}

/// Whether an engine message describes a transient network condition
pub(crate) fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    [
        "timed out",
        "timeout",
        "connection reset",
        "connection refused",
        "connection aborted",
        "temporary failure",
        "temporarily unavailable",
        "too many requests",
        "http error 429",
        "http error 500",
        "http error 502",
        "http error 503",
        "http error 504",
    ]
    .iter()
    .any(|pattern| lower.contains(pattern))
}

/// Execute an async operation with exponential backoff retry logic
///
/// Retries while the error is retryable and fewer than `config.max_attempts` retries
/// have been made. Returns the successful result or the last error.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let wait = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };
                tokio::time::sleep(wait).await;

                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::debug!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}
