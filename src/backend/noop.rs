//! Stub backend used when no retrieval engine is installed

use super::traits::{MediaMetadata, ProgressSink, RetrievalBackend};
use crate::error::{Error, Result};
use crate::types::Task;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Backend that rejects every operation with [`Error::NotSupported`]
///
/// Tasks can still be created (metadata lookup failures are tolerated) but every
/// transfer fails cleanly instead of the downloader refusing to start.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableBackend;

#[async_trait]
impl RetrievalBackend for UnavailableBackend {
    async fn extract_metadata(&self, _url: &str) -> Result<MediaMetadata> {
        Err(Error::NotSupported(
            "metadata lookup requires yt-dlp, which was not found".to_string(),
        ))
    }

    async fn transfer(
        &self,
        _task: &Task,
        _progress: &dyn ProgressSink,
        _cancel: CancellationToken,
    ) -> Result<PathBuf> {
        Err(Error::NotSupported(
            "downloading requires yt-dlp, which was not found".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
