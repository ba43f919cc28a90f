//! Downloader tests, grouped by concern.

pub(super) use super::test_helpers::{
    SCRIPTED_TITLE, ScriptedBackend, create_test_downloader, create_test_downloader_with,
};
pub(super) use super::{DownloadHandle, MediaDownloader};
pub(super) use crate::backend::{FailureKind, RawProgress, TickStatus};
pub(super) use crate::error::{DownloadError, Error};
pub(super) use crate::platform::Platform;
pub(super) use crate::types::{
    Event, Progress, ProgressEvent, Quality, Status, TaskId, TaskOptions, TaskOutcome,
    UNKNOWN_TITLE,
};
pub(super) use serial_test::serial;
pub(super) use std::sync::Arc;
pub(super) use std::time::Duration;

mod scheduler;
mod tasks;

const VIDEO_URL: &str = "https://www.youtube.com/watch?v=abc";

/// Wait until `task` reaches `status`, panicking after five seconds
async fn wait_for_status(downloader: &MediaDownloader, id: &TaskId, status: Status) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if downloader.get_task(id).unwrap().status == status {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} never reached {status}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
