//! Shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::types::Event;

use super::MediaDownloader;

/// Grace period for workers to observe cancellation once the shutdown timeout expired
const CANCEL_GRACE: Duration = Duration::from_secs(5);

impl MediaDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new tasks and starts
    /// 2. Waits up to `Config.download.shutdown_timeout` for queued and running tasks
    /// 3. Cancels whatever is still active and waits briefly for it to stop
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Calling it again is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new work
        self.scheduler.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        // 2. Let active work finish
        let shutdown_timeout = self.config.download.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_downloads()).await {
            Ok(()) => {
                tracing::info!("All active downloads completed gracefully");
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = shutdown_timeout.as_secs(),
                    "Timeout waiting for downloads to complete, cancelling the rest"
                );

                // 3. Cancel the remainder
                self.cancel_all().await;
                if tokio::time::timeout(CANCEL_GRACE, self.wait_for_active_downloads())
                    .await
                    .is_err()
                {
                    tracing::warn!(
                        active_count = self.active_count().await,
                        "Some downloads did not stop after cancellation"
                    );
                }
            }
        }

        // 4. Emit shutdown event
        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has begun
    pub fn is_shutting_down(&self) -> bool {
        !self.scheduler.is_accepting()
    }

    /// Signal cancellation to every queued and running task
    pub(crate) async fn cancel_all(&self) {
        let active = self.scheduler.active_downloads.lock().await;
        tracing::debug!(active_count = active.len(), "Cancelling all active downloads");

        for (id, token) in active.iter() {
            tracing::debug!(task_id = %id, "Signaling cancellation");
            token.cancel();
        }
    }

    /// Wait until no task is queued or running
    async fn wait_for_active_downloads(&self) {
        loop {
            let active_count = self.active_count().await;
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for active downloads to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
