//! Retrieval backend driving the external yt-dlp binary

use super::failure::TransferFailure;
use super::options::{BackendSettings, EngineOptions};
use super::progress::{parse_progress_line, progress_template};
use super::traits::{FormatInfo, MediaMetadata, ProgressSink, RetrievalBackend};
use crate::error::{Error, Result};
use crate::types::Task;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Prefix of the line carrying the final file path (`--print after_move:`)
const PATH_MARKER: &str = "media-dl:path:";

/// Number of stderr lines kept for failure classification
const STDERR_TAIL_LINES: usize = 200;

/// CLI-based backend using the external `yt-dlp` binary
///
/// # Examples
///
/// ```no_run
/// use media_dl::backend::{BackendSettings, YtDlpBackend};
/// use media_dl::{Config, CredentialStore};
/// use std::path::PathBuf;
/// use std::sync::Arc;
///
/// let settings = BackendSettings::from_config(Arc::new(Config::default()), CredentialStore::new());
///
/// // Explicit binary
/// let backend = YtDlpBackend::new(PathBuf::from("/usr/local/bin/yt-dlp"), settings.clone());
///
/// // Or auto-discover from PATH
/// let backend = YtDlpBackend::from_path(settings).expect("yt-dlp not found in PATH");
/// ```
pub struct YtDlpBackend {
    binary_path: PathBuf,
    settings: BackendSettings,
}

impl YtDlpBackend {
    /// Create a backend with an explicit binary path
    pub fn new(binary_path: PathBuf, settings: BackendSettings) -> Self {
        tracing::debug!(
            binary = %binary_path.display(),
            profile = %settings.profile.name,
            "yt-dlp backend created"
        );
        Self {
            binary_path,
            settings,
        }
    }

    /// Attempt to find yt-dlp in PATH
    ///
    /// Returns `None` if no `yt-dlp` binary is found.
    pub fn from_path(settings: BackendSettings) -> Option<Self> {
        which::which("yt-dlp")
            .ok()
            .map(|path| Self::new(path, settings))
    }

    /// Settings this backend was built with
    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn metadata_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        let network = &self.settings.config.network;
        if let Some(proxy) = &network.proxy {
            args.extend(["--proxy".to_string(), proxy.clone()]);
        }
        if let Some(user_agent) = &network.user_agent {
            args.extend(["--user-agent".to_string(), user_agent.clone()]);
        }
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn transfer_args(&self, task: &Task) -> Vec<String> {
        let mut args = EngineOptions::build(task, &self.settings).to_args();
        args.extend([
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            progress_template(),
            "--print".to_string(),
            format!("after_move:{PATH_MARKER}%(filepath)s"),
            "--".to_string(),
            task.source_url.clone(),
        ]);
        args
    }

    fn spawn(&self, args: &[String]) -> Result<Child> {
        Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))
    }
}

#[async_trait]
impl RetrievalBackend for YtDlpBackend {
    async fn extract_metadata(&self, url: &str) -> Result<MediaMetadata> {
        let metadata_error = |reason: String| Error::MetadataExtraction {
            url: url.to_string(),
            reason,
        };
        let child = self
            .spawn(&self.metadata_args(url))
            .map_err(|e| metadata_error(e.to_string()))?;
        let timeout = self.settings.config.metadata.metadata_timeout;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| metadata_error(format!("yt-dlp failed: {}", e)))?,
            // The child is killed when its future is dropped
            Err(_) => {
                return Err(metadata_error(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::MetadataExtraction {
                url: url.to_string(),
                reason: last_error_line(stderr.lines())
                    .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status)),
            });
        }

        parse_metadata(&output.stdout).map_err(|e| Error::MetadataExtraction {
            url: url.to_string(),
            reason: format!("unreadable yt-dlp output: {}", e),
        })
    }

    async fn transfer(
        &self,
        task: &Task,
        progress: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        let mut child = self.spawn(&self.transfer_args(task))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stderr not captured".to_string()))?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_open = true;
        let mut stderr_open = true;
        let mut final_path: Option<PathBuf> = None;
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        let mut handle_line = |line: String, from_stderr: bool| {
            if let Some(path) = line.trim().strip_prefix(PATH_MARKER) {
                final_path = Some(PathBuf::from(path.trim()));
            } else if let Some(tick) = parse_progress_line(&line) {
                progress.report(tick);
            } else {
                tracing::debug!(task_id = %task.id, line = %line, "yt-dlp output");
                if from_stderr {
                    if stderr_tail.len() == STDERR_TAIL_LINES {
                        stderr_tail.pop_front();
                    }
                    stderr_tail.push_back(line);
                }
            }
        };

        while stdout_open || stderr_open {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(task_id = %task.id, "Cancelling yt-dlp transfer");
                    child.kill().await.ok();
                    return Err(Error::Transfer(TransferFailure::cancelled()));
                }
                line = stdout_lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => handle_line(line, false),
                    _ => stdout_open = false,
                },
                line = stderr_lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => handle_line(line, true),
                    _ => stderr_open = false,
                },
            }
        }

        let status = tokio::select! {
            status = child.wait() => status
                .map_err(|e| Error::ExternalTool(format!("Failed to wait for yt-dlp: {}", e)))?,
            _ = cancel.cancelled() => {
                child.kill().await.ok();
                return Err(Error::Transfer(TransferFailure::cancelled()));
            }
        };

        if !status.success() {
            let message = last_error_line(stderr_tail.iter().map(String::as_str))
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            tracing::warn!(task_id = %task.id, error = %message, "yt-dlp transfer failed");
            return Err(Error::Transfer(TransferFailure::classify(message)));
        }

        final_path.ok_or_else(|| {
            Error::ExternalTool("yt-dlp finished without reporting an output file".to_string())
        })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Last line that looks like an engine error, or the last non-empty line
fn last_error_line<'a>(lines: impl DoubleEndedIterator<Item = &'a str> + Clone) -> Option<String> {
    lines
        .clone()
        .rev()
        .find(|l| l.trim_start().starts_with("ERROR"))
        .or_else(|| lines.rev().find(|l| !l.trim().is_empty()))
        .map(|l| l.trim().to_string())
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    #[serde(default)]
    format_id: String,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<f64>,
    #[serde(default)]
    format_note: Option<String>,
}

fn parse_metadata(json: &[u8]) -> serde_json::Result<MediaMetadata> {
    let info: YtDlpInfo = serde_json::from_slice(json)?;
    Ok(MediaMetadata {
        title: info
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| crate::types::UNKNOWN_TITLE.to_string()),
        duration_secs: info.duration,
        uploader: info.uploader,
        view_count: info.view_count,
        thumbnail: info.thumbnail,
        description: info.description,
        upload_date: info.upload_date,
        formats: info
            .formats
            .into_iter()
            .map(|f| FormatInfo {
                format_id: f.format_id,
                ext: f.ext,
                height: f.height,
                width: f.width,
                fps: f.fps,
                vcodec: f.vcodec,
                acodec: f.acodec,
                filesize: f
                    .filesize
                    .or_else(|| f.filesize_approx.map(|s| s.max(0.0).round() as u64)),
                format_note: f.format_note,
            })
            .collect(),
    })
}
