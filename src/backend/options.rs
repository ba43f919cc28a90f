//! Engine option layering
//!
//! Options for one transfer are built in layers, later layers overriding earlier ones:
//! speed profile and base tuning, then the platform overlay (fragment override, age
//! gate, credentials), then the format selector, then network settings.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::credentials::{CredentialBundle, CredentialStore};
use crate::platform::Platform;
use crate::speed_profile::{BASE_TUNING, SpeedProfile};
use crate::types::{Quality, Task};

/// Desktop browser user agent sent to age-gated platforms
pub(crate) const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Age limit passed to the engine for age-gated platforms
const ADULT_AGE_LIMIT: u8 = 18;

/// Everything a backend needs besides the task itself
///
/// The speed profile is resolved when the settings are created and never re-evaluated.
#[derive(Clone, Debug)]
pub struct BackendSettings {
    /// Shared configuration
    pub config: Arc<Config>,
    /// Resolved speed profile
    pub profile: SpeedProfile,
    /// Registered credential bundles
    pub credentials: CredentialStore,
}

impl BackendSettings {
    /// Resolve the configured speed profile and bundle it with `config` and `credentials`
    pub fn from_config(config: Arc<Config>, credentials: CredentialStore) -> Self {
        let profile = config.speed_profile.resolve().clone();
        Self {
            config,
            profile,
            credentials,
        }
    }
}

/// Audio extraction settings for audio-only tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtraction {
    /// Target codec (e.g. "mp3")
    pub codec: String,
    /// Target quality (e.g. "192")
    pub quality: String,
}

/// Fully layered engine options for one transfer
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Format selector expression
    pub format: String,
    /// Output path template
    pub output_template: PathBuf,
    /// Audio extraction for audio-only tasks
    pub audio: Option<AudioExtraction>,
    /// Container for merged audio+video streams (unset for audio-only tasks)
    pub merge_output_format: Option<String>,
    /// Fragments fetched concurrently
    pub concurrent_fragments: u32,
    /// Retries per fragment
    pub fragment_retries: u32,
    /// Whole-request retries
    pub retries: u32,
    /// Retries on file access errors
    pub file_access_retries: u32,
    /// Retries on extractor errors
    pub extractor_retries: u32,
    /// Socket timeout in seconds
    pub socket_timeout_secs: u64,
    /// HTTP chunk size in bytes
    pub http_chunk_size: u64,
    /// Download buffer size in bytes
    pub buffer_size: u64,
    /// Bypass geographic restrictions
    pub geo_bypass: bool,
    /// Age limit for age-gated platforms
    pub age_limit: Option<u8>,
    /// Extra HTTP headers
    pub headers: Vec<(String, String)>,
    /// Cookie jar file
    pub cookie_file: Option<PathBuf>,
    /// Browser to read cookies from when no cookie file is registered
    pub cookies_from_browser: Option<String>,
    /// Proxy URL
    pub proxy: Option<String>,
    /// User agent
    pub user_agent: Option<String>,
    /// Rate limit in bytes per second
    pub rate_limit_bps: Option<u64>,
    /// ffmpeg location
    pub ffmpeg_location: Option<PathBuf>,
}

/// Format selector for the given quality and container
pub fn format_selector(quality: Quality, container: &str, audio_only: bool) -> String {
    if audio_only {
        return "bestaudio/best".to_string();
    }
    match quality {
        Quality::Best => format!("best[ext={container}]/best"),
        Quality::Worst => format!("worst[ext={container}]/worst"),
        Quality::MaxHeight(height) => {
            format!("best[height<={height}][ext={container}]/best[height<={height}]/best")
        }
    }
}

impl EngineOptions {
    /// Layer profile, platform overlay, format selector and network settings for `task`
    pub fn build(task: &Task, settings: &BackendSettings) -> Self {
        let config = &settings.config;
        let profile = &settings.profile;

        let mut options = Self {
            format: format_selector(task.quality, &task.container_format, task.audio_only),
            output_template: task.output_directory.join(&config.download.filename_template),
            audio: None,
            merge_output_format: Some(BASE_TUNING.merge_output_format.to_string()),
            concurrent_fragments: profile.concurrency_level,
            fragment_retries: profile.retry_count,
            retries: BASE_TUNING.retries,
            file_access_retries: BASE_TUNING.file_access_retries,
            extractor_retries: BASE_TUNING.extractor_retries,
            socket_timeout_secs: profile.socket_timeout.as_secs(),
            http_chunk_size: profile.chunk_size_bytes,
            buffer_size: BASE_TUNING.buffer_size,
            geo_bypass: BASE_TUNING.geo_bypass,
            age_limit: None,
            headers: Vec::new(),
            cookie_file: None,
            cookies_from_browser: None,
            proxy: None,
            user_agent: None,
            rate_limit_bps: config.download.speed_limit_bps,
            ffmpeg_location: config.tools.ffmpeg_location.clone(),
        };

        options.apply_platform_overlay(task.platform, settings);

        if task.audio_only {
            options.audio = Some(AudioExtraction {
                codec: config.download.audio_format.clone(),
                quality: config.download.audio_quality.clone(),
            });
            options.merge_output_format = None;
        }

        if let Some(proxy) = &config.network.proxy {
            options.proxy = Some(proxy.clone());
        }
        if let Some(user_agent) = &config.network.user_agent {
            options.user_agent = Some(user_agent.clone());
        }

        options
    }

    fn apply_platform_overlay(&mut self, platform: Platform, settings: &BackendSettings) {
        let platform_config = settings.config.platform(platform);

        if let Some(fragments) = platform_config.and_then(|p| p.concurrent_fragments) {
            self.concurrent_fragments = fragments.max(1);
        }

        if platform_config.is_some_and(|p| p.age_verification) {
            self.age_limit = Some(ADULT_AGE_LIMIT);
            self.user_agent = Some(DESKTOP_USER_AGENT.to_string());
            self.headers
                .push(("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()));
        }

        match settings.credentials.get(platform) {
            Some(CredentialBundle::CookieFile(path)) => self.cookie_file = Some(path),
            None => {
                self.cookies_from_browser =
                    platform_config.and_then(|p| p.cookies_from_browser.clone());
            }
        }
    }

    /// Command-line arguments for yt-dlp
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--format".to_string(),
            self.format.clone(),
            "--output".to_string(),
            self.output_template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--concurrent-fragments".to_string(),
            self.concurrent_fragments.to_string(),
            "--fragment-retries".to_string(),
            self.fragment_retries.to_string(),
            "--retries".to_string(),
            self.retries.to_string(),
            "--file-access-retries".to_string(),
            self.file_access_retries.to_string(),
            "--extractor-retries".to_string(),
            self.extractor_retries.to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            "--http-chunk-size".to_string(),
            self.http_chunk_size.to_string(),
            "--buffer-size".to_string(),
            self.buffer_size.to_string(),
        ];

        if self.geo_bypass {
            args.push("--geo-bypass".to_string());
        }
        if let Some(container) = &self.merge_output_format {
            args.extend(["--merge-output-format".to_string(), container.clone()]);
        }
        if let Some(audio) = &self.audio {
            args.extend([
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                audio.codec.clone(),
                "--audio-quality".to_string(),
                audio.quality.clone(),
            ]);
        }
        if let Some(limit) = self.age_limit {
            args.extend(["--age-limit".to_string(), limit.to_string()]);
        }
        for (name, value) in &self.headers {
            args.extend(["--add-header".to_string(), format!("{name}:{value}")]);
        }
        if let Some(path) = &self.cookie_file {
            args.extend(["--cookies".to_string(), path.to_string_lossy().into_owned()]);
        }
        if let Some(browser) = &self.cookies_from_browser {
            args.extend(["--cookies-from-browser".to_string(), browser.clone()]);
        }
        if let Some(proxy) = &self.proxy {
            args.extend(["--proxy".to_string(), proxy.clone()]);
        }
        if let Some(user_agent) = &self.user_agent {
            args.extend(["--user-agent".to_string(), user_agent.clone()]);
        }
        if let Some(limit) = self.rate_limit_bps {
            args.extend(["--limit-rate".to_string(), limit.to_string()]);
        }
        if let Some(path) = &self.ffmpeg_location {
            args.extend([
                "--ffmpeg-location".to_string(),
                path.to_string_lossy().into_owned(),
            ]);
        }

        args
    }
}
