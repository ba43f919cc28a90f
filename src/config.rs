//! Configuration types for media-dl

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::speed_profile::SpeedProfileSelection;
use crate::types::Quality;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

/// Download behavior configuration (directories, workers, output naming)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Output directory used when a task does not name one (default: "downloads")
    #[serde(default = "default_output_dir")]
    pub default_output_dir: PathBuf,

    /// Number of tasks transferred concurrently (default: 4)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Quality selector used when neither the task nor the platform sets one
    #[serde(default)]
    pub default_quality: Quality,

    /// Container format used when the task does not set one (default: "mp4")
    #[serde(default = "default_format")]
    pub default_format: String,

    /// Engine output template for file names (default: "%(title)s.%(ext)s")
    #[serde(default = "default_filename_template")]
    pub filename_template: String,

    /// Codec for audio-only downloads (default: "mp3")
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Audio quality passed to the extractor, kbps or VBR level (default: "192")
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,

    /// Speed limit in bytes per second per transfer (None = unlimited)
    #[serde(default)]
    pub speed_limit_bps: Option<u64>,

    /// How long shutdown waits for running transfers before cancelling them (default: 30s)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            default_output_dir: default_output_dir(),
            max_workers: default_max_workers(),
            default_quality: Quality::Best,
            default_format: default_format(),
            filename_template: default_filename_template(),
            audio_format: default_audio_format(),
            audio_quality: default_audio_quality(),
            speed_limit_bps: None,
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// External tool paths
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,

    /// Location of ffmpeg, passed through to yt-dlp (engine default if None)
    #[serde(default)]
    pub ffmpeg_location: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: None,
            ffmpeg_location: None,
            search_path: true,
        }
    }
}

/// Per-platform policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Whether tasks may be created for this platform (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Fragment concurrency override; the speed profile decides when unset
    #[serde(default)]
    pub concurrent_fragments: Option<u32>,

    /// Quality selectors to try, in order, when a task does not set one
    #[serde(default)]
    pub quality_preference: Vec<String>,

    /// Pass an age limit and a desktop user agent to the engine
    #[serde(default)]
    pub age_verification: bool,

    /// Browser to read cookies from when no cookie file is registered (e.g. "chrome")
    #[serde(default)]
    pub cookies_from_browser: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrent_fragments: None,
            quality_preference: Vec::new(),
            age_verification: false,
            cookies_from_browser: None,
        }
    }
}

impl PlatformConfig {
    /// First entry of `quality_preference` that parses as a quality selector
    pub fn preferred_quality(&self) -> Option<Quality> {
        self.quality_preference
            .iter()
            .find_map(|q| q.parse::<Quality>().ok())
    }
}

/// Credential bundle discovery
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Directory scanned for `<platform>_cookies.txt` files (default: "cookies")
    #[serde(default = "default_cookies_dir")]
    pub cookies_dir: PathBuf,

    /// Scan `cookies_dir` when the downloader starts (default: true)
    #[serde(default = "default_true")]
    pub scan_cookies_on_start: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cookies_dir: default_cookies_dir(),
            scan_cookies_on_start: true,
        }
    }
}

/// Metadata lookup behavior
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Look up title and uploader when a task is created (default: true)
    #[serde(default = "default_true")]
    pub fetch_metadata: bool,

    /// Upper bound for a single metadata lookup (default: 60s)
    #[serde(default = "default_metadata_timeout", with = "duration_serde")]
    pub metadata_timeout: Duration,

    /// Retry policy for transient metadata lookup failures
    #[serde(default = "default_metadata_retry")]
    pub metadata_retry: RetryConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            fetch_metadata: true,
            metadata_timeout: default_metadata_timeout(),
            metadata_retry: default_metadata_retry(),
        }
    }
}

/// Network settings passed to the engine
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Proxy URL (e.g. "socks5://127.0.0.1:1080")
    #[serde(default)]
    pub proxy: Option<String>,

    /// User agent override
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Main configuration for MediaDownloader
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig): output directory, workers, naming
/// - [`tools`](ToolsConfig): external binary paths
/// - [`credentials`](CredentialsConfig): cookie file discovery
/// - [`metadata`](MetadataConfig): metadata lookup and retry
///
/// These sub-configs are flattened, so the JSON form is a single flat object apart
/// from `platforms` and `network`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// External tool paths
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Speed profile ("auto" or a preset name)
    #[serde(default)]
    pub speed_profile: SpeedProfileSelection,

    /// Per-platform policy; platforms missing from the map are enabled with defaults
    #[serde(default = "default_platforms")]
    pub platforms: HashMap<Platform, PlatformConfig>,

    /// Credential bundle discovery
    #[serde(flatten)]
    pub credentials: CredentialsConfig,

    /// Metadata lookup behavior
    #[serde(flatten)]
    pub metadata: MetadataConfig,

    /// Network settings
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            tools: ToolsConfig::default(),
            speed_profile: SpeedProfileSelection::default(),
            platforms: default_platforms(),
            credentials: CredentialsConfig::default(),
            metadata: MetadataConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file and validate it
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| Error::Config {
            message: format!("invalid config file '{}': {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check values that serde cannot reject on its own
    pub fn validate(&self) -> Result<()> {
        if self.download.max_workers == 0 {
            return Err(Error::Config {
                message: "max_workers must be at least 1".to_string(),
                key: Some("max_workers".to_string()),
            });
        }
        if self.download.default_format.trim().is_empty() {
            return Err(Error::Config {
                message: "default_format must not be empty".to_string(),
                key: Some("default_format".to_string()),
            });
        }
        if self.download.filename_template.trim().is_empty() {
            return Err(Error::Config {
                message: "filename_template must not be empty".to_string(),
                key: Some("filename_template".to_string()),
            });
        }
        Ok(())
    }

    /// Policy for a platform, if one is configured
    pub fn platform(&self, platform: Platform) -> Option<&PlatformConfig> {
        self.platforms.get(&platform)
    }

    /// Whether tasks may be created for `platform`
    pub fn is_platform_enabled(&self, platform: Platform) -> bool {
        self.platform(platform).is_none_or(|p| p.enabled)
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_platforms() -> HashMap<Platform, PlatformConfig> {
    let prefs = |list: &[&str]| list.iter().map(|q| q.to_string()).collect::<Vec<_>>();

    Platform::ALL
        .into_iter()
        .map(|platform| {
            let config = match platform {
                Platform::Youtube | Platform::Bilibili => PlatformConfig {
                    quality_preference: prefs(&["1080", "720", "best"]),
                    ..PlatformConfig::default()
                },
                Platform::Pornhub => PlatformConfig {
                    quality_preference: prefs(&["720", "best"]),
                    age_verification: true,
                    ..PlatformConfig::default()
                },
                Platform::Generic => PlatformConfig {
                    quality_preference: prefs(&["best"]),
                    ..PlatformConfig::default()
                },
                _ => PlatformConfig {
                    quality_preference: prefs(&["720", "best"]),
                    ..PlatformConfig::default()
                },
            };
            (platform, config)
        })
        .collect()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_workers() -> usize {
    4
}

fn default_format() -> String {
    "mp4".to_string()
}

fn default_filename_template() -> String {
    "%(title)s.%(ext)s".to_string()
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_audio_quality() -> String {
    "192".to_string()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_cookies_dir() -> PathBuf {
    PathBuf::from("cookies")
}

fn default_metadata_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_metadata_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        ..RetryConfig::default()
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
