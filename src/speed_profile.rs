//! Speed profiles for the retrieval engine
//!
//! A profile is a named, immutable preset of transfer tuning (fragment concurrency,
//! retries, socket timeout and HTTP chunk size). [`SpeedProfileSelection::Auto`]
//! picks a preset from the host's memory and core count; the choice is made once,
//! when the backend is constructed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

use crate::error::Error;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Name of a built-in speed profile
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileName {
    /// Safe and stable
    Conservative,
    /// Recommended default
    Balanced,
    /// High throughput
    Aggressive,
    /// High-bandwidth connections only
    Ultra,
}

impl ProfileName {
    /// All built-in profiles, slowest first
    pub const ALL: [ProfileName; 4] = [
        ProfileName::Conservative,
        ProfileName::Balanced,
        ProfileName::Aggressive,
        ProfileName::Ultra,
    ];

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileName::Conservative => "conservative",
            ProfileName::Balanced => "balanced",
            ProfileName::Aggressive => "aggressive",
            ProfileName::Ultra => "ultra",
        }
    }

    /// The preset for this name
    pub fn profile(&self) -> &'static SpeedProfile {
        match self {
            ProfileName::Conservative => &CONSERVATIVE,
            ProfileName::Balanced => &BALANCED,
            ProfileName::Aggressive => &AGGRESSIVE,
            ProfileName::Ultra => &ULTRA,
        }
    }
}

impl std::fmt::Display for ProfileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer tuning preset
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpeedProfile {
    /// Preset name
    pub name: ProfileName,
    /// Number of fragments fetched concurrently
    pub concurrency_level: u32,
    /// Retries per fragment
    pub retry_count: u32,
    /// Socket timeout
    #[serde(serialize_with = "serialize_secs")]
    pub socket_timeout: Duration,
    /// HTTP chunk size in bytes
    pub chunk_size_bytes: u64,
    /// Human-readable description
    pub description: &'static str,
}

static CONSERVATIVE: SpeedProfile = SpeedProfile {
    name: ProfileName::Conservative,
    concurrency_level: 2,
    retry_count: 3,
    socket_timeout: Duration::from_secs(30),
    chunk_size_bytes: MIB,
    description: "Safe and stable, good for slow connections",
};

static BALANCED: SpeedProfile = SpeedProfile {
    name: ProfileName::Balanced,
    concurrency_level: 4,
    retry_count: 5,
    socket_timeout: Duration::from_secs(20),
    chunk_size_bytes: 4 * MIB,
    description: "Balanced speed and stability (recommended)",
};

static AGGRESSIVE: SpeedProfile = SpeedProfile {
    name: ProfileName::Aggressive,
    concurrency_level: 8,
    retry_count: 10,
    socket_timeout: Duration::from_secs(15),
    chunk_size_bytes: 8 * MIB,
    description: "Maximum speed, may be unstable on slow connections",
};

static ULTRA: SpeedProfile = SpeedProfile {
    name: ProfileName::Ultra,
    concurrency_level: 16,
    retry_count: 15,
    socket_timeout: Duration::from_secs(10),
    chunk_size_bytes: 16 * MIB,
    description: "Extreme speed for high-bandwidth connections",
};

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

/// Engine settings applied on top of every profile
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseTuning {
    /// Whole-request retries
    pub retries: u32,
    /// Retries on file access errors
    pub file_access_retries: u32,
    /// Retries on extractor errors
    pub extractor_retries: u32,
    /// Download buffer size in bytes
    pub buffer_size: u64,
    /// Container used when merging separate audio/video streams
    pub merge_output_format: &'static str,
    /// Ask the engine to bypass geographic restrictions
    pub geo_bypass: bool,
}

/// The fixed tuning layered under every speed profile
pub const BASE_TUNING: BaseTuning = BaseTuning {
    retries: 10,
    file_access_retries: 5,
    extractor_retries: 3,
    buffer_size: 64 * 1024,
    merge_output_format: "mp4",
    geo_bypass: true,
};

/// How the speed profile is chosen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpeedProfileSelection {
    /// Pick from detected host resources
    #[default]
    Auto,
    /// Use the named preset
    Named(ProfileName),
}

impl SpeedProfileSelection {
    /// Resolve to a concrete preset, detecting host resources for `Auto`
    pub fn resolve(self) -> &'static SpeedProfile {
        match self {
            SpeedProfileSelection::Auto => {
                let resources = HostResources::detect();
                let name = select_profile(&resources);
                tracing::info!(
                    memory_bytes = ?resources.memory_bytes,
                    logical_cores = resources.logical_cores,
                    profile = %name,
                    "Auto-selected speed profile"
                );
                name.profile()
            }
            SpeedProfileSelection::Named(name) => name.profile(),
        }
    }
}

impl std::str::FromStr for SpeedProfileSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if wanted == "auto" {
            return Ok(SpeedProfileSelection::Auto);
        }
        ProfileName::ALL
            .into_iter()
            .find(|name| name.as_str() == wanted)
            .map(SpeedProfileSelection::Named)
            .ok_or_else(|| Error::Config {
                message: format!("unknown speed profile '{s}'"),
                key: Some("speed_profile".to_string()),
            })
    }
}

impl std::fmt::Display for SpeedProfileSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeedProfileSelection::Auto => f.write_str("auto"),
            SpeedProfileSelection::Named(name) => f.write_str(name.as_str()),
        }
    }
}

impl Serialize for SpeedProfileSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpeedProfileSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Host resources relevant to profile selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostResources {
    /// Total physical memory in bytes (None if it could not be determined)
    pub memory_bytes: Option<u64>,
    /// Logical CPU count
    pub logical_cores: usize,
}

impl HostResources {
    /// Detect resources of the current host
    pub fn detect() -> Self {
        Self {
            memory_bytes: total_memory_bytes(),
            logical_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Pick a preset for the given host resources
///
/// Unknown memory falls back to `balanced`; `ultra` is never picked automatically.
pub fn select_profile(resources: &HostResources) -> ProfileName {
    match resources.memory_bytes {
        None => ProfileName::Balanced,
        Some(mem) if mem >= 8 * GIB && resources.logical_cores >= 8 => ProfileName::Aggressive,
        Some(mem) if mem >= 4 * GIB && resources.logical_cores >= 4 => ProfileName::Balanced,
        Some(_) => ProfileName::Conservative,
    }
}

#[cfg(unix)]
fn total_memory_bytes() -> Option<u64> {
    // SAFETY: sysconf only queries runtime configuration values and has no
    // preconditions on its argument.
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    // SAFETY: as above.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    if pages <= 0 || page_size <= 0 {
        return None;
    }
    (pages as u64).checked_mul(page_size as u64)
}

#[cfg(not(unix))]
fn total_memory_bytes() -> Option<u64> {
    None
}
