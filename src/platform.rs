//! Platform classification of source URLs
//!
//! A URL's host is matched against an ordered domain table. A table entry matches when
//! the host equals the domain or is a subdomain of it. The first matching platform
//! wins, and anything unrecognised (including unparseable input) is
//! [`Platform::Generic`].

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Content origin a URL belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// youtube.com, youtu.be
    Youtube,
    /// pornhub.com (age-gated)
    Pornhub,
    /// twitter.com, x.com, t.co
    Twitter,
    /// instagram.com
    Instagram,
    /// tiktok.com
    Tiktok,
    /// bilibili.com, b23.tv
    Bilibili,
    /// twitch.tv
    Twitch,
    /// Anything else
    Generic,
}

impl Platform {
    /// The closed set of platforms, in classification order
    pub const ALL: [Platform; 8] = [
        Platform::Youtube,
        Platform::Pornhub,
        Platform::Twitter,
        Platform::Instagram,
        Platform::Tiktok,
        Platform::Bilibili,
        Platform::Twitch,
        Platform::Generic,
    ];

    /// Lowercase tag of the platform
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Pornhub => "pornhub",
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Bilibili => "bilibili",
            Platform::Twitch => "twitch",
            Platform::Generic => "generic",
        }
    }

    /// Domains recognised for this platform
    pub fn domains(&self) -> &'static [&'static str] {
        DOMAIN_TABLE
            .iter()
            .find(|(platform, _)| platform == self)
            .map(|(_, domains)| *domains)
            .unwrap_or(&[])
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| Error::Config {
                message: format!("unknown platform '{s}'"),
                key: Some("platform".to_string()),
            })
    }
}

// Order matters: first match wins.
const DOMAIN_TABLE: &[(Platform, &[&str])] = &[
    (Platform::Youtube, &["youtube.com", "youtu.be"]),
    (Platform::Pornhub, &["pornhub.com"]),
    (Platform::Twitter, &["twitter.com", "x.com", "t.co"]),
    (Platform::Instagram, &["instagram.com"]),
    (Platform::Tiktok, &["tiktok.com"]),
    (Platform::Bilibili, &["bilibili.com", "b23.tv"]),
    (Platform::Twitch, &["twitch.tv"]),
];

/// Maps URLs to platforms
pub struct PlatformResolver;

impl PlatformResolver {
    /// Classify `url`. Never fails; unknown or malformed input is [`Platform::Generic`].
    pub fn resolve(url: &str) -> Platform {
        let Some(host) = host_of(url) else {
            return Platform::Generic;
        };

        DOMAIN_TABLE
            .iter()
            .find(|(_, domains)| domains.iter().any(|d| host_matches(&host, d)))
            .map(|(platform, _)| *platform)
            .unwrap_or(Platform::Generic)
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn host_of(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Scheme-less input ("youtube.com/watch?v=x") either fails to parse or parses
    // with no host; retry it as https.
    let parsed = Url::parse(trimmed)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("https://{trimmed}")).ok())?;

    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() { None } else { Some(host) }
}
