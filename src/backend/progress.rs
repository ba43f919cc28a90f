//! Progress tick parsing and tier resolution

use regex::Regex;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use super::traits::{RawProgress, TickStatus};
use crate::types::Progress;

/// Prefix of machine-readable progress lines emitted via `--progress-template`
pub(crate) const PROGRESS_MARKER: &str = "media-dl:progress:";

const MIB: f32 = 1024.0 * 1024.0;

/// Ceiling for byte-based estimates, so they never look finished
const ESTIMATE_CEILING: f32 = 95.0;

/// `--progress-template` value matching [`parse_progress_line`]
pub(crate) fn progress_template() -> String {
    format!(
        "download:{PROGRESS_MARKER}%(progress.status)s|%(progress.downloaded_bytes)s|\
         %(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress._percent_str)s|\
         %(progress.speed)s|%(progress.eta)s"
    )
}

static PERCENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").ok());

static DOWNLOAD_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^\[download\]\s+(\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(\d+(?:\.\d+)?)\s*([KMGT]?i?B))?(?:.*?\bat\s+(\d+(?:\.\d+)?)\s*([KMGT]?i?B)/s)?",
    )
    .ok()
});

/// Maps raw ticks to a single progress value
///
/// Tiers, first applicable wins:
/// 1. downloaded / total bytes → exact
/// 2. engine-formatted percent → exact
/// 3. bytes received so far → estimate, capped at 95
/// 4. nothing quantitative → activity pulse cycling through 10..90
///
/// A `finished` tick is always exact 100.
#[derive(Debug, Clone)]
pub struct ProgressResolver {
    started: Instant,
}

impl Default for ProgressResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressResolver {
    /// Create a resolver; the activity pulse is timed from now
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Resolve one tick
    pub fn resolve(&self, tick: &RawProgress) -> Progress {
        if tick.status == TickStatus::Finished {
            return Progress::Exact(100.0);
        }

        match (tick.downloaded_bytes, tick.total_bytes) {
            (Some(done), Some(total)) if total > 0 => {
                return Progress::exact(done as f32 / total as f32 * 100.0);
            }
            _ => {}
        }

        if let Some(percent) = tick.percent_str.as_deref().and_then(parse_percent) {
            return Progress::exact(percent);
        }

        match tick.downloaded_bytes {
            Some(done) if done > 0 => estimate_from_bytes(done),
            _ => activity_pulse(self.started.elapsed()),
        }
    }
}

fn estimate_from_bytes(downloaded: u64) -> Progress {
    let mib = downloaded as f32 / MIB;
    Progress::Estimated((mib / 10.0 * 100.0).min(ESTIMATE_CEILING))
}

fn activity_pulse(elapsed: Duration) -> Progress {
    Progress::Activity(((elapsed.as_secs() % 80) + 10) as f32)
}

fn parse_percent(text: &str) -> Option<f32> {
    let regex = PERCENT.as_ref()?;
    let captures = regex.captures(text)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Parse one line of engine output into a raw tick
///
/// Understands the machine-readable template lines and, as a fallback, the engine's
/// human-readable `[download]  42.0% of 10.00MiB at 1.00MiB/s` lines.
pub fn parse_progress_line(line: &str) -> Option<RawProgress> {
    let line = line.trim();
    match line.strip_prefix(PROGRESS_MARKER) {
        Some(fields) => parse_template_fields(fields),
        None => parse_download_line(line),
    }
}

fn parse_template_fields(fields: &str) -> Option<RawProgress> {
    let fields: Vec<&str> = fields.split('|').map(str::trim).collect();
    let [status, downloaded, total, estimate, percent, speed, eta] = fields.as_slice() else {
        return None;
    };

    Some(RawProgress {
        status: if *status == "finished" {
            TickStatus::Finished
        } else {
            TickStatus::Downloading
        },
        downloaded_bytes: parse_count(downloaded),
        total_bytes: parse_count(total),
        total_bytes_estimate: parse_count(estimate),
        percent_str: (!percent.is_empty() && *percent != "NA").then(|| percent.to_string()),
        speed_bps: speed.parse::<f64>().ok().filter(|s| s.is_finite() && *s >= 0.0),
        eta_secs: parse_count(eta),
    })
}

// Missing template fields come through as "NA"; sizes may be fractional estimates.
fn parse_count(field: &str) -> Option<u64> {
    let value = field.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value.round() as u64)
}

fn parse_download_line(line: &str) -> Option<RawProgress> {
    let captures = DOWNLOAD_LINE.as_ref()?.captures(line)?;
    let percent = captures.get(1)?.as_str();

    let size = |value: usize, unit: usize| -> Option<f64> {
        let number: f64 = captures.get(value)?.as_str().parse().ok()?;
        Some(number * unit_multiplier(captures.get(unit)?.as_str())?)
    };

    Some(RawProgress {
        status: TickStatus::Downloading,
        total_bytes_estimate: size(2, 3).map(|b| b.round() as u64),
        percent_str: Some(format!("{percent}%")),
        speed_bps: size(4, 5),
        ..RawProgress::default()
    })
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    let multiplier = match unit {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some(multiplier)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn tick() -> RawProgress {
        RawProgress::default()
    }

    #[test]
    fn byte_ratio_is_exact() {
        let resolver = ProgressResolver::new();
        let progress = resolver.resolve(&RawProgress {
            downloaded_bytes: Some(250),
            total_bytes: Some(1000),
            percent_str: Some("99%".into()),
            ..tick()
        });
        assert_eq!(progress, Progress::Exact(25.0), "byte ratio wins over percent string");
    }

    #[test]
    fn zero_total_falls_through_to_percent_string() {
        let resolver = ProgressResolver::new();
        let progress = resolver.resolve(&RawProgress {
            downloaded_bytes: Some(10),
            total_bytes: Some(0),
            percent_str: Some("\u{1b}[0;94m 42.5%\u{1b}[0m".into()),
            ..tick()
        });
        assert_eq!(progress, Progress::Exact(42.5));
    }

    #[test]
    fn bytes_only_give_capped_estimate() {
        let resolver = ProgressResolver::new();
        let five_mib = resolver.resolve(&RawProgress {
            downloaded_bytes: Some(5 * 1024 * 1024),
            ..tick()
        });
        assert_eq!(five_mib, Progress::Estimated(50.0));
        assert!(five_mib.is_indeterminate());

        let huge = resolver.resolve(&RawProgress {
            downloaded_bytes: Some(500 * 1024 * 1024),
            percent_str: Some("NA".into()),
            ..tick()
        });
        assert_eq!(huge, Progress::Estimated(95.0));
    }

    #[test]
    fn no_data_gives_activity_pulse_in_range() {
        let resolver = ProgressResolver::new();
        let progress = resolver.resolve(&tick());
        assert!(matches!(progress, Progress::Activity(_)));
        assert!((10.0..90.0).contains(&progress.percent()));

        assert_eq!(activity_pulse(Duration::from_secs(0)), Progress::Activity(10.0));
        assert_eq!(activity_pulse(Duration::from_secs(79)), Progress::Activity(89.0));
        assert_eq!(activity_pulse(Duration::from_secs(80)), Progress::Activity(10.0));
    }

    #[test]
    fn finished_tick_is_complete() {
        let resolver = ProgressResolver::new();
        let progress = resolver.resolve(&RawProgress {
            status: TickStatus::Finished,
            ..tick()
        });
        assert_eq!(progress, Progress::Exact(100.0));
    }

    #[test]
    fn parses_template_line() {
        let line = "media-dl:progress:downloading|1048576|4194304|NA| 25.0%|524288.5|6";
        let raw = parse_progress_line(line).unwrap();
        assert_eq!(raw.status, TickStatus::Downloading);
        assert_eq!(raw.downloaded_bytes, Some(1_048_576));
        assert_eq!(raw.total_bytes, Some(4_194_304));
        assert_eq!(raw.total_bytes_estimate, None);
        assert_eq!(raw.percent_str.as_deref(), Some("25.0%"));
        assert_eq!(raw.speed_bps, Some(524_288.5));
        assert_eq!(raw.eta_secs, Some(6));
    }

    #[test]
    fn parses_template_line_with_missing_fields() {
        let raw = parse_progress_line("media-dl:progress:finished|NA|NA|NA|NA|NA|NA").unwrap();
        assert_eq!(raw.status, TickStatus::Finished);
        assert_eq!(raw.downloaded_bytes, None);
        assert_eq!(raw.percent_str, None);
        assert_eq!(raw.speed_bps, None);
    }

    #[test]
    fn rejects_truncated_template_line() {
        assert!(parse_progress_line("media-dl:progress:downloading|1|2").is_none());
    }

    #[test]
    fn parses_human_readable_download_line() {
        let raw =
            parse_progress_line("[download]  42.3% of ~ 10.00MiB at  1.00MiB/s ETA 00:05").unwrap();
        assert_eq!(raw.percent_str.as_deref(), Some("42.3%"));
        assert_eq!(raw.total_bytes_estimate, Some(10 * 1024 * 1024));
        assert_eq!(raw.speed_bps, Some(1024.0 * 1024.0));

        let done = parse_progress_line("[download] 100% of 3.50MiB in 00:00:02 at 1.75MiB/s").unwrap();
        assert_eq!(done.percent_str.as_deref(), Some("100%"));
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress_line("[download] Destination: video.mp4").is_none());
        assert!(parse_progress_line("").is_none());
    }
}
