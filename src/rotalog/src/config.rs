//! Configuration for rotating writers.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::clock::ClockKind;
use crate::{Result, RotateError};

// ============================================================================
// Constants
// ============================================================================

/// Default rotation interval (24 hours).
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default retention for [`LogSettings`] (7 days).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default time pattern appended to the base name by [`LogSettings`].
pub const DEFAULT_PATTERN: &str = "%Y-%m-%d";

/// Default base name used by [`LogSettings`].
pub const DEFAULT_LOG_NAME: &str = "log";

/// Extension appended by [`LogSettings`].
pub const LOG_EXTENSION: &str = ".log";

// ============================================================================
// Configuration
// ============================================================================

/// Low-level writer configuration.
///
/// `max_age_secs` defaults to 0, which disables retention entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationConfig {
    /// Filename template with time conversions, e.g. `logs/app-%Y-%m-%d.log`.
    #[serde(default)]
    pub pattern: String,

    /// Width of a rotation bucket in seconds (0 = no truncation).
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_secs: u64,

    /// Age in seconds after which rotated files are deleted (0 = keep forever).
    #[serde(default)]
    pub max_age_secs: u64,

    /// Never reuse an existing file when entering a new bucket.
    #[serde(default)]
    pub force_new_file: bool,

    /// Clock used to pick buckets.
    #[serde(default)]
    pub clock: ClockKind,
}

fn default_rotation_interval() -> u64 {
    DEFAULT_ROTATION_INTERVAL.as_secs()
}

fn default_max_age() -> u64 {
    DEFAULT_MAX_AGE.as_secs()
}

fn default_log_name() -> String {
    DEFAULT_LOG_NAME.to_string()
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

impl RotationConfig {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            rotation_interval_secs: default_rotation_interval(),
            max_age_secs: 0,
            force_new_file: false,
            clock: ClockKind::default(),
        }
    }

    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RotateError::Config(e.to_string()))
    }

    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}

/// High-level settings: a root directory, a base name and a time pattern.
///
/// Files are named `<root>/<name><pattern>.log`. Empty names and patterns and
/// zero durations fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    /// Directory holding the log files.
    pub root: PathBuf,

    /// Base file name.
    #[serde(default = "default_log_name")]
    pub name: String,

    /// Time pattern appended to the base name.
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Rotation interval in seconds.
    #[serde(default = "default_rotation_interval")]
    pub rotation_interval_secs: u64,

    /// Retention in seconds.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    /// Clock used to pick buckets.
    #[serde(default)]
    pub clock: ClockKind,
}

impl LogSettings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            name: default_log_name(),
            pattern: default_pattern(),
            rotation_interval_secs: default_rotation_interval(),
            max_age_secs: default_max_age(),
            clock: ClockKind::default(),
        }
    }

    /// Full filename template, defaults applied.
    pub fn file_template(&self) -> String {
        let name = if self.name.is_empty() {
            DEFAULT_LOG_NAME
        } else {
            &self.name
        };
        let pattern = if self.pattern.is_empty() {
            DEFAULT_PATTERN
        } else {
            &self.pattern
        };
        self.root
            .join(format!("{name}{pattern}{LOG_EXTENSION}"))
            .to_string_lossy()
            .into_owned()
    }

    /// Equivalent low-level configuration, defaults applied.
    pub fn rotation_config(&self) -> RotationConfig {
        let or_default = |secs: u64, default: Duration| {
            if secs == 0 { default.as_secs() } else { secs }
        };
        RotationConfig {
            pattern: self.file_template(),
            rotation_interval_secs: or_default(
                self.rotation_interval_secs,
                DEFAULT_ROTATION_INTERVAL,
            ),
            max_age_secs: or_default(self.max_age_secs, DEFAULT_MAX_AGE),
            force_new_file: false,
            clock: self.clock,
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RotateError::Config(e.to_string()))
    }

    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}

/// Parse a duration string.
///
/// Supported formats:
/// - `30s` - seconds
/// - `15m` - minutes
/// - `24h` - hours
/// - `7d` - days
/// - `2w` - weeks
/// - `0`, `never`, `none` - zero (disables whatever the value controls)
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim().to_lowercase();

    if s == "never" || s == "none" || s == "0" {
        return Ok(Duration::ZERO);
    }

    let (num_str, multiplier) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 60 * 60),
        Some((i, 'd')) => (&s[..i], 24 * 60 * 60),
        Some((i, 'w')) => (&s[..i], 7 * 24 * 60 * 60),
        Some(_) => (s.as_str(), 1),
        None => return Err("Empty duration".to_string()),
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid duration: {s}"))?;

    num.checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration too large: {s}"))
}

/// Format a duration using the largest unit that divides it evenly.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs == 0 {
        return "0".to_string();
    }
    for (unit, size) in [
        ("w", 7 * 24 * 60 * 60),
        ("d", 24 * 60 * 60),
        ("h", 60 * 60),
        ("m", 60),
    ] {
        if secs % size == 0 {
            return format!("{}{unit}", secs / size);
        }
    }
    format!("{secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rotation_config_defaults() {
        let config = RotationConfig::from_toml_str(r#"pattern = "app-%Y%m%d.log""#).unwrap();
        assert_eq!(config.rotation_interval(), DEFAULT_ROTATION_INTERVAL);
        assert_eq!(config.max_age(), Duration::ZERO);
        assert!(!config.force_new_file);
        assert_eq!(config.clock, ClockKind::Local);
        assert_eq!(config, RotationConfig::new("app-%Y%m%d.log"));
    }

    #[test]
    fn test_rotation_config_full_toml() {
        let config = RotationConfig::from_toml_str(
            r#"
pattern = "logs/%Y/%m/%d/%H.log"
rotation_interval_secs = 3600
max_age_secs = 172800
force_new_file = true
clock = "utc"
"#,
        )
        .unwrap();
        assert_eq!(config.rotation_interval(), Duration::from_secs(3600));
        assert_eq!(config.max_age(), Duration::from_secs(172_800));
        assert!(config.force_new_file);
        assert_eq!(config.clock, ClockKind::Utc);
    }

    #[test]
    fn test_rotation_config_pattern_may_come_from_elsewhere() {
        let config = RotationConfig::from_toml_str("max_age_secs = 10").unwrap();
        assert!(config.pattern.is_empty());
        assert_eq!(config.max_age_secs, 10);
    }

    #[test]
    fn test_rotation_config_rejects_bad_types() {
        let err = RotationConfig::from_toml_str("max_age_secs = \"ten\"").unwrap_err();
        assert!(matches!(err, RotateError::Config(_)));
    }

    #[test]
    fn test_log_settings_defaults() {
        let settings = LogSettings::from_toml_str(r#"root = "/var/log/app""#).unwrap();
        assert_eq!(settings, LogSettings::new("/var/log/app"));
        assert_eq!(settings.file_template(), "/var/log/app/log%Y-%m-%d.log");

        let config = settings.rotation_config();
        assert_eq!(config.rotation_interval(), DEFAULT_ROTATION_INTERVAL);
        assert_eq!(config.max_age(), DEFAULT_MAX_AGE);
    }

    #[test]
    fn test_log_settings_zero_and_empty_fall_back() {
        let settings = LogSettings {
            name: String::new(),
            pattern: String::new(),
            rotation_interval_secs: 0,
            max_age_secs: 0,
            ..LogSettings::new("/tmp/x")
        };
        let config = settings.rotation_config();
        assert_eq!(config.pattern, "/tmp/x/log%Y-%m-%d.log");
        assert_eq!(config.rotation_interval(), DEFAULT_ROTATION_INTERVAL);
        assert_eq!(config.max_age(), DEFAULT_MAX_AGE);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("24h").unwrap(), DEFAULT_ROTATION_INTERVAL);
        assert_eq!(parse_duration("7d").unwrap(), DEFAULT_MAX_AGE);
        assert_eq!(parse_duration("1w").unwrap(), DEFAULT_MAX_AGE);
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("never").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-5h").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(DEFAULT_ROTATION_INTERVAL), "1d");
        assert_eq!(format_duration(DEFAULT_MAX_AGE), "1w");
        assert_eq!(format_duration(Duration::ZERO), "0");
    }
}
