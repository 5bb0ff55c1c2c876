//! Engine configuration.
//!
//! # Responsibility
//! - Single-source every reproductive scheduling constant.
//! - Load constants from a JSON file and validate them at startup.
//!
//! # Invariants
//! - The PD-check offset and gestation length are always explicit; loading a
//!   file without them fails with `MissingConstant`.
//! - A validated config satisfies `pd_check_offset_days < gestation_days` and
//!   `fresh_window_days < heat_detection_window_days`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Reference gestation length for dairy cattle, in days.
pub const GESTATION_DAYS_CATTLE: u32 = 280;
pub const DEFAULT_REOPEN_GRACE_DAYS: u32 = 14;
pub const DEFAULT_LOOKAHEAD_DAYS: u32 = 7;
/// Last day (inclusive) after calving that still counts as `Fresh`.
pub const DEFAULT_FRESH_WINDOW_DAYS: u32 = 48;
/// Last day (inclusive) after calving that still counts as `Heat-Detection-Due`.
pub const DEFAULT_HEAT_DETECTION_WINDOW_DAYS: u32 = 365;

/// Environment variable the CLI reads when `--config` is absent.
pub const CONFIG_PATH_ENV: &str = "HERDBOOK_CONFIG";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    MissingConstant(&'static str),
    InvalidValue { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::MissingConstant(name) => {
                write!(f, "required constant `{name}` is not configured")
            }
            Self::InvalidValue { field, reason } => write!(f, "invalid `{field}`: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Validated scheduling constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    /// Days after breeding when the pregnancy diagnosis is due (K_PD).
    pub pd_check_offset_days: u32,
    /// Species gestation length in days (K_GESTATION).
    pub gestation_days: u32,
    /// Days past expected calving before a `reopen_breeding` alert fires.
    /// Zero is allowed.
    pub reopen_grace_days: u32,
    /// Reminder horizon: due dates in `[today, today + lookahead]` are announced.
    /// Zero is allowed.
    pub lookahead_days: u32,
    pub fresh_window_days: u32,
    pub heat_detection_window_days: u32,
}

/// On-disk shape; every field optional so absence can be reported by name.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    pd_check_offset_days: Option<u32>,
    gestation_days: Option<u32>,
    reopen_grace_days: Option<u32>,
    lookahead_days: Option<u32>,
    fresh_window_days: Option<u32>,
    heat_detection_window_days: Option<u32>,
}

impl EngineConfig {
    /// Builds a config from the two species constants; the rest use defaults.
    pub fn new(pd_check_offset_days: u32, gestation_days: u32) -> Result<Self, ConfigError> {
        Self {
            pd_check_offset_days,
            gestation_days,
            reopen_grace_days: DEFAULT_REOPEN_GRACE_DAYS,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            fresh_window_days: DEFAULT_FRESH_WINDOW_DAYS,
            heat_detection_window_days: DEFAULT_HEAT_DETECTION_WINDOW_DAYS,
        }
        .validated()
    }

    /// Sets the reminder horizon. Every value is valid: zero announces only
    /// reminders due today. No validated invariant involves this field.
    pub fn with_lookahead_days(mut self, days: u32) -> Self {
        self.lookahead_days = days;
        self
    }

    /// Sets the reopen grace period. Every value is valid: zero raises the
    /// alert on the day after expected calving.
    pub fn with_reopen_grace_days(mut self, days: u32) -> Self {
        self.reopen_grace_days = days;
        self
    }

    /// Parses and validates a JSON config document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        Self {
            pd_check_offset_days: raw
                .pd_check_offset_days
                .ok_or(ConfigError::MissingConstant("pd_check_offset_days"))?,
            gestation_days: raw
                .gestation_days
                .ok_or(ConfigError::MissingConstant("gestation_days"))?,
            reopen_grace_days: raw.reopen_grace_days.unwrap_or(DEFAULT_REOPEN_GRACE_DAYS),
            lookahead_days: raw.lookahead_days.unwrap_or(DEFAULT_LOOKAHEAD_DAYS),
            fresh_window_days: raw.fresh_window_days.unwrap_or(DEFAULT_FRESH_WINDOW_DAYS),
            heat_detection_window_days: raw
                .heat_detection_window_days
                .unwrap_or(DEFAULT_HEAT_DETECTION_WINDOW_DAYS),
        }
        .validated()
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        require_positive("pd_check_offset_days", self.pd_check_offset_days)?;
        require_positive("gestation_days", self.gestation_days)?;
        require_positive("heat_detection_window_days", self.heat_detection_window_days)?;

        if self.pd_check_offset_days >= self.gestation_days {
            return Err(ConfigError::InvalidValue {
                field: "pd_check_offset_days",
                reason: format!(
                    "must be shorter than gestation_days ({})",
                    self.gestation_days
                ),
            });
        }
        if self.fresh_window_days >= self.heat_detection_window_days {
            return Err(ConfigError::InvalidValue {
                field: "fresh_window_days",
                reason: format!(
                    "must be shorter than heat_detection_window_days ({})",
                    self.heat_detection_window_days
                ),
            });
        }
        Ok(self)
    }
}

fn require_positive(field: &'static str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineConfig, DEFAULT_LOOKAHEAD_DAYS, DEFAULT_REOPEN_GRACE_DAYS};
    use std::io::Write;

    #[test]
    fn json_with_species_constants_fills_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"pd_check_offset_days": 55, "gestation_days": 280}"#)
                .unwrap();
        assert_eq!(config.pd_check_offset_days, 55);
        assert_eq!(config.gestation_days, 280);
        assert_eq!(config.reopen_grace_days, DEFAULT_REOPEN_GRACE_DAYS);
        assert_eq!(config.lookahead_days, DEFAULT_LOOKAHEAD_DAYS);
    }

    #[test]
    fn missing_pd_offset_is_reported_by_name() {
        let err = EngineConfig::from_json_str(r#"{"gestation_days": 280}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingConstant("pd_check_offset_days")));
        assert_eq!(
            err.to_string(),
            "required constant `pd_check_offset_days` is not configured"
        );
    }

    #[test]
    fn missing_gestation_is_reported_by_name() {
        let err = EngineConfig::from_json_str(r#"{"pd_check_offset_days": 45}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingConstant("gestation_days")));
    }

    #[test]
    fn unknown_fields_and_bad_ranges_are_rejected() {
        let unknown = EngineConfig::from_json_str(
            r#"{"pd_check_offset_days": 45, "gestation_days": 280, "pd_offset": 60}"#,
        )
        .unwrap_err();
        assert!(matches!(unknown, ConfigError::Parse(_)));

        let inverted = EngineConfig::new(300, 280).unwrap_err();
        assert!(matches!(
            inverted,
            ConfigError::InvalidValue {
                field: "pd_check_offset_days",
                ..
            }
        ));

        let zero = EngineConfig::new(0, 280).unwrap_err();
        assert!(matches!(zero, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn zero_lookahead_and_grace_are_accepted() {
        let built = EngineConfig::new(55, 280)
            .unwrap()
            .with_lookahead_days(0)
            .with_reopen_grace_days(0);
        assert_eq!(built.lookahead_days, 0);
        assert_eq!(built.reopen_grace_days, 0);

        let loaded = EngineConfig::from_json_str(
            r#"{"pd_check_offset_days": 55, "gestation_days": 280,
                "lookahead_days": 0, "reopen_grace_days": 0}"#,
        )
        .unwrap();
        assert_eq!(loaded, built);
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"pd_check_offset_days": 60, "gestation_days": 283, "lookahead_days": 10}}"#
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.pd_check_offset_days, 60);
        assert_eq!(config.gestation_days, 283);
        assert_eq!(config.lookahead_days, 10);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
