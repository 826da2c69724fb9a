//! Monitor configuration
//!
//! Everything is supplied at construction; there is no runtime
//! reconfiguration. A TOML file only needs the keys that differ from the
//! defaults:
//!
//! ```toml
//! [counting]
//! line_y = 300.0
//! entry_direction = "down"
//!
//! [dwell]
//! db_path = "data/dwell_time.db"
//! alert_minutes = 120.0
//! ```

use crate::error::{OccupancyError, Result};
use centrack::{CountingConfig, TrackerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What to do when an identity enters while it still has an open session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateEntryPolicy {
    /// Close the stale session at the new entry time, then open a new one
    #[default]
    CloseStale,
    /// Leave the stale session open next to the new one; exits close the oldest first
    KeepBoth,
}

/// Dwell session ledger configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DwellConfig {
    /// SQLite file holding the session ledger
    pub db_path: PathBuf,
    /// Minutes after which an active session shows up as a warning
    pub warning_minutes: f64,
    /// Minutes after which an active session is a camper
    pub alert_minutes: f64,
    /// Visits shorter than this count as quick visits in statistics
    pub quick_visit_minutes: f64,
    /// Closed sessions older than this are removed by the retention sweep
    pub retention_days: u32,
    pub duplicate_entry_policy: DuplicateEntryPolicy,
    /// Close every open session when the monitor shuts down
    pub close_sessions_on_shutdown: bool,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/dwell_time.db"),
            warning_minutes: 90.0,
            alert_minutes: 120.0,
            quick_visit_minutes: 30.0,
            retention_days: 90,
            duplicate_entry_policy: DuplicateEntryPolicy::CloseStale,
            close_sessions_on_shutdown: false,
        }
    }
}

impl DwellConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.warning_minutes) || !positive(self.alert_minutes) {
            return Err(OccupancyError::config(format!(
                "dwell thresholds must be positive (warning={}, alert={})",
                self.warning_minutes, self.alert_minutes
            )));
        }
        if self.warning_minutes >= self.alert_minutes {
            return Err(OccupancyError::config(format!(
                "warning threshold ({} min) must be below alert threshold ({} min)",
                self.warning_minutes, self.alert_minutes
            )));
        }
        if !positive(self.quick_visit_minutes) {
            return Err(OccupancyError::config(format!(
                "quick_visit_minutes must be positive, got {}",
                self.quick_visit_minutes
            )));
        }
        if self.retention_days == 0 {
            return Err(OccupancyError::config("retention_days must be at least 1"));
        }
        Ok(())
    }
}

/// Occupancy time series configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// SQLite file holding snapshots and events
    pub db_path: PathBuf,
    /// Seconds between background snapshots
    pub interval_secs: f64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/occupancy.db"),
            interval_secs: 60.0,
        }
    }
}

impl SnapshotConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.interval_secs.is_finite() && self.interval_secs > 0.0) {
            return Err(OccupancyError::config(format!(
                "snapshot interval must be positive, got {}s",
                self.interval_secs
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }
}

/// Full monitor configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tracker: TrackerConfig,
    pub counting: CountingConfig,
    pub dwell: DwellConfig,
    pub occupancy: SnapshotConfig,
}

impl MonitorConfig {
    /// Load and validate a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OccupancyError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tracker
            .validate()
            .map_err(|e| OccupancyError::config(format!("tracker: {:#}", e)))?;
        self.counting
            .validate()
            .map_err(|e| OccupancyError::config(format!("counting: {:#}", e)))?;
        self.dwell.validate()?;
        self.occupancy.validate()?;
        Ok(())
    }
}

/// Fail unless the directory that will hold `db_path` exists
pub(crate) fn check_storage_path(db_path: &Path) -> Result<()> {
    let parent = match db_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };
    if !parent.is_dir() {
        return Err(OccupancyError::config(format!(
            "storage directory {} does not exist",
            parent.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use centrack::EntryDirection;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dwell.warning_minutes, 90.0);
        assert_eq!(config.dwell.alert_minutes, 120.0);
        assert_eq!(config.occupancy.interval_secs, 60.0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let text = r#"
            [counting]
            line_y = 300.0
            entry_direction = "up"

            [dwell]
            alert_minutes = 150.0
            duplicate_entry_policy = "keep_both"
        "#;
        let config: MonitorConfig = toml::from_str(text).unwrap();
        assert_eq!(config.counting.line_y, 300.0);
        assert_eq!(config.counting.frame_height, 480.0);
        assert_eq!(config.counting.entry_direction, EntryDirection::Up);
        assert_eq!(config.dwell.alert_minutes, 150.0);
        assert_eq!(config.dwell.warning_minutes, 90.0);
        assert_eq!(
            config.dwell.duplicate_entry_policy,
            DuplicateEntryPolicy::KeepBoth
        );
        assert_eq!(config.tracker, TrackerConfig::default());
    }

    #[test]
    fn test_inverted_thresholds_are_rejected() {
        let config = DwellConfig {
            warning_minutes: 130.0,
            alert_minutes: 120.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(OccupancyError::ConfigError(_))
        ));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = SnapshotConfig {
            interval_secs: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_counting_line_is_a_config_error() {
        let mut config = MonitorConfig::default();
        config.counting.line_y = -5.0;
        assert!(matches!(
            config.validate(),
            Err(OccupancyError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_storage_directory() {
        assert!(check_storage_path(Path::new("/definitely/not/here/x.db")).is_err());
        assert!(check_storage_path(Path::new("relative.db")).is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(&path, "[occupancy]\ninterval_secs = 5.0\n").unwrap();
        let config = MonitorConfig::from_file(&path).unwrap();
        assert_eq!(config.occupancy.interval_secs, 5.0);

        std::fs::write(&path, "[dwell]\nwarning_minutes = -1.0\n").unwrap();
        assert!(MonitorConfig::from_file(&path).is_err());
    }
}
