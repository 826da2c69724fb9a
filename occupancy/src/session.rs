//! Dwell sessions: one visit of one identity

use crate::error::{OccupancyError, Result};
use chrono::{DateTime, Datelike, Duration, Local, SecondsFormat, SubsecRound, Timelike, Utc};
use serde::Serialize;

/// One visit, from an inbound crossing to the matching outbound crossing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DwellSession {
    /// Ledger row ID
    pub id: i64,
    pub track_id: u32,
    pub entry_time: DateTime<Local>,
    pub exit_time: Option<DateTime<Local>>,
    /// Set once the session is closed
    pub dwell_minutes: Option<f64>,
    /// English weekday name of the entry, e.g. `Friday`
    pub day_of_week: Option<String>,
    /// Local hour of the entry (0-23)
    pub entry_hour: Option<u32>,
    pub is_active: bool,
}

impl DwellSession {
    pub fn open(id: i64, track_id: u32, entry_time: DateTime<Local>) -> Self {
        Self {
            id,
            track_id,
            entry_time,
            exit_time: None,
            dwell_minutes: None,
            day_of_week: None,
            entry_hour: None,
            is_active: true,
        }
    }

    /// Close the session at `exit_time` and fill in the derived fields.
    /// An exit before the entry yields a dwell of zero.
    pub fn close(&mut self, exit_time: DateTime<Local>) {
        let mut minutes = minutes_between(self.entry_time, exit_time);
        if minutes < 0.0 {
            log::warn!(
                "Track {}: exit {} precedes entry {}, clamping dwell to 0",
                self.track_id,
                exit_time.format("%H:%M:%S"),
                self.entry_time.format("%H:%M:%S")
            );
            minutes = 0.0;
        }
        self.exit_time = Some(exit_time);
        self.dwell_minutes = Some(minutes);
        self.day_of_week = Some(self.entry_time.format("%A").to_string());
        self.entry_hour = Some(self.entry_time.hour());
        self.is_active = false;
    }

    /// Dwell so far, measured against `now` while open
    pub fn current_dwell_minutes_at(&self, now: DateTime<Local>) -> f64 {
        match self.dwell_minutes {
            Some(minutes) => minutes,
            None => minutes_between(self.entry_time, now).max(0.0),
        }
    }

    pub fn current_dwell_minutes(&self) -> f64 {
        self.current_dwell_minutes_at(Local::now())
    }
}

fn minutes_between(from: DateTime<Local>, to: DateTime<Local>) -> f64 {
    let delta = to.signed_duration_since(from);
    match delta.num_microseconds() {
        Some(us) => us as f64 / 60_000_000.0,
        None => delta.num_seconds() as f64 / 60.0,
    }
}

/// Drop precision the ledger cannot store
pub(crate) fn ledger_precision(ts: DateTime<Local>) -> DateTime<Local> {
    ts.trunc_subsecs(6)
}

/// Fixed-width UTC text, so text order equals time order
pub(crate) fn to_db_time(ts: &DateTime<Local>) -> String {
    ts.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Ledger text of `now - window`. Windows reaching past year 1 give an
/// empty string, which sorts before every stored timestamp.
pub(crate) fn db_cutoff(now: DateTime<Local>, window: Duration) -> String {
    now.checked_sub_signed(window)
        .filter(|ts| ts.with_timezone(&Utc).year() >= 1)
        .map(|ts| to_db_time(&ts))
        .unwrap_or_default()
}

pub(crate) fn from_db_time(text: &str) -> Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Local))
        .map_err(|e| OccupancyError::timestamp(text, e))
}
