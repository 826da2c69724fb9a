//! Dwell session ledger backed by SQLite
//!
//! Every visit is one row in `sessions`. Open visits are also kept in
//! memory so camper/warning queries never touch the database. The
//! connection and the in-memory set sit behind one lock and every write is
//! committed before the lock is released.

use crate::config::{check_storage_path, DuplicateEntryPolicy, DwellConfig};
use crate::dwell_stats::{DayOfWeekStats, DwellStatistics, HourStats, RevenueImpact};
use crate::error::{OccupancyError, Result};
use crate::session::{db_cutoff, from_db_time, ledger_precision, to_db_time, DwellSession};
use centrack::CrossingObserver;
use chrono::{DateTime, Duration, Local, Weekday};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Spend per visitor assumed by `export_report`
pub const DEFAULT_AVG_SPEND: f64 = 30.0;
/// Target dwell assumed by `export_report`
pub const DEFAULT_TARGET_DWELL_MINUTES: f64 = 75.0;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        track_id INTEGER NOT NULL,
        entry_time TEXT NOT NULL,
        exit_time TEXT,
        dwell_minutes REAL,
        day_of_week TEXT,
        entry_hour INTEGER,
        is_active INTEGER DEFAULT 1
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_entry_time ON sessions(entry_time);
    CREATE INDEX IF NOT EXISTS idx_sessions_exit_time ON sessions(exit_time);
    CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions(is_active);
    CREATE INDEX IF NOT EXISTS idx_sessions_day ON sessions(day_of_week);
";

struct Ledger {
    conn: Connection,
    /// open sessions per track, oldest first
    active: BTreeMap<u32, VecDeque<DwellSession>>,
}

/// Owns the lifecycle of every visit: open, running, closed
pub struct DwellSessionStore {
    config: DwellConfig,
    path: Option<PathBuf>,
    ledger: Mutex<Ledger>,
}

/// Report written by `export_report`
#[derive(Debug, Serialize)]
pub struct DwellReport {
    pub generated_at: DateTime<Local>,
    pub period_days: u32,
    pub statistics: DwellStatistics,
    pub revenue_impact: RevenueImpact,
    pub active_sessions: Vec<DwellSession>,
    pub current_campers: Vec<DwellSession>,
    pub current_warnings: Vec<DwellSession>,
}

impl DwellSessionStore {
    /// Open (or create) the ledger at `path` and reload open sessions
    pub fn open<P: AsRef<Path>>(path: P, config: DwellConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;
        check_storage_path(path)?;

        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;

        Self::from_connection(conn, config, Some(path.to_path_buf()))
    }

    pub fn in_memory(config: DwellConfig) -> Result<Self> {
        config.validate()?;
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, config, None)
    }

    fn from_connection(conn: Connection, config: DwellConfig, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        let active = load_active_sessions(&conn)?;
        let recovered: usize = active.values().map(VecDeque::len).sum();
        if recovered > 0 {
            log::info!("Loaded {} active sessions from database", recovered);
        }

        log::info!(
            "DwellSessionStore initialized (db={}, warning={}m, alert={}m, policy={:?})",
            path.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string()),
            config.warning_minutes,
            config.alert_minutes,
            config.duplicate_entry_policy
        );

        Ok(Self {
            config,
            path,
            ledger: Mutex::new(Ledger { conn, active }),
        })
    }

    pub fn config(&self) -> &DwellConfig {
        &self.config
    }

    /// Database file, `None` for an in-memory ledger
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Open a session for `track_id` entering at `timestamp` (default now)
    pub fn record_entry(
        &self,
        track_id: u32,
        timestamp: Option<DateTime<Local>>,
    ) -> Result<DwellSession> {
        let timestamp = ledger_precision(timestamp.unwrap_or_else(Local::now));
        let mut guard = self.ledger.lock();
        let ledger = &mut *guard;

        if self.config.duplicate_entry_policy == DuplicateEntryPolicy::CloseStale {
            while let Some(stale) = ledger.close_oldest(track_id, timestamp)? {
                log::warn!(
                    "Track {} entered again while session {} was open; closed it after {:.1} minutes",
                    track_id,
                    stale.id,
                    stale.dwell_minutes.unwrap_or_default()
                );
            }
        }

        ledger.conn.execute(
            "INSERT INTO sessions (track_id, entry_time, is_active) VALUES (?1, ?2, 1)",
            params![track_id, to_db_time(&timestamp)],
        )?;
        let session = DwellSession::open(ledger.conn.last_insert_rowid(), track_id, timestamp);
        ledger
            .active
            .entry(track_id)
            .or_default()
            .push_back(session.clone());

        log::info!(
            "Entry recorded: track_id={}, time={}",
            track_id,
            timestamp.format("%H:%M:%S")
        );
        Ok(session)
    }

    /// Close the oldest open session of `track_id`.
    /// Returns `None` (and changes nothing) when the track has no open session.
    pub fn record_exit(
        &self,
        track_id: u32,
        timestamp: Option<DateTime<Local>>,
    ) -> Result<Option<DwellSession>> {
        let timestamp = ledger_precision(timestamp.unwrap_or_else(Local::now));
        let closed = self.ledger.lock().close_oldest(track_id, timestamp)?;

        match &closed {
            Some(session) => log::info!(
                "Exit recorded: track_id={}, dwell_time={:.1} minutes",
                track_id,
                session.dwell_minutes.unwrap_or_default()
            ),
            None => log::warn!("Exit recorded for unknown track_id: {}", track_id),
        }
        Ok(closed)
    }

    /// Open sessions ordered by entry time
    pub fn active_sessions(&self) -> Vec<DwellSession> {
        self.ledger.lock().active_sorted()
    }

    pub fn active_count(&self) -> usize {
        self.ledger.lock().active.values().map(VecDeque::len).sum()
    }

    /// Open sessions that have lasted at least `threshold_minutes`
    /// (default: the alert threshold), longest first
    pub fn campers(&self, threshold_minutes: Option<f64>) -> Vec<DwellSession> {
        let threshold = threshold_minutes.unwrap_or(self.config.alert_minutes);
        self.campers_at(threshold, Local::now())
    }

    pub fn campers_at(&self, threshold_minutes: f64, now: DateTime<Local>) -> Vec<DwellSession> {
        self.ledger
            .lock()
            .dwelling_between(now, threshold_minutes, None)
    }

    /// Open sessions between the warning and the alert threshold, longest first
    pub fn warnings(&self) -> Vec<DwellSession> {
        self.warnings_at(Local::now())
    }

    pub fn warnings_at(&self, now: DateTime<Local>) -> Vec<DwellSession> {
        self.ledger.lock().dwelling_between(
            now,
            self.config.warning_minutes,
            Some(self.config.alert_minutes),
        )
    }

    /// Statistics over sessions closed within the last `days` days
    pub fn statistics(&self, days: u32) -> Result<DwellStatistics> {
        self.statistics_at(days, Local::now())
    }

    pub fn statistics_at(&self, days: u32, now: DateTime<Local>) -> Result<DwellStatistics> {
        let cutoff = db_cutoff(now, Duration::days(i64::from(days)));
        let ledger = self.ledger.lock();
        let conn = &ledger.conn;

        let (total_visits, avg, min, max, campers, quick_visits) = conn.query_row(
            "SELECT COUNT(*),
                    AVG(dwell_minutes),
                    MIN(dwell_minutes),
                    MAX(dwell_minutes),
                    SUM(CASE WHEN dwell_minutes >= ?1 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN dwell_minutes < ?2 THEN 1 ELSE 0 END)
             FROM sessions
             WHERE exit_time >= ?3 AND is_active = 0",
            params![
                self.config.alert_minutes,
                self.config.quick_visit_minutes,
                cutoff
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            },
        )?;

        let mut by_day_of_week = {
            let mut stmt = conn.prepare(
                "SELECT day_of_week, AVG(dwell_minutes), COUNT(*)
                 FROM sessions
                 WHERE exit_time >= ?1 AND is_active = 0 AND day_of_week IS NOT NULL
                 GROUP BY day_of_week",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| {
                Ok(DayOfWeekStats {
                    day: row.get(0)?,
                    avg_dwell_minutes: row.get::<_, Option<f64>>(1)?.unwrap_or_default(),
                    visit_count: row.get::<_, i64>(2)? as u64,
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        by_day_of_week.sort_by_key(|d| {
            d.day
                .parse::<Weekday>()
                .map(|w| w.num_days_from_monday())
                .unwrap_or(u32::MAX)
        });

        let by_entry_hour = {
            let mut stmt = conn.prepare(
                "SELECT entry_hour, AVG(dwell_minutes), COUNT(*)
                 FROM sessions
                 WHERE exit_time >= ?1 AND is_active = 0 AND entry_hour IS NOT NULL
                 GROUP BY entry_hour
                 ORDER BY entry_hour",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| {
                Ok(HourStats {
                    hour: row.get(0)?,
                    avg_dwell_minutes: row.get::<_, Option<f64>>(1)?.unwrap_or_default(),
                    visit_count: row.get::<_, i64>(2)? as u64,
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let current_campers = ledger
            .dwelling_between(now, self.config.alert_minutes, None)
            .len();
        let current_warnings = ledger
            .dwelling_between(
                now,
                self.config.warning_minutes,
                Some(self.config.alert_minutes),
            )
            .len();

        Ok(DwellStatistics {
            period_days: days,
            total_visits: total_visits as u64,
            avg_dwell_minutes: avg.unwrap_or_default(),
            min_dwell_minutes: min.unwrap_or_default(),
            max_dwell_minutes: max.unwrap_or_default(),
            campers_count: campers.unwrap_or_default() as u64,
            quick_visits_count: quick_visits.unwrap_or_default() as u64,
            by_day_of_week,
            by_entry_hour,
            current_active: ledger.active.values().map(VecDeque::len).sum(),
            current_campers,
            current_warnings,
        })
    }

    /// Revenue estimate from the last 30 days of visits
    pub fn revenue_impact_estimate(
        &self,
        avg_spend: f64,
        target_dwell_minutes: f64,
    ) -> Result<RevenueImpact> {
        if !(target_dwell_minutes.is_finite() && target_dwell_minutes > 0.0) {
            return Err(OccupancyError::config(format!(
                "target dwell must be positive, got {}",
                target_dwell_minutes
            )));
        }
        let stats = self.statistics(30)?;
        Ok(RevenueImpact::estimate(&stats, avg_spend, target_dwell_minutes))
    }

    /// Delete closed sessions that ended more than `days_to_keep` days ago.
    /// Returns the number of rows removed.
    pub fn cleanup_old_data(&self, days_to_keep: u32) -> Result<usize> {
        let cutoff = db_cutoff(Local::now(), Duration::days(i64::from(days_to_keep)));
        let deleted = self.ledger.lock().conn.execute(
            "DELETE FROM sessions WHERE exit_time < ?1 AND is_active = 0",
            params![cutoff],
        )?;
        log::info!(
            "Cleaned up {} old sessions (older than {} days)",
            deleted,
            days_to_keep
        );
        Ok(deleted)
    }

    /// Close every open session at `timestamp` (default now)
    pub fn close_all_active(&self, timestamp: Option<DateTime<Local>>) -> Result<Vec<DwellSession>> {
        let timestamp = ledger_precision(timestamp.unwrap_or_else(Local::now));
        let mut ledger = self.ledger.lock();
        let track_ids: Vec<u32> = ledger.active.keys().copied().collect();

        let mut closed = Vec::new();
        for track_id in track_ids {
            while let Some(session) = ledger.close_oldest(track_id, timestamp)? {
                closed.push(session);
            }
        }
        if !closed.is_empty() {
            log::info!("Closed {} active sessions", closed.len());
        }
        Ok(closed)
    }

    /// Highest track ID in the ledger, open or closed
    pub fn max_track_id(&self) -> Result<Option<u32>> {
        let max = self
            .ledger
            .lock()
            .conn
            .query_row("SELECT MAX(track_id) FROM sessions", [], |row| {
                row.get::<_, Option<u32>>(0)
            })?;
        Ok(max)
    }

    /// Look up one ledger row
    pub fn session(&self, id: i64) -> Result<Option<DwellSession>> {
        let ledger = self.ledger.lock();
        let row = ledger
            .conn
            .query_row(
                "SELECT id, track_id, entry_time, exit_time, dwell_minutes, day_of_week,
                        entry_hour, is_active
                 FROM sessions WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<u32>>(6)?,
                        row.get::<_, bool>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, track_id, entry, exit, dwell_minutes, day_of_week, entry_hour, is_active)) =
            row
        else {
            return Ok(None);
        };
        Ok(Some(DwellSession {
            id,
            track_id,
            entry_time: from_db_time(&entry)?,
            exit_time: exit.as_deref().map(from_db_time).transpose()?,
            dwell_minutes,
            day_of_week,
            entry_hour,
            is_active,
        }))
    }

    /// Write a JSON report covering the last `days` days
    pub fn export_report<P: AsRef<Path>>(&self, path: P, days: u32) -> Result<DwellReport> {
        let now = Local::now();
        let report = DwellReport {
            generated_at: now,
            period_days: days,
            statistics: self.statistics_at(days, now)?,
            revenue_impact: self
                .revenue_impact_estimate(DEFAULT_AVG_SPEND, DEFAULT_TARGET_DWELL_MINUTES)?,
            active_sessions: self.active_sessions(),
            current_campers: self.campers_at(self.config.alert_minutes, now),
            current_warnings: self.warnings_at(now),
        };

        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, &report)?;
        log::info!("Report exported to {}", path.as_ref().display());
        Ok(report)
    }
}

impl Ledger {
    /// Close and persist the oldest open session of `track_id`
    fn close_oldest(
        &mut self,
        track_id: u32,
        timestamp: DateTime<Local>,
    ) -> Result<Option<DwellSession>> {
        let Some(mut session) = self
            .active
            .get(&track_id)
            .and_then(|queue| queue.front())
            .cloned()
        else {
            return Ok(None);
        };

        session.close(timestamp);
        self.conn.execute(
            "UPDATE sessions
             SET exit_time = ?1, dwell_minutes = ?2, day_of_week = ?3, entry_hour = ?4,
                 is_active = 0
             WHERE id = ?5",
            params![
                to_db_time(&timestamp),
                session.dwell_minutes,
                session.day_of_week,
                session.entry_hour,
                session.id
            ],
        )?;

        if let Some(queue) = self.active.get_mut(&track_id) {
            queue.pop_front();
            if queue.is_empty() {
                self.active.remove(&track_id);
            }
        }
        Ok(Some(session))
    }

    fn active_sorted(&self) -> Vec<DwellSession> {
        let mut sessions: Vec<DwellSession> = self.active.values().flatten().cloned().collect();
        sessions.sort_by(|a, b| a.entry_time.cmp(&b.entry_time).then(a.id.cmp(&b.id)));
        sessions
    }

    /// Open sessions with `min <= dwell` (and `dwell < max` when given), longest first
    fn dwelling_between(
        &self,
        now: DateTime<Local>,
        min_minutes: f64,
        max_minutes: Option<f64>,
    ) -> Vec<DwellSession> {
        let mut matching: Vec<(f64, DwellSession)> = self
            .active
            .values()
            .flatten()
            .filter_map(|session| {
                let dwell = session.current_dwell_minutes_at(now);
                let below_max = max_minutes.map_or(true, |max| dwell < max);
                (dwell >= min_minutes && below_max).then(|| (dwell, session.clone()))
            })
            .collect();
        matching.sort_by(|a, b| b.0.total_cmp(&a.0));
        matching.into_iter().map(|(_, session)| session).collect()
    }
}

fn load_active_sessions(conn: &Connection) -> Result<BTreeMap<u32, VecDeque<DwellSession>>> {
    let mut stmt = conn.prepare(
        "SELECT id, track_id, entry_time
         FROM sessions
         WHERE is_active = 1 AND exit_time IS NULL
         ORDER BY entry_time, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, u32>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut active: BTreeMap<u32, VecDeque<DwellSession>> = BTreeMap::new();
    for row in rows {
        let (id, track_id, entry) = row?;
        let session = DwellSession::open(id, track_id, from_db_time(&entry)?);
        active.entry(track_id).or_default().push_back(session);
    }
    Ok(active)
}

impl CrossingObserver for DwellSessionStore {
    fn on_entry(&self, track_id: u32, timestamp: DateTime<Local>) -> anyhow::Result<()> {
        self.record_entry(track_id, Some(timestamp))?;
        Ok(())
    }

    fn on_exit(&self, track_id: u32, timestamp: DateTime<Local>) -> anyhow::Result<()> {
        self.record_exit(track_id, Some(timestamp))?;
        Ok(())
    }
}
