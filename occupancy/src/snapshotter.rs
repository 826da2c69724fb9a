//! Occupancy time series: per-crossing events and periodic snapshots
//!
//! The frame path calls `update` with the counter's cumulative totals; new
//! entries/exits become rows in `events`. A background thread writes a row
//! to `snapshots` every `interval_secs`, whatever the frame rate is.

use crate::config::{check_storage_path, SnapshotConfig};
use crate::error::{OccupancyError, Result};
use crate::session::{db_cutoff, from_db_time, ledger_precision, to_db_time};
use centrack::{CounterStats, CrossingDirection};
use chrono::{DateTime, Duration, Local};
use crossbeam::channel::{bounded, tick, Sender};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::thread;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        current_occupancy INTEGER NOT NULL,
        total_entries INTEGER NOT NULL,
        total_exits INTEGER NOT NULL,
        active_tracks INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        occupancy_after INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp ON snapshots(timestamp);
    CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
";

/// Counter state at one point in time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancySnapshot {
    pub timestamp: DateTime<Local>,
    pub current_occupancy: u32,
    pub total_entries: u64,
    pub total_exits: u64,
    pub active_tracks: usize,
}

/// One entry or exit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyEvent {
    pub timestamp: DateTime<Local>,
    pub kind: CrossingDirection,
    pub occupancy_after: u32,
}

struct Recorder {
    conn: Connection,
    current: CounterStats,
}

impl Recorder {
    /// Insert `count` events of one kind
    fn record_events(
        conn: &Connection,
        kind: CrossingDirection,
        count: u64,
        timestamp: &str,
        occupancy_after: u32,
    ) -> Result<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO events (timestamp, event_type, occupancy_after) VALUES (?1, ?2, ?3)",
        )?;
        let kind = kind.to_string();
        for _ in 0..count {
            stmt.execute(params![timestamp, kind, occupancy_after])?;
        }
        Ok(())
    }

    fn take_snapshot(&self) -> Result<OccupancySnapshot> {
        let snapshot = OccupancySnapshot {
            timestamp: ledger_precision(Local::now()),
            current_occupancy: self.current.current_occupancy,
            total_entries: self.current.total_entries,
            total_exits: self.current.total_exits,
            active_tracks: self.current.active_tracks,
        };
        self.conn.execute(
            "INSERT INTO snapshots
             (timestamp, current_occupancy, total_entries, total_exits, active_tracks)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                to_db_time(&snapshot.timestamp),
                snapshot.current_occupancy,
                snapshot.total_entries as i64,
                snapshot.total_exits as i64,
                snapshot.active_tracks as i64
            ],
        )?;
        log::debug!("Snapshot taken: occupancy={}", snapshot.current_occupancy);
        Ok(snapshot)
    }
}

/// Records occupancy events and periodic snapshots
pub struct OccupancySnapshotter {
    config: SnapshotConfig,
    recorder: Arc<Mutex<Recorder>>,
    shutdown_tx: Option<Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl OccupancySnapshotter {
    /// Open the database at `path` and start the snapshot timer
    pub fn start<P: AsRef<Path>>(path: P, config: SnapshotConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;
        check_storage_path(path)?;
        let conn = Connection::open(path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        log::info!(
            "OccupancySnapshotter initialized (db={}, snapshot_interval={}s)",
            path.display(),
            config.interval_secs
        );
        Self::spawn(conn, config)
    }

    /// Same as `start`, with an in-memory database
    pub fn in_memory(config: SnapshotConfig) -> Result<Self> {
        config.validate()?;
        Self::spawn(Connection::open_in_memory()?, config)
    }

    fn spawn(conn: Connection, config: SnapshotConfig) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        let recorder = Arc::new(Mutex::new(Recorder {
            conn,
            current: CounterStats::default(),
        }));

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let interval = config.interval();
        let timer_recorder = Arc::clone(&recorder);
        let worker = thread::Builder::new()
            .name("occupancy-snapshots".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                let mut cycles = 0_u64;
                log::debug!("Snapshot thread started (every {:?})", interval);

                loop {
                    crossbeam::select! {
                        recv(ticker) -> _ => {
                            cycles += 1;
                            if let Err(e) = timer_recorder.lock().take_snapshot() {
                                log::error!("Periodic snapshot {} failed: {}", cycles, e);
                            }
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }

                log::debug!("Snapshot thread stopped after {} cycles", cycles);
            })?;

        Ok(Self {
            config,
            recorder,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Record the events implied by the counter moving to `stats`
    ///
    /// Totals lower than the last ones seen mean the upstream counter was
    /// reset; the baseline is taken over without recording anything.
    /// The events of one update are written together or not at all, and
    /// the baseline only moves once they are committed.
    pub fn update(&self, stats: &CounterStats) -> Result<()> {
        let mut recorder = self.recorder.lock();
        let last = recorder.current;

        if stats.total_entries < last.total_entries || stats.total_exits < last.total_exits {
            log::debug!(
                "Counter totals went backwards ({}/{} -> {}/{}), re-baselining",
                last.total_entries,
                last.total_exits,
                stats.total_entries,
                stats.total_exits
            );
            recorder.current = *stats;
            return Ok(());
        }

        let new_entries = stats.total_entries - last.total_entries;
        let new_exits = stats.total_exits - last.total_exits;
        if new_entries > 0 || new_exits > 0 {
            let timestamp = to_db_time(&Local::now());
            let occupancy = stats.current_occupancy;
            let tx = recorder.conn.unchecked_transaction()?;
            Recorder::record_events(&tx, CrossingDirection::Entry, new_entries, &timestamp, occupancy)?;
            Recorder::record_events(&tx, CrossingDirection::Exit, new_exits, &timestamp, occupancy)?;
            tx.commit()?;
            log::debug!(
                "Recorded {} entry and {} exit events (occupancy: {})",
                new_entries,
                new_exits,
                occupancy
            );
        }

        recorder.current = *stats;
        Ok(())
    }

    /// Last counter state seen
    pub fn current(&self) -> CounterStats {
        self.recorder.lock().current
    }

    /// Persist a snapshot now, outside the timer
    pub fn take_snapshot(&self) -> Result<OccupancySnapshot> {
        self.recorder.lock().take_snapshot()
    }

    /// Zero the cumulative totals. Occupancy is the real headcount and stays.
    pub fn reset_counters(&self) {
        let mut recorder = self.recorder.lock();
        recorder.current.total_entries = 0;
        recorder.current.total_exits = 0;
        log::info!("Counters reset");
    }

    /// Snapshots of the last `hours` hours, oldest first
    pub fn history(&self, hours: u32) -> Result<Vec<OccupancySnapshot>> {
        let cutoff = cutoff(hours);
        let recorder = self.recorder.lock();
        let mut stmt = recorder.conn.prepare(
            "SELECT timestamp, current_occupancy, total_entries, total_exits, active_tracks
             FROM snapshots
             WHERE timestamp >= ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (timestamp, current_occupancy, entries, exits, active) = row?;
            snapshots.push(OccupancySnapshot {
                timestamp: from_db_time(&timestamp)?,
                current_occupancy,
                total_entries: entries as u64,
                total_exits: exits as u64,
                active_tracks: active as usize,
            });
        }
        Ok(snapshots)
    }

    /// Events of the last `hours` hours, oldest first
    pub fn events(&self, hours: u32) -> Result<Vec<OccupancyEvent>> {
        let cutoff = cutoff(hours);
        let recorder = self.recorder.lock();
        let mut stmt = recorder.conn.prepare(
            "SELECT timestamp, event_type, occupancy_after
             FROM events
             WHERE timestamp >= ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (timestamp, kind, occupancy_after) = row?;
            let kind = match kind.as_str() {
                "entry" => CrossingDirection::Entry,
                "exit" => CrossingDirection::Exit,
                other => {
                    log::warn!("Skipping event with unknown type {:?}", other);
                    continue;
                }
            };
            events.push(OccupancyEvent {
                timestamp: from_db_time(&timestamp)?,
                kind,
                occupancy_after,
            });
        }
        Ok(events)
    }

    /// Highest snapshot occupancy of the last `hours` hours and when it was
    /// first reached; `(0, now)` without snapshots
    pub fn peak_occupancy(&self, hours: u32) -> Result<(u32, DateTime<Local>)> {
        let cutoff = cutoff(hours);
        let peak = self
            .recorder
            .lock()
            .conn
            .query_row(
                "SELECT current_occupancy, timestamp
                 FROM snapshots
                 WHERE timestamp >= ?1
                 ORDER BY current_occupancy DESC, timestamp ASC, id ASC
                 LIMIT 1",
                params![cutoff],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match peak {
            Some((count, timestamp)) => Ok((count, from_db_time(&timestamp)?)),
            None => Ok((0, Local::now())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Stop the timer and persist a final snapshot. Later calls do nothing.
    pub fn stop(&mut self) -> Result<()> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Ok(());
        };
        let _ = shutdown_tx.send(());

        let joined = match self.worker.take() {
            Some(handle) => handle.join().map_err(|_| OccupancyError::WorkerPanicked),
            None => Ok(()),
        };

        self.take_snapshot()?;
        log::info!("OccupancySnapshotter stopped");
        joined
    }
}

impl Drop for OccupancySnapshotter {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Failed to stop snapshotter: {}", e);
        }
    }
}

fn cutoff(hours: u32) -> String {
    db_cutoff(Local::now(), Duration::hours(i64::from(hours)))
}
