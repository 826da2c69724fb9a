//! Frame-processing entry point tying counter, ledger and time series together

use crate::config::MonitorConfig;
use crate::dwell_store::DwellSessionStore;
use crate::error::{OccupancyError, Result};
use crate::snapshotter::OccupancySnapshotter;
use centrack::{CounterStats, CrossingCounter, FrameCounts, Point};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Instant;

/// One camera's occupancy pipeline
///
/// Detections flow `CrossingCounter` -> `DwellSessionStore` (session
/// open/close) and `OccupancySnapshotter` (events, snapshots) on the
/// caller's thread; only the periodic snapshot runs in the background.
pub struct OccupancyMonitor {
    config: MonitorConfig,
    counter: CrossingCounter,
    dwell_store: Arc<DwellSessionStore>,
    snapshotter: OccupancySnapshotter,
    frames_processed: u64,
}

impl OccupancyMonitor {
    /// Open both databases named in `config`, recover open sessions and
    /// start the snapshot timer
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let dwell_store = DwellSessionStore::open(&config.dwell.db_path, config.dwell.clone())?;
        let snapshotter =
            OccupancySnapshotter::start(&config.occupancy.db_path, config.occupancy.clone())?;
        Self::assemble(config, dwell_store, snapshotter)
    }

    /// Monitor without files; `db_path` settings are ignored
    pub fn in_memory(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let dwell_store = DwellSessionStore::in_memory(config.dwell.clone())?;
        let snapshotter = OccupancySnapshotter::in_memory(config.occupancy.clone())?;
        Self::assemble(config, dwell_store, snapshotter)
    }

    fn assemble(
        config: MonitorConfig,
        dwell_store: DwellSessionStore,
        snapshotter: OccupancySnapshotter,
    ) -> Result<Self> {
        let dwell_store = Arc::new(dwell_store);

        // Continue numbering after the ledger so recovered sessions keep their IDs
        let mut tracker_config = config.tracker.clone();
        if let Some(max_id) = dwell_store.max_track_id()? {
            tracker_config.first_id = tracker_config.first_id.max(max_id.saturating_add(1));
        }
        let first_id = tracker_config.first_id;

        let counter = CrossingCounter::new(config.counting.clone(), tracker_config)
            .map_err(|e| OccupancyError::config(format!("{:#}", e)))?
            .with_observer(Box::new(Arc::clone(&dwell_store)));

        log::info!(
            "OccupancyMonitor ready (first track id {}, {} open sessions)",
            first_id,
            dwell_store.active_count()
        );

        Ok(Self {
            config,
            counter,
            dwell_store,
            snapshotter,
            frames_processed: 0,
        })
    }

    /// Run one frame of detections through the pipeline
    pub fn process_frame(&mut self, detections: &[Point]) -> Result<FrameCounts> {
        self.process_frame_at(detections, Instant::now(), Local::now())
    }

    pub fn process_frame_at(
        &mut self,
        detections: &[Point],
        now: Instant,
        timestamp: DateTime<Local>,
    ) -> Result<FrameCounts> {
        self.frames_processed += 1;
        let counted = self.counter.update_at(detections, now, timestamp);

        // The counters moved even if the ledger write failed; keep the series in step
        self.snapshotter.update(&self.counter.stats())?;

        counted.map_err(OccupancyError::from_tracking)
    }

    /// Start a new counting day. Occupancy history and open sessions stay.
    pub fn daily_reset(&mut self) {
        self.counter.reset();
        self.snapshotter.reset_counters();
        log::info!("Daily reset after {} frames", self.frames_processed);
    }

    pub fn stats(&self) -> CounterStats {
        self.counter.stats()
    }

    pub fn counter(&self) -> &CrossingCounter {
        &self.counter
    }

    pub fn dwell_store(&self) -> &Arc<DwellSessionStore> {
        &self.dwell_store
    }

    pub fn snapshotter(&self) -> &OccupancySnapshotter {
        &self.snapshotter
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Stop the snapshot timer (final snapshot), optionally close open
    /// sessions, then sweep old sessions out of the ledger
    pub fn shutdown(&mut self) -> Result<()> {
        self.snapshotter.stop()?;

        if self.config.dwell.close_sessions_on_shutdown {
            self.dwell_store.close_all_active(None)?;
        }
        self.dwell_store
            .cleanup_old_data(self.config.dwell.retention_days)?;

        log::info!(
            "OccupancyMonitor shut down after {} frames ({} entries, {} exits)",
            self.frames_processed,
            self.counter.total_entries(),
            self.counter.total_exits()
        );
        Ok(())
    }
}
