//! Doorway occupancy and dwell-time tracking
//!
//! Turns per-frame person centroids into durable facts: who is inside, how
//! long each visit lasted and how occupancy moved over the day.
//!
//! ```rust,ignore
//! use occupancy::{MonitorConfig, OccupancyMonitor};
//! use centrack::Point;
//!
//! let mut monitor = OccupancyMonitor::new(MonitorConfig::from_file("monitor.toml")?)?;
//! let counts = monitor.process_frame(&[Point::new(320.0, 250.0)])?;
//! let campers = monitor.dwell_store().campers(None);
//! monitor.shutdown()?;
//! ```

pub mod config;
pub mod dwell_stats;
pub mod dwell_store;
pub mod error;
pub mod monitor;
pub mod session;
pub mod snapshotter;

pub use config::{DuplicateEntryPolicy, DwellConfig, MonitorConfig, SnapshotConfig};
pub use dwell_stats::{DayOfWeekStats, DwellStatistics, HourStats, RevenueImpact};
pub use dwell_store::{DwellReport, DwellSessionStore};
pub use error::{OccupancyError, Result};
pub use monitor::OccupancyMonitor;
pub use session::DwellSession;
pub use snapshotter::{OccupancyEvent, OccupancySnapshot, OccupancySnapshotter};

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
