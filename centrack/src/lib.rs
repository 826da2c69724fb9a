//! Centroid identity tracking and line-crossing counting
//!
//! This crate turns per-frame person centroids into stable identities and
//! directional entry/exit counts across a horizontal doorway line. It does no
//! I/O; persistence lives in the `occupancy` crate, which plugs in through
//! the `CrossingObserver` trait.
//!
//! # Unified Interface
//!
//! Trackers implement `MultiIdentityTracker`, matching algorithms implement
//! `MatchingStrategy`, so either can be swapped without touching the counter:
//!
//! ```rust,ignore
//! use centrack::{CentroidTracker, CountingConfig, CrossingCounter, HungarianMatcher, Point, TrackerConfig};
//!
//! let tracker = CentroidTracker::with_matcher(TrackerConfig::default(), HungarianMatcher::default())?;
//! let mut counter = CrossingCounter::with_tracker(CountingConfig::default(), Box::new(tracker))?;
//! let counts = counter.update(&[Point::new(320.0, 250.0)])?;
//! ```

pub mod crossing;
pub mod identity;
pub mod matching;
pub mod point;
pub mod trackers;

pub use crossing::{
    CounterStats, CountingConfig, CrossingCounter, CrossingEvent, CrossingObserver,
    EntryDirection, FrameCounts, Side,
};
pub use identity::{CrossingDirection, Identity};
pub use matching::{AssignmentResult, GreedyMatcher, HungarianMatcher, MatchingStrategy};
pub use point::Point;
pub use trackers::{CentroidTracker, MultiIdentityTracker, TrackerConfig};
