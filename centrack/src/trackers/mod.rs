//! Identity tracking implementations
//!
//! Trackers turn per-frame detections into identities with a stable ID.
//! The crossing counter only depends on the `MultiIdentityTracker` trait, so
//! a different tracker (or the same tracker with a different matching
//! strategy) can be dropped in without touching the counting logic.

use crate::identity::{CrossingDirection, Identity};
use crate::point::Point;
use std::collections::BTreeMap;
use std::time::Instant;

mod centroid;

pub use centroid::{CentroidTracker, TrackerConfig};

/// Common interface for multi-identity trackers
pub trait MultiIdentityTracker: Send {
    /// Update tracker with the detections of one frame observed at `now`
    ///
    /// # Arguments
    /// * `detections` - centroids of the people detected in the frame
    /// * `now` - monotonic time of the frame, used for retirement
    ///
    /// # Returns
    /// All live identities keyed by ID
    fn update_at(&mut self, detections: &[Point], now: Instant) -> &BTreeMap<u32, Identity>;

    /// Update tracker with the detections of the current frame
    fn update(&mut self, detections: &[Point]) -> &BTreeMap<u32, Identity> {
        self.update_at(detections, Instant::now())
    }

    /// Live identities keyed by ID
    fn identities(&self) -> &BTreeMap<u32, Identity>;

    /// Flag an identity as having crossed the reference line.
    /// Returns false if the identity is unknown or already crossed.
    fn mark_crossed(&mut self, id: u32, direction: CrossingDirection) -> bool;

    /// Drop all identities
    fn clear(&mut self);

    /// Number of live identities
    fn num_identities(&self) -> usize {
        self.identities().len()
    }

    /// Number of updates processed
    fn step_count(&self) -> u64;
}
