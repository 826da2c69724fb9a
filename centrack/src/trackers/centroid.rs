//! Centroid tracking: nearest-neighbour association of detection centers
//!
//! Suited to a doorway camera where people move a few pixels per frame.

use super::MultiIdentityTracker;
use crate::identity::{CrossingDirection, Identity};
use crate::matching::{GreedyMatcher, MatchingStrategy};
use crate::point::{distances, Point};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Configuration for centroid tracking
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Frames an identity may go unmatched before it is retired
    pub max_disappeared_frames: u32,
    /// Frame rate used to turn `max_disappeared_frames` into wall-clock time
    pub assumed_fps: f32,
    /// Maximum centroid distance (pixels) for a detection to continue an identity
    pub max_match_distance: f32,
    /// Number of recent centroids kept per identity
    pub history_len: usize,
    /// First ID handed out
    pub first_id: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_disappeared_frames: 30, // 1 second at 30fps
            assumed_fps: 30.0,
            max_match_distance: 50.0,
            history_len: 30,
            first_id: 1,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_disappeared_frames > 0,
            "max_disappeared_frames must be positive"
        );
        ensure!(
            self.assumed_fps.is_finite() && self.assumed_fps > 0.0,
            "assumed_fps must be a positive number, got {}",
            self.assumed_fps
        );
        ensure!(
            self.max_match_distance.is_finite() && self.max_match_distance > 0.0,
            "max_match_distance must be a positive number, got {}",
            self.max_match_distance
        );
        ensure!(
            self.history_len >= 2,
            "history_len must be at least 2 to detect movement, got {}",
            self.history_len
        );
        Ok(())
    }

    /// Time an identity may go unmatched before it is retired
    pub fn disappearance_window(&self) -> Duration {
        Duration::from_secs_f32(self.max_disappeared_frames as f32 / self.assumed_fps)
    }
}

/// Centroid tracker with a pluggable matching strategy
pub struct CentroidTracker<M: MatchingStrategy = GreedyMatcher> {
    config: TrackerConfig,
    disappearance_window: Duration,
    matcher: M,
    next_id: u32,
    identities: BTreeMap<u32, Identity>,
    n_steps: u64,
}

impl CentroidTracker<GreedyMatcher> {
    pub fn new(config: TrackerConfig) -> Result<Self> {
        Self::with_matcher(config, GreedyMatcher)
    }
}

impl<M: MatchingStrategy> CentroidTracker<M> {
    pub fn with_matcher(config: TrackerConfig, matcher: M) -> Result<Self> {
        config.validate()?;
        log::info!(
            "CentroidTracker initialized (matcher={}, max_disappeared={}, max_distance={:.1})",
            matcher.name(),
            config.max_disappeared_frames,
            config.max_match_distance
        );
        Ok(Self {
            disappearance_window: config.disappearance_window(),
            next_id: config.first_id,
            config,
            matcher,
            identities: BTreeMap::new(),
            n_steps: 0,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// ID the next registered identity will get
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    fn register(&mut self, centroid: Point, now: Instant) -> u32 {
        let id = self.next_id;
        self.identities.insert(
            id,
            Identity::new(id, centroid, self.config.history_len, now),
        );
        self.next_id = self.next_id.wrapping_add(1);
        log::debug!("Registered identity {} at {}", id, centroid);
        id
    }

    /// Age every identity in `missed` and retire those gone for too long
    fn age_and_retire(&mut self, missed: &[u32], now: Instant) {
        let window = self.disappearance_window;
        let mut retired = Vec::new();
        for id in missed {
            if let Some(identity) = self.identities.get_mut(id) {
                identity.mark_missed();
                if identity.since_last_seen(now) > window {
                    retired.push(*id);
                }
            }
        }
        for id in retired {
            self.identities.remove(&id);
            log::debug!("Retired identity {}", id);
        }
    }

    /// Associate detections with live identities, register the rest
    fn associate(&mut self, detections: &[Point], now: Instant) {
        let ids: Vec<u32> = self.identities.keys().copied().collect();
        let positions: Vec<Point> = self.identities.values().map(|i| i.position()).collect();

        let cost = distances(&positions, detections);
        let result = self
            .matcher
            .assign(cost.view(), self.config.max_match_distance);

        for &(row, col) in &result.assignments {
            if let Some(identity) = self.identities.get_mut(&ids[row]) {
                identity.update_position(detections[col], now);
            }
        }

        for &col in &result.unmatched_cols {
            self.register(detections[col], now);
        }

        let missed: Vec<u32> = result.unmatched_rows.iter().map(|&row| ids[row]).collect();
        self.age_and_retire(&missed, now);
    }
}

impl<M: MatchingStrategy> MultiIdentityTracker for CentroidTracker<M> {
    fn update_at(&mut self, detections: &[Point], now: Instant) -> &BTreeMap<u32, Identity> {
        self.n_steps += 1;

        if detections.is_empty() {
            let all: Vec<u32> = self.identities.keys().copied().collect();
            self.age_and_retire(&all, now);
        } else if self.identities.is_empty() {
            for &centroid in detections {
                self.register(centroid, now);
            }
        } else {
            self.associate(detections, now);
        }

        &self.identities
    }

    fn identities(&self) -> &BTreeMap<u32, Identity> {
        &self.identities
    }

    fn mark_crossed(&mut self, id: u32, direction: CrossingDirection) -> bool {
        self.identities
            .get_mut(&id)
            .map(|identity| identity.mark_crossed(direction))
            .unwrap_or(false)
    }

    /// IDs keep counting up so a cleared tracker never reuses one
    fn clear(&mut self) {
        self.identities.clear();
        self.n_steps = 0;
    }

    fn step_count(&self) -> u64 {
        self.n_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::HungarianMatcher;

    fn tracker() -> CentroidTracker {
        CentroidTracker::new(TrackerConfig::default()).unwrap()
    }

    #[test]
    fn test_first_update_registers_everything() {
        let mut tracker = tracker();
        let now = Instant::now();
        let ids: Vec<u32> = tracker
            .update_at(&[Point::new(10.0, 10.0), Point::new(200.0, 200.0)], now)
            .keys()
            .copied()
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(tracker.step_count(), 1);
    }

    #[test]
    fn test_nearby_detection_keeps_identity() {
        let mut tracker = tracker();
        let now = Instant::now();
        tracker.update_at(&[Point::new(320.0, 250.0)], now);
        let identities = tracker.update_at(&[Point::new(320.0, 270.0)], now);
        assert_eq!(identities.len(), 1);
        let identity = &identities[&1];
        assert_eq!(identity.history().len(), 2);
        assert_eq!(identity.position(), Point::new(320.0, 270.0));
    }

    #[test]
    fn test_distant_detection_registers_new_identity() {
        let mut tracker = tracker();
        let now = Instant::now();
        tracker.update_at(&[Point::new(0.0, 0.0)], now);
        let identities = tracker.update_at(&[Point::new(300.0, 300.0)], now);
        // The old identity is unmatched but still inside the disappearance window
        assert_eq!(identities.len(), 2);
        assert_eq!(identities[&1].frames_unmatched, 1);
        assert!(identities.contains_key(&2));
    }

    #[test]
    fn test_empty_frames_retire_after_window() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.update_at(&[Point::new(10.0, 10.0)], start);

        // 30 frames at 30fps = 1s window
        tracker.update_at(&[], start + Duration::from_millis(500));
        assert_eq!(tracker.num_identities(), 1);
        assert_eq!(tracker.identities()[&1].frames_unmatched, 1);

        tracker.update_at(&[], start + Duration::from_millis(1100));
        assert_eq!(tracker.num_identities(), 0);
    }

    #[test]
    fn test_unmatched_identity_retires_while_others_are_seen() {
        let mut tracker = tracker();
        let start = Instant::now();
        tracker.update_at(&[Point::new(10.0, 10.0), Point::new(400.0, 10.0)], start);
        let later = start + Duration::from_millis(1500);
        let identities = tracker.update_at(&[Point::new(12.0, 10.0)], later);
        assert_eq!(identities.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_empty_update_on_empty_tracker_is_noop() {
        let mut tracker = tracker();
        assert!(tracker.update(&[]).is_empty());
        assert_eq!(tracker.next_id(), 1);
    }

    #[test]
    fn test_mark_crossed() {
        let mut tracker = tracker();
        tracker.update(&[Point::new(1.0, 1.0)]);
        assert!(tracker.mark_crossed(1, CrossingDirection::Entry));
        assert!(!tracker.mark_crossed(1, CrossingDirection::Entry));
        assert!(!tracker.mark_crossed(99, CrossingDirection::Exit));
    }

    #[test]
    fn test_clear_keeps_id_sequence() {
        let mut tracker = tracker();
        tracker.update(&[Point::new(1.0, 1.0), Point::new(100.0, 1.0)]);
        tracker.clear();
        assert_eq!(tracker.num_identities(), 0);
        let ids: Vec<u32> = tracker.update(&[Point::new(1.0, 1.0)]).keys().copied().collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_first_id_is_configurable() {
        let config = TrackerConfig {
            first_id: 42,
            ..Default::default()
        };
        let mut tracker = CentroidTracker::new(config).unwrap();
        assert!(tracker.update(&[Point::new(0.0, 0.0)]).contains_key(&42));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TrackerConfig {
            assumed_fps: 0.0,
            ..Default::default()
        };
        assert!(CentroidTracker::new(config).is_err());

        let config = TrackerConfig {
            history_len: 1,
            ..Default::default()
        };
        assert!(CentroidTracker::new(config).is_err());
    }

    #[test]
    fn test_hungarian_tracker_assigns_min_cost() {
        let mut tracker =
            CentroidTracker::with_matcher(TrackerConfig::default(), HungarianMatcher::default())
                .unwrap();
        let now = Instant::now();
        tracker.update_at(&[Point::new(100.0, 100.0), Point::new(140.0, 100.0)], now);
        let identities = tracker.update_at(&[Point::new(115.0, 100.0), Point::new(150.0, 100.0)], now);
        assert_eq!(identities[&1].position(), Point::new(115.0, 100.0));
        assert_eq!(identities[&2].position(), Point::new(150.0, 100.0));
    }
}
