//! Entry/exit counting by reference-line crossing
//!
//! A horizontal line is drawn across the doorway. Every tracked identity is
//! classified as above or below the line each frame; the first time its side
//! flips it produces exactly one entry or exit, depending on which way the
//! configured entry direction points. Later flips of the same identity are
//! ignored, which suppresses jitter of people standing on the line.

use crate::identity::{CrossingDirection, Identity};
use crate::point::Point;
use crate::trackers::{CentroidTracker, MultiIdentityTracker, TrackerConfig};
use anyhow::{ensure, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Which way a person moves in the frame when they walk in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    /// Moving from above the line to below it is an entry
    #[default]
    Down,
    /// Moving from below the line to above it is an entry
    Up,
}

impl EntryDirection {
    fn classify(&self, from: Side, to: Side) -> Option<CrossingDirection> {
        match (from, to, self) {
            (Side::Above, Side::Below, Self::Down) | (Side::Below, Side::Above, Self::Up) => {
                Some(CrossingDirection::Entry)
            }
            (Side::Above, Side::Below, Self::Up) | (Side::Below, Side::Above, Self::Down) => {
                Some(CrossingDirection::Exit)
            }
            _ => None,
        }
    }
}

/// Position of a centroid relative to the counting line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Above,
    Below,
}

impl Side {
    pub fn of(point: &Point, line_y: f32) -> Self {
        if point.y < line_y {
            Side::Above
        } else {
            Side::Below
        }
    }
}

/// Counting line configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingConfig {
    /// Y coordinate of the counting line (0 = top of frame)
    pub line_y: f32,
    /// Height of the video frame in pixels
    pub frame_height: f32,
    pub entry_direction: EntryDirection,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            line_y: 240.0,
            frame_height: 480.0,
            entry_direction: EntryDirection::Down,
        }
    }
}

impl CountingConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.frame_height.is_finite() && self.frame_height > 0.0,
            "frame_height must be positive, got {}",
            self.frame_height
        );
        ensure!(
            self.line_y.is_finite() && (0.0..=self.frame_height).contains(&self.line_y),
            "line_y {} is outside the frame (0..={})",
            self.line_y,
            self.frame_height
        );
        Ok(())
    }
}

/// One line crossing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossingEvent {
    pub track_id: u32,
    pub direction: CrossingDirection,
    pub timestamp: DateTime<Local>,
    pub occupancy_after: u32,
}

/// Crossings produced by a single frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameCounts {
    pub entries: u32,
    pub exits: u32,
}

/// Aggregate counters of a `CrossingCounter`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterStats {
    pub total_entries: u64,
    pub total_exits: u64,
    pub current_occupancy: u32,
    pub active_tracks: usize,
}

/// Receiver of session start/stop signals
///
/// Implemented by the dwell session store; errors are handed back to
/// whoever called `CrossingCounter::update`.
pub trait CrossingObserver: Send + Sync {
    fn on_entry(&self, track_id: u32, timestamp: DateTime<Local>) -> Result<()>;

    fn on_exit(&self, track_id: u32, timestamp: DateTime<Local>) -> Result<()>;
}

impl<T: CrossingObserver + ?Sized> CrossingObserver for Arc<T> {
    fn on_entry(&self, track_id: u32, timestamp: DateTime<Local>) -> Result<()> {
        (**self).on_entry(track_id, timestamp)
    }

    fn on_exit(&self, track_id: u32, timestamp: DateTime<Local>) -> Result<()> {
        (**self).on_exit(track_id, timestamp)
    }
}

/// Counts people entering and leaving across a horizontal line
pub struct CrossingCounter {
    config: CountingConfig,
    tracker: Box<dyn MultiIdentityTracker>,
    observer: Option<Box<dyn CrossingObserver>>,
    /// last side seen per identity
    sides: HashMap<u32, Side>,
    total_entries: u64,
    total_exits: u64,
    current_occupancy: u32,
}

impl CrossingCounter {
    /// Counter backed by a greedy centroid tracker
    pub fn new(config: CountingConfig, tracker_config: TrackerConfig) -> Result<Self> {
        let tracker = CentroidTracker::new(tracker_config)?;
        Self::with_tracker(config, Box::new(tracker))
    }

    pub fn with_tracker(
        config: CountingConfig,
        tracker: Box<dyn MultiIdentityTracker>,
    ) -> Result<Self> {
        config.validate()?;
        log::info!(
            "CrossingCounter initialized: line_y={}, frame_height={}, entry_direction={:?}",
            config.line_y,
            config.frame_height,
            config.entry_direction
        );
        Ok(Self {
            config,
            tracker,
            observer: None,
            sides: HashMap::new(),
            total_entries: 0,
            total_exits: 0,
            current_occupancy: 0,
        })
    }

    /// Notify `observer` of every entry and exit
    pub fn with_observer(mut self, observer: Box<dyn CrossingObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &CountingConfig {
        &self.config
    }

    /// Process the detections of the current frame
    pub fn update(&mut self, detections: &[Point]) -> Result<FrameCounts> {
        self.update_at(detections, Instant::now(), Local::now())
    }

    /// Process a frame observed at monotonic time `now` and wall-clock `timestamp`
    ///
    /// Counters are always updated for the whole frame. If the observer fails,
    /// its first error is returned after every event of the frame was offered.
    pub fn update_at(
        &mut self,
        detections: &[Point],
        now: Instant,
        timestamp: DateTime<Local>,
    ) -> Result<FrameCounts> {
        let line_y = self.config.line_y;
        let entry_direction = self.config.entry_direction;

        let identities = self.tracker.update_at(detections, now);
        let crossings = detect_crossings(identities, &mut self.sides, line_y, entry_direction);

        // Drop bookkeeping of identities the tracker retired
        let live: &BTreeMap<u32, Identity> = self.tracker.identities();
        self.sides.retain(|id, _| live.contains_key(id));

        let mut counts = FrameCounts::default();
        let mut events = Vec::with_capacity(crossings.len());

        for (track_id, direction) in crossings {
            if !self.tracker.mark_crossed(track_id, direction) {
                continue;
            }
            match direction {
                CrossingDirection::Entry => {
                    counts.entries += 1;
                    self.total_entries += 1;
                    self.current_occupancy += 1;
                }
                CrossingDirection::Exit => {
                    counts.exits += 1;
                    self.total_exits += 1;
                    self.current_occupancy = self.current_occupancy.saturating_sub(1);
                }
            }
            log::info!(
                "Track {}: {} detected (occupancy: {})",
                track_id,
                direction,
                self.current_occupancy
            );
            events.push(CrossingEvent {
                track_id,
                direction,
                timestamp,
                occupancy_after: self.current_occupancy,
            });
        }

        self.notify(&events)?;
        Ok(counts)
    }

    fn notify(&self, events: &[CrossingEvent]) -> Result<()> {
        let Some(observer) = &self.observer else {
            return Ok(());
        };

        let mut first_error = None;
        for event in events {
            let result = match event.direction {
                CrossingDirection::Entry => observer.on_entry(event.track_id, event.timestamp),
                CrossingDirection::Exit => observer.on_exit(event.track_id, event.timestamp),
            };
            if let Err(e) = result {
                log::error!(
                    "Failed to record {} of track {}: {:#}",
                    event.direction,
                    event.track_id,
                    e
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Current occupancy, never negative
    pub fn occupancy(&self) -> u32 {
        self.current_occupancy
    }

    pub fn total_entries(&self) -> u64 {
        self.total_entries
    }

    pub fn total_exits(&self) -> u64 {
        self.total_exits
    }

    pub fn active_tracks(&self) -> usize {
        self.tracker.num_identities()
    }

    pub fn stats(&self) -> CounterStats {
        CounterStats {
            total_entries: self.total_entries,
            total_exits: self.total_exits,
            current_occupancy: self.current_occupancy,
            active_tracks: self.active_tracks(),
        }
    }

    pub fn tracker(&self) -> &dyn MultiIdentityTracker {
        self.tracker.as_ref()
    }

    /// Zero all counters and forget every identity (daily reset)
    pub fn reset(&mut self) {
        self.total_entries = 0;
        self.total_exits = 0;
        self.current_occupancy = 0;
        self.tracker.clear();
        self.sides.clear();
        log::info!("Counter reset");
    }
}

/// Compare each identity's side with the last recorded one.
/// Returns the identities that flipped sides and have not crossed yet.
fn detect_crossings(
    identities: &BTreeMap<u32, Identity>,
    sides: &mut HashMap<u32, Side>,
    line_y: f32,
    entry_direction: EntryDirection,
) -> Vec<(u32, CrossingDirection)> {
    let mut crossings = Vec::new();

    for (&id, identity) in identities {
        // Need two positions before movement means anything
        if identity.previous_position().is_none() {
            continue;
        }

        let current = Side::of(&identity.position(), line_y);
        let Some(previous) = sides.insert(id, current) else {
            continue;
        };

        if previous != current && !identity.has_crossed() {
            if let Some(direction) = entry_direction.classify(previous, current) {
                crossings.push((id, direction));
            }
        }
    }

    crossings
}
