//! A single tracked person and its recent trajectory

use crate::point::Point;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Direction of a line crossing, already mapped through the configured entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossingDirection {
    Entry,
    Exit,
}

impl fmt::Display for CrossingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => write!(f, "entry"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Identity {
    /// track id
    pub id: u32,
    /// recent centroids, oldest first
    history: VecDeque<Point>,
    capacity: usize,
    /// when the identity was last matched to a detection
    pub last_seen: Instant,
    /// number of consecutive updates without a matching detection
    pub frames_unmatched: u32,
    /// number of updates with a matching detection (including the first)
    pub hits: u32,
    crossed_line: bool,
    direction: Option<CrossingDirection>,
}

impl Identity {
    pub fn new(id: u32, centroid: Point, capacity: usize, now: Instant) -> Self {
        let capacity = capacity.max(1);
        let mut history = VecDeque::with_capacity(capacity);
        history.push_back(centroid);
        Self {
            id,
            history,
            capacity,
            last_seen: now,
            frames_unmatched: 0,
            hits: 1,
            crossed_line: false,
            direction: None,
        }
    }

    /// Record a matched detection
    pub fn update_position(&mut self, centroid: Point, now: Instant) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(centroid);
        self.last_seen = now;
        self.frames_unmatched = 0;
        self.hits += 1;
    }

    /// Record an update in which this identity was not matched
    pub fn mark_missed(&mut self) {
        self.frames_unmatched += 1;
    }

    pub fn since_last_seen(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    pub fn history(&self) -> &VecDeque<Point> {
        &self.history
    }

    /// Most recent centroid
    pub fn position(&self) -> Point {
        // history is never empty: it starts with one point and only evicts on push
        self.history.back().copied().unwrap_or_default()
    }

    /// Centroid before the most recent one
    pub fn previous_position(&self) -> Option<Point> {
        let n = self.history.len();
        if n >= 2 {
            self.history.get(n - 2).copied()
        } else {
            None
        }
    }

    pub fn has_crossed(&self) -> bool {
        self.crossed_line
    }

    pub fn direction(&self) -> Option<CrossingDirection> {
        self.direction
    }

    /// Flag the identity as having crossed the line. Returns false (and
    /// changes nothing) if it already crossed during this visit.
    pub fn mark_crossed(&mut self, direction: CrossingDirection) -> bool {
        if self.crossed_line {
            return false;
        }
        self.crossed_line = true;
        self.direction = Some(direction);
        true
    }
}
