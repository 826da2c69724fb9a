//! Centroid points and distance matrices

use ndarray::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Center point of a detected person in frame coordinates (pixels, y grows downwards)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Centroid of an axis-aligned box given as [xmin, ymin, xmax, ymax]
    pub fn from_bounds(bounds: [f32; 4]) -> Self {
        Self {
            x: (bounds[0] + bounds[2]) / 2.0,
            y: (bounds[1] + bounds[3]) / 2.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Euclidean distance, infinite when either point is not finite
    pub fn distance(&self, other: &Point) -> f32 {
        if !self.is_finite() || !other.is_finite() {
            return f32::INFINITY;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// Pairwise distance matrix between tracked positions and new detections.
/// Returns: (n_tracked, n_detections) matrix
pub fn distances(tracked: &[Point], detections: &[Point]) -> Array2<f32> {
    let n_tracked = tracked.len();
    let n_dets = detections.len();

    if n_tracked == 0 || n_dets == 0 {
        return Array2::zeros((n_tracked, n_dets));
    }

    let data: Vec<f32> = tracked
        .par_iter()
        .flat_map_iter(|t| detections.iter().map(move |d| t.distance(d)))
        .collect();

    Array2::from_shape_vec((n_tracked, n_dets), data)
        .unwrap_or_else(|_| Array2::from_elem((n_tracked, n_dets), f32::INFINITY))
}
