//! Counting-line crossing with at-most-once semantics per track id.

use std::collections::HashSet;
use std::f32::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use crate::geometry::{point_to_segment_distance, segments_intersect, Point};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub track_id: String,
    pub frame: u64,
    pub position: Point,
    pub direction: Direction,
}

/// Counts tracks whose movement between two observations intersects a
/// fixed segment. A track counts once for the lifetime of the detector or
/// until [`reset`](Self::reset).
#[derive(Clone, Debug)]
pub struct LineCrossingDetector {
    start: Point,
    end: Point,
    crossed: HashSet<String>,
    events: Vec<CrossingEvent>,
}

impl LineCrossingDetector {
    pub fn new(start: Point, end: Point) -> Self {
        log::info!(
            "counting line ({}, {}) -> ({}, {})",
            start.x,
            start.y,
            end.x,
            end.y
        );
        Self {
            start,
            end,
            crossed: HashSet::new(),
            events: Vec::new(),
        }
    }

    pub fn line(&self) -> (Point, Point) {
        (self.start, self.end)
    }

    /// Distance from `point` to the counting segment.
    pub fn point_to_line_distance(&self, point: Point) -> f32 {
        point_to_segment_distance(point, self.start, self.end)
    }

    /// Returns true the first time `track_id` moves across the line.
    pub fn check_crossing(&mut self, track_id: &str, prev: Point, curr: Point, frame: u64) -> bool {
        if !segments_intersect(self.start, self.end, prev, curr) {
            return false;
        }
        if self.crossed.contains(track_id) {
            return false;
        }

        self.crossed.insert(track_id.to_string());
        let direction = self.direction(prev, curr);
        log::debug!(
            "track {} crossed at frame {} ({:?})",
            track_id,
            frame,
            direction
        );
        self.events.push(CrossingEvent {
            track_id: track_id.to_string(),
            frame,
            position: curr,
            direction,
        });
        true
    }

    // Relative angle is not wrapped into (-pi, pi].
    fn direction(&self, prev: Point, curr: Point) -> Direction {
        let movement = (curr.y - prev.y).atan2(curr.x - prev.x);
        let line = (self.end.y - self.start.y).atan2(self.end.x - self.start.x);
        let relative = movement - line;
        if -FRAC_PI_2 < relative && relative < FRAC_PI_2 {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    pub fn count(&self) -> usize {
        self.crossed.len()
    }

    pub fn crossings(&self) -> &[CrossingEvent] {
        &self.events
    }

    pub fn has_crossed(&self, track_id: &str) -> bool {
        self.crossed.contains(track_id)
    }

    pub fn reset(&mut self) {
        self.crossed.clear();
        self.events.clear();
        log::info!("line crossing counter reset");
    }
}

/// Crossing of the vertical line `x = threshold`, in either direction.
#[derive(Clone, Debug)]
pub struct VerticalLineCrossing {
    threshold: f32,
    crossed: HashSet<String>,
}

impl VerticalLineCrossing {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            crossed: HashSet::new(),
        }
    }

    pub fn check_crossing(&mut self, track_id: &str, prev_x: f32, curr_x: f32) -> bool {
        let t = self.threshold;
        let straddles = (prev_x < t && t <= curr_x) || (prev_x > t && t >= curr_x);
        straddles && self.crossed.insert(track_id.to_string())
    }

    pub fn count(&self) -> usize {
        self.crossed.len()
    }

    pub fn reset(&mut self) {
        self.crossed.clear();
    }
}
