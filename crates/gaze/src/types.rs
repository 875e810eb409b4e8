//! Core data types for the gaze selection pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a candidate object within one scene refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl ObjectId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Row index into fixed-capacity tables, if the id fits
    pub fn index(self, capacity: usize) -> Option<usize> {
        let idx = self.0 as usize;
        (idx < capacity).then_some(idx)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A raw sample from the eye tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    /// Horizontal pupil ratio (0.0-1.0), absent when the pupil was not found
    pub horizontal_ratio: Option<f64>,
    /// Vertical pupil ratio (0.0-1.0)
    pub vertical_ratio: Option<f64>,
    /// Whether the tracker located the pupils at all
    pub valid: bool,
    /// Seconds on the shared monotonic clock
    pub timestamp: f64,
}

impl GazeSample {
    pub fn new(horizontal_ratio: f64, vertical_ratio: f64, timestamp: f64) -> Self {
        Self {
            horizontal_ratio: Some(horizontal_ratio),
            vertical_ratio: Some(vertical_ratio),
            valid: true,
            timestamp,
        }
    }

    /// A sample the tracker could not resolve
    pub fn missing(timestamp: f64) -> Self {
        Self {
            horizontal_ratio: None,
            vertical_ratio: None,
            valid: false,
            timestamp,
        }
    }

    /// Both ratios, only when the sample is usable
    pub fn ratios(&self) -> Option<(f64, f64)> {
        if !self.valid {
            return None;
        }
        match (self.horizontal_ratio, self.vertical_ratio) {
            (Some(h), Some(v)) if h.is_finite() && v.is_finite() => Some((h, v)),
            _ => None,
        }
    }
}

/// Scene position of an object (world units, roughly -1.0..1.0 on x/y)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Planar distance, ignoring depth
    pub fn planar_distance(&self, x: f64, y: f64) -> f64 {
        let dx = self.x - x;
        let dy = self.y - y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Position mapped into normalized [0,1] screen ratios
    pub fn normalized(&self) -> (f64, f64) {
        (
            ((self.x + 1.0) / 2.0).clamp(0.0, 1.0),
            ((self.y + 1.0) / 2.0).clamp(0.0, 1.0),
        )
    }
}

/// An object the user may select
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateObject {
    pub id: ObjectId,
    pub position: Position,
    pub name: String,
}

impl CandidateObject {
    pub fn new(id: u32, position: Position, name: impl Into<String>) -> Self {
        Self {
            id: ObjectId(id),
            position,
            name: name.into(),
        }
    }
}

/// Eight-way compass direction from the joystick or arrow keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
    UpRight,
    UpLeft,
    DownRight,
    DownLeft,
}

impl Direction {
    pub const COUNT: usize = 8;

    pub const ALL: [Direction; 8] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
        Direction::UpRight,
        Direction::UpLeft,
        Direction::DownRight,
        Direction::DownLeft,
    ];

    /// Column index used by the value table and the probability model
    pub fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
            Direction::UpRight => 4,
            Direction::UpLeft => 5,
            Direction::DownRight => 6,
            Direction::DownLeft => 7,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Right => "right",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::UpRight => "up-right",
            Direction::UpLeft => "up-left",
            Direction::DownRight => "down-right",
            Direction::DownLeft => "down-left",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.as_str() == s)
    }

    /// Unit axes in screen convention (y grows downward)
    pub fn axes(self) -> (f64, f64) {
        match self {
            Direction::Up => (0.0, -1.0),
            Direction::Right => (1.0, 0.0),
            Direction::Down => (0.0, 1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::UpRight => (1.0, -1.0),
            Direction::UpLeft => (-1.0, -1.0),
            Direction::DownRight => (1.0, 1.0),
            Direction::DownLeft => (-1.0, 1.0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calibration summary for UI display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationStatus {
    pub calibrated: bool,
    pub sample_count: usize,
}

/// Gaze point after calibration and object resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedGaze {
    /// Calibrated horizontal ratio
    pub h: f64,
    /// Calibrated vertical ratio
    pub v: f64,
    /// Object under the gaze, if any was close enough
    pub object: Option<ObjectId>,
    pub timestamp: f64,
}

/// Emitted once per decision cycle that produced a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEvent {
    pub object: ObjectId,
    pub name: String,
    pub direction: Direction,
    /// Fused probability of the chosen object (0.0-1.0)
    pub probability: f64,
    /// True when the pick came from the exploration branch
    pub explored: bool,
    /// Whether the executor carried the action out
    pub executed: bool,
    /// Reward applied to the value table, if any
    pub reward: Option<f64>,
    pub timestamp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_roundtrip() {
        for (i, d) in Direction::ALL.iter().enumerate() {
            assert_eq!(d.index(), i);
            assert_eq!(Direction::from_index(i), Some(*d));
            assert_eq!(Direction::from_name(d.as_str()), Some(*d));
        }
        assert_eq!(Direction::from_index(8), None);
    }

    #[test]
    fn sample_ratios_require_valid_flag() {
        let mut s = GazeSample::new(0.4, 0.6, 1.0);
        assert_eq!(s.ratios(), Some((0.4, 0.6)));
        s.valid = false;
        assert_eq!(s.ratios(), None);
        assert_eq!(GazeSample::missing(2.0).ratios(), None);

        let half = GazeSample {
            horizontal_ratio: Some(0.5),
            vertical_ratio: None,
            valid: true,
            timestamp: 0.0,
        };
        assert_eq!(half.ratios(), None);
    }

    #[test]
    fn object_index_respects_capacity() {
        assert_eq!(ObjectId(3).index(10), Some(3));
        assert_eq!(ObjectId(10).index(10), None);
    }

    #[test]
    fn position_normalized() {
        let p = Position::new(-1.0, 1.0, 0.3);
        assert_eq!(p.normalized(), (0.0, 1.0));
        assert!((Position::new(0.0, 0.0, 0.0).planar_distance(3.0, 4.0) - 5.0).abs() < 1e-12);
    }
}
