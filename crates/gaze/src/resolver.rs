//! Gaze → object resolution.
//!
//! Normalized gaze ratios are mapped into scene coordinates with the same
//! linear mapping the scene uses (`world = -1 + 2 * ratio`) and matched to
//! the nearest candidate's planar position.

use crate::config::ResolverConfig;
use crate::types::{CandidateObject, ObjectId};

/// The object under the gaze and how far it was from the gaze point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub object: ObjectId,
    pub distance: f64,
}

#[derive(Debug, Clone, Default)]
pub struct GazeResolver {
    config: ResolverConfig,
}

impl GazeResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve using the configured threshold for the calibration state
    pub fn resolve_for(
        &self,
        h: f64,
        v: f64,
        objects: &[CandidateObject],
        calibrated: bool,
    ) -> Option<Resolution> {
        resolve(h, v, objects, self.config.threshold_for(calibrated))
    }
}

/// Map a normalized ratio onto the scene axis
pub fn ratio_to_world(ratio: f64) -> f64 {
    -1.0 + 2.0 * ratio
}

/// Nearest candidate strictly closer than `threshold`.
///
/// Linear scan; on equal distances the object listed first wins, so the
/// outcome depends on the caller's ordering of `objects`.
pub fn resolve(h: f64, v: f64, objects: &[CandidateObject], threshold: f64) -> Option<Resolution> {
    let wx = ratio_to_world(h);
    let wy = ratio_to_world(v);

    let mut best: Option<Resolution> = None;
    for obj in objects {
        let distance = obj.position.planar_distance(wx, wy);
        if best.map_or(true, |b| distance < b.distance) {
            best = Some(Resolution {
                object: obj.id,
                distance,
            });
        }
    }

    best.filter(|b| b.distance < threshold)
}
