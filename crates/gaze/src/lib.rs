//! # RayOS Gaze - intent fusion for gaze + directional input
//!
//! Picks the object a user means by combining where they have been looking
//! with a joystick or arrow-key command, and learns from the outcome.
//!
//! Data flow:
//!
//! ```text
//! raw ratios -> CalibrationEngine::transform -> GazeResolver -> DwellTracker / GazeHistory
//!                                                                      |
//! direction -> quantize_direction -> IntentFusionAgent::select -> executor -> reward -> ValueStore
//! ```
//!
//! The pieces are usable on their own; [`GazeRuntime`] wires them into a
//! producer/consumer pipeline with a decision cycle on top.

pub mod agent;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod dwell;
pub mod error;
pub mod persistence;
pub mod resolver;
pub mod runtime;
pub mod source;
pub mod types;

pub use agent::{
    quantize_direction, IntentFusionAgent, ObjectStats, RecentGazeReward, RewardPolicy, Selection,
    ValueStore,
};
pub use calibration::{
    CalibrationEngine, CalibrationModel, CalibrationPhase, CalibrationSequence, FitOutcome,
};
pub use clock::MonotonicClock;
pub use config::GazeConfig;
pub use dwell::{DwellDurations, DwellTracker};
pub use error::{GazeError, Result};
pub use persistence::ModelState;
pub use resolver::GazeResolver;
pub use runtime::{GazeRuntime, LoggingExecutor, ObjectExecutor};
pub use source::{GazeSource, SimulatedGazeSource, UdpGazeSource};
pub use types::*;

use std::path::Path;

/// Load a scene description: a JSON array of candidate objects
pub fn load_scene(path: &Path) -> Result<Vec<CandidateObject>> {
    let json = std::fs::read_to_string(path)?;
    let scene: Vec<CandidateObject> = serde_json::from_str(&json)?;
    log::info!("Loaded {} candidate objects from {}", scene.len(), path.display());
    Ok(scene)
}
