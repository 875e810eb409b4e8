//! Configuration for the gaze selection system
//!
//! Every section has sensible defaults so a TOML file only needs to name the
//! values it overrides:
//!
//! ```toml
//! [agent]
//! exploration_rate = 0.2
//!
//! [resolver]
//! threshold = 0.4
//! ```

use crate::error::{GazeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    pub dwell: DwellConfig,
    pub calibration: CalibrationConfig,
    pub resolver: ResolverConfig,
    pub agent: AgentConfig,
    pub runtime: RuntimeConfig,
}

impl GazeConfig {
    /// Load from a TOML file and validate
    pub fn load(path: &Path) -> Result<Self> {
        log::info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: GazeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, msg: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(GazeError::InvalidConfig(msg.to_string()))
            }
        }

        check(self.dwell.max_idle_time > 0.0, "dwell.max_idle_time must be positive")?;
        check(self.calibration.min_samples >= 2, "calibration.min_samples must be at least 2")?;
        check(
            matches!(self.calibration.degree, 1 | 2),
            "calibration.degree must be 1 or 2",
        )?;
        check(
            (0.0..=1.0).contains(&self.calibration.sequence.acceptance_ratio),
            "calibration.sequence.acceptance_ratio must be within [0, 1]",
        )?;
        check(
            self.calibration.sequence.samples_per_target > 0,
            "calibration.sequence.samples_per_target must be positive",
        )?;
        check(self.resolver.threshold > 0.0, "resolver.threshold must be positive")?;
        check(
            self.resolver.calibrated_threshold > 0.0,
            "resolver.calibrated_threshold must be positive",
        )?;
        check(self.agent.max_objects > 0, "agent.max_objects must be positive")?;
        check(self.agent.history_size > 0, "agent.history_size must be positive")?;
        check(self.agent.saturation_bound > 0.0, "agent.saturation_bound must be positive")?;
        check(
            (0.0..=1.0).contains(&self.agent.params.exploration_rate),
            "agent.params.exploration_rate must be within [0, 1]",
        )?;
        check(self.agent.params.time_window > 0.0, "agent.params.time_window must be positive")?;
        check(self.runtime.queue_capacity > 0, "runtime.queue_capacity must be positive")?;
        Ok(())
    }
}

/// Dwell timer tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DwellConfig {
    /// Gap (seconds) after which a dwell streak is considered broken
    pub max_idle_time: f64,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self { max_idle_time: 0.3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Samples required before a fit is attempted
    pub min_samples: usize,
    /// Polynomial degree per axis (1 = affine, 2 = quadratic)
    pub degree: usize,
    pub sequence: SequenceConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            degree: 1,
            sequence: SequenceConfig::default(),
        }
    }
}

/// Timing of the guided calibration sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Seconds a target is shown before sampling begins
    pub intro_duration: f64,
    /// Minimum seconds between two collected samples
    pub sample_interval: f64,
    pub samples_per_target: usize,
    /// Seconds before giving up on a target
    pub target_timeout: f64,
    /// Fraction of `samples_per_target` needed to accept a target
    pub acceptance_ratio: f64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            intro_duration: 1.0,
            sample_interval: 0.1,
            samples_per_target: 20,
            target_timeout: 15.0,
            acceptance_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Max world distance between gaze and object before calibration
    pub threshold: f64,
    /// Tighter distance used once calibration is active
    pub calibrated_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            calibrated_threshold: 0.3,
        }
    }
}

impl ResolverConfig {
    pub fn threshold_for(&self, calibrated: bool) -> f64 {
        if calibrated {
            self.calibrated_threshold
        } else {
            self.threshold
        }
    }
}

/// Tunable parameters of the fusion model. These are persisted with the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentParams {
    /// Steepness of the recency model
    pub k: f64,
    /// Seconds of gaze history considered for a decision
    pub time_window: f64,
    /// Minimum dwell (seconds) for an object to be eligible
    pub min_gaze_duration: f64,
    pub learning_rate: f64,
    pub exploration_rate: f64,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            k: 1.0,
            time_window: 3.0,
            min_gaze_duration: 0.5,
            learning_rate: 0.1,
            exploration_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub params: AgentParams,
    /// Rows in the value table; larger ids get no learned value
    pub max_objects: usize,
    /// Gaze history ring buffer length
    pub history_size: usize,
    /// Max |Q| per row before the row is rescaled
    pub saturation_bound: f64,
    /// Fixed RNG seed for reproducible exploration
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            params: AgentParams::default(),
            max_objects: 10,
            history_size: 50,
            saturation_bound: 5.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Bounded gaze queue between producer and consumer
    pub queue_capacity: usize,
    /// Minimum seconds between two executed selections
    pub action_cooldown: f64,
    /// Period of the simulated gaze source in milliseconds (~30Hz)
    pub sample_period_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            action_cooldown: 1.0,
            sample_period_ms: 33,
        }
    }
}
