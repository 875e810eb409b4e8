//! Model persistence
//!
//! Everything that changes decision behaviour is saved: the value table,
//! the tunable parameters, the calibration model and the RNG state. A
//! restored agent makes the same choices as the one that was saved.

use crate::agent::{IntentFusionAgent, ValueStore};
use crate::calibration::{CalibrationEngine, CalibrationModel};
use crate::config::AgentParams;
use crate::error::{GazeError, Result};
use crate::types::Direction;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MODEL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub version: u32,
    pub max_objects: usize,
    pub q_table: Vec<[f64; Direction::COUNT]>,
    pub params: AgentParams,
    #[serde(default)]
    pub calibration: Option<CalibrationModel>,
    pub rng_seed: u64,
}

impl ModelState {
    pub fn capture(agent: &IntentFusionAgent, engine: &CalibrationEngine) -> Self {
        let calibration = engine.is_calibrated().then(|| engine.model().clone());
        Self {
            version: MODEL_VERSION,
            max_objects: agent.values().capacity(),
            q_table: agent.values().to_rows(),
            params: *agent.params(),
            calibration,
            rng_seed: agent.rng_seed(),
        }
    }

    /// Install this state into a running agent and calibration engine
    pub fn restore(&self, agent: &mut IntentFusionAgent, engine: &mut CalibrationEngine) {
        let capacity = agent.values().capacity();
        if capacity != self.max_objects {
            log::warn!(
                "Model has {} value rows, agent holds {}; extra rows dropped, missing rows zeroed",
                self.max_objects,
                capacity
            );
        }

        let bound = agent.values().saturation_bound();
        agent.replace_values(ValueStore::from_rows(&self.q_table, capacity, bound));
        agent.set_params(self.params);
        agent.reseed(self.rng_seed);

        match &self.calibration {
            Some(model) => engine.set_model(model.clone()),
            None => engine.reset(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Model saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let state: ModelState = serde_json::from_str(&json)?;
        state.validate(path)?;
        log::info!("Model loaded from {}", path.display());
        Ok(state)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let fail = |reason: String| GazeError::ModelFormat {
            path: path.to_path_buf(),
            reason,
        };

        if self.version != MODEL_VERSION {
            return Err(fail(format!("unsupported version {}", self.version)));
        }
        if self.q_table.len() != self.max_objects {
            return Err(fail(format!(
                "q_table has {} rows, max_objects is {}",
                self.q_table.len(),
                self.max_objects
            )));
        }
        if self.q_table.iter().flatten().any(|v| !v.is_finite()) {
            return Err(fail("q_table contains non-finite values".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, CalibrationConfig};
    use crate::types::{CandidateObject, ObjectId, Position};
    use std::collections::HashMap;

    fn trained() -> (IntentFusionAgent, CalibrationEngine) {
        let mut config = AgentConfig::default();
        config.params.exploration_rate = 0.4;
        config.seed = Some(99);
        let mut agent = IntentFusionAgent::new(&config);
        agent.update_value(ObjectId(1), Direction::Right, 1.0);
        agent.update_value(ObjectId(2), Direction::Up, -0.2);

        let mut engine = CalibrationEngine::new(&CalibrationConfig::default());
        for raw in [0.1, 0.3, 0.5, 0.7, 0.9] {
            engine
                .add_sample(raw, raw, 0.8 * raw + 0.1, 0.5 * raw + 0.2)
                .expect("in range");
        }
        assert!(engine.fit().is_fitted());
        (agent, engine)
    }

    #[test]
    fn round_trip_reproduces_decisions() {
        let (mut agent, engine) = trained();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        ModelState::capture(&agent, &engine).save(&path).expect("save");

        let mut restored_agent = IntentFusionAgent::new(&AgentConfig::default());
        let mut restored_engine = CalibrationEngine::default();
        ModelState::load(&path)
            .expect("load")
            .restore(&mut restored_agent, &mut restored_engine);

        assert_eq!(restored_agent.params(), agent.params());
        assert_eq!(restored_agent.values(), agent.values());
        assert_eq!(restored_engine.transform(0.42, 0.42), engine.transform(0.42, 0.42));

        let scene: Vec<CandidateObject> = (0..4)
            .map(|i| CandidateObject::new(i, Position::new(0.0, 0.0, 0.0), format!("/obj[{i}]")))
            .collect();
        let mut durations = HashMap::new();
        for id in 0..4 {
            agent.record_gaze(ObjectId(id), 1.0);
            restored_agent.record_gaze(ObjectId(id), 1.0);
            durations.insert(ObjectId(id), 1.5);
        }
        for _ in 0..25 {
            assert_eq!(
                agent.select(Direction::Right, 1.1, &scene, &durations),
                restored_agent.select(Direction::Right, 1.1, &scene, &durations)
            );
        }
    }

    #[test]
    fn uncalibrated_engine_saves_no_model() {
        let agent = IntentFusionAgent::new(&AgentConfig::default());
        let state = ModelState::capture(&agent, &CalibrationEngine::default());
        assert!(state.calibration.is_none());
        assert_eq!(state.q_table.len(), 10);
    }

    #[test]
    fn mismatched_shape_rejected() {
        let (agent, engine) = trained();
        let mut state = ModelState::capture(&agent, &engine);
        state.q_table.pop();

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        state.save(&path).expect("save");

        match ModelState::load(&path) {
            Err(GazeError::ModelFormat { reason, .. }) => assert!(reason.contains("rows")),
            other => panic!("expected ModelFormat, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            ModelState::load(&dir.path().join("absent.json")),
            Err(GazeError::Io(_))
        ));
    }
}
