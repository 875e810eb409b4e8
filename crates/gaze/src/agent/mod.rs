//! Intent fusion
//!
//! The agent turns a directional command plus recent gaze into at most one
//! selected object. Each eligible candidate gets a fused score:
//!
//! ```text
//! p       = 1 / (1 + exp(k * exp(dt * d)))   dt = seconds since last look, d = direction index
//! p      *= min(dwell / 2, 1)
//! p_final = clamp(0.7 * p + 0.3 * Q[object, d], 0, 1)
//! ```
//!
//! Candidates looked at for less than `min_gaze_duration` are never scored.
//! With probability `exploration_rate` the choice is uniform among the
//! non-zero scores, otherwise the first maximum wins.

mod history;
mod q_table;
mod reward;

pub use history::{GazeHistory, GazeHistoryEntry, HistoryDurations};
pub use q_table::ValueStore;
pub use reward::{RecentGazeReward, RewardPolicy};

use crate::config::{AgentConfig, AgentParams};
use crate::dwell::DwellDurations;
use crate::types::{CandidateObject, Direction, ObjectId};
use serde::{Deserialize, Serialize};

/// Axis magnitude below which input is ignored
pub const DEADZONE: f64 = 0.2;

/// Blend of gaze model and learned value in the fused score
const GAZE_WEIGHT: f64 = 0.7;
const VALUE_WEIGHT: f64 = 0.3;
/// Dwell (seconds) at which the dwell weight saturates
const DWELL_SATURATION: f64 = 2.0;

/// Reaction calibration stops performance tuning past this many points
const REACTION_LOCK_POINTS: usize = 10;

/// Map joystick / keyboard axes to one of eight directions.
///
/// Screen convention: negative y is up.
pub fn quantize_direction(x_axis: f64, y_axis: f64) -> Option<Direction> {
    let x_on = x_axis.abs() >= DEADZONE;
    let y_on = y_axis.abs() >= DEADZONE;

    let direction = match (x_on, y_on) {
        (false, false) => return None,
        (false, true) if y_axis < 0.0 => Direction::Up,
        (false, true) => Direction::Down,
        (true, false) if x_axis > 0.0 => Direction::Right,
        (true, false) => Direction::Left,
        (true, true) => match (x_axis > 0.0, y_axis < 0.0) {
            (true, true) => Direction::UpRight,
            (false, true) => Direction::UpLeft,
            (true, false) => Direction::DownRight,
            (false, false) => Direction::DownLeft,
        },
    };
    Some(direction)
}

/// Outcome of one decision cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub object: ObjectId,
    pub direction: Direction,
    pub probability: f64,
    pub explored: bool,
}

/// A user reaction observed during agent calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReactionPoint {
    pub object: ObjectId,
    pub direction: Direction,
    /// Seconds between the last look and the command
    pub time_diff: f64,
}

/// Per-object summary for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectStats {
    pub object: ObjectId,
    pub gaze_count: usize,
    pub mean_value: f64,
    pub max_value: f64,
    pub preferred_direction: Direction,
}

pub struct IntentFusionAgent {
    params: AgentParams,
    values: ValueStore,
    history: GazeHistory,
    rng: fastrand::Rng,
    last_probabilities: Vec<(ObjectId, f64)>,
    reactions: Vec<ReactionPoint>,
    reaction_calibrated: bool,
}

impl IntentFusionAgent {
    pub fn new(config: &AgentConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };

        Self {
            params: config.params,
            values: ValueStore::new(config.max_objects, config.saturation_bound),
            history: GazeHistory::new(config.history_size),
            rng,
            last_probabilities: Vec::new(),
            reactions: Vec::new(),
            reaction_calibrated: false,
        }
    }

    pub fn params(&self) -> &AgentParams {
        &self.params
    }

    pub fn set_params(&mut self, params: AgentParams) {
        self.params = params;
    }

    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    pub(crate) fn replace_values(&mut self, values: ValueStore) {
        self.values = values;
    }

    pub fn history(&self) -> &GazeHistory {
        &self.history
    }

    /// Current RNG state, enough to replay future exploration draws
    pub fn rng_seed(&self) -> u64 {
        self.rng.get_seed()
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng.seed(seed);
    }

    pub fn record_gaze(&mut self, object: ObjectId, timestamp: f64) {
        self.history.push(object, timestamp);
    }

    /// Scores from the most recent `select`, in candidate order
    pub fn last_probabilities(&self) -> &[(ObjectId, f64)] {
        &self.last_probabilities
    }

    /// Recency confidence, before dwell weighting and value blending
    pub fn probability_model(&self, direction: Direction, time_since_gaze: f64) -> f64 {
        let d = direction.index() as f64;
        let exponent = self.params.k * (time_since_gaze * d).exp();
        1.0 / (1.0 + exponent.exp())
    }

    /// Pick the object the user most likely means by `direction`.
    ///
    /// `dwell` supplies continuous look time per object; both the dwell
    /// tracker and the history's own duration view work here.
    pub fn select<D: DwellDurations + ?Sized>(
        &mut self,
        direction: Direction,
        now: f64,
        candidates: &[CandidateObject],
        dwell: &D,
    ) -> Option<Selection> {
        self.last_probabilities.clear();
        if candidates.is_empty() {
            log::debug!("No candidates, nothing to select");
            return None;
        }

        let recency = self.history.recency(now, self.params.time_window);
        let mut scores: Vec<(ObjectId, f64)> = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let id = candidate.id;
            let score = match recency.get(&id) {
                Some(&since) => {
                    let duration = dwell.dwell_duration(id, now);
                    if duration >= self.params.min_gaze_duration {
                        let mut p = self.probability_model(direction, since);
                        p *= (duration / DWELL_SATURATION).min(1.0);
                        let q = self.values.get(id, direction);
                        (GAZE_WEIGHT * p + VALUE_WEIGHT * q).clamp(0.0, 1.0)
                    } else {
                        log::trace!("{} seen for {:.2}s only, skipped", id, duration);
                        0.0
                    }
                }
                None => 0.0,
            };
            scores.push((id, score));
        }

        log::debug!("Scores for {}: {:?}", direction, scores);
        self.last_probabilities = scores;
        let scores = &self.last_probabilities;

        let positive: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|(_, (_, p))| *p > 0.0)
            .map(|(i, _)| i)
            .collect();
        if positive.is_empty() {
            log::debug!("No candidate was looked at long enough");
            return None;
        }

        let explored = self.rng.f64() < self.params.exploration_rate;
        let chosen = if explored {
            positive[self.rng.usize(..positive.len())]
        } else {
            // first maximum wins
            let mut best = positive[0];
            for &i in &positive[1..] {
                if scores[i].1 > scores[best].1 {
                    best = i;
                }
            }
            best
        };

        let (object, probability) = scores[chosen];
        log::info!(
            "Selected {} for {} (p={:.3}{})",
            object,
            direction,
            probability,
            if explored { ", exploring" } else { "" }
        );

        Some(Selection {
            object,
            direction,
            probability,
            explored,
        })
    }

    /// Apply a reward to the learned value of (object, direction)
    pub fn update_value(&mut self, object: ObjectId, direction: Direction, reward: f64) {
        let delta = self.params.learning_rate * reward;
        if self.values.adjust(object, direction, delta) {
            log::debug!(
                "Value {}/{} -> {:.3} (reward {:.2})",
                object,
                direction,
                self.values.get(object, direction),
                reward
            );
        } else {
            log::warn!(
                "Ignoring reward for {}: beyond value table capacity {}",
                object,
                self.values.capacity()
            );
        }
    }

    pub fn reset_values(&mut self) {
        self.values.reset();
        log::info!("Value table reset");
    }

    pub fn record_reaction(&mut self, object: ObjectId, direction: Direction, time_diff: f64) {
        self.reactions.push(ReactionPoint {
            object,
            direction,
            time_diff,
        });
    }

    /// Record a reaction against the newest gaze entry if it is recent enough
    pub fn record_reaction_at(&mut self, direction: Direction, now: f64) -> Option<ReactionPoint> {
        let latest = *self.history.latest()?;
        let time_diff = now - latest.timestamp;
        if time_diff > self.params.time_window {
            return None;
        }
        self.record_reaction(latest.object, direction, time_diff);
        log::info!(
            "Recorded reaction: {} {} after {:.2}s",
            latest.object,
            direction,
            time_diff
        );
        self.reactions.last().copied()
    }

    pub fn reactions(&self) -> &[ReactionPoint] {
        &self.reactions
    }

    pub fn is_reaction_calibrated(&self) -> bool {
        self.reaction_calibrated
    }

    /// Tune the gaze model from recorded reaction times. Returns false when
    /// nothing was recorded.
    pub fn adjust_from_reactions(&mut self) -> bool {
        if self.reactions.is_empty() {
            log::warn!("No reaction data recorded, parameters unchanged");
            return false;
        }

        let n = self.reactions.len() as f64;
        let avg = self.reactions.iter().map(|r| r.time_diff).sum::<f64>() / n;
        let std = if self.reactions.len() > 1 {
            let var = self
                .reactions
                .iter()
                .map(|r| (r.time_diff - avg).powi(2))
                .sum::<f64>()
                / n;
            var.sqrt()
        } else {
            0.5
        };

        let consistency = 1.0 - std / (avg + 0.1);
        self.params.time_window = (avg * 3.0).clamp(1.5, 5.0);
        self.params.min_gaze_duration = (avg * 0.4).clamp(0.3, 1.0);
        self.params.k = (1.0 / (avg + 0.1)).clamp(0.1, 2.0);
        self.params.exploration_rate = (0.3 * (1.0 - consistency)).clamp(0.05, 0.5);
        self.reaction_calibrated = true;

        log::info!(
            "Reaction calibration: window={:.2}s min_gaze={:.2}s k={:.2} exploration={:.2}",
            self.params.time_window,
            self.params.min_gaze_duration,
            self.params.k,
            self.params.exploration_rate
        );
        true
    }

    /// Tune learning from a success rate in [0, 1]
    pub fn adjust_learning_parameters(&mut self, performance: f64) {
        if self.reaction_calibrated && self.reactions.len() > REACTION_LOCK_POINTS {
            log::debug!("Reaction calibration in effect, skipping performance tuning");
            return;
        }

        let miss = 1.0 - performance.clamp(0.0, 1.0);
        self.params.exploration_rate = (0.5 * miss).clamp(0.05, 0.5);
        self.params.learning_rate = (0.3 * miss + 0.05).clamp(0.05, 0.3);
        self.params.time_window = (5.0 * miss + 1.5).clamp(1.5, 5.0);

        log::info!(
            "Performance {:.2}: exploration={:.2} learning_rate={:.2} window={:.2}s",
            performance,
            self.params.exploration_rate,
            self.params.learning_rate,
            self.params.time_window
        );
    }

    /// Summary of every object in the gaze history that has a value row
    pub fn object_stats(&self) -> Vec<ObjectStats> {
        let counts = self.history.gaze_counts();
        let mut ids: Vec<ObjectId> = counts.keys().copied().collect();
        ids.sort();

        ids.into_iter()
            .filter_map(|id| {
                let row = self.values.row(id)?;
                let mean_value = row.mean().unwrap_or(0.0);
                let mut best = 0;
                for (j, v) in row.iter().enumerate() {
                    if *v > row[best] {
                        best = j;
                    }
                }
                Some(ObjectStats {
                    object: id,
                    gaze_count: counts[&id],
                    mean_value,
                    max_value: row[best],
                    preferred_direction: Direction::from_index(best).unwrap_or(Direction::Up),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dwell::DwellTracker;
    use crate::types::Position;
    use std::collections::HashMap;

    fn agent(exploration_rate: f64) -> IntentFusionAgent {
        let mut config = AgentConfig::default();
        config.params.exploration_rate = exploration_rate;
        config.seed = Some(7);
        IntentFusionAgent::new(&config)
    }

    fn candidates(n: u32) -> Vec<CandidateObject> {
        (0..n)
            .map(|i| {
                let position = Position::new(i as f64 * 0.2 - 0.5, 0.0, 0.0);
                CandidateObject::new(i, position, format!("/obj[{i}]"))
            })
            .collect()
    }

    #[test]
    fn quantizer_table() {
        use Direction::*;
        let cases = [
            ((0.0, -1.0), Some(Up)),
            ((1.0, 0.0), Some(Right)),
            ((0.0, 1.0), Some(Down)),
            ((-1.0, 0.0), Some(Left)),
            ((1.0, -1.0), Some(UpRight)),
            ((-1.0, -1.0), Some(UpLeft)),
            ((1.0, 1.0), Some(DownRight)),
            ((-1.0, 1.0), Some(DownLeft)),
            ((0.0, 0.0), None),
            ((0.1, 0.1), None),
            ((0.15, -0.9), Some(Up)),
        ];
        for ((x, y), expected) in cases {
            assert_eq!(quantize_direction(x, y), expected, "axes ({x}, {y})");
        }
    }

    #[test]
    fn probability_decays_with_time() {
        let agent = agent(0.0);
        let fresh = agent.probability_model(Direction::Right, 0.0);
        let stale = agent.probability_model(Direction::Right, 2.0);
        assert!((fresh - 1.0 / (1.0 + 1f64.exp())).abs() < 1e-12);
        assert!(stale < fresh);
        assert!(stale >= 0.0);
    }

    #[test]
    fn brief_glance_is_excluded() {
        let mut agent = agent(0.0);
        let mut tracker = DwellTracker::default();
        for i in 0..=15 {
            let t = i as f64 * 0.1;
            agent.record_gaze(ObjectId(2), t);
            tracker.update(ObjectId(2), t);
        }
        for t in [1.3, 1.4, 1.5] {
            agent.record_gaze(ObjectId(3), t);
            tracker.update(ObjectId(3), t);
        }

        let scene = candidates(5);
        let selection = agent
            .select(Direction::Right, 1.5, &scene, &tracker)
            .expect("object 2 was looked at long enough");
        assert_eq!(selection.object, ObjectId(2));
        assert!(!selection.explored);

        let probs: HashMap<ObjectId, f64> = agent.last_probabilities().iter().copied().collect();
        assert_eq!(probs[&ObjectId(3)], 0.0);
        assert!(probs[&ObjectId(2)] > 0.0);
    }

    #[test]
    fn no_history_means_no_selection() {
        let mut agent = agent(0.0);
        let durations: HashMap<ObjectId, f64> = HashMap::new();
        assert!(agent.select(Direction::Up, 1.0, &candidates(3), &durations).is_none());
        assert!(agent.select(Direction::Up, 1.0, &[], &durations).is_none());
    }

    #[test]
    fn negative_values_can_silence_a_candidate() {
        let mut agent = agent(0.0);
        agent.record_gaze(ObjectId(1), 0.9);
        let mut durations = HashMap::new();
        durations.insert(ObjectId(1), 2.0);

        for _ in 0..20 {
            agent.update_value(ObjectId(1), Direction::Down, -1.0);
        }
        assert!(agent.select(Direction::Down, 1.0, &candidates(3), &durations).is_none());
        assert_eq!(agent.last_probabilities()[1], (ObjectId(1), 0.0));
    }

    #[test]
    fn value_update_steps() {
        let mut agent = agent(0.0);
        agent.update_value(ObjectId(0), Direction::Left, 1.0);
        assert!((agent.values().get(ObjectId(0), Direction::Left) - 0.1).abs() < 1e-12);
        agent.update_value(ObjectId(0), Direction::Left, -0.2);
        assert!((agent.values().get(ObjectId(0), Direction::Left) - 0.08).abs() < 1e-12);

        // beyond capacity: ignored
        agent.update_value(ObjectId(42), Direction::Left, 1.0);
        assert_eq!(agent.values().get(ObjectId(42), Direction::Left), 0.0);
    }

    #[test]
    fn learned_value_breaks_gaze_tie() {
        let mut agent = agent(0.0);
        let mut durations = HashMap::new();
        for id in [0, 1] {
            agent.record_gaze(ObjectId(id), 1.0);
            durations.insert(ObjectId(id), 1.0);
        }
        let scene = candidates(2);

        let first = agent.select(Direction::Up, 1.0, &scene, &durations).expect("selection");
        assert_eq!(first.object, ObjectId(0));

        agent.update_value(ObjectId(1), Direction::Up, 1.0);
        let second = agent.select(Direction::Up, 1.0, &scene, &durations).expect("selection");
        assert_eq!(second.object, ObjectId(1));
    }

    #[test]
    fn full_exploration_stays_among_nonzero() {
        let mut agent = agent(1.0);
        let mut durations = HashMap::new();
        for id in [1, 3] {
            agent.record_gaze(ObjectId(id), 0.5);
            durations.insert(ObjectId(id), 1.0);
        }
        let scene = candidates(5);
        for _ in 0..50 {
            let s = agent.select(Direction::Left, 0.6, &scene, &durations).expect("selection");
            assert!(s.explored);
            assert!(s.object == ObjectId(1) || s.object == ObjectId(3));
        }
    }

    #[test]
    fn out_of_capacity_ids_remain_selectable() {
        let mut config = AgentConfig::default();
        config.max_objects = 2;
        config.params.exploration_rate = 0.0;
        let mut agent = IntentFusionAgent::new(&config);

        let scene = vec![CandidateObject::new(5, Position::default(), "/far")];
        agent.record_gaze(ObjectId(5), 1.0);
        let mut durations = HashMap::new();
        durations.insert(ObjectId(5), 1.0);

        let s = agent.select(Direction::Up, 1.0, &scene, &durations).expect("selection");
        assert_eq!(s.object, ObjectId(5));
    }

    #[test]
    fn reaction_calibration_adjusts_params() {
        let mut agent = agent(0.1);
        for t in [0.8, 1.0, 1.2] {
            agent.record_reaction(ObjectId(0), Direction::Up, t);
        }
        assert!(agent.adjust_from_reactions());

        let p = agent.params();
        assert!((p.time_window - 3.0).abs() < 1e-9);
        assert!((p.min_gaze_duration - 0.4).abs() < 1e-9);
        assert!((p.k - 1.0 / 1.1).abs() < 1e-9);
        assert!(p.exploration_rate >= 0.05 && p.exploration_rate <= 0.5);
        assert!(agent.is_reaction_calibrated());
    }

    #[test]
    fn reaction_needs_recent_gaze() {
        let mut agent = agent(0.1);
        assert!(agent.record_reaction_at(Direction::Up, 1.0).is_none());
        agent.record_gaze(ObjectId(4), 1.0);
        assert!(agent.record_reaction_at(Direction::Up, 10.0).is_none());
        let point = agent.record_reaction_at(Direction::Up, 1.5).expect("recent");
        assert_eq!(point.object, ObjectId(4));
        assert_eq!(agent.reactions().len(), 1);
    }

    #[test]
    fn performance_tuning() {
        let mut agent = agent(0.1);
        agent.adjust_learning_parameters(1.0);
        let p = *agent.params();
        assert_eq!(p.exploration_rate, 0.05);
        assert_eq!(p.learning_rate, 0.05);
        assert_eq!(p.time_window, 1.5);

        agent.adjust_learning_parameters(0.0);
        let p = *agent.params();
        assert_eq!(p.exploration_rate, 0.5);
        assert_eq!(p.learning_rate, 0.3);
        assert_eq!(p.time_window, 5.0);
    }

    #[test]
    fn stats_cover_gazed_objects() {
        let mut agent = agent(0.0);
        agent.record_gaze(ObjectId(1), 0.0);
        agent.record_gaze(ObjectId(1), 0.1);
        agent.record_gaze(ObjectId(30), 0.2);
        agent.update_value(ObjectId(1), Direction::DownLeft, 1.0);

        let stats = agent.object_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].object, ObjectId(1));
        assert_eq!(stats[0].gaze_count, 2);
        assert_eq!(stats[0].preferred_direction, Direction::DownLeft);
        assert!((stats[0].max_value - 0.1).abs() < 1e-12);
    }

    #[test]
    fn seeded_agents_explore_identically() {
        let mut a = agent(0.5);
        let mut b = agent(0.5);
        let mut durations = HashMap::new();
        for id in 0..4 {
            a.record_gaze(ObjectId(id), 1.0);
            b.record_gaze(ObjectId(id), 1.0);
            durations.insert(ObjectId(id), 1.0);
        }
        let scene = candidates(4);
        for _ in 0..20 {
            assert_eq!(
                a.select(Direction::Up, 1.0, &scene, &durations),
                b.select(Direction::Up, 1.0, &scene, &durations)
            );
        }
    }
}
