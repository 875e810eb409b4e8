use super::history::GazeHistory;
use crate::types::ObjectId;

/// Turns the outcome of an executed selection into a scalar reward
pub trait RewardPolicy: Send + Sync {
    fn reward(&self, selected: ObjectId, history: &GazeHistory) -> f64;
}

/// Rewards a selection that the user recently looked at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentGazeReward {
    pub window: usize,
    pub hit: f64,
    pub miss: f64,
}

impl Default for RecentGazeReward {
    fn default() -> Self {
        Self {
            window: 5,
            hit: 1.0,
            miss: -0.2,
        }
    }
}

impl RewardPolicy for RecentGazeReward {
    fn reward(&self, selected: ObjectId, history: &GazeHistory) -> f64 {
        if history.recent(self.window).any(|e| e.object == selected) {
            self.hit
        } else {
            self.miss
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_recent_entries_count() {
        let mut history = GazeHistory::new(50);
        history.push(ObjectId(9), 0.0);
        for i in 0..5 {
            history.push(ObjectId(1), 1.0 + i as f64);
        }
        let policy = RecentGazeReward::default();
        assert_eq!(policy.reward(ObjectId(1), &history), 1.0);
        assert_eq!(policy.reward(ObjectId(9), &history), -0.2);
    }
}
