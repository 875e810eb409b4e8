//! Bounded log of which object was under the gaze and when

use crate::dwell::DwellDurations;
use crate::types::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Gaps below this still count as one continuous look
const CONTINUITY_GAP: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeHistoryEntry {
    pub object: ObjectId,
    pub timestamp: f64,
}

#[derive(Debug, Clone)]
pub struct GazeHistory {
    entries: VecDeque<GazeHistoryEntry>,
    capacity: usize,
}

impl GazeHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, object: ObjectId, timestamp: f64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(GazeHistoryEntry { object, timestamp });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&GazeHistoryEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GazeHistoryEntry> {
        self.entries.iter()
    }

    /// The `n` newest entries, newest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &GazeHistoryEntry> {
        self.entries.iter().rev().take(n)
    }

    /// Seconds since each object was last seen, limited to `window`
    pub fn recency(&self, now: f64, window: f64) -> HashMap<ObjectId, f64> {
        let mut out = HashMap::new();
        for entry in self.entries.iter().rev() {
            let since = now - entry.timestamp;
            if since <= window {
                out.entry(entry.object)
                    .and_modify(|d: &mut f64| *d = d.min(since))
                    .or_insert(since);
            }
        }
        out
    }

    /// Continuous look time on `object` within `window`, summing only
    /// gaps shorter than a quarter second
    pub fn continuous_duration(&self, object: ObjectId, now: f64, window: f64) -> f64 {
        let mut times: Vec<f64> = self
            .entries
            .iter()
            .filter(|e| e.object == object && now - e.timestamp <= window)
            .map(|e| e.timestamp)
            .collect();
        times.sort_by(f64::total_cmp);

        times
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|gap| *gap < CONTINUITY_GAP)
            .sum()
    }

    pub fn gaze_counts(&self) -> HashMap<ObjectId, usize> {
        let mut counts = HashMap::new();
        for entry in &self.entries {
            *counts.entry(entry.object).or_insert(0) += 1;
        }
        counts
    }

    /// Dwell view over the history for a fixed window
    pub fn durations(&self, window: f64) -> HistoryDurations<'_> {
        HistoryDurations {
            history: self,
            window,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub struct HistoryDurations<'a> {
    history: &'a GazeHistory,
    window: f64,
}

impl DwellDurations for HistoryDurations<'_> {
    fn dwell_duration(&self, object: ObjectId, now: f64) -> f64 {
        self.history.continuous_duration(object, now, self.window)
    }
}
