//! Dwell tracking - how long the gaze has stayed on each object.
//!
//! A streak survives short re-detection gaps (`max_idle_time`); a longer gap
//! starts a fresh streak. Stale records are kept but report zero duration.

use crate::config::DwellConfig;
use crate::types::ObjectId;
use std::collections::HashMap;

/// Anything that can report the current dwell duration of an object
pub trait DwellDurations {
    fn dwell_duration(&self, object: ObjectId, now: f64) -> f64;
}

/// One continuous attention streak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellRecord {
    pub object: ObjectId,
    pub first_seen: f64,
    pub last_seen: f64,
}

#[derive(Debug, Clone)]
pub struct DwellTracker {
    records: HashMap<ObjectId, DwellRecord>,
    max_idle_time: f64,
}

impl DwellTracker {
    pub fn new(config: &DwellConfig) -> Self {
        Self::with_idle_time(config.max_idle_time)
    }

    pub fn with_idle_time(max_idle_time: f64) -> Self {
        Self {
            records: HashMap::new(),
            max_idle_time,
        }
    }

    pub fn max_idle_time(&self) -> f64 {
        self.max_idle_time
    }

    /// Register that `object` is under the gaze at `now`
    pub fn update(&mut self, object: ObjectId, now: f64) {
        let max_idle = self.max_idle_time;
        let record = self.records.entry(object).or_insert(DwellRecord {
            object,
            first_seen: now,
            last_seen: now,
        });

        if now - record.last_seen < max_idle {
            record.last_seen = now;
        } else {
            log::trace!(
                "Dwell on {} broken after {:.2}s gap",
                object,
                now - record.last_seen
            );
            record.first_seen = now;
            record.last_seen = now;
        }
    }

    /// Continuous dwell, or 0.0 once the record went stale
    pub fn duration(&self, object: ObjectId, now: f64) -> f64 {
        match self.records.get(&object) {
            Some(r) if now - r.last_seen <= self.max_idle_time => r.last_seen - r.first_seen,
            _ => 0.0,
        }
    }

    pub fn record(&self, object: ObjectId) -> Option<&DwellRecord> {
        self.records.get(&object)
    }

    /// Objects whose streak is still alive at `now`
    pub fn active_objects(&self, now: f64) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self
            .records
            .values()
            .filter(|r| now - r.last_seen <= self.max_idle_time)
            .map(|r| r.object)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn reset(&mut self, object: ObjectId) {
        self.records.remove(&object);
    }

    pub fn reset_all(&mut self) {
        self.records.clear();
    }
}

impl Default for DwellTracker {
    fn default() -> Self {
        Self::new(&DwellConfig::default())
    }
}

impl DwellDurations for DwellTracker {
    fn dwell_duration(&self, object: ObjectId, now: f64) -> f64 {
        self.duration(object, now)
    }
}

/// Durations computed elsewhere and handed in as-is
impl DwellDurations for HashMap<ObjectId, f64> {
    fn dwell_duration(&self, object: ObjectId, _now: f64) -> f64 {
        self.get(&object).copied().unwrap_or(0.0)
    }
}
