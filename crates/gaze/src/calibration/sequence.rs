//! Guided calibration sequence.
//!
//! The caller owns timing: it calls [`CalibrationSequence::tick`] from its
//! own loop and renders whatever [`CalibrationProgress`] describes. Raw gaze
//! is pulled through an injected [`RawGazeFeed`].

use super::CalibrationEngine;
use crate::config::SequenceConfig;
use crate::types::{CandidateObject, ObjectId};

/// Source of the latest raw (uncalibrated) gaze ratios
pub trait RawGazeFeed: Send {
    fn latest_raw(&mut self) -> Option<(f64, f64)>;
}

impl<F> RawGazeFeed for F
where
    F: FnMut() -> Option<(f64, f64)> + Send,
{
    fn latest_raw(&mut self) -> Option<(f64, f64)> {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    WaitingForStart,
    ShowingTarget,
    CollectingSamples,
    Completed,
    TimedOut,
}

#[derive(Debug, Clone)]
enum State {
    WaitingForStart,
    ShowingTarget {
        index: usize,
        since: f64,
    },
    CollectingSamples {
        index: usize,
        started: f64,
        last_sample: Option<f64>,
        raw: Vec<(f64, f64)>,
    },
    Completed,
    TimedOut,
}

/// Snapshot for the UI after each tick
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationProgress {
    pub phase: CalibrationPhase,
    pub target_index: Option<usize>,
    pub target: Option<ObjectId>,
    /// Normalized screen position of the current target
    pub target_position: Option<(f64, f64)>,
    pub total_targets: usize,
    pub collected: usize,
    pub required: usize,
    pub accepted_targets: usize,
}

impl CalibrationProgress {
    /// Fraction of samples collected for the current target
    pub fn fraction(&self) -> f64 {
        if self.required == 0 {
            return 0.0;
        }
        (self.collected as f64 / self.required as f64).min(1.0)
    }
}

pub struct CalibrationSequence {
    config: SequenceConfig,
    targets: Vec<CandidateObject>,
    feed: Box<dyn RawGazeFeed>,
    state: State,
    accepted: usize,
}

impl CalibrationSequence {
    pub fn new(
        config: SequenceConfig,
        objects: Vec<CandidateObject>,
        feed: impl RawGazeFeed + 'static,
    ) -> Self {
        Self {
            config,
            targets: order_targets(objects),
            feed: Box::new(feed),
            state: State::WaitingForStart,
            accepted: 0,
        }
    }

    pub fn targets(&self) -> &[CandidateObject] {
        &self.targets
    }

    pub fn phase(&self) -> CalibrationPhase {
        match self.state {
            State::WaitingForStart => CalibrationPhase::WaitingForStart,
            State::ShowingTarget { .. } => CalibrationPhase::ShowingTarget,
            State::CollectingSamples { .. } => CalibrationPhase::CollectingSamples,
            State::Completed => CalibrationPhase::Completed,
            State::TimedOut => CalibrationPhase::TimedOut,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Completed | State::TimedOut)
    }

    /// Begin the sequence. Any earlier calibration data in `engine` is dropped.
    pub fn start(&mut self, now: f64, engine: &mut CalibrationEngine) -> CalibrationProgress {
        engine.reset();
        self.accepted = 0;

        if self.targets.is_empty() {
            log::error!("No calibration targets in scene");
            self.state = State::TimedOut;
        } else {
            log::info!(
                "Starting guided calibration with {} targets",
                self.targets.len()
            );
            self.state = State::ShowingTarget {
                index: 0,
                since: now,
            };
        }
        self.progress()
    }

    /// Abort and go back to waiting; collected engine samples are kept
    pub fn cancel(&mut self) {
        log::info!("Calibration sequence cancelled");
        self.state = State::WaitingForStart;
    }

    /// Advance the state machine to `now`
    pub fn tick(&mut self, now: f64, engine: &mut CalibrationEngine) -> CalibrationProgress {
        let state = std::mem::replace(&mut self.state, State::WaitingForStart);

        self.state = match state {
            State::ShowingTarget { index, since } => {
                if now - since >= self.config.intro_duration {
                    log::debug!("Collecting samples for target {}", index + 1);
                    State::CollectingSamples {
                        index,
                        started: now,
                        last_sample: None,
                        raw: Vec::with_capacity(self.config.samples_per_target),
                    }
                } else {
                    State::ShowingTarget { index, since }
                }
            }
            State::CollectingSamples {
                index,
                started,
                mut last_sample,
                mut raw,
            } => {
                let required = self.config.samples_per_target;
                let due = last_sample.map_or(true, |t| now - t >= self.config.sample_interval);

                if raw.len() < required && due {
                    if let Some((h, v)) = self.feed.latest_raw() {
                        raw.push((h, v));
                        last_sample = Some(now);
                        log::trace!(
                            "Calibration sample {}/{} for target {}: ({:.3}, {:.3})",
                            raw.len(),
                            required,
                            index + 1,
                            h,
                            v
                        );
                    }
                }

                if raw.len() >= required {
                    self.finish_target(index, &raw, now, engine)
                } else if now - started > self.config.target_timeout {
                    log::warn!(
                        "Timeout on target {} after {:.1}s ({}/{} samples)",
                        self.targets[index].name,
                        now - started,
                        raw.len(),
                        required
                    );
                    self.finish_target(index, &raw, now, engine)
                } else {
                    State::CollectingSamples {
                        index,
                        started,
                        last_sample,
                        raw,
                    }
                }
            }
            other => other,
        };

        self.progress()
    }

    fn finish_target(
        &mut self,
        index: usize,
        raw: &[(f64, f64)],
        now: f64,
        engine: &mut CalibrationEngine,
    ) -> State {
        let target = &self.targets[index];
        let needed = self.config.samples_per_target as f64 * self.config.acceptance_ratio;

        if !raw.is_empty() && raw.len() as f64 >= needed {
            let n = raw.len() as f64;
            let avg_h = raw.iter().map(|s| s.0).sum::<f64>() / n;
            let avg_v = raw.iter().map(|s| s.1).sum::<f64>() / n;
            let (target_h, target_v) = target.position.normalized();

            match engine.add_sample(avg_h, avg_v, target_h, target_v) {
                Ok(()) => {
                    self.accepted += 1;
                    log::info!(
                        "Stored mapping for {}: gaze ({:.3}, {:.3}) -> target ({:.3}, {:.3})",
                        target.name,
                        avg_h,
                        avg_v,
                        target_h,
                        target_v
                    );
                }
                Err(e) => log::warn!("Discarding calibration target {}: {}", target.name, e),
            }
        }

        if index + 1 < self.targets.len() {
            return State::ShowingTarget {
                index: index + 1,
                since: now,
            };
        }

        if engine.fit().is_fitted() {
            log::info!(
                "Calibration sequence complete ({} of {} targets)",
                self.accepted,
                self.targets.len()
            );
            State::Completed
        } else {
            log::warn!(
                "Not enough targets calibrated ({} of {}), staying uncalibrated",
                self.accepted,
                self.targets.len()
            );
            State::TimedOut
        }
    }

    pub fn progress(&self) -> CalibrationProgress {
        let (index, collected) = match &self.state {
            State::ShowingTarget { index, .. } => (Some(*index), 0),
            State::CollectingSamples { index, raw, .. } => (Some(*index), raw.len()),
            _ => (None, 0),
        };
        let target = index.and_then(|i| self.targets.get(i));

        CalibrationProgress {
            phase: self.phase(),
            target_index: index,
            target: target.map(|t| t.id),
            target_position: target.map(|t| t.position.normalized()),
            total_targets: self.targets.len(),
            collected,
            required: self.config.samples_per_target,
            accepted_targets: self.accepted,
        }
    }
}

/// Order targets so the corners and the centre come first, then the rest
/// in their original order.
pub fn order_targets(objects: Vec<CandidateObject>) -> Vec<CandidateObject> {
    const ANCHORS: [(f64, f64); 5] = [
        (-1.0, -1.0),
        (1.0, -1.0),
        (-1.0, 1.0),
        (1.0, 1.0),
        (0.0, 0.0),
    ];

    if objects.is_empty() {
        return objects;
    }

    let mut picked: Vec<usize> = Vec::with_capacity(ANCHORS.len());
    for (ax, ay) in ANCHORS {
        let nearest = objects
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.position
                    .planar_distance(ax, ay)
                    .total_cmp(&b.position.planar_distance(ax, ay))
            })
            .map(|(i, _)| i);
        if let Some(i) = nearest {
            if !picked.contains(&i) {
                picked.push(i);
            }
        }
    }

    let mut ordered: Vec<CandidateObject> = picked.iter().map(|&i| objects[i].clone()).collect();
    ordered.extend(
        objects
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !picked.contains(i))
            .map(|(_, o)| o),
    );
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalibrationConfig;
    use crate::types::Position;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn scene() -> Vec<CandidateObject> {
        vec![
            CandidateObject::new(0, Position::new(0.0, 0.0, 0.0), "/target[0]"),
            CandidateObject::new(1, Position::new(0.3, 0.4, 0.0), "/target[1]"),
            CandidateObject::new(2, Position::new(-0.8, -0.8, 0.0), "/target[2]"),
            CandidateObject::new(3, Position::new(0.8, -0.8, 0.0), "/target[3]"),
            CandidateObject::new(4, Position::new(-0.8, 0.8, 0.0), "/target[4]"),
            CandidateObject::new(5, Position::new(0.8, 0.8, 0.0), "/target[5]"),
        ]
    }

    fn run(
        seq: &mut CalibrationSequence,
        engine: &mut CalibrationEngine,
        mut on_tick: impl FnMut(&CalibrationProgress),
    ) -> f64 {
        let mut now = 0.0;
        let mut progress = seq.start(now, engine);
        let mut steps = 0;
        while !seq.is_finished() && steps < 100_000 {
            on_tick(&progress);
            now += 0.05;
            progress = seq.tick(now, engine);
            steps += 1;
        }
        now
    }

    #[test]
    fn corners_and_centre_first() {
        let ids: Vec<u32> = order_targets(scene()).iter().map(|o| o.id.0).collect();
        assert_eq!(ids, vec![2, 3, 4, 5, 0, 1]);
    }

    #[test]
    fn waits_for_start() {
        let mut engine = CalibrationEngine::default();
        let mut seq =
            CalibrationSequence::new(SequenceConfig::default(), scene(), || Some((0.5, 0.5)));
        assert_eq!(seq.tick(5.0, &mut engine).phase, CalibrationPhase::WaitingForStart);
    }

    #[test]
    fn full_sequence_fits_compressed_gaze() {
        // Tracker only reports half of the true range, centred
        let current = Arc::new(Mutex::new((0.5, 0.5)));
        let feed_state = Arc::clone(&current);
        let feed = move || Some(*feed_state.lock());

        let mut engine = CalibrationEngine::new(&CalibrationConfig::default());
        let mut seq = CalibrationSequence::new(SequenceConfig::default(), scene(), feed);

        let mut saw_showing = false;
        let mut saw_collecting = false;
        run(&mut seq, &mut engine, |p| {
            match p.phase {
                CalibrationPhase::ShowingTarget => saw_showing = true,
                CalibrationPhase::CollectingSamples => saw_collecting = true,
                _ => {}
            }
            if let Some((th, tv)) = p.target_position {
                *current.lock() = (0.25 + 0.5 * th, 0.25 + 0.5 * tv);
            }
        });

        assert!(saw_showing && saw_collecting);
        assert_eq!(seq.phase(), CalibrationPhase::Completed);
        assert_eq!(seq.progress().accepted_targets, 6);
        assert!(engine.is_calibrated());

        let (h, v) = engine.transform(0.25 + 0.5 * 0.9, 0.25 + 0.5 * 0.1);
        assert!((h - 0.9).abs() < 1e-6);
        assert!((v - 0.1).abs() < 1e-6);
    }

    #[test]
    fn no_gaze_times_out_every_target() {
        let mut engine = CalibrationEngine::default();
        let mut seq = CalibrationSequence::new(SequenceConfig::default(), scene(), || None);

        let elapsed = run(&mut seq, &mut engine, |_| {});

        assert_eq!(seq.phase(), CalibrationPhase::TimedOut);
        assert!(!engine.is_calibrated());
        assert_eq!(engine.transform(0.2, 0.8), (0.2, 0.8));
        // six targets, each: intro + timeout
        assert!(elapsed > 6.0 * 15.0);
    }

    #[test]
    fn empty_scene_times_out_immediately() {
        let mut engine = CalibrationEngine::default();
        let mut seq =
            CalibrationSequence::new(SequenceConfig::default(), Vec::new(), || Some((0.5, 0.5)));
        let progress = seq.start(0.0, &mut engine);
        assert_eq!(progress.phase, CalibrationPhase::TimedOut);
    }

    #[test]
    fn cancel_returns_to_waiting() {
        let mut engine = CalibrationEngine::default();
        let mut seq =
            CalibrationSequence::new(SequenceConfig::default(), scene(), || Some((0.5, 0.5)));
        seq.start(0.0, &mut engine);
        seq.tick(2.0, &mut engine);
        seq.cancel();
        assert_eq!(seq.phase(), CalibrationPhase::WaitingForStart);
        assert_eq!(seq.progress().target_index, None);
    }
}
