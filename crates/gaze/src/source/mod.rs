//! Gaze sample producers
//!
//! Perception lives outside this crate; a source only delivers ratios that
//! some tracker already computed, stamped on the shared clock.

mod udp;

pub use udp::{parse_gaze_message, udp_gaze_addr_from_env, UdpGazeSource};

use crate::clock::MonotonicClock;
use crate::types::{GazeSample, Position};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait GazeSource: Send {
    /// Wait for the next sample. `Ok(None)` means the source is exhausted.
    async fn next_sample(&mut self) -> Result<Option<GazeSample>>;
}

/// Synthetic tracker that hops between fixation points with a little jitter.
pub struct SimulatedGazeSource {
    clock: MonotonicClock,
    interval: tokio::time::Interval,
    fixations: Vec<(f64, f64)>,
    hold: f64,
    jitter: f64,
    started: Option<f64>,
    rng: fastrand::Rng,
}

impl SimulatedGazeSource {
    /// `fixations` are scene positions; an empty list stares at the centre
    pub fn new(clock: MonotonicClock, period: Duration, fixations: &[Position], hold: f64) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut points: Vec<(f64, f64)> = fixations.iter().map(|p| p.normalized()).collect();
        if points.is_empty() {
            points.push((0.5, 0.5));
        }

        Self {
            clock,
            interval,
            fixations: points,
            hold: hold.max(0.1),
            jitter: 0.02,
            started: None,
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    fn point_at(&self, elapsed: f64) -> (f64, f64) {
        let idx = (elapsed / self.hold) as usize % self.fixations.len();
        self.fixations[idx]
    }
}

#[async_trait]
impl GazeSource for SimulatedGazeSource {
    async fn next_sample(&mut self) -> Result<Option<GazeSample>> {
        self.interval.tick().await;
        let now = self.clock.now();
        let started = *self.started.get_or_insert(now);

        let (h, v) = self.point_at(now - started);
        let jh = (self.rng.f64() - 0.5) * 2.0 * self.jitter;
        let jv = (self.rng.f64() - 0.5) * 2.0 * self.jitter;

        Ok(Some(GazeSample::new(
            (h + jh).clamp(0.0, 1.0),
            (v + jv).clamp(0.0, 1.0),
            now,
        )))
    }
}
