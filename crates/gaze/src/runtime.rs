//! Producer / consumer pipeline and the decision cycle.
//!
//! ```text
//! GazeSource --(bounded queue)--> consumer: transform -> resolve -> dwell + history
//!                                                  |
//! direction input --> handle_direction: quantize -> select -> execute -> reward
//! ```
//!
//! The consumer and the decision cycle meet in one `SharedState` behind a
//! single mutex. The calibration engine sits behind its own `RwLock`: the
//! consumer only reads it, calibration is the only writer.
//!
//! Lock order is state, then calibration. The latest raw ratios live in a
//! separate leaf mutex so a calibration sequence can read them while it
//! holds the engine for writing.

use crate::agent::{quantize_direction, IntentFusionAgent, RecentGazeReward, RewardPolicy};
use crate::calibration::{CalibrationEngine, RawGazeFeed};
use crate::clock::MonotonicClock;
use crate::config::GazeConfig;
use crate::dwell::DwellTracker;
use crate::persistence::ModelState;
use crate::resolver::GazeResolver;
use crate::source::GazeSource;
use crate::types::{
    CalibrationStatus, CandidateObject, Direction, GazeSample, ResolvedGaze, SelectionEvent,
};
use async_trait::async_trait;
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Carries out a selection (robot, simulator, UI...)
#[async_trait]
pub trait ObjectExecutor: Send + Sync {
    /// `Ok(true)` when the action was performed
    async fn execute(&self, object: &CandidateObject, direction: Direction) -> anyhow::Result<bool>;
}

/// Executor that only logs; every action succeeds
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExecutor;

#[async_trait]
impl ObjectExecutor for LoggingExecutor {
    async fn execute(
        &self,
        object: &CandidateObject,
        direction: Direction,
    ) -> anyhow::Result<bool> {
        log::info!(
            "Executing {} on {} ({}) at ({:.2}, {:.2})",
            direction,
            object.name,
            object.id,
            object.position.x,
            object.position.y
        );
        Ok(true)
    }
}

/// Everything the consumer and the decision cycle share
pub struct SharedState {
    pub candidates: Vec<CandidateObject>,
    pub latest: Option<ResolvedGaze>,
    pub dwell: DwellTracker,
    pub agent: IntentFusionAgent,
    last_timestamp: f64,
    last_action: Option<f64>,
}

struct RuntimeInner {
    config: GazeConfig,
    clock: MonotonicClock,
    resolver: GazeResolver,
    state: Mutex<SharedState>,
    calibration: RwLock<CalibrationEngine>,
    /// Last usable raw ratios, before calibration
    latest_raw: Mutex<Option<(f64, f64)>>,
    reward: Box<dyn RewardPolicy>,
    selection_tx: Mutex<Option<Sender<SelectionEvent>>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    dropped: AtomicU64,
}

/// Explicit runtime context; cheap to clone and share between tasks
#[derive(Clone)]
pub struct GazeRuntime {
    inner: Arc<RuntimeInner>,
}

impl GazeRuntime {
    pub fn new(config: GazeConfig) -> Self {
        Self::with_reward_policy(config, Box::new(RecentGazeReward::default()))
    }

    pub fn with_reward_policy(config: GazeConfig, reward: Box<dyn RewardPolicy>) -> Self {
        Self::with_clock(config, reward, MonotonicClock::new())
    }

    pub fn with_clock(
        config: GazeConfig,
        reward: Box<dyn RewardPolicy>,
        clock: MonotonicClock,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let state = SharedState {
            candidates: Vec::new(),
            latest: None,
            dwell: DwellTracker::new(&config.dwell),
            agent: IntentFusionAgent::new(&config.agent),
            last_timestamp: f64::NEG_INFINITY,
            last_action: None,
        };

        Self {
            inner: Arc::new(RuntimeInner {
                resolver: GazeResolver::new(config.resolver.clone()),
                calibration: RwLock::new(CalibrationEngine::new(&config.calibration)),
                state: Mutex::new(state),
                latest_raw: Mutex::new(None),
                reward,
                selection_tx: Mutex::new(None),
                shutdown_tx,
                tasks: Mutex::new(Vec::new()),
                dropped: AtomicU64::new(0),
                clock,
                config,
            }),
        }
    }

    pub fn config(&self) -> &GazeConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> MonotonicClock {
        self.inner.clock
    }

    /// Forward every decision to `tx`
    pub fn set_selection_sink(&self, tx: Sender<SelectionEvent>) {
        *self.inner.selection_tx.lock() = Some(tx);
    }

    /// Replace the candidate set in one step
    pub fn update_candidates(&self, candidates: Vec<CandidateObject>) {
        let mut state = self.inner.state.lock();
        log::debug!("Candidate set updated: {} objects", candidates.len());
        state.candidates = candidates;
    }

    pub fn candidates(&self) -> Vec<CandidateObject> {
        self.inner.state.lock().candidates.clone()
    }

    pub fn latest_gaze(&self) -> Option<ResolvedGaze> {
        self.inner.state.lock().latest
    }

    /// Run `f` with the shared state locked
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        f(&mut self.inner.state.lock())
    }

    pub fn calibration(&self) -> &RwLock<CalibrationEngine> {
        &self.inner.calibration
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        self.inner.calibration.read().status()
    }

    /// Last usable raw ratios, before calibration
    pub fn latest_raw(&self) -> Option<(f64, f64)> {
        *self.inner.latest_raw.lock()
    }

    /// Feed of the latest raw ratios for a calibration sequence.
    ///
    /// Never touches the state mutex, so it is safe to poll with the
    /// calibration engine write-locked.
    pub fn raw_feed(&self) -> impl RawGazeFeed + 'static {
        let inner = Arc::clone(&self.inner);
        move || *inner.latest_raw.lock()
    }

    pub fn dropped_samples(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn model_state(&self) -> ModelState {
        let state = self.inner.state.lock();
        let engine = self.inner.calibration.read();
        ModelState::capture(&state.agent, &engine)
    }

    pub fn restore_model(&self, model: &ModelState) {
        let mut state = self.inner.state.lock();
        let mut engine = self.inner.calibration.write();
        model.restore(&mut state.agent, &mut engine);
    }

    /// Apply one gaze sample: calibrate, resolve, update dwell and history.
    ///
    /// Samples older than the last applied one are dropped.
    pub fn ingest(&self, sample: GazeSample) -> Option<ResolvedGaze> {
        let Some((raw_h, raw_v)) = sample.ratios() else {
            log::trace!("Gaze sample at {:.3} has no pupils", sample.timestamp);
            return None;
        };

        let (h, v, calibrated) = {
            let engine = self.inner.calibration.read();
            let (h, v) = engine.transform(raw_h, raw_v);
            (h, v, engine.is_calibrated())
        };

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if sample.timestamp < state.last_timestamp {
            log::debug!(
                "Dropping out-of-order gaze sample ({:.3} < {:.3})",
                sample.timestamp,
                state.last_timestamp
            );
            return None;
        }
        state.last_timestamp = sample.timestamp;
        *self.inner.latest_raw.lock() = Some((raw_h, raw_v));

        let object = self
            .inner
            .resolver
            .resolve_for(h, v, &state.candidates, calibrated)
            .map(|r| r.object);
        if let Some(id) = object {
            state.dwell.update(id, sample.timestamp);
            state.agent.record_gaze(id, sample.timestamp);
        }

        let resolved = ResolvedGaze {
            h,
            v,
            object,
            timestamp: sample.timestamp,
        };
        state.latest = Some(resolved);
        Some(resolved)
    }

    /// Start the producer and consumer tasks for `source`
    pub fn spawn_pipeline<S: GazeSource + 'static>(&self, source: S) {
        let capacity = self.inner.config.runtime.queue_capacity;
        let (tx, rx) = mpsc::channel(capacity);

        let producer = tokio::spawn(produce(
            source,
            tx,
            self.inner.shutdown_tx.subscribe(),
            Arc::clone(&self.inner),
        ));
        let consumer = tokio::spawn(consume(rx, self.inner.shutdown_tx.subscribe(), self.clone()));

        let mut tasks = self.inner.tasks.lock();
        tasks.push(producer);
        tasks.push(consumer);
        log::info!("Gaze pipeline started (queue capacity {})", capacity);
    }

    /// Signal both loops to stop and wait for them
    pub async fn shutdown(&self) {
        log::info!("Shutting down gaze pipeline...");
        self.inner.shutdown_tx.send_replace(true);
        self.join().await;
    }

    /// Wait for the pipeline tasks to finish on their own
    pub async fn join(&self) {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                log::warn!("Pipeline task ended abnormally: {e}");
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown_tx.borrow()
    }

    /// Run one decision cycle for joystick / keyboard axes.
    ///
    /// Returns `None` for a centred stick, during the action cooldown, or when
    /// no candidate qualifies.
    pub async fn handle_direction(
        &self,
        x_axis: f64,
        y_axis: f64,
        executor: &dyn ObjectExecutor,
    ) -> Option<SelectionEvent> {
        let direction = quantize_direction(x_axis, y_axis)?;
        let now = self.inner.clock.now();
        self.decide(direction, now, executor).await
    }

    /// Decision cycle for an already quantized direction at `now`
    pub async fn decide(
        &self,
        direction: Direction,
        now: f64,
        executor: &dyn ObjectExecutor,
    ) -> Option<SelectionEvent> {
        let cooldown = self.inner.config.runtime.action_cooldown;

        let (selection, object) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            if let Some(last) = state.last_action {
                if now - last < cooldown {
                    log::debug!("Direction {} ignored, cooling down", direction);
                    return None;
                }
            }

            let selection = state
                .agent
                .select(direction, now, &state.candidates, &state.dwell)?;
            let object = state
                .candidates
                .iter()
                .find(|c| c.id == selection.object)
                .cloned()?;
            state.last_action = Some(now);
            (selection, object)
        };

        let executed = match executor.execute(&object, direction).await {
            Ok(done) => done,
            Err(e) => {
                log::warn!("Executing {} on {} failed: {e:#}", direction, object.name);
                false
            }
        };

        let reward = if executed {
            let mut state = self.inner.state.lock();
            let reward = self.inner.reward.reward(object.id, state.agent.history());
            state.agent.update_value(object.id, direction, reward);
            Some(reward)
        } else {
            log::warn!("Action on {} not performed, no reward applied", object.name);
            None
        };

        let event = SelectionEvent {
            object: object.id,
            name: object.name,
            direction,
            probability: selection.probability,
            explored: selection.explored,
            executed,
            reward,
            timestamp: now,
        };

        if let Some(tx) = self.inner.selection_tx.lock().as_ref() {
            if let Err(e) = tx.send(event.clone()) {
                log::warn!("Failed to forward selection: {}", e);
            }
        }

        Some(event)
    }
}

async fn produce<S: GazeSource>(
    mut source: S,
    tx: mpsc::Sender<GazeSample>,
    mut shutdown: watch::Receiver<bool>,
    inner: Arc<RuntimeInner>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = source.next_sample() => next,
        };

        match next {
            Ok(Some(sample)) => match tx.try_send(sample) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    inner.dropped.fetch_add(1, Ordering::Relaxed);
                    log::trace!("Gaze queue full, sample dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            },
            Ok(None) => {
                log::info!("Gaze source exhausted");
                break;
            }
            Err(e) => {
                log::warn!("Gaze source error: {e:#}");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
    log::debug!("Gaze producer stopped");
}

async fn consume(
    mut rx: mpsc::Receiver<GazeSample>,
    mut shutdown: watch::Receiver<bool>,
    runtime: GazeRuntime,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let sample = tokio::select! {
            _ = shutdown.changed() => break,
            sample = rx.recv() => sample,
        };

        match sample {
            Some(sample) => {
                runtime.ingest(sample);
            }
            None => break,
        }
    }
    log::debug!("Gaze consumer stopped");
}
