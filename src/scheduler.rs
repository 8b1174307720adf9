//! Decides which arriving frames get analysed.
//!
//! Frames are sampled every Nth arrival once the warm-up interval has passed.
//! At most one scoring pass and one signal pass are in flight at a time; a
//! sampled frame arriving while the previous pass is still running is dropped,
//! never queued. Every technique switch bumps an epoch, and work tagged with an
//! older epoch can no longer publish.

use crate::composition::CompositionTechnique;
use crate::config::SchedulerConfig;
use crate::frame::FrameId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The capture source has not been started.
    NotStarted,
    WarmingUp,
    NotSampled,
    /// The previous sampled frame is still being analysed.
    Busy,
}

/// Releases an in-flight slot when dropped, including on panic.
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Technique and the epoch it was selected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TechniqueState {
    pub technique: CompositionTechnique,
    pub epoch: u64,
}

/// Permission to analyse one frame.
#[derive(Debug)]
pub struct Ticket {
    pub frame_id: FrameId,
    pub technique: CompositionTechnique,
    pub epoch: u64,
    current_epoch: Arc<AtomicU64>,
    _scoring: InFlightGuard,
    /// Present when this frame also feeds the signal analyzer.
    pub signals: Option<InFlightGuard>,
}

impl Ticket {
    /// False once the technique has changed since the ticket was issued.
    pub fn is_current(&self) -> bool {
        self.current_epoch.load(Ordering::Acquire) == self.epoch
    }

    pub fn epoch_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.current_epoch)
    }
}

#[derive(Debug)]
pub enum Decision {
    Analyze(Ticket),
    Skip(SkipReason),
}

pub struct FrameScheduler {
    config: SchedulerConfig,
    started_at: Mutex<Option<Instant>>,
    arrivals: AtomicU64,
    accepted: AtomicU64,
    scoring_in_flight: Arc<AtomicBool>,
    signals_in_flight: Arc<AtomicBool>,
    state: Mutex<TechniqueState>,
    epoch: Arc<AtomicU64>,
}

impl FrameScheduler {
    pub fn new(config: SchedulerConfig, technique: CompositionTechnique) -> Self {
        Self {
            config,
            started_at: Mutex::new(None),
            arrivals: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            scoring_in_flight: Arc::new(AtomicBool::new(false)),
            signals_in_flight: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(TechniqueState {
                technique,
                epoch: 0,
            }),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The capture source became active; the warm-up interval starts now.
    pub fn start(&self, now: Instant) {
        *self.started_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
        self.arrivals.store(0, Ordering::Relaxed);
        self.accepted.store(0, Ordering::Relaxed);
        debug!("Scheduler started, warm-up {:?}", self.config.warmup);
    }

    pub fn stop(&self) {
        *self.started_at.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Called on the frame-arrival path. Never blocks on analysis work.
    pub fn offer(&self, frame_id: FrameId, now: Instant) -> Decision {
        let started = *self.started_at.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(started) = started else {
            return Decision::Skip(SkipReason::NotStarted);
        };
        if now.saturating_duration_since(started) < self.config.warmup {
            return Decision::Skip(SkipReason::WarmingUp);
        }

        let arrival = self.arrivals.fetch_add(1, Ordering::Relaxed);
        if arrival % self.config.sample_every.max(1) != 0 {
            return Decision::Skip(SkipReason::NotSampled);
        }

        let Some(scoring) = InFlightGuard::try_acquire(&self.scoring_in_flight) else {
            debug!("Frame {} dropped: analysis in flight", frame_id.0);
            return Decision::Skip(SkipReason::Busy);
        };

        let accepted = self.accepted.fetch_add(1, Ordering::Relaxed);
        let signals = if accepted % self.config.signal_every.max(1) == 0 {
            InFlightGuard::try_acquire(&self.signals_in_flight)
        } else {
            None
        };

        let state = self.technique_state();
        Decision::Analyze(Ticket {
            frame_id,
            technique: state.technique,
            epoch: state.epoch,
            current_epoch: Arc::clone(&self.epoch),
            _scoring: scoring,
            signals,
        })
    }

    pub fn technique_state(&self) -> TechniqueState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Switch technique and invalidate all in-flight work. Returns the new
    /// epoch.
    pub fn set_technique(&self, technique: CompositionTechnique) -> u64 {
        let mut state = self.lock_state();
        state.technique = technique;
        state.epoch += 1;
        self.epoch.store(state.epoch, Ordering::Release);
        debug!("Technique -> {} (epoch {})", technique.key(), state.epoch);
        state.epoch
    }

    /// Hold the technique state. Publishing under this lock cannot interleave
    /// with a technique switch.
    pub fn lock_state(&self) -> MutexGuard<'_, TechniqueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
