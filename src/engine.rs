//! Live composition engine.
//!
//! The frame-arrival path only asks the [`FrameScheduler`] for a ticket and
//! queues work; it never waits on analysis. Workers compute immutable results
//! and hand them to a coordinator thread, the only writer of the latest
//! result. The coordinator publishes under the scheduler's technique lock, so
//! a result for a technique can never appear after a switch away from it.

use crate::analysis::{SignalAnalyzer, SignalSummary};
use crate::composition::{CompositionResult, CompositionTechnique, OverlayPrimitive, RuleEngine};
use crate::config::EngineConfig;
use crate::detection::SubjectDetector;
use crate::frame::{Frame, FrameId};
use crate::geometry::{CoordinateMapper, Size};
use crate::luma::LumaGrid;
use crate::scheduler::{Decision, FrameScheduler, SkipReason, Ticket};
use crate::workers::Workers;
use crossbeam_channel::{unbounded, Receiver, Sender, TrySendError};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// Per-subscriber backlog before the oldest undelivered results are dropped.
const SUBSCRIBER_BACKLOG: usize = 16;

/// A result as published, with the technique epoch it belongs to.
#[derive(Debug, Clone)]
pub struct Published {
    pub epoch: u64,
    pub result: Arc<CompositionResult>,
}

enum Message {
    Scored { epoch: u64, result: CompositionResult },
    Signals { epoch: u64, frame_id: FrameId, summary: SignalSummary },
}

/// Everything a worker job needs, shared read-only.
struct Pipeline {
    config: EngineConfig,
    detector: SubjectDetector,
    rules: RuleEngine,
    analyzer: SignalAnalyzer,
    mapper: CoordinateMapper,
    viewport: RwLock<Option<Size>>,
}

impl Pipeline {
    fn score(&self, frame: &Frame, ticket: &Ticket) -> Option<CompositionResult> {
        let _span = tracing::debug_span!("score", frame = frame.id.0).entered();
        let region = self.detector.detect(frame);
        if !ticket.is_current() {
            return None;
        }

        let luma = match ticket.technique {
            CompositionTechnique::RuleOfThirds => None,
            CompositionTechnique::CenterFraming | CompositionTechnique::Symmetry => {
                let side = self.config.composition.symmetry_grid;
                Some(LumaGrid::resized(&frame.image, side, side))
            }
        };
        let mut result =
            self.rules
                .evaluate(frame.id, ticket.technique, &region, frame.size(), luma.as_ref());

        if !region.is_none() {
            let viewport = *self.viewport.read().unwrap_or_else(PoisonError::into_inner);
            result.subject_display = viewport
                .map(|vp| self.mapper.map_to_display(region.bounds, frame.size(), vp))
                .filter(|r| !r.is_empty());
        }
        Some(result)
    }
}

struct Coordinator {
    scheduler: Arc<FrameScheduler>,
    latest: Arc<RwLock<Option<Published>>>,
    subscribers: Arc<Mutex<Vec<Sender<Published>>>>,
    last_frame: Option<(u64, FrameId)>,
    signals: Option<(u64, FrameId, SignalSummary)>,
}

impl Coordinator {
    fn run(mut self, rx: Receiver<Message>) {
        while let Ok(message) = rx.recv() {
            match message {
                Message::Scored { epoch, result } => self.publish(epoch, result),
                Message::Signals {
                    epoch,
                    frame_id,
                    summary,
                } => self.store_signals(epoch, frame_id, summary),
            }
        }
        debug!("Coordinator stopped");
    }

    fn store_signals(&mut self, epoch: u64, frame_id: FrameId, summary: SignalSummary) {
        if epoch != self.scheduler.current_epoch() {
            debug!("Signals for frame {} are stale", frame_id.0);
            return;
        }
        let newer = match &self.signals {
            Some((e, f, _)) => *e != epoch || frame_id > *f,
            None => true,
        };
        if newer {
            self.signals = Some((epoch, frame_id, summary));
        }
    }

    fn publish(&mut self, epoch: u64, mut result: CompositionResult) {
        let state = self.scheduler.lock_state();
        if state.epoch != epoch || state.technique != result.technique {
            debug!("Discarding frame {}: technique changed", result.frame_id.0);
            return;
        }
        if let Some((last_epoch, last_frame)) = self.last_frame {
            if last_epoch == epoch && result.frame_id <= last_frame {
                debug!("Discarding frame {}: not newer than {}", result.frame_id.0, last_frame.0);
                return;
            }
        }

        if let Some((signal_epoch, _, summary)) = &self.signals {
            if *signal_epoch == epoch {
                result.signals = Some(summary.clone());
            }
        }

        let published = Published {
            epoch,
            result: Arc::new(result),
        };
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(published.clone());
        self.last_frame = Some((epoch, published.result.frame_id));

        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(published.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
        drop(subscribers);
        drop(state);

        debug!(
            "Published frame {} ({}): score {:.2}",
            published.result.frame_id.0,
            published.result.technique.key(),
            published.result.score
        );
    }
}

pub struct CompositionEngine {
    scheduler: Arc<FrameScheduler>,
    pipeline: Arc<Pipeline>,
    workers: Workers,
    coordinator_tx: Option<Sender<Message>>,
    coordinator: Option<thread::JoinHandle<()>>,
    latest: Arc<RwLock<Option<Published>>>,
    subscribers: Arc<Mutex<Vec<Sender<Published>>>>,
}

impl CompositionEngine {
    pub fn new(config: EngineConfig, detector: SubjectDetector) -> std::io::Result<Self> {
        let scheduler = Arc::new(FrameScheduler::new(
            config.scheduler.clone(),
            CompositionTechnique::default(),
        ));
        // One signal orchestration may hold a worker while scoring continues.
        let threads = config.worker_count().max(2);
        let workers = Workers::new("compose", threads, threads * 2)?;
        let pipeline = Arc::new(Pipeline {
            rules: RuleEngine::new(config.composition.clone()),
            analyzer: SignalAnalyzer::new(config.analysis.clone())?,
            detector,
            mapper: CoordinateMapper::default(),
            viewport: RwLock::new(None),
            config,
        });

        let latest = Arc::new(RwLock::new(None));
        let subscribers = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = unbounded();
        let coordinator = Coordinator {
            scheduler: Arc::clone(&scheduler),
            latest: Arc::clone(&latest),
            subscribers: Arc::clone(&subscribers),
            last_frame: None,
            signals: None,
        };
        let handle = thread::Builder::new()
            .name("coordinator".to_string())
            .spawn(move || coordinator.run(rx))?;

        info!("Composition engine ready: {} workers", threads);

        Ok(Self {
            scheduler,
            pipeline,
            workers,
            coordinator_tx: Some(tx),
            coordinator: Some(handle),
            latest,
            subscribers,
        })
    }

    /// The capture source became active; starts the warm-up interval.
    pub fn start(&self) {
        self.scheduler.start(Instant::now());
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Offer an arriving frame. Never blocks on analysis.
    pub fn submit_frame(&self, frame: Frame) -> Option<SkipReason> {
        self.submit_frame_at(frame, Instant::now())
    }

    pub fn submit_frame_at(&self, frame: Frame, now: Instant) -> Option<SkipReason> {
        let mut ticket = match self.scheduler.offer(frame.id, now) {
            Decision::Analyze(ticket) => ticket,
            Decision::Skip(reason) => return Some(reason),
        };
        let Some(tx) = self.coordinator_tx.clone() else {
            return Some(SkipReason::Busy);
        };
        let epoch = ticket.epoch;

        // Signals run as their own job so scoring never waits on them. The
        // guard moves into the job and frees the signal slot when it ends.
        if let Some(guard) = ticket.signals.take() {
            let pipeline = Arc::clone(&self.pipeline);
            let frame = frame.clone();
            let tx = tx.clone();
            let current = ticket.epoch_handle();
            let queued = self.workers.try_execute(move || {
                let _guard = guard;
                let summary = pipeline.analyzer.analyze(&frame);
                if current.load(Ordering::Acquire) == epoch {
                    let _ = tx.send(Message::Signals {
                        epoch,
                        frame_id: frame.id,
                        summary,
                    });
                }
            });
            if !queued {
                debug!("Frame {}: signal pass dropped", ticket.frame_id.0);
            }
        }

        let pipeline = Arc::clone(&self.pipeline);
        let queued = self.workers.try_execute(move || {
            if let Some(result) = pipeline.score(&frame, &ticket) {
                let _ = tx.send(Message::Scored { epoch, result });
            }
            // The scoring slot is released only after the result is handed off.
            drop(ticket);
        });

        if queued {
            None
        } else {
            Some(SkipReason::Busy)
        }
    }

    /// Switch technique. In-flight work for the old one can no longer publish.
    pub fn set_technique(&self, technique: CompositionTechnique) -> u64 {
        info!("Technique: {}", technique.key());
        self.scheduler.set_technique(technique)
    }

    pub fn technique(&self) -> CompositionTechnique {
        self.scheduler.technique_state().technique
    }

    /// Latest result for the current technique.
    pub fn latest(&self) -> Option<Arc<CompositionResult>> {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        latest
            .as_ref()
            .filter(|p| p.epoch == self.scheduler.current_epoch())
            .map(|p| Arc::clone(&p.result))
    }

    /// Stream of published results, in publication order.
    pub fn subscribe(&self) -> Receiver<Published> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_BACKLOG);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Guides for the current technique, drawn before any subject is found.
    pub fn basic_overlays(&self, frame: Size) -> Vec<OverlayPrimitive> {
        self.pipeline.rules.basic_overlays(self.technique(), frame)
    }

    /// On-screen preview rectangle used to map subject boxes.
    pub fn set_viewport(&self, viewport: Option<Size>) {
        *self
            .pipeline
            .viewport
            .write()
            .unwrap_or_else(PoisonError::into_inner) = viewport.filter(|v| !v.is_degenerate());
    }
}

impl Drop for CompositionEngine {
    fn drop(&mut self) {
        self.scheduler.stop();
        // Queued jobs hold sender clones; the coordinator drains until the
        // last of them finishes.
        self.coordinator_tx.take();
        if let Some(handle) = self.coordinator.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompositionConfig, SchedulerConfig};
    use crate::detection::{Candidate, CandidateDetector, DetectedRegion};
    use crate::geometry::Rect;
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    struct Fixed(Rect);

    /// Never finds a subject.
    struct Nothing;

    impl CandidateDetector for Nothing {
        fn name(&self) -> &str {
            "nothing"
        }

        fn detect(&self, _frame: &Frame) -> anyhow::Result<Vec<Candidate>> {
            Ok(Vec::new())
        }
    }

    impl CandidateDetector for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&self, _frame: &Frame) -> anyhow::Result<Vec<Candidate>> {
            Ok(vec![Candidate::new(self.0, 0.9)])
        }
    }

    fn engine(subject: Rect) -> CompositionEngine {
        engine_with(Box::new(Fixed(subject)))
    }

    fn engine_with(backend: Box<dyn CandidateDetector>) -> CompositionEngine {
        let config = EngineConfig {
            scheduler: SchedulerConfig {
                sample_every: 1,
                warmup: Duration::ZERO,
                signal_every: 1,
            },
            workers: Some(2),
            ..EngineConfig::default()
        };
        let detector = SubjectDetector::new(config.detection.clone()).with_primary(backend);
        CompositionEngine::new(config, detector).unwrap()
    }

    fn frame(id: u64) -> Frame {
        Frame::new(id, RgbImage::from_pixel(300, 300, Rgb([100, 100, 100])))
    }

    fn wait_for(rx: &Receiver<Published>) -> Published {
        rx.recv_timeout(Duration::from_secs(5)).expect("published result")
    }

    /// Submit frames until one is accepted; returns the next id to use.
    fn submit_accepted(engine: &CompositionEngine, mut id: u64) -> u64 {
        while engine.submit_frame(frame(id)).is_some() {
            id += 1;
            std::thread::sleep(Duration::from_millis(1));
        }
        id + 1
    }

    fn coordinator() -> (Coordinator, Arc<FrameScheduler>, Receiver<Published>) {
        let scheduler = Arc::new(FrameScheduler::new(
            SchedulerConfig::default(),
            CompositionTechnique::RuleOfThirds,
        ));
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_BACKLOG);
        let coordinator = Coordinator {
            scheduler: Arc::clone(&scheduler),
            latest: Arc::new(RwLock::new(None)),
            subscribers: Arc::new(Mutex::new(vec![tx])),
            last_frame: None,
            signals: None,
        };
        (coordinator, scheduler, rx)
    }

    fn scored(id: u64, technique: CompositionTechnique) -> CompositionResult {
        RuleEngine::new(CompositionConfig::default()).evaluate(
            FrameId(id),
            technique,
            &DetectedRegion::none(),
            Size::new(300.0, 300.0),
            None,
        )
    }

    fn summary(lines: usize) -> SignalSummary {
        SignalSummary {
            line_count: Some(lines),
            ..SignalSummary::default()
        }
    }

    #[test]
    fn nothing_is_analysed_before_start() {
        let engine = engine(Rect::new(0.3, 0.6, 0.1, 0.1));
        assert_eq!(engine.submit_frame(frame(1)), Some(SkipReason::NotStarted));
        assert!(engine.latest().is_none());
    }

    #[test]
    fn publishes_scored_frames() {
        let engine = engine(Rect::new(0.283, 0.617, 0.1, 0.1));
        let rx = engine.subscribe();
        engine.start();
        assert_eq!(engine.submit_frame(frame(1)), None);
        let published = wait_for(&rx);
        assert_eq!(published.result.frame_id, FrameId(1));
        assert_eq!(published.result.technique, CompositionTechnique::RuleOfThirds);
        assert!(published.result.score > 0.9);
        let latest = engine.latest().expect("latest");
        assert_eq!(latest.frame_id, FrameId(1));
    }

    #[test]
    fn switch_hides_old_results() {
        let engine = engine(Rect::new(0.45, 0.45, 0.1, 0.1));
        let rx = engine.subscribe();
        engine.start();
        engine.submit_frame(frame(1));
        wait_for(&rx);
        let epoch = engine.set_technique(CompositionTechnique::CenterFraming);
        assert!(engine.latest().is_none());

        let mut id = 2;
        let published = loop {
            id = submit_accepted(&engine, id);
            let p = wait_for(&rx);
            if p.epoch == epoch {
                break p;
            }
        };
        assert_eq!(published.result.technique, CompositionTechnique::CenterFraming);
        assert_eq!(engine.technique(), CompositionTechnique::CenterFraming);
    }

    #[test]
    fn subject_is_mapped_into_the_viewport() {
        let engine = engine(Rect::new(0.25, 0.25, 0.5, 0.5));
        engine.set_viewport(Some(Size::new(600.0, 600.0)));
        let rx = engine.subscribe();
        engine.start();
        engine.submit_frame(frame(1));
        let display = wait_for(&rx).result.subject_display.expect("mapped");
        assert!((display.x - 150.0).abs() < 1e-6);
        assert!((display.width - 300.0).abs() < 1e-6);
    }

    #[test]
    fn basic_overlays_follow_technique() {
        let engine = engine(Rect::EMPTY);
        let thirds = engine.basic_overlays(Size::new(300.0, 200.0));
        engine.set_technique(CompositionTechnique::Symmetry);
        let symmetry = engine.basic_overlays(Size::new(300.0, 200.0));
        assert_ne!(thirds.len(), symmetry.len());
        assert!(engine.basic_overlays(Size::new(0.0, 200.0)).is_empty());
    }

    #[test]
    fn signals_merge_only_within_their_epoch() {
        let (mut coordinator, scheduler, rx) = coordinator();
        coordinator.store_signals(0, FrameId(1), summary(3));
        coordinator.publish(0, scored(2, CompositionTechnique::RuleOfThirds));
        assert_eq!(rx.try_recv().unwrap().result.signals, Some(summary(3)));

        let epoch = scheduler.set_technique(CompositionTechnique::Symmetry);
        // Finished after the switch but computed for the old technique.
        coordinator.store_signals(0, FrameId(3), summary(7));
        coordinator.publish(epoch, scored(4, CompositionTechnique::Symmetry));
        let published = rx.try_recv().unwrap();
        assert_eq!(published.epoch, epoch);
        assert_eq!(published.result.signals, None);

        coordinator.store_signals(epoch, FrameId(5), summary(9));
        coordinator.publish(epoch, scored(6, CompositionTechnique::Symmetry));
        assert_eq!(rx.try_recv().unwrap().result.signals, Some(summary(9)));
    }

    #[test]
    fn out_of_order_and_stale_results_are_dropped() {
        let (mut coordinator, scheduler, rx) = coordinator();
        coordinator.publish(0, scored(5, CompositionTechnique::RuleOfThirds));
        coordinator.publish(0, scored(4, CompositionTechnique::RuleOfThirds));
        coordinator.publish(0, scored(5, CompositionTechnique::RuleOfThirds));
        let received: Vec<_> = rx.try_iter().map(|p| p.result.frame_id).collect();
        assert_eq!(received, vec![FrameId(5)]);

        let epoch = scheduler.set_technique(CompositionTechnique::CenterFraming);
        coordinator.publish(0, scored(9, CompositionTechnique::RuleOfThirds));
        assert!(rx.try_recv().is_err());

        // Frame ids are compared within an epoch only.
        coordinator.publish(epoch, scored(1, CompositionTechnique::CenterFraming));
        let latest = coordinator.latest.read().unwrap().clone().expect("latest");
        assert_eq!(latest.epoch, epoch);
        assert_eq!(latest.result.frame_id, FrameId(1));
    }

    #[test]
    fn signal_summaries_reach_published_results() {
        let engine = engine(Rect::new(0.3, 0.3, 0.2, 0.2));
        let rx = engine.subscribe();
        engine.start();
        let mut id = 1;
        let mut with_signals = 0;
        for _ in 0..20 {
            id = submit_accepted(&engine, id);
            if wait_for(&rx).result.signals.is_some() {
                with_signals += 1;
            }
        }
        assert!(with_signals > 0);
    }

    #[test]
    fn symmetry_scores_pixels_without_a_subject() {
        let engine = engine_with(Box::new(Nothing));
        let rx = engine.subscribe();
        engine.set_technique(CompositionTechnique::Symmetry);
        engine.start();
        submit_accepted(&engine, 1);
        let result = wait_for(&rx).result;
        assert_eq!(result.technique, CompositionTechnique::Symmetry);
        assert!(result.score > 0.99, "score {}", result.score);
        assert_eq!(result.icon_key, "symmetry");
        assert!(result.subject_display.is_none());
    }
}
