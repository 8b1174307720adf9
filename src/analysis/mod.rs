//! Multi-signal scene analysis.
//!
//! Four independent analyses run in parallel on a shared luminance grid. Each
//! has its own deadline; a late or failed task leaves its field empty instead
//! of failing the whole summary.

mod angle;
mod contrast;
mod lines;
mod saliency;

pub use angle::dominant_angle;
pub use contrast::{classify_contrast, ContrastClass};
pub use lines::{extract_lines, HoughLine};
pub use saliency::salient_regions;

use crate::config::AnalysisConfig;
use crate::frame::Frame;
use crate::geometry::Rect;
use crate::luma::LumaGrid;
use crate::workers::{CancelToken, Workers};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Best-effort aggregate of the scene signals for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSummary {
    pub contrast_class: Option<ContrastClass>,
    pub dominant_angle_degrees: Option<f64>,
    pub line_count: Option<usize>,
    /// Normalized, top-left origin, strongest first.
    pub salient_regions: Option<Vec<Rect>>,
}

impl SignalSummary {
    pub fn is_empty(&self) -> bool {
        self.contrast_class.is_none()
            && self.dominant_angle_degrees.is_none()
            && self.line_count.is_none()
            && self.salient_regions.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Contrast,
    Angle,
    Lines,
    Saliency,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalValue {
    Contrast(ContrastClass),
    Angle(f64),
    Lines(usize),
    Saliency(Vec<Rect>),
}

/// One sub-analysis. Implementations must poll `cancel` at their own
/// boundaries and return `None` once it is set.
pub trait Signal: Send + Sync {
    fn kind(&self) -> SignalKind;

    fn run(&self, luma: &LumaGrid, cancel: &CancelToken) -> Option<SignalValue>;
}

struct ContrastSignal(AnalysisConfig);
struct AngleSignal(AnalysisConfig);
struct LinesSignal(AnalysisConfig);
struct SaliencySignal(AnalysisConfig);

impl Signal for ContrastSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Contrast
    }

    fn run(&self, luma: &LumaGrid, cancel: &CancelToken) -> Option<SignalValue> {
        classify_contrast(luma, &self.0, cancel).map(SignalValue::Contrast)
    }
}

impl Signal for AngleSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Angle
    }

    fn run(&self, luma: &LumaGrid, cancel: &CancelToken) -> Option<SignalValue> {
        dominant_angle(luma, &self.0, cancel).map(SignalValue::Angle)
    }
}

impl Signal for LinesSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Lines
    }

    fn run(&self, luma: &LumaGrid, cancel: &CancelToken) -> Option<SignalValue> {
        extract_lines(luma, &self.0, cancel).map(|lines| SignalValue::Lines(lines.len()))
    }
}

impl Signal for SaliencySignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Saliency
    }

    fn run(&self, luma: &LumaGrid, cancel: &CancelToken) -> Option<SignalValue> {
        salient_regions(luma, &self.0, cancel).map(SignalValue::Saliency)
    }
}

struct Pending {
    kind: SignalKind,
    rx: Receiver<Option<SignalValue>>,
    cancel: CancelToken,
    deadline: Instant,
}

/// Fans the signals out to a dedicated pool and gathers them back.
pub struct SignalAnalyzer {
    config: AnalysisConfig,
    signals: Vec<Arc<dyn Signal>>,
    pool: Workers,
}

impl SignalAnalyzer {
    pub fn new(config: AnalysisConfig) -> std::io::Result<Self> {
        let signals: Vec<Arc<dyn Signal>> = vec![
            Arc::new(ContrastSignal(config.clone())),
            Arc::new(AngleSignal(config.clone())),
            Arc::new(LinesSignal(config.clone())),
            Arc::new(SaliencySignal(config.clone())),
        ];
        // Room for one late straggler per signal on top of the current batch.
        let pool = Workers::new("signal", signals.len(), signals.len() * 2)?;
        Ok(Self {
            config,
            signals,
            pool,
        })
    }

    /// Replace the built-in signal of the same kind.
    pub fn with_signal(mut self, signal: Arc<dyn Signal>) -> Self {
        let kind = signal.kind();
        self.signals.retain(|s| s.kind() != kind);
        self.signals.push(signal);
        self
    }

    pub fn timeout(&self, kind: SignalKind) -> Duration {
        match kind {
            SignalKind::Contrast => self.config.contrast_timeout,
            SignalKind::Angle => self.config.angle_timeout,
            SignalKind::Lines => self.config.lines_timeout,
            SignalKind::Saliency => self.config.saliency_timeout,
        }
    }

    pub fn analyze(&self, frame: &Frame) -> SignalSummary {
        let _span = tracing::debug_span!("signals", frame = frame.id.0).entered();
        let luma = Arc::new(LumaGrid::from_image(&frame.image, self.config.analysis_side));
        self.analyze_luma(luma)
    }

    pub fn analyze_luma(&self, luma: Arc<LumaGrid>) -> SignalSummary {
        if luma.is_empty() {
            return SignalSummary::default();
        }

        let started = Instant::now();
        let pending: Vec<Pending> = self
            .signals
            .iter()
            .map(|signal| {
                let (tx, rx) = bounded(1);
                let cancel = CancelToken::new();
                let task_signal = Arc::clone(signal);
                let task_luma = Arc::clone(&luma);
                let task_cancel = cancel.clone();
                let queued = self.pool.try_execute(move || {
                    let value = task_signal.run(&task_luma, &task_cancel);
                    let _ = tx.send(value);
                });
                if !queued {
                    debug!("{:?} signal not queued", signal.kind());
                }
                Pending {
                    kind: signal.kind(),
                    rx,
                    cancel,
                    deadline: started + self.timeout(signal.kind()),
                }
            })
            .collect();

        let mut summary = SignalSummary::default();
        for task in pending {
            let value = match task.rx.recv_deadline(task.deadline) {
                Ok(value) => value,
                Err(RecvTimeoutError::Timeout) => {
                    task.cancel.cancel();
                    debug!("{:?} signal timed out", task.kind);
                    None
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("{:?} signal failed", task.kind);
                    None
                }
            };
            match value {
                Some(SignalValue::Contrast(c)) => summary.contrast_class = Some(c),
                Some(SignalValue::Angle(a)) => summary.dominant_angle_degrees = Some(a),
                Some(SignalValue::Lines(n)) => summary.line_count = Some(n),
                Some(SignalValue::Saliency(r)) => summary.salient_regions = Some(r),
                None => {}
            }
        }

        debug!("Signals done in {:.1}ms: {:?}", started.elapsed().as_secs_f64() * 1000.0, summary);
        summary
    }
}
